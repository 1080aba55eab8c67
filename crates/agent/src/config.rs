//! Agent configuration

use anyhow::{Context, Result};
use bridge_lib::BridgeConfig;
use serde::Deserialize;
use std::collections::HashMap;

/// Optional configuration file, layered under the environment
pub const CONFIG_FILE_ENV: &str = "BRIDGE_CONFIG";

const ENV_PREFIX: &str = "BRIDGE";
const ENV_SEPARATOR: &str = "__";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Port of the HTTP API (containers, health, metrics)
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds between engine/platform health probes
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    #[serde(flatten)]
    pub bridge: BridgeConfig,
}

fn default_api_port() -> u16 {
    8080
}

fn default_health_interval() -> u64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            health_interval_secs: default_health_interval(),
            bridge: BridgeConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from `BRIDGE_CONFIG` (if set) and `BRIDGE_*`
    /// environment variables, e.g. `BRIDGE_ADDRESS__STRATEGY=docker-local`
    pub fn load() -> Result<Self> {
        Self::from_sources(std::env::var(CONFIG_FILE_ENV).ok().as_deref(), None)
    }

    /// Build from an optional file and an explicit environment map
    /// (the process environment when `env` is `None`)
    pub fn from_sources(file: Option<&str>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env),
        );

        let settings = builder.build().context("failed to read agent configuration")?;
        settings
            .try_deserialize()
            .context("invalid agent configuration")
    }
}
