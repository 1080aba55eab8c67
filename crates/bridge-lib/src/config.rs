//! Typed configuration for the bridge
//!
//! Every section deserializes with defaults, so an empty source yields a
//! working configuration against the local cluster.

use crate::models::ServerConf;
use crate::poll::PollConfig;
use crate::servers::{AddressOverrides, DEFAULT_STRATEGY};
use serde::Deserialize;

/// Top-level bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Connector name ("openshift" or "default")
    #[serde(default = "default_connector")]
    pub connector: String,

    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub address: AddressConfig,

    #[serde(default)]
    pub discovery: PollConfig,

    #[serde(default)]
    pub routes: RouteConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Servers every workspace container exposes
    #[serde(default)]
    pub servers: Vec<ServerConf>,
}

fn default_connector() -> String {
    "openshift".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connector: default_connector(),
            platform: PlatformConfig::default(),
            address: AddressConfig::default(),
            discovery: PollConfig::default(),
            routes: RouteConfig::default(),
            engine: EngineConfig::default(),
            servers: Vec::new(),
        }
    }
}

/// Orchestration platform access
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Project the workspace resources are created in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Service account the workspace deployments run under
    #[serde(default = "default_service_account")]
    pub service_account: String,

    /// Explicit kubeconfig; in-cluster or ambient config otherwise
    #[serde(default)]
    pub kubeconfig: Option<String>,

    /// API server URL overriding the one from kubeconfig
    #[serde(default)]
    pub api_endpoint: Option<String>,

    /// Address node ports are reachable on
    #[serde(default = "default_node_address")]
    pub node_address: String,

    /// Claim holding every workspace's project files, mounted by the
    /// workspace-files jobs
    #[serde(default = "default_workspaces_pvc_name")]
    pub workspaces_pvc_name: String,

    /// Bounds on waiting for a workspace-files job to finish
    #[serde(default)]
    pub files_job: PollConfig,
}

fn default_namespace() -> String {
    "eclipse-che".to_string()
}

fn default_service_account() -> String {
    "cheserviceaccount".to_string()
}

fn default_node_address() -> String {
    "172.17.0.1".to_string()
}

fn default_workspaces_pvc_name() -> String {
    "claim-che-workspace".to_string()
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            service_account: default_service_account(),
            kubeconfig: None,
            api_endpoint: None,
            node_address: default_node_address(),
            workspaces_pvc_name: default_workspaces_pvc_name(),
            files_job: PollConfig::default(),
        }
    }
}

/// Server address resolution
#[derive(Debug, Clone, Deserialize)]
pub struct AddressConfig {
    /// Registered strategy name
    #[serde(default = "default_strategy")]
    pub strategy: String,

    #[serde(flatten)]
    pub overrides: AddressOverrides,
}

fn default_strategy() -> String {
    DEFAULT_STRATEGY.to_string()
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            overrides: AddressOverrides::default(),
        }
    }
}

/// Route exposure of workspace servers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Terminate TLS at the router and redirect plain HTTP
    #[serde(default)]
    pub tls: bool,

    /// External root hostname routes are created under
    #[serde(default)]
    pub external_address: Option<String>,
}

/// Container engine API
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
}

fn default_engine_url() -> String {
    "http://127.0.0.1:2375".to_string()
}

fn default_engine_timeout() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            timeout_secs: default_engine_timeout(),
        }
    }
}
