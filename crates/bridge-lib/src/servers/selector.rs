//! Name-keyed selection of the active address strategy

use super::strategy::{
    AddressOverrides, AddressStrategy, DefaultStrategy, HostPortStrategy, LocalEngineStrategy,
};
use std::collections::BTreeMap;
use tracing::warn;

/// Name of the fallback strategy
pub const DEFAULT_STRATEGY: &str = "default";
/// Direct in-cluster addressing
pub const LOCAL_ENGINE_STRATEGY: &str = "docker-local";
/// Explicit host:port addressing
pub const HOST_PORT_STRATEGY: &str = "host-port";

/// Registry of strategies, built once at startup
#[derive(Debug, Clone)]
pub struct StrategySelector {
    default: AddressStrategy,
    strategies: BTreeMap<String, AddressStrategy>,
}

impl StrategySelector {
    /// Register every variant with the same overrides
    pub fn new(overrides: AddressOverrides) -> Self {
        let mut selector = Self {
            default: AddressStrategy::Default(DefaultStrategy::new(overrides.clone())),
            strategies: BTreeMap::new(),
        };
        selector.register(
            DEFAULT_STRATEGY,
            AddressStrategy::Default(DefaultStrategy::new(overrides.clone())),
        );
        selector.register(
            LOCAL_ENGINE_STRATEGY,
            AddressStrategy::LocalEngine(LocalEngineStrategy::new(overrides.clone())),
        );
        selector.register(
            HOST_PORT_STRATEGY,
            AddressStrategy::HostPort(HostPortStrategy::new(overrides)),
        );
        selector
    }

    /// Add or replace a strategy; registering "default" replaces the fallback
    pub fn register(&mut self, name: impl Into<String>, strategy: AddressStrategy) {
        let name = name.into();
        if name == DEFAULT_STRATEGY {
            self.default = strategy.clone();
        }
        self.strategies.insert(name, strategy);
    }

    /// The strategy registered under `name`, or the default one
    pub fn get(&self, name: &str) -> &AddressStrategy {
        match self.strategies.get(name) {
            Some(strategy) => strategy,
            None => {
                warn!(
                    strategy = %name,
                    fallback = DEFAULT_STRATEGY,
                    "Unknown server address strategy, using default"
                );
                &self.default
            }
        }
    }

    /// Registered strategy names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(AddressOverrides::default())
    }
}
