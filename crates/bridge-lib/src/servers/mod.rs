//! Server resolution for exposed container ports
//!
//! This module turns observed network state (gateway, container address,
//! ephemeral port bindings, labels) into [`ServerRecord`]s:
//! - `conf`: per-port server descriptor (override > label > synthesized)
//! - `strategy`: internal/external address computation, one type per variant
//! - `selector`: name-keyed choice of the active strategy

mod conf;
mod selector;
mod strategy;

#[cfg(test)]
mod tests;

pub use conf::{default_ref, normalize_server_confs, resolve_server_conf, ServerConfMap};
pub use selector::{StrategySelector, DEFAULT_STRATEGY, HOST_PORT_STRATEGY, LOCAL_ENGINE_STRATEGY};
pub use strategy::{
    AddressOverrides, AddressPlan, AddressStrategy, DefaultStrategy, HostPortStrategy,
    LocalEngineStrategy, ServerAddressStrategy, DEFAULT_HOSTNAME,
};

use crate::models::PortBinding;
use std::collections::BTreeMap;

/// Network state observed for one running container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedNetwork {
    /// Gateway address reported for the container network
    pub gateway: Option<String>,
    /// Address of the container inside the cluster network
    pub container_address: Option<String>,
    /// Ephemeral bindings keyed by "port/protocol"
    pub ports: BTreeMap<String, Vec<PortBinding>>,
    /// Server labels attached to the container
    pub labels: BTreeMap<String, String>,
    /// Host the caller reaches the platform on, used when nothing better is known
    pub fallback_host: Option<String>,
}

impl ObservedNetwork {
    pub fn gateway(&self) -> Option<&str> {
        non_empty(self.gateway.as_deref())
    }

    pub fn container_address(&self) -> Option<&str> {
        non_empty(self.container_address.as_deref())
    }

    pub fn fallback_host(&self) -> Option<&str> {
        non_empty(self.fallback_host.as_deref())
    }

    /// First binding for a "port/protocol" token
    pub fn binding(&self, token: &str) -> Option<&PortBinding> {
        self.ports.get(token).and_then(|bindings| bindings.first())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
