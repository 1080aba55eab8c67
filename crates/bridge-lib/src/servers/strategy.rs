//! Address strategies for resolving servers
//!
//! Every strategy decides, from the observed network and its configured
//! overrides, an [`AddressPlan`]: which host internal clients use, which host
//! external clients use, and whether internal clients go through the
//! ephemeral node port or straight to the exposed container port. Turning a
//! plan into server records is shared by all variants.

use super::conf::{default_ref, resolve_server_conf, ServerConfMap};
use super::ObservedNetwork;
use crate::models::{PortBinding, ServerConf, ServerProperties, ServerRecord};
use crate::ports::PORT_PROTOCOL_DELIMITER;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Host used when neither overrides nor network state provide one
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// Address overrides fixed when a strategy is constructed
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AddressOverrides {
    /// Host reported to internal clients instead of the observed one
    #[serde(default)]
    pub internal_address: Option<String>,
    /// Host reported to external clients instead of the observed one
    #[serde(default)]
    pub external_address: Option<String>,
    /// Talk to the container directly on its in-cluster address when known
    #[serde(default)]
    pub use_internal_address: bool,
}

/// Hosts and port mode chosen for one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPlan {
    pub internal_host: String,
    pub external_host: String,
    /// False when internal clients talk to the exposed port directly
    pub use_ephemeral_ports: bool,
}

/// Computes server records for the exposed ports of a container
pub trait ServerAddressStrategy: Send + Sync {
    /// Choose hosts and port mode for the observed network
    fn plan(&self, network: &ObservedNetwork) -> AddressPlan;

    /// Resolve a server record for every bound port
    fn resolve(
        &self,
        network: &ObservedNetwork,
        confs: &ServerConfMap,
    ) -> BTreeMap<String, ServerRecord> {
        let plan = self.plan(network);

        network
            .ports
            .keys()
            .filter_map(|token| {
                let binding = network.binding(token)?;
                let conf = resolve_server_conf(token, confs, &network.labels);
                Some((token.clone(), server_record(token, binding, conf, &plan)))
            })
            .collect()
    }
}

fn server_record(
    token: &str,
    binding: &PortBinding,
    conf: ServerConf,
    plan: &AddressPlan,
) -> ServerRecord {
    let ephemeral_port = binding.host_port.as_str();
    let exposed_port = token
        .split_once(PORT_PROTOCOL_DELIMITER)
        .map(|(port, _)| port)
        .unwrap_or(token);

    let internal_port = if plan.use_ephemeral_ports {
        ephemeral_port
    } else {
        exposed_port
    };

    let internal_address = format!("{}:{}", plan.internal_host, internal_port);
    let external_address = format!("{}:{}", plan.external_host, ephemeral_port);

    let (internal_url, external_url) = match conf.protocol.as_deref() {
        Some(protocol) => {
            let suffix = path_suffix(conf.path.as_deref());
            (
                Some(format!("{}://{}{}", protocol, internal_address, suffix)),
                Some(format!("{}://{}{}", protocol, external_address, suffix)),
            )
        }
        None => (None, None),
    };

    ServerRecord {
        ref_name: conf.ref_name.unwrap_or_else(|| default_ref(token)),
        protocol: conf.protocol,
        address: external_address,
        url: external_url,
        properties: ServerProperties {
            path: conf.path,
            internal_address,
            internal_url,
        },
    }
}

fn path_suffix(path: Option<&str>) -> String {
    match path {
        Some(path) if !path.is_empty() => {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            }
        }
        _ => String::new(),
    }
}

/// Internal host and port mode shared by the variants
fn internal_plan(
    overrides: &AddressOverrides,
    use_internal_address: bool,
    network: &ObservedNetwork,
    observed_host: &str,
) -> (String, bool) {
    if let Some(host) = overrides.internal_address.as_deref() {
        return (host.to_string(), true);
    }
    match network.container_address() {
        Some(address) if use_internal_address => (address.to_string(), false),
        _ => (observed_host.to_string(), true),
    }
}

/// Gateway, else the caller's fallback host, else localhost
fn observed_host(network: &ObservedNetwork) -> &str {
    network
        .gateway()
        .or_else(|| network.fallback_host())
        .unwrap_or(DEFAULT_HOSTNAME)
}

/// Gateway and ephemeral ports unless direct addressing is requested.
/// External clients never inherit the internal override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultStrategy {
    overrides: AddressOverrides,
}

impl DefaultStrategy {
    pub fn new(overrides: AddressOverrides) -> Self {
        Self { overrides }
    }
}

impl ServerAddressStrategy for DefaultStrategy {
    fn plan(&self, network: &ObservedNetwork) -> AddressPlan {
        let observed = observed_host(network);
        let (internal_host, use_ephemeral_ports) = internal_plan(
            &self.overrides,
            self.overrides.use_internal_address,
            network,
            observed,
        );
        let external_host = self
            .overrides
            .external_address
            .clone()
            .unwrap_or_else(|| observed.to_string());

        AddressPlan {
            internal_host,
            external_host,
            use_ephemeral_ports,
        }
    }
}

/// Direct in-cluster addressing whenever the container address is known
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalEngineStrategy {
    overrides: AddressOverrides,
}

impl LocalEngineStrategy {
    pub fn new(overrides: AddressOverrides) -> Self {
        Self { overrides }
    }
}

impl ServerAddressStrategy for LocalEngineStrategy {
    fn plan(&self, network: &ObservedNetwork) -> AddressPlan {
        let observed = observed_host(network);
        let (internal_host, use_ephemeral_ports) =
            internal_plan(&self.overrides, true, network, observed);
        let external_host = self
            .overrides
            .external_address
            .clone()
            .unwrap_or_else(|| observed.to_string());

        AddressPlan {
            internal_host,
            external_host,
            use_ephemeral_ports,
        }
    }
}

/// Explicit host:port addressing: the external host falls back to the
/// internal override before the observed gateway
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPortStrategy {
    overrides: AddressOverrides,
}

impl HostPortStrategy {
    pub fn new(overrides: AddressOverrides) -> Self {
        Self { overrides }
    }
}

impl ServerAddressStrategy for HostPortStrategy {
    fn plan(&self, network: &ObservedNetwork) -> AddressPlan {
        let observed = observed_host(network);
        let (internal_host, use_ephemeral_ports) = internal_plan(
            &self.overrides,
            self.overrides.use_internal_address,
            network,
            observed,
        );
        let external_host = self
            .overrides
            .external_address
            .as_deref()
            .or(self.overrides.internal_address.as_deref())
            .unwrap_or(observed)
            .to_string();

        AddressPlan {
            internal_host,
            external_host,
            use_ephemeral_ports,
        }
    }
}

/// Closed set of strategy variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressStrategy {
    Default(DefaultStrategy),
    LocalEngine(LocalEngineStrategy),
    HostPort(HostPortStrategy),
}

impl AddressStrategy {
    pub fn variant_name(&self) -> &'static str {
        match self {
            AddressStrategy::Default(_) => "default",
            AddressStrategy::LocalEngine(_) => "local-engine",
            AddressStrategy::HostPort(_) => "host-port",
        }
    }
}

impl ServerAddressStrategy for AddressStrategy {
    fn plan(&self, network: &ObservedNetwork) -> AddressPlan {
        match self {
            AddressStrategy::Default(s) => s.plan(network),
            AddressStrategy::LocalEngine(s) => s.plan(network),
            AddressStrategy::HostPort(s) => s.plan(network),
        }
    }
}
