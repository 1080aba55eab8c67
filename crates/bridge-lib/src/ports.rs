//! Exposed-port parsing and service/container port construction
//!
//! Ports are exchanged as `"<port>/<protocol>"` tokens. Service ports keep
//! the protocol as written, container ports upper-case it. Names come from a
//! table of well-known workspace ports, falling back to the token with `/`
//! replaced by `-`. No remapping is done here: the platform allocates the
//! ephemeral node port itself.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Separator between port number and protocol in a token
pub const PORT_PROTOCOL_DELIMITER: char = '/';

/// Well-known workspace ports and their symbolic names
const WELL_KNOWN_PORTS: &[(u16, &str)] = &[
    (22, "sshd"),
    (4401, "wsagent"),
    (4403, "wsagent-jpda"),
    (4411, "terminal"),
    (8080, "tomcat"),
    (8000, "tomcat-jpda"),
    (9876, "codeserver"),
];

/// A parsed "port/protocol" token
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PortSpec {
    pub port: u16,
    pub protocol: String,
}

impl PortSpec {
    /// Parse a "<port>/<protocol>" token
    pub fn parse(token: &str) -> Result<Self> {
        let (port, protocol) = token
            .split_once(PORT_PROTOCOL_DELIMITER)
            .ok_or_else(|| Error::invalid_spec(format!("port '{}' has no protocol", token)))?;

        let port = port
            .parse::<u16>()
            .map_err(|_| Error::invalid_spec(format!("port '{}' is not a valid number", token)))?;

        if protocol.is_empty() {
            return Err(Error::invalid_spec(format!("port '{}' has no protocol", token)));
        }

        Ok(Self {
            port,
            protocol: protocol.to_string(),
        })
    }

    /// Back to the "<port>/<protocol>" form
    pub fn token(&self) -> String {
        format!("{}{}{}", self.port, PORT_PROTOCOL_DELIMITER, self.protocol)
    }

    /// Symbolic name of this port
    pub fn name(&self) -> String {
        well_known_name(self.port)
            .map(str::to_string)
            .unwrap_or_else(|| self.token().replace(PORT_PROTOCOL_DELIMITER, "-"))
    }
}

/// Port exposed through the workspace service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    pub protocol: String,
    pub port: u16,
    pub target_port: u16,
    /// Node port allocated by the platform; only known after creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<u16>,
}

/// Port declared on the workspace container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPort {
    pub name: String,
    pub protocol: String,
    pub container_port: u16,
}

/// Look up the symbolic name of a well-known port
pub fn well_known_name(port: u16) -> Option<&'static str> {
    WELL_KNOWN_PORTS
        .iter()
        .find(|(number, _)| *number == port)
        .map(|(_, name)| *name)
}

/// Union of image-declared and caller-declared port tokens
pub fn exposed_ports<'a, I, J>(image_ports: I, requested_ports: J) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
    J: IntoIterator<Item = &'a String>,
{
    image_ports
        .into_iter()
        .chain(requested_ports)
        .cloned()
        .collect()
}

/// Service ports for a set of exposed-port tokens
pub fn service_ports<'a, I>(exposed: I) -> Result<Vec<ServicePort>>
where
    I: IntoIterator<Item = &'a String>,
{
    exposed
        .into_iter()
        .map(|token| {
            let spec = PortSpec::parse(token)?;
            Ok(ServicePort {
                name: spec.name(),
                protocol: spec.protocol.clone(),
                port: spec.port,
                target_port: spec.port,
                node_port: None,
            })
        })
        .collect()
}

/// Container ports for a set of exposed-port tokens
pub fn container_ports<'a, I>(exposed: I) -> Result<Vec<ContainerPort>>
where
    I: IntoIterator<Item = &'a String>,
{
    exposed
        .into_iter()
        .map(|token| {
            let spec = PortSpec::parse(token)?;
            Ok(ContainerPort {
                name: spec.name(),
                protocol: spec.protocol.to_uppercase(),
                container_port: spec.port,
            })
        })
        .collect()
}
