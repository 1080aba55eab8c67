//! Core data models for the workspace bridge

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Container creation request, as issued by the workspace manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name requested by the caller (e.g. "workspaceab12_machine3_che_ws")
    pub name: String,
    /// Image reference
    pub image: String,
    /// Environment in "NAME=VALUE" form
    #[serde(default)]
    pub env: Vec<String>,
    /// Exposed ports as "<port>/<protocol>" tokens
    #[serde(default)]
    pub exposed_ports: BTreeSet<String>,
    /// Bind mounts as "hostPath:mountPath[:mode]"
    #[serde(default)]
    pub binds: Vec<String>,
    /// Free-form labels; null values are dropped when stored on the platform
    #[serde(default)]
    pub labels: BTreeMap<String, Option<String>>,
}

/// Result of a successful create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreated {
    pub id: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ContainerCreated {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            warnings: Vec::new(),
        }
    }
}

/// Server descriptor supplied by the caller or synthesized from labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConf {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub ref_name: Option<String>,
    /// "<port>/<protocol>" token
    pub port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ServerConf {
    pub fn new(
        ref_name: Option<&str>,
        port: &str,
        protocol: Option<&str>,
        path: Option<&str>,
    ) -> Self {
        Self {
            ref_name: ref_name.map(str::to_string),
            port: port.to_string(),
            protocol: protocol.map(str::to_string),
            path: path.map(str::to_string),
        }
    }
}

/// Host address bound to an exposed port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default)]
    pub host_ip: Option<String>,
    #[serde(default)]
    pub host_port: String,
}

impl PortBinding {
    pub fn new(host_ip: impl Into<String>, host_port: impl Into<String>) -> Self {
        Self {
            host_ip: Some(host_ip.into()),
            host_port: host_port.into(),
        }
    }
}

/// Internal view of a resolved server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub internal_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_url: Option<String>,
}

/// Reachability descriptor for one exposed port of a running container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// External "host:port"
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub properties: ServerProperties,
}

/// Everything `inspect` reports about a container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub properties: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub servers: BTreeMap<String, ServerRecord>,
}
