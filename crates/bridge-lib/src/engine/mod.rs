//! Container engine client
//!
//! The bridge reads image metadata and container state from the engine and,
//! for the pass-through connector, creates and removes containers there
//! directly. Payloads follow the engine's JSON wire format.

mod client;

pub use client::HttpEngine;

use crate::error::EngineError;
use crate::models::{ContainerCreated, ContainerSpec, PortBinding};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Result type for engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Image metadata as returned by image inspect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub config: Option<ImageConfig>,
}

impl ImageInfo {
    /// Exposed-port tokens declared by the image
    pub fn exposed_ports(&self) -> Vec<String> {
        self.config
            .as_ref()
            .and_then(|config| config.exposed_ports.as_ref())
            .map(|ports| ports.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageConfig {
    #[serde(default)]
    pub exposed_ports: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub env: Option<Vec<String>>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Container state as returned by container inspect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInfo {
    pub id: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: ContainerConfig,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: ContainerState,
    #[serde(default, deserialize_with = "null_as_default")]
    pub network_settings: NetworkSettings,
    #[serde(default, deserialize_with = "null_as_default")]
    pub host_config: HostConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub env: Option<Vec<String>>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub exposed_ports: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub exit_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    #[serde(rename = "IPAddress", default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(rename = "MacAddress", default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// Bindings per "port/protocol"; unbound ports map to null
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: BTreeMap<String, Option<Vec<PortBinding>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub memory: i64,
    #[serde(default)]
    pub binds: Option<Vec<String>>,
}

/// Engines send `null` for empty sections
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Engine operations the bridge relies on
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// `None` when the image is unknown to the engine
    async fn inspect_image(&self, image: &str) -> EngineResult<Option<ImageInfo>>;

    /// `None` when no container has this id
    async fn inspect_container(&self, id: &str) -> EngineResult<Option<ContainerInfo>>;

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<ContainerCreated>;

    /// False when the container was already gone
    async fn remove_container(
        &self,
        id: &str,
        force: bool,
        remove_volumes: bool,
    ) -> EngineResult<bool>;

    /// Cheap reachability check used by health reporting
    async fn ping(&self) -> EngineResult<()>;
}
