//! Health check infrastructure for the bridge agent
//!
//! Tracks the health of the platform client, the container engine and the
//! lifecycle connector for the agent's liveness and readiness probes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving requests, e.g. the engine is slow or unreachable
    Degraded,
    /// Requests through this component fail
    Unhealthy,
}

/// Last known state of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
    /// Failed probes since the last successful one
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
            consecutive_failures: 0,
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of `/healthz`; the overall status is the worst component status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    fn from_components(components: BTreeMap<String, ComponentHealth>) -> Self {
        let status = components
            .values()
            .map(|health| health.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        Self { status, components }
    }
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const PLATFORM: &str = "platform";
    pub const ENGINE: &str = "engine";
    pub const LIFECYCLE: &str = "lifecycle";
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<String, ComponentHealth>,
    connector_built: bool,
}

/// Shared component health, cloned into the API state and the probe task
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Flipped once the connector is built
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.connector_built = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        HealthResponse::from_components(self.state.read().await.components.clone())
    }

    /// Record the outcome of a dependency probe. A failure is stored with
    /// the `on_failure` status and extends the component's failure streak.
    pub async fn record_probe<E: Display>(
        &self,
        name: &str,
        outcome: Result<(), E>,
        on_failure: ComponentStatus,
    ) {
        let mut state = self.state.write().await;
        let streak = state
            .components
            .get(name)
            .map(|health| health.consecutive_failures)
            .unwrap_or(0);

        let health = match outcome {
            Ok(()) => ComponentHealth::healthy(),
            Err(e) => ComponentHealth {
                consecutive_failures: streak.saturating_add(1),
                ..ComponentHealth::new(on_failure, Some(e.to_string()))
            },
        };
        state.components.insert(name.to_string(), health);
    }

    /// Ready once the connector is built and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.connector_built {
            return ReadinessResponse {
                ready: false,
                reason: Some("Connector not yet built".to_string()),
            };
        }

        let failing: Vec<String> = state
            .components
            .iter()
            .filter(|(_, health)| health.status == ComponentStatus::Unhealthy)
            .map(|(name, health)| match &health.message {
                Some(message) => format!("{}: {}", name, message),
                None => name.clone(),
            })
            .collect();

        if failing.is_empty() {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some(format!("Unhealthy components: {}", failing.join("; "))),
            }
        }
    }
}
