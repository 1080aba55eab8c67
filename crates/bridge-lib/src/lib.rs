//! Workspace bridge library
//!
//! Translates Docker-style container create / inspect / remove calls into
//! OpenShift resources:
//! - Label encoding and server descriptors for exposed ports
//! - Server address strategies and their selection
//! - The cluster lifecycle (Service, DeploymentConfig, Routes, pod discovery)
//! - Platform and container engine adapters
//! - Connector selection, health checks and observability

pub mod config;
pub mod connector;
pub mod engine;
pub mod error;
pub mod health;
pub mod labels;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod platform;
pub mod poll;
pub mod ports;
pub mod runtime;
pub mod servers;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::BridgeConfig;
pub use connector::{
    ConnectorContext, ConnectorRegistry, ContainerConnector, EngineConnector, DEFAULT_CONNECTOR,
    OPENSHIFT_CONNECTOR,
};
pub use error::{EngineError, Error, PlatformError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use lifecycle::{ClusterContainerLifecycle, FilesCommand, LifecycleSettings, WorkspaceFiles};
pub use models::*;
pub use observability::{BridgeMetrics, StructuredLogger};
