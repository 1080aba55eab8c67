//! Orchestration platform abstraction
//!
//! The lifecycle talks to the cluster only through [`OrchestrationPlatform`].
//! Resource shapes here carry exactly what the bridge writes and reads back;
//! the kube-backed adapter converts them to and from API objects.

mod openshift;

pub use openshift::KubePlatform;

use crate::error::PlatformError;
use crate::ports::{ContainerPort, ServicePort};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result type for platform calls
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Node-port service fronting one workspace deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformService {
    pub namespace: String,
    pub name: String,
    /// Always "NodePort" for workspace services
    pub service_type: String,
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
    /// DNS-safe encoded container labels
    pub annotations: BTreeMap<String, String>,
}

/// Environment variable of the workspace container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPathVolume {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub run_as_user: i64,
    pub privileged: bool,
}

/// TCP liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpProbe {
    pub port: u16,
    pub initial_delay_secs: i32,
    pub timeout_secs: i32,
}

/// The single container of a workspace deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentContainer {
    pub name: String,
    pub image: String,
    pub image_pull_policy: String,
    pub ports: Vec<ContainerPort>,
    pub env: Vec<EnvVar>,
    pub volume_mounts: Vec<VolumeMount>,
    pub security_context: SecurityContext,
    pub liveness_probe: TcpProbe,
}

/// Deployment config owning the workspace pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDeployment {
    pub namespace: String,
    pub name: String,
    pub replicas: i32,
    pub selector: BTreeMap<String, String>,
    pub service_account: String,
    /// Pod-level user id
    pub run_as_user: i64,
    pub container: DeploymentContainer,
    pub triggers: Vec<String>,
    pub volumes: Vec<HostPathVolume>,
}

/// Running pod as far as the bridge cares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformPod {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Runtime container ids from the pod status, e.g. "docker://<64 hex>"
    pub container_ids: Vec<String>,
    pub phase: Option<String>,
}

/// Route exposing one service port under the external root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRoute {
    pub namespace: String,
    pub name: String,
    pub host: String,
    pub service_name: String,
    /// Service port name
    pub target_port: String,
    /// Edge TLS with insecure traffic redirected
    pub tls: bool,
    pub labels: BTreeMap<String, String>,
}

/// One-shot pod running a command against the workspaces claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformJobPod {
    pub namespace: String,
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    /// Persistent volume claim mounted at `mount_path`
    pub claim_name: String,
    pub mount_path: String,
}

/// Cluster operations the lifecycle depends on.
///
/// Deletes report `false` when the resource was already gone; reads of a
/// single resource return `None` for the same case.
#[async_trait]
pub trait OrchestrationPlatform: Send + Sync {
    async fn project_exists(&self, namespace: &str) -> PlatformResult<bool>;

    async fn create_service(&self, service: &PlatformService) -> PlatformResult<()>;

    async fn list_services(&self, namespace: &str) -> PlatformResult<Vec<PlatformService>>;

    async fn delete_service(&self, namespace: &str, name: &str) -> PlatformResult<bool>;

    async fn create_deployment(&self, deployment: &PlatformDeployment) -> PlatformResult<()>;

    async fn delete_deployment(&self, namespace: &str, name: &str) -> PlatformResult<bool>;

    /// Delete the replication controller a deployment rolled out
    async fn delete_replication_controller(
        &self,
        namespace: &str,
        name: &str,
    ) -> PlatformResult<bool>;

    /// Pods matching every entry of `selector`; all pods when it is empty
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> PlatformResult<Vec<PlatformPod>>;

    async fn label_pod(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> PlatformResult<()>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> PlatformResult<bool>;

    /// Start a pod that runs once and is never restarted
    async fn create_job_pod(&self, pod: &PlatformJobPod) -> PlatformResult<()>;

    /// Status phase of a pod ("Pending", "Running", "Succeeded", ...); an
    /// empty string before the kubelet reports one, `None` once it is gone
    async fn pod_phase(&self, namespace: &str, name: &str) -> PlatformResult<Option<String>>;

    async fn create_route(&self, route: &PlatformRoute) -> PlatformResult<()>;

    /// Delete all routes matching `selector`, returning how many went away
    async fn delete_routes(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> PlatformResult<usize>;
}

/// Render a selector map as "k1=v1,k2=v2"
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(",")
}

/// True when `labels` contains every entry of `selector`
pub fn selector_matches(
    selector: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}
