//! Observability infrastructure for the workspace bridge
//!
//! Provides:
//! - Prometheus metrics (create latency, discovery attempts, lifecycle counters)
//! - Structured JSON logging of lifecycle milestones with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info, warn};

/// Histogram buckets for container creation (in seconds); discovery alone
/// may take up to two minutes
const CREATE_LATENCY_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 90.0, 120.0];

/// Buckets for the number of discovery polls
const DISCOVERY_ATTEMPT_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 20.0, 40.0, 60.0, 90.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<BridgeMetricsInner> = OnceLock::new();

struct BridgeMetricsInner {
    create_latency_seconds: Histogram,
    discovery_attempts: Histogram,
    containers_created: IntCounter,
    containers_removed: IntCounter,
    container_inspections: IntCounter,
    operation_failures: IntCounterVec,
}

impl BridgeMetricsInner {
    fn new() -> Self {
        Self {
            create_latency_seconds: register_histogram!(
                "workspace_bridge_create_latency_seconds",
                "Time from create request to discovered container",
                CREATE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register create_latency_seconds"),

            discovery_attempts: register_histogram!(
                "workspace_bridge_discovery_attempts",
                "Pod polls needed to discover a workspace container",
                DISCOVERY_ATTEMPT_BUCKETS.to_vec()
            )
            .expect("Failed to register discovery_attempts"),

            containers_created: register_int_counter!(
                "workspace_bridge_containers_created_total",
                "Workspace containers created and discovered"
            )
            .expect("Failed to register containers_created"),

            containers_removed: register_int_counter!(
                "workspace_bridge_containers_removed_total",
                "Workspace containers torn down"
            )
            .expect("Failed to register containers_removed"),

            container_inspections: register_int_counter!(
                "workspace_bridge_container_inspections_total",
                "Inspect requests served"
            )
            .expect("Failed to register container_inspections"),

            operation_failures: register_int_counter_vec!(
                "workspace_bridge_operation_failures_total",
                "Failed lifecycle operations by operation and error kind",
                &["operation", "kind"]
            )
            .expect("Failed to register operation_failures"),
        }
    }
}

/// Bridge metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct BridgeMetrics {
    _private: (),
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(BridgeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &BridgeMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_create_latency(&self, elapsed: Duration) {
        self.inner()
            .create_latency_seconds
            .observe(elapsed.as_secs_f64());
    }

    pub fn observe_discovery_attempts(&self, attempts: u32) {
        self.inner().discovery_attempts.observe(f64::from(attempts));
    }

    pub fn inc_containers_created(&self) {
        self.inner().containers_created.inc();
    }

    pub fn inc_containers_removed(&self) {
        self.inner().containers_removed.inc();
    }

    pub fn inc_container_inspections(&self) {
        self.inner().container_inspections.inc();
    }

    /// Count a failed operation, labelled by error kind
    pub fn inc_failure(&self, operation: &str, kind: &str) {
        self.inner()
            .operation_failures
            .with_label_values(&[operation, kind])
            .inc();
    }
}

/// Structured logger for lifecycle events
///
/// Emits one event per milestone with a stable `event` field so log
/// pipelines can follow a workspace from request to teardown.
#[derive(Clone)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn log_create_requested(&self, workspace_id: &str, image: &str, ports: usize) {
        info!(
            event = "container_create_requested",
            namespace = %self.namespace,
            workspace_id = %workspace_id,
            image = %image,
            exposed_ports = ports,
            "Workspace container requested"
        );
    }

    pub fn log_service_created(&self, workspace_id: &str, service: &str) {
        info!(
            event = "service_created",
            namespace = %self.namespace,
            workspace_id = %workspace_id,
            service = %service,
            "Workspace service created"
        );
    }

    pub fn log_deployment_created(&self, workspace_id: &str, deployment: &str) {
        info!(
            event = "deployment_created",
            namespace = %self.namespace,
            workspace_id = %workspace_id,
            deployment = %deployment,
            "Workspace deployment created"
        );
    }

    pub fn log_container_discovered(
        &self,
        deployment: &str,
        pod: &str,
        container_id: &str,
        attempts: u32,
    ) {
        info!(
            event = "container_discovered",
            namespace = %self.namespace,
            deployment = %deployment,
            pod = %pod,
            container_id = %container_id,
            attempts = attempts,
            "Workspace container discovered"
        );
    }

    pub fn log_discovery_timeout(&self, deployment: &str, attempts: u32, waited: Duration) {
        warn!(
            event = "discovery_timeout",
            namespace = %self.namespace,
            deployment = %deployment,
            attempts = attempts,
            waited_secs = waited.as_secs(),
            "Workspace container did not materialize"
        );
    }

    pub fn log_container_removed(&self, container_id: &str, deployment: &str) {
        info!(
            event = "container_removed",
            namespace = %self.namespace,
            container_id = %container_id,
            deployment = %deployment,
            "Workspace resources removed"
        );
    }

    pub fn log_resource_already_gone(&self, kind: &str, name: &str) {
        warn!(
            event = "resource_already_gone",
            namespace = %self.namespace,
            kind = %kind,
            name = %name,
            "Resource not found during removal"
        );
    }

    pub fn log_files_job_started(&self, workspace: &str, pod: &str, command: &str) {
        info!(
            event = "files_job_started",
            namespace = %self.namespace,
            workspace = %workspace,
            pod = %pod,
            command = %command,
            "Workspace files job started"
        );
    }

    pub fn log_files_job_finished(&self, pod: &str, phase: &str, attempts: u32) {
        if phase == "Succeeded" {
            info!(
                event = "files_job_finished",
                namespace = %self.namespace,
                pod = %pod,
                phase = %phase,
                attempts = attempts,
                "Workspace files job finished"
            );
        } else {
            error!(
                event = "files_job_finished",
                namespace = %self.namespace,
                pod = %pod,
                phase = %phase,
                attempts = attempts,
                "Workspace files job failed"
            );
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, connector: &str, strategy: &str) {
        info!(
            event = "agent_started",
            namespace = %self.namespace,
            agent_version = %version,
            connector = %connector,
            strategy = %strategy,
            "Workspace bridge agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            namespace = %self.namespace,
            reason = %reason,
            "Workspace bridge agent shutting down"
        );
    }
}
