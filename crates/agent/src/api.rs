//! HTTP API: container endpoints, health checks and Prometheus metrics

use bridge_lib::{
    engine::ContainerInfo,
    health::{ComponentStatus, HealthRegistry},
    observability::BridgeMetrics,
    ContainerConnector, ContainerCreated, ContainerSpec, Error, FilesCommand, RuntimeInfo,
    ServerConf,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: BridgeMetrics,
    pub connector: Arc<dyn ContainerConnector>,
    /// Cancelled on shutdown; aborts in-flight discovery
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: BridgeMetrics,
        connector: Arc<dyn ContainerConnector>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            connector,
            shutdown,
        }
    }
}

/// Error body returned by the container endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub kind: String,
}

/// Library error rendered as an HTTP response
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

/// HTTP status for a library error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        Error::AmbiguousDiscovery { .. } => StatusCode::CONFLICT,
        Error::DiscoveryTimeout { .. } | Error::JobTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::InvalidSpec(_) => StatusCode::BAD_REQUEST,
        Error::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Platform(_) | Error::Engine(_) | Error::JobFailed { .. } => {
            StatusCode::BAD_GATEWAY
        }
        Error::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(kind = %self.0.kind(), error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            message: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateParams {
    /// Overrides the name in the body, as the engine API does
    pub name: Option<String>,
}

async fn create_container(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CreateParams>,
    Json(mut spec): Json<ContainerSpec>,
) -> Result<(StatusCode, Json<ContainerCreated>), ApiError> {
    if let Some(name) = params.name.filter(|name| !name.is_empty()) {
        spec.name = name;
    }
    info!(name = %spec.name, image = %spec.image, "Create requested");

    let created = state.connector.create(&spec, &state.shutdown).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn inspect_container(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ContainerInfo>, ApiError> {
    Ok(Json(state.connector.inspect_container(&id).await?))
}

/// Per-request servers merged over the configured ones
#[derive(Debug, Default, Deserialize)]
pub struct RuntimeRequest {
    #[serde(default)]
    pub servers: Vec<ServerConf>,
}

async fn runtime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RuntimeInfo>, ApiError> {
    Ok(Json(state.connector.inspect(&id, &[]).await?))
}

async fn runtime_with_servers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RuntimeRequest>,
) -> Result<Json<RuntimeInfo>, ApiError> {
    Ok(Json(state.connector.inspect(&id, &request.servers).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoveParams {
    pub force: Option<String>,
    pub v: Option<String>,
}

/// Engine-style boolean query flag ("1" or "true")
fn flag(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true") | Some("True"))
}

async fn remove_container(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<RemoveParams>,
) -> Result<StatusCode, ApiError> {
    state
        .connector
        .remove(&id, flag(params.force.as_deref()), flag(params.v.as_deref()))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn make_workspace_files(
    State(state): State<Arc<AppState>>,
    Path(workspace): Path<String>,
) -> Result<StatusCode, ApiError> {
    info!(workspace = %workspace, "Workspace directory requested");
    state
        .connector
        .workspace_files(FilesCommand::Make, &workspace, &state.shutdown)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_workspace_files(
    State(state): State<Arc<AppState>>,
    Path(workspace): Path<String>,
) -> Result<StatusCode, ApiError> {
    info!(workspace = %workspace, "Workspace files removal requested");
    state
        .connector
        .workspace_files(FilesCommand::Remove, &workspace, &state.shutdown)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/containers/create", post(create_container))
        .route("/containers/:id/json", get(inspect_container))
        .route("/containers/:id/runtime", get(runtime).post(runtime_with_servers))
        .route("/containers/:id", delete(remove_container))
        .route(
            "/workspaces/:name/files",
            post(make_workspace_files).delete(clear_workspace_files),
        )
        .with_state(state)
}

/// Start the API server; returns once `shutdown` is cancelled
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_lib::PlatformError;
    use std::time::Duration;

    #[test]
    fn test_flag_parsing() {
        assert!(flag(Some("1")));
        assert!(flag(Some("true")));
        assert!(!flag(Some("0")));
        assert!(!flag(None));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&Error::not_found("Container", "abc")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::AmbiguousDiscovery {
                selector: "cheContainerIdentifier=abc".to_string(),
                matches: 0,
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::AmbiguousDiscovery {
                selector: "cheContainerIdentifier=abc".to_string(),
                matches: 2,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::DiscoveryTimeout {
                deployment: "che-ws-abc".to_string(),
                attempts: 120,
                waited: Duration::from_secs(120),
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&Error::invalid_spec("bad port")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::Platform(PlatformError::api(500, "boom"))),
            StatusCode::BAD_GATEWAY
        );
    }
}
