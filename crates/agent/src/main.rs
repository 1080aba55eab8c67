//! Bridge Agent - Docker-style container API backed by OpenShift
//!
//! Runs next to the workspace manager, translating its container calls into
//! cluster resources through the configured connector.

use anyhow::{Context, Result};
use bridge_agent::{api, config::AgentConfig};
use bridge_lib::{
    engine::{ContainerEngine, HttpEngine},
    health::{components, ComponentStatus, HealthRegistry},
    observability::{BridgeMetrics, StructuredLogger},
    platform::{KubePlatform, OrchestrationPlatform},
    ConnectorContext, ConnectorRegistry, OPENSHIFT_CONNECTOR,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting bridge-agent");

    let config = AgentConfig::load()?;
    let bridge = &config.bridge;
    info!(
        connector = %bridge.connector,
        namespace = %bridge.platform.namespace,
        strategy = %bridge.address.strategy,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ENGINE).await;

    let metrics = BridgeMetrics::new();
    let logger = StructuredLogger::new(bridge.platform.namespace.clone());

    let engine: Arc<dyn ContainerEngine> =
        Arc::new(HttpEngine::new(&bridge.engine).context("invalid engine configuration")?);

    let mut context = ConnectorContext::new(bridge.clone(), engine.clone());
    let mut platform: Option<Arc<dyn OrchestrationPlatform>> = None;
    if bridge.connector == OPENSHIFT_CONNECTOR {
        health_registry.register(components::PLATFORM).await;
        let client: Arc<dyn OrchestrationPlatform> = Arc::new(
            KubePlatform::connect(&bridge.platform)
                .await
                .context("failed to connect to the cluster")?,
        );
        context = context.with_platform(client.clone());
        platform = Some(client);
    }

    let registry = ConnectorRegistry::with_defaults();
    let connector = registry
        .build(&bridge.connector, &context)
        .context("failed to build connector")?;
    health_registry.register(components::LIFECYCLE).await;
    logger.log_startup(AGENT_VERSION, connector.name(), &bridge.address.strategy);

    let shutdown = CancellationToken::new();
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        connector,
        shutdown.clone(),
    ));

    // Connector built; probes decide readiness from here on
    health_registry.set_ready(true).await;

    let probe_handle = tokio::spawn(probe_dependencies(
        health_registry.clone(),
        engine,
        platform,
        bridge.platform.namespace.clone(),
        Duration::from_secs(config.health_interval_secs.max(1)),
        shutdown.clone(),
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    shutdown.cancel();

    if let Err(e) = probe_handle.await {
        warn!(error = %e, "Health probe task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server stopped with error"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }
    info!("Shutting down");

    Ok(())
}

/// Periodically ping the engine and the cluster, updating component health
async fn probe_dependencies(
    health: HealthRegistry,
    engine: Arc<dyn ContainerEngine>,
    platform: Option<Arc<dyn OrchestrationPlatform>>,
    namespace: String,
    interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let pinged = engine
            .ping()
            .await
            .map_err(|e| format!("engine ping failed: {}", e));
        health
            .record_probe(components::ENGINE, pinged, ComponentStatus::Degraded)
            .await;

        if let Some(platform) = &platform {
            let project = match platform.project_exists(&namespace).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(format!("project {} does not exist", namespace)),
                Err(e) => Err(format!("cluster unreachable: {}", e)),
            };
            health
                .record_probe(components::PLATFORM, project, ComponentStatus::Unhealthy)
                .await;
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
