//! Connector selection
//!
//! A connector is what the agent's container endpoints talk to. The
//! "openshift" connector drives [`ClusterContainerLifecycle`]; the "default"
//! connector passes calls straight through to the container engine. The
//! [`ConnectorRegistry`] maps configured names to builders and is consulted
//! once at startup.

use crate::config::BridgeConfig;
use crate::engine::{ContainerEngine, ContainerInfo};
use crate::error::{Error, Result};
use crate::lifecycle::{ClusterContainerLifecycle, FilesCommand, LifecycleSettings};
use crate::models::{ContainerCreated, ContainerSpec, RuntimeInfo, ServerConf};
use crate::platform::OrchestrationPlatform;
use crate::runtime::runtime_info;
use crate::servers::{normalize_server_confs, StrategySelector};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Name of the pass-through connector
pub const DEFAULT_CONNECTOR: &str = "default";
/// Name of the cluster-backed connector
pub const OPENSHIFT_CONNECTOR: &str = "openshift";

/// Docker-style container operations
#[async_trait]
pub trait ContainerConnector: Send + Sync {
    /// Registered name of this connector
    fn name(&self) -> &str;

    async fn create(
        &self,
        spec: &ContainerSpec,
        cancel: &CancellationToken,
    ) -> Result<ContainerCreated>;

    /// Raw inspect output, as the caller's engine client expects it
    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo>;

    /// Properties, environment and resolved servers
    async fn inspect(&self, id: &str, servers: &[ServerConf]) -> Result<RuntimeInfo>;

    async fn remove(&self, id: &str, force: bool, remove_volumes: bool) -> Result<()>;

    /// Create or delete a workspace's project directory
    async fn workspace_files(
        &self,
        command: FilesCommand,
        workspace: &str,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Err(Error::Configuration(format!(
            "connector '{}' cannot {} files of workspace {}",
            self.name(),
            command.as_str(),
            workspace
        )))
    }
}

#[async_trait]
impl ContainerConnector for ClusterContainerLifecycle {
    fn name(&self) -> &str {
        OPENSHIFT_CONNECTOR
    }

    async fn create(
        &self,
        spec: &ContainerSpec,
        cancel: &CancellationToken,
    ) -> Result<ContainerCreated> {
        self.create_with_cancel(spec, cancel).await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        ClusterContainerLifecycle::inspect_container(self, id).await
    }

    async fn inspect(&self, id: &str, servers: &[ServerConf]) -> Result<RuntimeInfo> {
        ClusterContainerLifecycle::inspect(self, id, servers).await
    }

    async fn remove(&self, id: &str, force: bool, remove_volumes: bool) -> Result<()> {
        ClusterContainerLifecycle::remove(self, id, force, remove_volumes).await
    }

    async fn workspace_files(
        &self,
        command: FilesCommand,
        workspace: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.files().run(command, workspace, cancel).await
    }
}

/// Connector talking to the container engine directly
pub struct EngineConnector {
    engine: Arc<dyn ContainerEngine>,
    selector: StrategySelector,
    strategy: String,
    system_servers: Vec<ServerConf>,
    fallback_host: Option<String>,
}

impl EngineConnector {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        selector: StrategySelector,
        config: &BridgeConfig,
    ) -> Self {
        let fallback_host = url::Url::parse(&config.engine.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));
        Self {
            engine,
            selector,
            strategy: config.address.strategy.clone(),
            system_servers: config.servers.clone(),
            fallback_host,
        }
    }
}

#[async_trait]
impl ContainerConnector for EngineConnector {
    fn name(&self) -> &str {
        DEFAULT_CONNECTOR
    }

    async fn create(
        &self,
        spec: &ContainerSpec,
        _cancel: &CancellationToken,
    ) -> Result<ContainerCreated> {
        Ok(self.engine.create_container(spec).await?)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        self.engine
            .inspect_container(id)
            .await?
            .ok_or_else(|| Error::not_found("Container", id))
    }

    async fn inspect(&self, id: &str, servers: &[ServerConf]) -> Result<RuntimeInfo> {
        let info = ContainerConnector::inspect_container(self, id).await?;
        let confs = normalize_server_confs(self.system_servers.iter().chain(servers).cloned());
        Ok(runtime_info(
            &info,
            self.selector.get(&self.strategy),
            &confs,
            self.fallback_host.as_deref(),
        ))
    }

    async fn remove(&self, id: &str, force: bool, remove_volumes: bool) -> Result<()> {
        if !self.engine.remove_container(id, force, remove_volumes).await? {
            return Err(Error::not_found("Container", id));
        }
        Ok(())
    }
}

/// Everything a builder may need
#[derive(Clone)]
pub struct ConnectorContext {
    pub config: BridgeConfig,
    pub engine: Arc<dyn ContainerEngine>,
    /// Present when the agent connected to a cluster
    pub platform: Option<Arc<dyn OrchestrationPlatform>>,
}

impl ConnectorContext {
    pub fn new(config: BridgeConfig, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            config,
            engine,
            platform: None,
        }
    }

    pub fn with_platform(mut self, platform: Arc<dyn OrchestrationPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    fn selector(&self) -> StrategySelector {
        StrategySelector::new(self.config.address.overrides.clone())
    }
}

/// Builds one connector from the startup context
pub type ConnectorBuilder =
    Box<dyn Fn(&ConnectorContext) -> Result<Arc<dyn ContainerConnector>> + Send + Sync>;

/// Name-keyed connector builders
pub struct ConnectorRegistry {
    builders: BTreeMap<String, ConnectorBuilder>,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConnectorRegistry {
    /// Registry without any builder
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Registry with the "default" and "openshift" connectors
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_CONNECTOR, |ctx: &ConnectorContext| {
            let connector: Arc<dyn ContainerConnector> = Arc::new(EngineConnector::new(
                ctx.engine.clone(),
                ctx.selector(),
                &ctx.config,
            ));
            Ok(connector)
        });
        registry.register(OPENSHIFT_CONNECTOR, |ctx: &ConnectorContext| {
            let platform = ctx.platform.clone().ok_or_else(|| {
                Error::Configuration(format!(
                    "connector '{}' requires a platform client",
                    OPENSHIFT_CONNECTOR
                ))
            })?;
            let connector: Arc<dyn ContainerConnector> = Arc::new(ClusterContainerLifecycle::new(
                platform,
                ctx.engine.clone(),
                LifecycleSettings::from_config(&ctx.config),
                ctx.selector(),
            ));
            Ok(connector)
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(&ConnectorContext) -> Result<Arc<dyn ContainerConnector>> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Box::new(builder));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Build the connector registered under `name`; unknown names fall back
    /// to the default connector
    pub fn build(&self, name: &str, ctx: &ConnectorContext) -> Result<Arc<dyn ContainerConnector>> {
        let (resolved, builder) = match self.builders.get(name) {
            Some(builder) => (name, builder),
            None => {
                warn!(
                    connector = %name,
                    fallback = DEFAULT_CONNECTOR,
                    "Unknown connector, using default"
                );
                let builder = self.builders.get(DEFAULT_CONNECTOR).ok_or_else(|| {
                    Error::Configuration(format!(
                        "unknown connector '{}' and no default registered",
                        name
                    ))
                })?;
                (DEFAULT_CONNECTOR, builder)
            }
        };

        let connector = builder(ctx)?;
        info!(connector = %resolved, "Connector built");
        Ok(connector)
    }
}
