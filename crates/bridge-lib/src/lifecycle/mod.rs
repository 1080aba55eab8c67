//! Workspace container lifecycle on the orchestration platform
//!
//! A Docker-style create becomes a NodePort Service plus a DeploymentConfig
//! (and optionally Routes); the runtime container is then discovered by
//! polling pods. Inspect and remove go back from a container id to the owning
//! pod through the identity label stamped during discovery. Project files
//! live apart from the container, on the workspaces claim (see [`storage`]).

mod discovery;
pub mod naming;
mod state;
pub mod storage;

#[cfg(test)]
mod tests;

pub use discovery::{
    pod_by_container_id, short_id, strip_runtime_scheme, DiscoveredContainer, CONTAINER_ID_LABEL,
    DEPLOYER_LABEL, DEPLOYMENT_CONFIG_LABEL, REPLICATION_CONTROLLER_LABEL, SHORT_ID_LEN,
};
pub use state::{CreationProgress, LifecycleState};
pub use storage::{FilesCommand, WorkspaceFiles};

use crate::config::{BridgeConfig, RouteConfig};
use crate::engine::{ContainerEngine, ContainerInfo};
use crate::error::{Error, Result};
use crate::labels::{self, server_labels};
use crate::models::{ContainerCreated, ContainerSpec, PortBinding, RuntimeInfo, ServerConf};
use crate::observability::{BridgeMetrics, StructuredLogger};
use crate::platform::{
    DeploymentContainer, OrchestrationPlatform, PlatformDeployment, PlatformPod, PlatformRoute,
    PlatformService, SecurityContext, TcpProbe,
};
use crate::poll::{poll_until, PollConfig, PollError};
use crate::ports::{self, ServicePort, PORT_PROTOCOL_DELIMITER};
use crate::runtime::runtime_info;
use crate::servers::{normalize_server_confs, StrategySelector};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// User id the workspace container runs as
pub const WORKSPACE_USER_ID: i64 = 1000;

/// Port of the workspace agent, probed for liveness
pub const LIVENESS_PORT: u16 = 4401;

const LIVENESS_INITIAL_DELAY_SECS: i32 = 120;
const LIVENESS_TIMEOUT_SECS: i32 = 1;
const IMAGE_PULL_POLICY: &str = "IfNotPresent";
const SERVICE_TYPE: &str = "NodePort";
const CONFIG_CHANGE_TRIGGER: &str = "ConfigChange";

/// Settings the lifecycle needs from the bridge configuration
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub namespace: String,
    pub service_account: String,
    /// Host IP reported for node-port bindings
    pub node_address: String,
    pub discovery: PollConfig,
    pub routes: RouteConfig,
    /// Name of the address strategy used by inspect
    pub strategy: String,
    /// Servers merged into every inspect request
    pub system_servers: Vec<ServerConf>,
    /// Claim holding the workspaces' project directories
    pub workspaces_pvc_name: String,
    pub files_job: PollConfig,
}

impl LifecycleSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            namespace: config.platform.namespace.clone(),
            service_account: config.platform.service_account.clone(),
            node_address: config.platform.node_address.clone(),
            discovery: config.discovery.clone(),
            routes: config.routes.clone(),
            strategy: config.address.strategy.clone(),
            system_servers: config.servers.clone(),
            workspaces_pvc_name: config.platform.workspaces_pvc_name.clone(),
            files_job: config.platform.files_job.clone(),
        }
    }
}

/// Names derived from one create request
struct WorkspaceNames {
    workspace_id: String,
    resource: String,
    container: String,
}

/// Cluster-backed create / inspect / remove of workspace containers
pub struct ClusterContainerLifecycle {
    platform: Arc<dyn OrchestrationPlatform>,
    engine: Arc<dyn ContainerEngine>,
    settings: LifecycleSettings,
    selector: StrategySelector,
    files: WorkspaceFiles,
    metrics: BridgeMetrics,
    logger: StructuredLogger,
}

impl ClusterContainerLifecycle {
    pub fn new(
        platform: Arc<dyn OrchestrationPlatform>,
        engine: Arc<dyn ContainerEngine>,
        settings: LifecycleSettings,
        selector: StrategySelector,
    ) -> Self {
        let logger = StructuredLogger::new(settings.namespace.clone());
        let files = WorkspaceFiles::new(
            platform.clone(),
            settings.namespace.clone(),
            settings.workspaces_pvc_name.clone(),
            settings.files_job.clone(),
        );
        Self {
            platform,
            engine,
            settings,
            selector,
            files,
            metrics: BridgeMetrics::new(),
            logger,
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Project files of workspaces in this lifecycle's project
    pub fn files(&self) -> &WorkspaceFiles {
        &self.files
    }

    /// Create a workspace container and wait for it to be discovered
    pub async fn create(&self, spec: &ContainerSpec) -> Result<ContainerCreated> {
        self.create_with_cancel(spec, &CancellationToken::new())
            .await
    }

    /// Like [`create`](Self::create); cancelling `cancel` aborts discovery
    /// and leaves the created resources in place
    pub async fn create_with_cancel(
        &self,
        spec: &ContainerSpec,
        cancel: &CancellationToken,
    ) -> Result<ContainerCreated> {
        let started = Instant::now();
        let mut progress = CreationProgress::new(spec.name.clone());

        match self.provision(spec, cancel, &mut progress).await {
            Ok(created) => {
                self.metrics.observe_create_latency(started.elapsed());
                self.metrics.inc_containers_created();
                Ok(created)
            }
            Err(e) => {
                progress.fail();
                self.metrics.inc_failure("create", e.kind());
                Err(e)
            }
        }
    }

    async fn provision(
        &self,
        spec: &ContainerSpec,
        cancel: &CancellationToken,
        progress: &mut CreationProgress,
    ) -> Result<ContainerCreated> {
        let workspace_id = naming::workspace_id(&spec.env)?;
        let names = WorkspaceNames {
            resource: naming::resource_name(&workspace_id),
            container: naming::container_name(&spec.name)?,
            workspace_id,
        };

        let image_ports = match self.engine.inspect_image(&spec.image).await? {
            Some(image) => image.exposed_ports(),
            None => {
                warn!(image = %spec.image, "Image not present on the engine, using requested ports only");
                Vec::new()
            }
        };
        let exposed = ports::exposed_ports(&image_ports, &spec.exposed_ports);
        let service_ports = ports::service_ports(&exposed)?;
        let container_ports = ports::container_ports(&exposed)?;
        let (volumes, mounts) = naming::volumes(&names.workspace_id, &spec.binds)?;
        let route_root = self.route_root()?;

        let namespace = &self.settings.namespace;
        if !self.platform.project_exists(namespace).await? {
            return Err(Error::not_found("Project", namespace.clone()));
        }

        self.logger
            .log_create_requested(&names.workspace_id, &spec.image, exposed.len());

        let selector = deployment_selector(&names.resource);

        let service = PlatformService {
            namespace: namespace.clone(),
            name: names.resource.clone(),
            service_type: SERVICE_TYPE.to_string(),
            selector: selector.clone(),
            ports: service_ports.clone(),
            annotations: labels::encode(&spec.labels),
        };
        self.platform.create_service(&service).await?;
        progress.advance(LifecycleState::ServiceCreated);
        self.logger
            .log_service_created(&names.workspace_id, &service.name);

        let deployment = PlatformDeployment {
            namespace: namespace.clone(),
            name: names.resource.clone(),
            replicas: 1,
            selector: selector.clone(),
            service_account: self.settings.service_account.clone(),
            run_as_user: WORKSPACE_USER_ID,
            container: DeploymentContainer {
                name: names.container.clone(),
                image: spec.image.clone(),
                image_pull_policy: IMAGE_PULL_POLICY.to_string(),
                ports: container_ports,
                env: naming::env_vars(&spec.env),
                volume_mounts: mounts,
                security_context: SecurityContext {
                    run_as_user: WORKSPACE_USER_ID,
                    privileged: true,
                },
                liveness_probe: TcpProbe {
                    port: LIVENESS_PORT,
                    initial_delay_secs: LIVENESS_INITIAL_DELAY_SECS,
                    timeout_secs: LIVENESS_TIMEOUT_SECS,
                },
            },
            triggers: vec![CONFIG_CHANGE_TRIGGER.to_string()],
            volumes,
        };
        self.platform.create_deployment(&deployment).await?;
        progress.advance(LifecycleState::DeploymentCreated);
        self.logger
            .log_deployment_created(&names.workspace_id, &deployment.name);

        if let Some(root) = route_root {
            self.create_routes(&names, &service_ports, &root, &selector)
                .await?;
        }

        progress.advance(LifecycleState::Discovering);
        let discovered = self.discover(&names.resource, cancel).await?;
        progress.advance(LifecycleState::Ready);

        Ok(ContainerCreated::new(discovered.container_id))
    }

    /// External root for routes; `None` when routes are disabled
    fn route_root(&self) -> Result<Option<String>> {
        let routes = &self.settings.routes;
        if !routes.enabled {
            return Ok(None);
        }
        let address = routes
            .external_address
            .as_deref()
            .filter(|address| !address.is_empty())
            .ok_or_else(|| {
                Error::invalid_spec("routes are enabled but no external address is configured")
            })?;
        Ok(Some(
            address.strip_prefix("che-").unwrap_or(address).to_string(),
        ))
    }

    async fn create_routes(
        &self,
        names: &WorkspaceNames,
        service_ports: &[ServicePort],
        root: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<()> {
        for port in service_ports {
            let name = naming::normalize_name(&format!("{}-{}", port.name, names.container));
            let route = PlatformRoute {
                namespace: self.settings.namespace.clone(),
                host: format!("{}-{}", name, root),
                name,
                service_name: names.resource.clone(),
                target_port: port.name.clone(),
                tls: self.settings.routes.tls,
                labels: selector.clone(),
            };
            self.platform.create_route(&route).await?;
            debug!(route = %route.name, host = %route.host, "Route created");
        }
        Ok(())
    }

    async fn discover(
        &self,
        deployment: &str,
        cancel: &CancellationToken,
    ) -> Result<DiscoveredContainer> {
        let platform = self.platform.as_ref();
        let namespace = self.settings.namespace.as_str();

        let polled = poll_until(&self.settings.discovery, "discover_container", cancel, || {
            discovery::probe(platform, namespace, deployment)
        })
        .await
        .map_err(|e| match e {
            PollError::Exhausted { attempts, waited } => {
                self.logger
                    .log_discovery_timeout(deployment, attempts, waited);
                Error::DiscoveryTimeout {
                    deployment: deployment.to_string(),
                    attempts,
                    waited,
                }
            }
            PollError::Cancelled { attempts } => Error::Cancelled(format!(
                "discovery of {} cancelled after {} attempts",
                deployment, attempts
            )),
            PollError::Failed(e) => Error::Platform(e),
        })?;

        self.metrics.observe_discovery_attempts(polled.attempts);
        self.logger.log_container_discovered(
            deployment,
            &polled.value.pod,
            &polled.value.container_id,
            polled.attempts,
        );
        Ok(polled.value)
    }

    /// Engine view of the container with the cluster's labels and node ports
    pub async fn inspect_container(&self, container_id: &str) -> Result<ContainerInfo> {
        let mut info = self
            .engine
            .inspect_container(container_id)
            .await?
            .ok_or_else(|| Error::not_found("Container", container_id))?;

        let pod = self.owning_pod(&info.id).await?;
        let deployment = deployment_label(&pod)?;
        let service = self
            .owning_service(deployment)
            .await?
            .ok_or_else(|| Error::not_found("Service", deployment))?;

        let mut merged = labels::decode(&service.annotations);
        if let Some(native) = &info.config.labels {
            merged.extend(native.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        info.config.labels = Some(server_labels(&merged));

        info.network_settings.ports = service
            .ports
            .iter()
            .map(|port| {
                let token = format!(
                    "{}{}{}",
                    port.target_port,
                    PORT_PROTOCOL_DELIMITER,
                    port.protocol.to_lowercase()
                );
                let bindings = port.node_port.map(|node_port| {
                    vec![PortBinding::new(
                        self.settings.node_address.clone(),
                        node_port.to_string(),
                    )]
                });
                (token, bindings)
            })
            .collect();

        Ok(info)
    }

    /// Properties, environment and servers of a workspace container.
    ///
    /// `servers` are merged over the configured system servers.
    pub async fn inspect(&self, container_id: &str, servers: &[ServerConf]) -> Result<RuntimeInfo> {
        let result = self.inspect_container(container_id).await;
        let info = match result {
            Ok(info) => info,
            Err(e) => {
                self.metrics.inc_failure("inspect", e.kind());
                return Err(e);
            }
        };
        self.metrics.inc_container_inspections();

        let confs = normalize_server_confs(
            self.settings
                .system_servers
                .iter()
                .chain(servers)
                .cloned(),
        );
        let strategy = self.selector.get(&self.settings.strategy);
        Ok(runtime_info(
            &info,
            strategy,
            &confs,
            Some(&self.settings.node_address),
        ))
    }

    /// Tear down every resource created for the container.
    ///
    /// Deletion order: Service, Routes, DeploymentConfig,
    /// ReplicationController, Pod. Resources already gone are logged.
    ///
    /// `force` and `remove_volumes` are accepted for engine compatibility
    /// and only logged. Host-path volumes go away with the pod, and the
    /// project directory on the workspaces claim is keyed by workspace name,
    /// which a container id does not carry; clearing it is a separate
    /// [`WorkspaceFiles::clear`] call.
    pub async fn remove(&self, container_id: &str, force: bool, remove_volumes: bool) -> Result<()> {
        match self.teardown(container_id, force, remove_volumes).await {
            Ok(()) => {
                self.metrics.inc_containers_removed();
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_failure("remove", e.kind());
                Err(e)
            }
        }
    }

    async fn teardown(&self, container_id: &str, force: bool, remove_volumes: bool) -> Result<()> {
        let namespace = self.settings.namespace.as_str();
        let pod = self.owning_pod(container_id).await?;
        let deployment = deployment_label(&pod)?.to_string();
        let replication_controller = pod.labels.get(REPLICATION_CONTROLLER_LABEL).cloned();

        debug!(
            container_id = %container_id,
            force = force,
            remove_volumes = remove_volumes,
            "Removing workspace resources"
        );

        match self.owning_service(&deployment).await? {
            Some(service) => {
                if !self.platform.delete_service(namespace, &service.name).await? {
                    self.logger.log_resource_already_gone("Service", &service.name);
                }
            }
            None => self.logger.log_resource_already_gone("Service", &deployment),
        }

        if self.settings.routes.enabled {
            let removed = self
                .platform
                .delete_routes(namespace, &deployment_selector(&deployment))
                .await?;
            debug!(deployment = %deployment, routes = removed, "Routes removed");
        }

        if !self.platform.delete_deployment(namespace, &deployment).await? {
            self.logger
                .log_resource_already_gone("DeploymentConfig", &deployment);
        }

        match replication_controller {
            Some(rc) => {
                if !self
                    .platform
                    .delete_replication_controller(namespace, &rc)
                    .await?
                {
                    self.logger
                        .log_resource_already_gone("ReplicationController", &rc);
                }
            }
            None => self
                .logger
                .log_resource_already_gone("ReplicationController", &deployment),
        }

        if !self.platform.delete_pod(namespace, &pod.name).await? {
            self.logger.log_resource_already_gone("Pod", &pod.name);
        }

        self.logger.log_container_removed(container_id, &deployment);
        Ok(())
    }

    async fn owning_pod(&self, container_id: &str) -> Result<PlatformPod> {
        pod_by_container_id(self.platform.as_ref(), &self.settings.namespace, container_id).await
    }

    /// The service selecting `deploymentConfig=<deployment>`
    async fn owning_service(&self, deployment: &str) -> Result<Option<PlatformService>> {
        let services = self.platform.list_services(&self.settings.namespace).await?;
        let found = services.into_iter().find(|service| {
            service.selector.get(DEPLOYMENT_CONFIG_LABEL).map(String::as_str) == Some(deployment)
        });
        if found.is_none() {
            info!(deployment = %deployment, "No service selects deployment");
        }
        Ok(found)
    }
}

fn deployment_selector(deployment: &str) -> BTreeMap<String, String> {
    [(DEPLOYMENT_CONFIG_LABEL.to_string(), deployment.to_string())]
        .into_iter()
        .collect()
}

fn deployment_label(pod: &PlatformPod) -> Result<&str> {
    pod.labels
        .get(DEPLOYMENT_CONFIG_LABEL)
        .map(String::as_str)
        .ok_or_else(|| {
            Error::not_found(
                "DeploymentConfig",
                format!("label {} on pod {}", DEPLOYMENT_CONFIG_LABEL, pod.name),
            )
        })
}
