//! In-memory platform and engine for tests
//!
//! [`InMemoryPlatform`] keeps resources in maps, records every mutating call
//! in order, and can simulate a rollout that materializes a pod some polls
//! after a deployment is created. [`StaticEngine`] serves canned image and
//! container metadata. Job pods run through scripted phases.

use crate::engine::{ContainerEngine, ContainerInfo, EngineResult, ImageConfig, ImageInfo};
use crate::error::PlatformError;
use crate::lifecycle::{DEPLOYER_LABEL, DEPLOYMENT_CONFIG_LABEL, REPLICATION_CONTROLLER_LABEL};
use crate::models::{ContainerCreated, ContainerSpec};
use crate::platform::{
    selector_matches, OrchestrationPlatform, PlatformDeployment, PlatformJobPod, PlatformPod,
    PlatformResult, PlatformRoute, PlatformService,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// How a simulated rollout behaves
#[derive(Debug, Clone)]
pub struct Rollout {
    /// Runtime id reported in the pod status, e.g. "docker://8d5e..."
    pub container_id: String,
    /// Pod list calls during which only the deployer pod exists
    pub deployer_polls: u32,
}

impl Rollout {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            deployer_polls: 0,
        }
    }

    pub fn after_deployer_polls(mut self, polls: u32) -> Self {
        self.deployer_polls = polls;
        self
    }
}

/// Phase a job pod ends in, reported after some "Running" phase reads
#[derive(Debug, Clone)]
pub struct JobScript {
    pub running_reads: u32,
    pub final_phase: String,
}

impl JobScript {
    pub fn succeeds_after(running_reads: u32) -> Self {
        Self {
            running_reads,
            final_phase: "Succeeded".to_string(),
        }
    }

    pub fn fails_after(running_reads: u32) -> Self {
        Self {
            running_reads,
            final_phase: "Failed".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    projects: BTreeSet<String>,
    services: BTreeMap<Key, PlatformService>,
    deployments: BTreeMap<Key, PlatformDeployment>,
    replication_controllers: BTreeSet<Key>,
    pods: BTreeMap<Key, PlatformPod>,
    routes: BTreeMap<Key, PlatformRoute>,
    jobs: BTreeMap<Key, PlatformJobPod>,
    /// Phase reads seen per job pod
    job_reads: BTreeMap<Key, u32>,
    job_script: Option<JobScript>,
    rollout: Option<Rollout>,
    /// Deployments waiting for their pod: name -> polls seen so far
    pending: BTreeMap<Key, u32>,
    next_node_port: u16,
    fail_pod_listing: Option<String>,
    calls: Vec<String>,
}

/// Map-backed [`OrchestrationPlatform`]
#[derive(Debug)]
pub struct InMemoryPlatform {
    state: Mutex<State>,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_node_port: 32100,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_project(self, namespace: &str) -> Self {
        self.state().projects.insert(namespace.to_string());
        self
    }

    /// Deployments created from now on roll out a pod as described
    pub fn with_rollout(self, rollout: Rollout) -> Self {
        self.state().rollout = Some(rollout);
        self
    }

    /// Job pods created from now on follow `script`; without one they stay
    /// "Running" forever
    pub fn with_job_script(self, script: JobScript) -> Self {
        self.state().job_script = Some(script);
        self
    }

    pub fn insert_pod(&self, pod: PlatformPod) {
        self.state()
            .pods
            .insert(key(&pod.namespace, &pod.name), pod);
    }

    pub fn insert_service(&self, service: PlatformService) {
        self.state()
            .services
            .insert(key(&service.namespace, &service.name), service);
    }

    pub fn insert_replication_controller(&self, namespace: &str, name: &str) {
        self.state()
            .replication_controllers
            .insert(key(namespace, name));
    }

    /// Make every pod listing fail with an API error
    pub fn fail_pod_listing(&self, message: &str) {
        self.state().fail_pod_listing = Some(message.to_string());
    }

    /// Mutating calls in the order they were made, as "op:name"
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn services(&self) -> Vec<PlatformService> {
        self.state().services.values().cloned().collect()
    }

    pub fn deployments(&self) -> Vec<PlatformDeployment> {
        self.state().deployments.values().cloned().collect()
    }

    pub fn pods(&self) -> Vec<PlatformPod> {
        self.state().pods.values().cloned().collect()
    }

    pub fn routes(&self) -> Vec<PlatformRoute> {
        self.state().routes.values().cloned().collect()
    }

    /// Job pods still present
    pub fn jobs(&self) -> Vec<PlatformJobPod> {
        self.state().jobs.values().cloned().collect()
    }

    pub fn replication_controllers(&self) -> Vec<String> {
        self.state()
            .replication_controllers
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

impl State {
    fn record(&mut self, op: &str, name: &str) {
        self.calls.push(format!("{}:{}", op, name));
    }

    /// Advance simulated rollouts by one pod listing
    fn tick(&mut self) {
        let Some(rollout) = self.rollout.clone() else {
            return;
        };
        let pending: Vec<Key> = self.pending.keys().cloned().collect();
        for deployment in pending {
            let (namespace, name) = deployment.clone();
            let rc = format!("{}-1", name);
            let deployer = key(&namespace, &format!("{}-deploy", rc));
            let polls = self.pending.entry(deployment.clone()).or_insert(0);
            *polls += 1;

            if *polls <= rollout.deployer_polls {
                let labels = [(DEPLOYER_LABEL.to_string(), rc.clone())]
                    .into_iter()
                    .collect();
                self.pods.insert(
                    deployer.clone(),
                    PlatformPod {
                        namespace: namespace.clone(),
                        name: deployer.1.clone(),
                        labels,
                        ..PlatformPod::default()
                    },
                );
                continue;
            }

            self.pods.remove(&deployer);
            self.pending.remove(&deployment);
            self.replication_controllers.insert(key(&namespace, &rc));
            let labels = [
                (DEPLOYMENT_CONFIG_LABEL.to_string(), name.clone()),
                (REPLICATION_CONTROLLER_LABEL.to_string(), rc.clone()),
            ]
            .into_iter()
            .collect();
            let pod_name = format!("{}-x7k2p", rc);
            self.pods.insert(
                key(&namespace, &pod_name),
                PlatformPod {
                    namespace,
                    name: pod_name,
                    labels,
                    container_ids: vec![rollout.container_id.clone()],
                    phase: Some("Running".to_string()),
                },
            );
        }
    }
}

#[async_trait]
impl OrchestrationPlatform for InMemoryPlatform {
    async fn project_exists(&self, namespace: &str) -> PlatformResult<bool> {
        Ok(self.state().projects.contains(namespace))
    }

    async fn create_service(&self, service: &PlatformService) -> PlatformResult<()> {
        let mut state = self.state();
        let k = key(&service.namespace, &service.name);
        if state.services.contains_key(&k) {
            return Err(PlatformError::api(409, format!("service {} exists", service.name)));
        }
        let mut stored = service.clone();
        for port in &mut stored.ports {
            port.node_port = Some(state.next_node_port);
            state.next_node_port += 1;
        }
        state.record("create_service", &service.name);
        state.services.insert(k, stored);
        Ok(())
    }

    async fn list_services(&self, namespace: &str) -> PlatformResult<Vec<PlatformService>> {
        Ok(self
            .state()
            .services
            .values()
            .filter(|service| service.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> PlatformResult<bool> {
        let mut state = self.state();
        state.record("delete_service", name);
        Ok(state.services.remove(&key(namespace, name)).is_some())
    }

    async fn create_deployment(&self, deployment: &PlatformDeployment) -> PlatformResult<()> {
        let mut state = self.state();
        let k = key(&deployment.namespace, &deployment.name);
        state.record("create_deployment", &deployment.name);
        state.deployments.insert(k.clone(), deployment.clone());
        if state.rollout.is_some() {
            state.pending.insert(k, 0);
        }
        Ok(())
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> PlatformResult<bool> {
        let mut state = self.state();
        state.record("delete_deployment", name);
        Ok(state.deployments.remove(&key(namespace, name)).is_some())
    }

    async fn delete_replication_controller(
        &self,
        namespace: &str,
        name: &str,
    ) -> PlatformResult<bool> {
        let mut state = self.state();
        state.record("delete_replication_controller", name);
        Ok(state.replication_controllers.remove(&key(namespace, name)))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> PlatformResult<Vec<PlatformPod>> {
        let mut state = self.state();
        if let Some(message) = &state.fail_pod_listing {
            return Err(PlatformError::api(500, message.clone()));
        }
        state.tick();
        Ok(state
            .pods
            .values()
            .filter(|pod| pod.namespace == namespace && selector_matches(selector, &pod.labels))
            .cloned()
            .collect())
    }

    async fn label_pod(
        &self,
        namespace: &str,
        name: &str,
        label: &str,
        value: &str,
    ) -> PlatformResult<()> {
        let mut state = self.state();
        state.record("label_pod", name);
        let pod = state
            .pods
            .get_mut(&key(namespace, name))
            .ok_or_else(|| PlatformError::api(404, format!("pod {} not found", name)))?;
        pod.labels.insert(label.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> PlatformResult<bool> {
        let mut state = self.state();
        state.record("delete_pod", name);
        let job = state.jobs.remove(&key(namespace, name)).is_some();
        Ok(state.pods.remove(&key(namespace, name)).is_some() || job)
    }

    async fn create_job_pod(&self, pod: &PlatformJobPod) -> PlatformResult<()> {
        let mut state = self.state();
        state.record("create_job_pod", &pod.name);
        let k = key(&pod.namespace, &pod.name);
        if state.jobs.contains_key(&k) {
            return Err(PlatformError::api(
                409,
                format!("pod {} already exists", pod.name),
            ));
        }
        state.jobs.insert(k.clone(), pod.clone());
        state.job_reads.insert(k, 0);
        Ok(())
    }

    async fn pod_phase(&self, namespace: &str, name: &str) -> PlatformResult<Option<String>> {
        let mut state = self.state();
        let k = key(namespace, name);
        if let Some(pod) = state.pods.get(&k) {
            return Ok(Some(pod.phase.clone().unwrap_or_default()));
        }
        if !state.jobs.contains_key(&k) {
            return Ok(None);
        }
        let script = state.job_script.clone();
        let reads = state.job_reads.entry(k).or_insert(0);
        *reads += 1;
        let phase = match script {
            Some(script) if *reads > script.running_reads => script.final_phase,
            _ => "Running".to_string(),
        };
        Ok(Some(phase))
    }

    async fn create_route(&self, route: &PlatformRoute) -> PlatformResult<()> {
        let mut state = self.state();
        state.record("create_route", &route.name);
        state
            .routes
            .insert(key(&route.namespace, &route.name), route.clone());
        Ok(())
    }

    async fn delete_routes(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> PlatformResult<usize> {
        let mut state = self.state();
        let doomed: Vec<Key> = state
            .routes
            .iter()
            .filter(|((ns, _), route)| ns == namespace && selector_matches(selector, &route.labels))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &doomed {
            state.routes.remove(k);
        }
        state.record("delete_routes", &doomed.len().to_string());
        Ok(doomed.len())
    }
}

/// Engine serving fixed images and containers
#[derive(Debug, Default)]
pub struct StaticEngine {
    images: Mutex<BTreeMap<String, ImageInfo>>,
    containers: Mutex<BTreeMap<String, ContainerInfo>>,
    created: Mutex<Vec<ContainerSpec>>,
}

impl StaticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image declaring `ports`
    pub fn with_image(self, name: &str, ports: &[&str]) -> Self {
        let exposed_ports = ports
            .iter()
            .map(|port| (port.to_string(), serde_json::json!({})))
            .collect();
        let image = ImageInfo {
            id: format!("sha256:{}", name),
            config: Some(ImageConfig {
                exposed_ports: Some(exposed_ports),
                ..ImageConfig::default()
            }),
        };
        lock(&self.images).insert(name.to_string(), image);
        self
    }

    pub fn with_container(self, info: ContainerInfo) -> Self {
        lock(&self.containers).insert(info.id.clone(), info);
        self
    }

    /// Specs passed to `create_container`
    pub fn created(&self) -> Vec<ContainerSpec> {
        lock(&self.created).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ContainerEngine for StaticEngine {
    async fn inspect_image(&self, image: &str) -> EngineResult<Option<ImageInfo>> {
        Ok(lock(&self.images).get(image).cloned())
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<Option<ContainerInfo>> {
        let containers = lock(&self.containers);
        // Engines accept unambiguous id prefixes
        Ok(containers
            .get(id)
            .or_else(|| {
                containers
                    .iter()
                    .find(|(full, _)| full.starts_with(id))
                    .map(|(_, info)| info)
            })
            .cloned())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<ContainerCreated> {
        let mut created = lock(&self.created);
        created.push(spec.clone());
        let id = format!("{:064x}", created.len());
        lock(&self.containers).insert(
            id.clone(),
            ContainerInfo {
                id: id.clone(),
                name: Some(format!("/{}", spec.name)),
                image: Some(spec.image.clone()),
                ..ContainerInfo::default()
            },
        );
        Ok(ContainerCreated::new(id))
    }

    async fn remove_container(
        &self,
        id: &str,
        _force: bool,
        _remove_volumes: bool,
    ) -> EngineResult<bool> {
        Ok(lock(&self.containers).remove(id).is_some())
    }

    async fn ping(&self) -> EngineResult<()> {
        Ok(())
    }
}
