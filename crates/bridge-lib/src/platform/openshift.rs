//! OpenShift adapter built on kube-rs
//!
//! Core resources (Service, Pod, ReplicationController, Namespace) use the
//! typed k8s-openapi structs. DeploymentConfig and Route are OpenShift
//! extensions and go through `DynamicObject` with manifests built as JSON.

use super::{
    selector_string, OrchestrationPlatform, PlatformDeployment, PlatformJobPod, PlatformPod,
    PlatformResult, PlatformRoute, PlatformService,
};
use crate::config::PlatformConfig;
use crate::error::PlatformError;
use crate::ports::ServicePort;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, Namespace, PersistentVolumeClaimVolumeSource, Pod, PodSpec, ReplicationController,
    SecurityContext as KubeSecurityContext, Service, ServicePort as KubeServicePort, ServiceSpec,
    Volume, VolumeMount as KubeVolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

fn deployment_config_resource() -> ApiResource {
    ApiResource {
        group: "apps.openshift.io".to_string(),
        version: "v1".to_string(),
        api_version: "apps.openshift.io/v1".to_string(),
        kind: "DeploymentConfig".to_string(),
        plural: "deploymentconfigs".to_string(),
    }
}

fn route_resource() -> ApiResource {
    ApiResource {
        group: "route.openshift.io".to_string(),
        version: "v1".to_string(),
        api_version: "route.openshift.io/v1".to_string(),
        kind: "Route".to_string(),
        plural: "routes".to_string(),
    }
}

/// `~/` at the start of a kubeconfig path refers to the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), home::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// OpenShift cluster reached through a kube client
#[derive(Clone)]
pub struct KubePlatform {
    client: Client,
}

impl KubePlatform {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from an explicit kubeconfig, or the ambient/in-cluster
    /// configuration, applying the endpoint override if one is set
    pub async fn connect(config: &PlatformConfig) -> PlatformResult<Self> {
        let mut kube_config = match config.kubeconfig.as_deref() {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(expand_home(path))
                    .map_err(|e| PlatformError::Config(e.to_string()))?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| PlatformError::Config(e.to_string()))?
            }
            None => Config::infer()
                .await
                .map_err(|e| PlatformError::Config(e.to_string()))?,
        };

        if let Some(endpoint) = config.api_endpoint.as_deref() {
            kube_config.cluster_url = endpoint
                .parse()
                .map_err(|e| PlatformError::Config(format!("invalid API endpoint: {}", e)))?;
        }

        info!(
            cluster_url = %kube_config.cluster_url,
            namespace = %config.namespace,
            "Connecting to orchestration platform"
        );

        let client = Client::try_from(kube_config)?;
        Ok(Self::new(client))
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployment_configs(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &deployment_config_resource())
    }

    fn routes(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &route_resource())
    }
}

/// Map a delete outcome to "was it there"
fn deleted<T>(result: Result<T, kube::Error>) -> PlatformResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn list_params(selector: &BTreeMap<String, String>) -> ListParams {
    let params = ListParams::default();
    if selector.is_empty() {
        params
    } else {
        params.labels(&selector_string(selector))
    }
}

#[async_trait]
impl OrchestrationPlatform for KubePlatform {
    async fn project_exists(&self, namespace: &str) -> PlatformResult<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(namespace).await?.is_some())
    }

    async fn create_service(&self, service: &PlatformService) -> PlatformResult<()> {
        self.services(&service.namespace)
            .create(&PostParams::default(), &service_to_kube(service))
            .await?;
        debug!(service = %service.name, namespace = %service.namespace, "Service created");
        Ok(())
    }

    async fn list_services(&self, namespace: &str) -> PlatformResult<Vec<PlatformService>> {
        let list = self.services(namespace).list(&ListParams::default()).await?;
        Ok(list.items.into_iter().map(service_from_kube).collect())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> PlatformResult<bool> {
        deleted(
            self.services(namespace)
                .delete(name, &DeleteParams::default())
                .await,
        )
    }

    async fn create_deployment(&self, deployment: &PlatformDeployment) -> PlatformResult<()> {
        let object: DynamicObject = serde_json::from_value(deployment_manifest(deployment))?;
        self.deployment_configs(&deployment.namespace)
            .create(&PostParams::default(), &object)
            .await?;
        debug!(
            deployment = %deployment.name,
            namespace = %deployment.namespace,
            "Deployment config created"
        );
        Ok(())
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> PlatformResult<bool> {
        deleted(
            self.deployment_configs(namespace)
                .delete(name, &DeleteParams::default())
                .await,
        )
    }

    async fn delete_replication_controller(
        &self,
        namespace: &str,
        name: &str,
    ) -> PlatformResult<bool> {
        let api: Api<ReplicationController> = Api::namespaced(self.client.clone(), namespace);
        deleted(api.delete(name, &DeleteParams::default()).await)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> PlatformResult<Vec<PlatformPod>> {
        let list = self.pods(namespace).list(&list_params(selector)).await?;
        Ok(list.items.into_iter().map(pod_from_kube).collect())
    }

    async fn label_pod(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> PlatformResult<()> {
        let patch = json!({ "metadata": { "labels": { key: value } } });
        self.pods(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> PlatformResult<bool> {
        deleted(self.pods(namespace).delete(name, &DeleteParams::default()).await)
    }

    async fn create_job_pod(&self, pod: &PlatformJobPod) -> PlatformResult<()> {
        self.pods(&pod.namespace)
            .create(&PostParams::default(), &job_pod_to_kube(pod))
            .await?;
        debug!(pod = %pod.name, claim = %pod.claim_name, "Job pod created");
        Ok(())
    }

    async fn pod_phase(&self, namespace: &str, name: &str) -> PlatformResult<Option<String>> {
        let pod = self.pods(namespace).get_opt(name).await?;
        Ok(pod.map(|pod| {
            pod.status
                .and_then(|status| status.phase)
                .unwrap_or_default()
        }))
    }

    async fn create_route(&self, route: &PlatformRoute) -> PlatformResult<()> {
        let object: DynamicObject = serde_json::from_value(route_manifest(route))?;
        self.routes(&route.namespace)
            .create(&PostParams::default(), &object)
            .await?;
        debug!(route = %route.name, host = %route.host, "Route created");
        Ok(())
    }

    async fn delete_routes(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> PlatformResult<usize> {
        let api = self.routes(namespace);
        let list = api.list(&list_params(selector)).await?;

        let mut removed = 0;
        for route in list.items {
            let Some(name) = route.metadata.name else {
                continue;
            };
            if deleted(api.delete(&name, &DeleteParams::default()).await)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn non_empty(map: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    if map.is_empty() {
        None
    } else {
        Some(map.clone())
    }
}

fn service_to_kube(service: &PlatformService) -> Service {
    let ports = service
        .ports
        .iter()
        .map(|port| KubeServicePort {
            name: Some(port.name.clone()),
            protocol: Some(port.protocol.to_uppercase()),
            port: i32::from(port.port),
            target_port: Some(IntOrString::Int(i32::from(port.target_port))),
            ..Default::default()
        })
        .collect();

    Service {
        metadata: ObjectMeta {
            name: Some(service.name.clone()),
            namespace: Some(service.namespace.clone()),
            annotations: non_empty(&service.annotations),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(service.service_type.clone()),
            selector: Some(service.selector.clone()),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_from_kube(service: Service) -> PlatformService {
    let spec = service.spec.unwrap_or_default();
    let ports = spec
        .ports
        .unwrap_or_default()
        .into_iter()
        .filter_map(|port| {
            let number = u16::try_from(port.port).ok()?;
            let target_port = match port.target_port {
                Some(IntOrString::Int(target)) => u16::try_from(target).ok()?,
                _ => number,
            };
            Some(ServicePort {
                name: port.name.unwrap_or_default(),
                protocol: port
                    .protocol
                    .unwrap_or_else(|| "TCP".to_string())
                    .to_lowercase(),
                port: number,
                target_port,
                node_port: port.node_port.and_then(|p| u16::try_from(p).ok()),
            })
        })
        .collect();

    PlatformService {
        namespace: service.metadata.namespace.unwrap_or_default(),
        name: service.metadata.name.unwrap_or_default(),
        service_type: spec.type_.unwrap_or_default(),
        selector: spec.selector.unwrap_or_default(),
        ports,
        annotations: service.metadata.annotations.unwrap_or_default(),
    }
}

fn job_pod_to_kube(pod: &PlatformJobPod) -> Pod {
    let container = Container {
        name: pod.name.clone(),
        image: Some(pod.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(pod.command.clone()),
        security_context: Some(KubeSecurityContext {
            privileged: Some(false),
            ..Default::default()
        }),
        volume_mounts: Some(vec![KubeVolumeMount {
            name: pod.claim_name.clone(),
            mount_path: pod.mount_path.clone(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Pod {
        metadata: ObjectMeta {
            name: Some(pod.name.clone()),
            namespace: Some(pod.namespace.clone()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container],
            restart_policy: Some("Never".to_string()),
            volumes: Some(vec![Volume {
                name: pod.claim_name.clone(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: pod.claim_name.clone(),
                    read_only: None,
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_from_kube(pod: Pod) -> PlatformPod {
    let status = pod.status.unwrap_or_default();
    let container_ids = status
        .container_statuses
        .unwrap_or_default()
        .into_iter()
        .filter_map(|container| container.container_id)
        .collect();

    PlatformPod {
        namespace: pod.metadata.namespace.unwrap_or_default(),
        name: pod.metadata.name.unwrap_or_default(),
        labels: pod.metadata.labels.unwrap_or_default(),
        container_ids,
        phase: status.phase,
    }
}

fn deployment_manifest(deployment: &PlatformDeployment) -> Value {
    let container = &deployment.container;

    let ports: Vec<Value> = container
        .ports
        .iter()
        .map(|port| {
            json!({
                "name": port.name,
                "containerPort": port.container_port,
                "protocol": port.protocol,
            })
        })
        .collect();

    let env: Vec<Value> = container
        .env
        .iter()
        .map(|var| match &var.value {
            Some(value) => json!({ "name": var.name, "value": value }),
            None => json!({ "name": var.name }),
        })
        .collect();

    let mounts: Vec<Value> = container
        .volume_mounts
        .iter()
        .map(|mount| {
            json!({
                "name": mount.name,
                "mountPath": mount.mount_path,
                "readOnly": mount.read_only,
            })
        })
        .collect();

    let volumes: Vec<Value> = deployment
        .volumes
        .iter()
        .map(|volume| json!({ "name": volume.name, "hostPath": { "path": volume.path } }))
        .collect();

    let triggers: Vec<Value> = deployment
        .triggers
        .iter()
        .map(|trigger| json!({ "type": trigger }))
        .collect();

    json!({
        "apiVersion": "apps.openshift.io/v1",
        "kind": "DeploymentConfig",
        "metadata": {
            "name": deployment.name,
            "namespace": deployment.namespace,
        },
        "spec": {
            "replicas": deployment.replicas,
            "selector": deployment.selector,
            "triggers": triggers,
            "template": {
                "metadata": { "labels": deployment.selector },
                "spec": {
                    "serviceAccountName": deployment.service_account,
                    "securityContext": { "runAsUser": deployment.run_as_user },
                    "containers": [{
                        "name": container.name,
                        "image": container.image,
                        "imagePullPolicy": container.image_pull_policy,
                        "ports": ports,
                        "env": env,
                        "volumeMounts": mounts,
                        "securityContext": {
                            "privileged": container.security_context.privileged,
                            "runAsUser": container.security_context.run_as_user,
                        },
                        "livenessProbe": {
                            "tcpSocket": { "port": container.liveness_probe.port },
                            "initialDelaySeconds": container.liveness_probe.initial_delay_secs,
                            "timeoutSeconds": container.liveness_probe.timeout_secs,
                        },
                    }],
                    "volumes": volumes,
                },
            },
        },
    })
}

fn route_manifest(route: &PlatformRoute) -> Value {
    let mut spec = json!({
        "host": route.host,
        "to": { "kind": "Service", "name": route.service_name },
        "port": { "targetPort": route.target_port },
    });
    if route.tls {
        spec["tls"] = json!({
            "termination": "edge",
            "insecureEdgeTerminationPolicy": "Redirect",
        });
    }

    json!({
        "apiVersion": "route.openshift.io/v1",
        "kind": "Route",
        "metadata": {
            "name": route.name,
            "namespace": route.namespace,
            "labels": route.labels,
        },
        "spec": spec,
    })
}
