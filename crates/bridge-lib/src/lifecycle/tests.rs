//! Tests for the cluster lifecycle

#[cfg(test)]
mod lifecycle_tests {
    use crate::config::RouteConfig;
    use crate::engine::ContainerInfo;
    use crate::error::Error;
    use crate::lifecycle::{
        ClusterContainerLifecycle, LifecycleSettings, CONTAINER_ID_LABEL, DEPLOYMENT_CONFIG_LABEL,
    };
    use crate::models::{ContainerSpec, ServerConf};
    use crate::platform::{OrchestrationPlatform, PlatformPod};
    use crate::poll::PollConfig;
    use crate::servers::{AddressOverrides, StrategySelector};
    use crate::testing::{InMemoryPlatform, Rollout, StaticEngine};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const NAMESPACE: &str = "eclipse-che";
    const IMAGE: &str = "eclipse/ubuntu_jdk8";
    const CONTAINER_ID: &str = "8d5e2f0c41a7b3e94f1c0d2a6b8e7f3015c9a4d2e6b1f0a8c7d3e5f2a1b4c6d8";

    fn settings(max_attempts: u32) -> LifecycleSettings {
        LifecycleSettings {
            namespace: NAMESPACE.to_string(),
            service_account: "cheserviceaccount".to_string(),
            node_address: "192.168.99.100".to_string(),
            discovery: PollConfig::new(Duration::from_millis(1), max_attempts),
            routes: RouteConfig::default(),
            strategy: "default".to_string(),
            system_servers: vec![ServerConf::new(Some("wsagent"), "4401", Some("http"), Some("/api"))],
            workspaces_pvc_name: "claim-che-workspace".to_string(),
            files_job: PollConfig::new(Duration::from_millis(1), max_attempts),
        }
    }

    fn spec() -> ContainerSpec {
        let mut labels = BTreeMap::new();
        labels.insert(
            "che:server:4411/tcp:ref".to_string(),
            Some("terminal".to_string()),
        );
        labels.insert("che:server:4411/tcp:protocol".to_string(), Some("ws".to_string()));
        labels.insert("dropped".to_string(), None);

        ContainerSpec {
            name: "workspacek6n2_machineab_che_ws".to_string(),
            image: IMAGE.to_string(),
            env: vec![
                "CHE_WORKSPACE_ID=workspacek6n2".to_string(),
                "JAVA_OPTS=-Xmx=1g".to_string(),
            ],
            exposed_ports: ["4411/tcp".to_string()].into_iter().collect(),
            binds: vec!["/var/lib/che/ws-agent:/mnt/che/ws-agent:ro".to_string()],
            labels,
        }
    }

    fn engine() -> StaticEngine {
        let container: ContainerInfo = serde_json::from_value(serde_json::json!({
            "Id": CONTAINER_ID,
            "Name": "/k6n2-machineab-che-ws",
            "Config": {
                "Env": ["CHE_WORKSPACE_ID=workspacek6n2"],
                "Labels": {"che:server:22/tcp:ref": "ssh", "io.kubernetes.pod.name": "x"}
            },
            "NetworkSettings": {"IPAddress": "10.1.2.3", "Ports": {}}
        }))
        .unwrap();
        StaticEngine::new()
            .with_image(IMAGE, &["4401/tcp", "22/tcp"])
            .with_container(container)
    }

    fn lifecycle(
        platform: Arc<InMemoryPlatform>,
        settings: LifecycleSettings,
    ) -> ClusterContainerLifecycle {
        ClusterContainerLifecycle::new(
            platform,
            Arc::new(engine()),
            settings,
            StrategySelector::new(AddressOverrides::default()),
        )
    }

    fn rolling_platform() -> Arc<InMemoryPlatform> {
        Arc::new(
            InMemoryPlatform::new()
                .with_project(NAMESPACE)
                .with_rollout(
                    Rollout::new(format!("docker://{}", CONTAINER_ID)).after_deployer_polls(2),
                ),
        )
    }

    #[tokio::test]
    async fn test_create_provisions_service_and_deployment() {
        let platform = rolling_platform();
        let lifecycle = lifecycle(platform.clone(), settings(10));

        let created = lifecycle.create(&spec()).await.unwrap();
        assert_eq!(created.id, CONTAINER_ID);

        let services = platform.services();
        assert_eq!(services.len(), 1);
        let service = &services[0];
        assert_eq!(service.name, "che-ws-k6n2");
        assert_eq!(service.service_type, "NodePort");
        assert_eq!(service.selector[DEPLOYMENT_CONFIG_LABEL], "che-ws-k6n2");
        let port_names: Vec<&str> = service.ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(port_names, vec!["sshd", "wsagent", "terminal"]);
        assert!(!service.annotations.is_empty());

        let deployment = &platform.deployments()[0];
        assert_eq!(deployment.replicas, 1);
        assert_eq!(deployment.service_account, "cheserviceaccount");
        assert_eq!(deployment.container.name, "k6n2-machineab-che-ws");
        assert_eq!(deployment.container.image_pull_policy, "IfNotPresent");
        assert_eq!(deployment.container.liveness_probe.port, 4401);
        assert_eq!(deployment.container.liveness_probe.initial_delay_secs, 120);
        assert!(deployment.container.security_context.privileged);
        assert_eq!(deployment.container.security_context.run_as_user, 1000);
        assert_eq!(deployment.triggers, vec!["ConfigChange".to_string()]);
        assert_eq!(deployment.volumes[0].name, "ws-k6n2-wsagent-lib");
        assert!(deployment.container.volume_mounts[0].read_only);
    }

    #[tokio::test]
    async fn test_discovered_pod_is_labelled_with_short_id() {
        let platform = rolling_platform();
        let lifecycle = lifecycle(platform.clone(), settings(10));
        lifecycle.create(&spec()).await.unwrap();

        let pods = platform.pods();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].labels[CONTAINER_ID_LABEL], "8d5e2f0c41a7");
    }

    #[tokio::test]
    async fn test_discovery_timeout_leaves_service_and_deployment() {
        let platform = Arc::new(InMemoryPlatform::new().with_project(NAMESPACE));
        let lifecycle = lifecycle(platform.clone(), settings(3));

        let err = lifecycle.create(&spec()).await.unwrap_err();
        match err {
            Error::DiscoveryTimeout {
                deployment,
                attempts,
                ..
            } => {
                assert_eq!(deployment, "che-ws-k6n2");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {}", other),
        }

        assert_eq!(
            platform.calls(),
            vec![
                "create_service:che-ws-k6n2".to_string(),
                "create_deployment:che-ws-k6n2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_deployer_pod_outlasting_ceiling_times_out() {
        let platform = Arc::new(
            InMemoryPlatform::new().with_project(NAMESPACE).with_rollout(
                Rollout::new(format!("docker://{}", CONTAINER_ID)).after_deployer_polls(5),
            ),
        );
        let lifecycle = lifecycle(platform.clone(), settings(4));

        let err = lifecycle.create(&spec()).await.unwrap_err();
        assert!(matches!(err, Error::DiscoveryTimeout { .. }));
        assert!(platform.pods().iter().all(|pod| !pod.labels.contains_key(CONTAINER_ID_LABEL)));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_discovery() {
        let platform = Arc::new(InMemoryPlatform::new().with_project(NAMESPACE));
        let mut slow = settings(1000);
        slow.discovery = PollConfig::new(Duration::from_secs(60), 1000);
        let lifecycle = lifecycle(platform.clone(), slow);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = lifecycle
            .create_with_cancel(&spec(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
        assert_eq!(platform.services().len(), 1);
        assert_eq!(platform.deployments().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_project_creates_nothing() {
        let platform = Arc::new(InMemoryPlatform::new());
        let lifecycle = lifecycle(platform.clone(), settings(3));

        let err = lifecycle.create(&spec()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_workspace_id_is_invalid_spec() {
        let platform = rolling_platform();
        let lifecycle = lifecycle(platform.clone(), settings(3));
        let mut spec = spec();
        spec.env = vec!["PATH=/bin".to_string()];

        let err = lifecycle.create(&spec).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSpec(_)));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_platform_error_aborts_discovery() {
        let platform = Arc::new(InMemoryPlatform::new().with_project(NAMESPACE));
        platform.fail_pod_listing("etcd unavailable");
        let lifecycle = lifecycle(platform.clone(), settings(50));

        let err = lifecycle.create(&spec()).await.unwrap_err();
        assert_eq!(err.kind(), "platform");
    }

    #[tokio::test]
    async fn test_routes_created_per_service_port() {
        let platform = rolling_platform();
        let mut with_routes = settings(10);
        with_routes.routes = RouteConfig {
            enabled: true,
            tls: true,
            external_address: Some("che-eclipse-che.apps.example.com".to_string()),
        };
        let lifecycle = lifecycle(platform.clone(), with_routes);
        lifecycle.create(&spec()).await.unwrap();

        let routes = platform.routes();
        assert_eq!(routes.len(), 3);
        let wsagent = routes
            .iter()
            .find(|route| route.target_port == "wsagent")
            .unwrap();
        assert_eq!(wsagent.name, "wsagent-k6n2-machineab-che-ws");
        assert_eq!(
            wsagent.host,
            "wsagent-k6n2-machineab-che-ws-eclipse-che.apps.example.com"
        );
        assert!(wsagent.tls);
        assert_eq!(wsagent.labels[DEPLOYMENT_CONFIG_LABEL], "che-ws-k6n2");
    }

    #[tokio::test]
    async fn test_routes_without_external_address_are_rejected() {
        let platform = rolling_platform();
        let mut with_routes = settings(10);
        with_routes.routes.enabled = true;
        let lifecycle = lifecycle(platform.clone(), with_routes);

        let err = lifecycle.create(&spec()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSpec(_)));
        assert!(platform.services().is_empty());
    }

    #[tokio::test]
    async fn test_remove_deletes_in_order() {
        let platform = rolling_platform();
        let lifecycle = lifecycle(platform.clone(), settings(10));
        lifecycle.create(&spec()).await.unwrap();

        lifecycle.remove(CONTAINER_ID, true, false).await.unwrap();

        let calls = platform.calls();
        let teardown: Vec<&str> = calls
            .iter()
            .map(String::as_str)
            .skip_while(|call| !call.starts_with("delete_"))
            .collect();
        assert_eq!(
            teardown,
            vec![
                "delete_service:che-ws-k6n2",
                "delete_deployment:che-ws-k6n2",
                "delete_replication_controller:che-ws-k6n2-1",
                "delete_pod:che-ws-k6n2-1-x7k2p",
            ]
        );
        assert!(platform.services().is_empty());
        assert!(platform.deployments().is_empty());
        assert!(platform.pods().is_empty());
        assert!(platform.replication_controllers().is_empty());
    }

    #[tokio::test]
    async fn test_remove_volumes_leaves_project_files_alone() {
        let platform = rolling_platform();
        let lifecycle = lifecycle(platform.clone(), settings(10));
        lifecycle.create(&spec()).await.unwrap();

        lifecycle.remove(CONTAINER_ID, true, true).await.unwrap();

        assert!(!platform
            .calls()
            .iter()
            .any(|call| call.starts_with("create_job_pod")));
        assert!(platform.pods().is_empty());
    }

    #[tokio::test]
    async fn test_remove_tolerates_resources_already_gone() {
        let platform = Arc::new(InMemoryPlatform::new().with_project(NAMESPACE));
        let labels = [
            (DEPLOYMENT_CONFIG_LABEL.to_string(), "che-ws-k6n2".to_string()),
            (CONTAINER_ID_LABEL.to_string(), "8d5e2f0c41a7".to_string()),
        ]
        .into_iter()
        .collect();
        platform.insert_pod(PlatformPod {
            namespace: NAMESPACE.to_string(),
            name: "orphan".to_string(),
            labels,
            ..PlatformPod::default()
        });
        let lifecycle = lifecycle(platform.clone(), settings(3));

        lifecycle.remove(CONTAINER_ID, false, false).await.unwrap();
        assert!(platform.pods().is_empty());
    }

    #[tokio::test]
    async fn test_remove_without_matching_pod_is_not_found() {
        let platform = Arc::new(InMemoryPlatform::new().with_project(NAMESPACE));
        let lifecycle = lifecycle(platform.clone(), settings(3));

        let err = lifecycle.remove(CONTAINER_ID, false, false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::AmbiguousDiscovery { matches: 0, .. }
        ));
        assert!(err.is_not_found());
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remove_with_duplicate_identity_is_ambiguous() {
        let platform = Arc::new(InMemoryPlatform::new().with_project(NAMESPACE));
        for name in ["first", "second"] {
            let labels = [(CONTAINER_ID_LABEL.to_string(), "8d5e2f0c41a7".to_string())]
                .into_iter()
                .collect();
            platform.insert_pod(PlatformPod {
                namespace: NAMESPACE.to_string(),
                name: name.to_string(),
                labels,
                ..PlatformPod::default()
            });
        }
        let lifecycle = lifecycle(platform.clone(), settings(3));

        let err = lifecycle.remove(CONTAINER_ID, false, false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::AmbiguousDiscovery { matches: 2, .. }
        ));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_inspect_container_uses_service_state() {
        let platform = rolling_platform();
        let lifecycle = lifecycle(platform.clone(), settings(10));
        lifecycle.create(&spec()).await.unwrap();

        let info = lifecycle.inspect_container(CONTAINER_ID).await.unwrap();

        let labels = info.config.labels.unwrap();
        assert_eq!(labels["che:server:4411/tcp:ref"], "terminal");
        assert_eq!(labels["che:server:22/tcp:ref"], "ssh");
        assert!(!labels.contains_key("io.kubernetes.pod.name"));

        let ports = &info.network_settings.ports;
        assert_eq!(ports.len(), 3);
        let wsagent = ports["4401/tcp"].as_ref().unwrap();
        assert_eq!(wsagent[0].host_ip.as_deref(), Some("192.168.99.100"));
    }

    #[tokio::test]
    async fn test_inspect_resolves_servers() {
        let platform = rolling_platform();
        let lifecycle = lifecycle(platform.clone(), settings(10));
        lifecycle.create(&spec()).await.unwrap();

        let service = platform.list_services(NAMESPACE).await.unwrap().remove(0);
        let node_port = |target: u16| {
            service
                .ports
                .iter()
                .find(|port| port.target_port == target)
                .and_then(|port| port.node_port)
                .unwrap()
        };

        let runtime = lifecycle.inspect(CONTAINER_ID, &[]).await.unwrap();

        let wsagent = &runtime.servers["4401/tcp"];
        assert_eq!(wsagent.ref_name, "wsagent");
        assert_eq!(wsagent.address, format!("192.168.99.100:{}", node_port(4401)));
        assert_eq!(
            wsagent.url.as_deref(),
            Some(format!("http://192.168.99.100:{}/api", node_port(4401)).as_str())
        );
        assert_eq!(runtime.servers["4411/tcp"].ref_name, "terminal");
        assert_eq!(runtime.servers["22/tcp"].ref_name, "ssh");
        assert_eq!(runtime.env["CHE_WORKSPACE_ID"], "workspacek6n2");
        assert_eq!(runtime.properties["id"], CONTAINER_ID);
    }

    #[tokio::test]
    async fn test_inspect_unknown_container_is_not_found() {
        let platform = rolling_platform();
        let lifecycle = lifecycle(platform, settings(10));

        let err = lifecycle.inspect("feedface", &[]).await.unwrap_err();
        assert!(err.is_not_found());
    }
}

#[cfg(test)]
mod storage_tests {
    use crate::error::Error;
    use crate::lifecycle::storage::{job_pod, FilesCommand, WorkspaceFiles};
    use crate::poll::PollConfig;
    use crate::testing::{InMemoryPlatform, JobScript};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const NAMESPACE: &str = "eclipse-che";
    const CLAIM: &str = "claim-che-workspace";

    fn files(platform: Arc<InMemoryPlatform>, max_attempts: u32) -> WorkspaceFiles {
        WorkspaceFiles::new(
            platform,
            NAMESPACE,
            CLAIM,
            PollConfig::new(Duration::from_millis(1), max_attempts),
        )
    }

    #[test]
    fn test_job_pod_commands() {
        let remove = job_pod(FilesCommand::Remove, "java-mysql", NAMESPACE, CLAIM).unwrap();
        assert_eq!(remove.name, "delete-java-mysql");
        assert_eq!(remove.image, "busybox");
        assert_eq!(remove.command, vec!["rm", "-rf", "/projects/java-mysql"]);
        assert_eq!(remove.claim_name, CLAIM);
        assert_eq!(remove.mount_path, "/projects");

        let make = job_pod(FilesCommand::Make, "Java_MySQL", NAMESPACE, CLAIM).unwrap();
        assert_eq!(make.name, "make-java-mysql");
        assert_eq!(make.command, vec!["mkdir", "-p", "/projects/Java_MySQL"]);
    }

    #[test]
    fn test_job_pod_rejects_paths() {
        for name in ["", ".", "..", "../etc", "a/b"] {
            let err = job_pod(FilesCommand::Remove, name, NAMESPACE, CLAIM).unwrap_err();
            assert!(matches!(err, Error::InvalidSpec(_)), "accepted {:?}", name);
        }
    }

    #[tokio::test]
    async fn test_clear_waits_for_success_and_deletes_job() {
        let platform = Arc::new(InMemoryPlatform::new().with_job_script(JobScript::succeeds_after(2)));

        files(platform.clone(), 10)
            .clear("java-mysql", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            platform.calls(),
            vec![
                "create_job_pod:delete-java-mysql".to_string(),
                "delete_pod:delete-java-mysql".to_string(),
            ]
        );
        assert!(platform.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_is_deleted_and_reported() {
        let platform = Arc::new(InMemoryPlatform::new().with_job_script(JobScript::fails_after(1)));

        let err = files(platform.clone(), 10)
            .make("java-mysql", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::JobFailed { ref pod } if pod == "make-java-mysql"));
        assert_eq!(err.kind(), "job_failed");
        assert!(platform.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_job_past_ceiling_times_out() {
        let platform = Arc::new(InMemoryPlatform::new());

        let err = files(platform.clone(), 3)
            .clear("java-mysql", &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::JobTimeout { pod, attempts, .. } => {
                assert_eq!(pod, "delete-java-mysql");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(platform.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_wait_leaves_job_in_place() {
        let platform = Arc::new(InMemoryPlatform::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = files(platform.clone(), 10)
            .clear("java-mysql", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled(_)));
        assert_eq!(platform.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_name_starts_no_job() {
        let platform = Arc::new(InMemoryPlatform::new());

        let err = files(platform.clone(), 10)
            .clear("..", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidSpec(_)));
        assert!(platform.calls().is_empty());
    }
}
