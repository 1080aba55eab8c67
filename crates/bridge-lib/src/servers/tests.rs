//! Tests for server resolution
//!
//! The fixture mirrors a workspace container on the default bridge network:
//! gateway 172.17.0.1, container address 172.17.0.200, with 4301/tcp bound
//! to node port 32100 and 4305/udp bound to 32103.

#[cfg(test)]
mod strategy_tests {
    use crate::labels::{server_label_key, ServerLabelField};
    use crate::models::{PortBinding, ServerConf};
    use crate::servers::*;
    use std::collections::BTreeMap;

    const GATEWAY: &str = "172.17.0.1";
    const CONTAINER_IP: &str = "172.17.0.200";
    const INTERNAL_OVERRIDE: &str = "internal.example.com";
    const EXTERNAL_OVERRIDE: &str = "external.example.com";

    fn network() -> ObservedNetwork {
        let mut ports = BTreeMap::new();
        ports.insert(
            "4301/tcp".to_string(),
            vec![PortBinding::new("0.0.0.0", "32100")],
        );
        ports.insert(
            "4305/udp".to_string(),
            vec![PortBinding::new("0.0.0.0", "32103")],
        );

        ObservedNetwork {
            gateway: Some(GATEWAY.to_string()),
            container_address: Some(CONTAINER_IP.to_string()),
            ports,
            labels: BTreeMap::new(),
            fallback_host: None,
        }
    }

    fn confs() -> ServerConfMap {
        normalize_server_confs(vec![
            ServerConf::new(Some("sysServer1-tcp"), "4301/tcp", Some("http"), Some("/some/path")),
            ServerConf::new(Some("sysServer2-udp"), "4305/udp", None, Some("some/path")),
        ])
    }

    fn overrides(
        internal: Option<&str>,
        external: Option<&str>,
        use_internal_address: bool,
    ) -> AddressOverrides {
        AddressOverrides {
            internal_address: internal.map(str::to_string),
            external_address: external.map(str::to_string),
            use_internal_address,
        }
    }

    #[test]
    fn test_default_strategy_uses_gateway_without_overrides() {
        let strategy = DefaultStrategy::new(AddressOverrides::default());
        let servers = strategy.resolve(&network(), &confs());

        let tcp = &servers["4301/tcp"];
        assert_eq!(tcp.ref_name, "sysServer1-tcp");
        assert_eq!(tcp.address, "172.17.0.1:32100");
        assert_eq!(tcp.url.as_deref(), Some("http://172.17.0.1:32100/some/path"));
        assert_eq!(tcp.properties.internal_address, "172.17.0.1:32100");
        assert_eq!(
            tcp.properties.internal_url.as_deref(),
            Some("http://172.17.0.1:32100/some/path")
        );
        assert_eq!(tcp.properties.path.as_deref(), Some("/some/path"));
    }

    #[test]
    fn test_server_without_protocol_has_no_urls() {
        let strategy = DefaultStrategy::new(AddressOverrides::default());
        let servers = strategy.resolve(&network(), &confs());

        let udp = &servers["4305/udp"];
        assert_eq!(udp.ref_name, "sysServer2-udp");
        assert_eq!(udp.address, "172.17.0.1:32103");
        assert!(udp.url.is_none());
        assert!(udp.properties.internal_url.is_none());
        assert_eq!(udp.properties.path.as_deref(), Some("some/path"));
    }

    #[test]
    fn test_internal_override_does_not_leak_to_external() {
        let strategy = DefaultStrategy::new(overrides(Some(INTERNAL_OVERRIDE), None, false));
        let servers = strategy.resolve(&network(), &confs());

        let tcp = &servers["4301/tcp"];
        assert_eq!(tcp.properties.internal_address, "internal.example.com:32100");
        assert_eq!(
            tcp.properties.internal_url.as_deref(),
            Some("http://internal.example.com:32100/some/path")
        );
        assert_eq!(tcp.address, "172.17.0.1:32100");
    }

    #[test]
    fn test_external_override_leaves_internal_on_gateway() {
        let strategy = DefaultStrategy::new(overrides(None, Some(EXTERNAL_OVERRIDE), false));
        let servers = strategy.resolve(&network(), &confs());

        let tcp = &servers["4301/tcp"];
        assert_eq!(tcp.address, "external.example.com:32100");
        assert_eq!(
            tcp.url.as_deref(),
            Some("http://external.example.com:32100/some/path")
        );
        assert_eq!(tcp.properties.internal_address, "172.17.0.1:32100");
    }

    #[test]
    fn test_both_overrides_apply_independently() {
        let strategy = DefaultStrategy::new(overrides(
            Some(INTERNAL_OVERRIDE),
            Some(EXTERNAL_OVERRIDE),
            false,
        ));
        let servers = strategy.resolve(&network(), &confs());

        let tcp = &servers["4301/tcp"];
        assert_eq!(tcp.properties.internal_address, "internal.example.com:32100");
        assert_eq!(tcp.address, "external.example.com:32100");
    }

    #[test]
    fn test_default_strategy_direct_addressing_when_requested() {
        let strategy = DefaultStrategy::new(overrides(None, None, true));
        let servers = strategy.resolve(&network(), &confs());

        let tcp = &servers["4301/tcp"];
        assert_eq!(tcp.properties.internal_address, "172.17.0.200:4301");
        assert_eq!(tcp.address, "172.17.0.1:32100");
    }

    #[test]
    fn test_local_engine_uses_container_address_and_exposed_port() {
        let strategy = LocalEngineStrategy::new(AddressOverrides::default());
        let servers = strategy.resolve(&network(), &confs());

        let tcp = &servers["4301/tcp"];
        assert_eq!(tcp.properties.internal_address, "172.17.0.200:4301");
        assert_eq!(
            tcp.properties.internal_url.as_deref(),
            Some("http://172.17.0.200:4301/some/path")
        );
        assert_eq!(tcp.address, "172.17.0.1:32100");

        let udp = &servers["4305/udp"];
        assert_eq!(udp.properties.internal_address, "172.17.0.200:4305");
        assert_eq!(udp.address, "172.17.0.1:32103");
    }

    #[test]
    fn test_local_engine_honors_external_override() {
        let strategy = LocalEngineStrategy::new(overrides(None, Some(EXTERNAL_OVERRIDE), false));
        let servers = strategy.resolve(&network(), &confs());

        let tcp = &servers["4301/tcp"];
        assert_eq!(tcp.properties.internal_address, "172.17.0.200:4301");
        assert_eq!(tcp.address, "external.example.com:32100");
    }

    #[test]
    fn test_local_engine_falls_back_to_caller_host() {
        let mut network = network();
        network.gateway = None;
        network.container_address = None;
        network.fallback_host = Some("localhost".to_string());

        let strategy = LocalEngineStrategy::new(AddressOverrides::default());
        let servers = strategy.resolve(&network, &confs());

        let tcp = &servers["4301/tcp"];
        assert_eq!(tcp.properties.internal_address, "localhost:32100");
        assert_eq!(tcp.address, "localhost:32100");
    }

    #[test]
    fn test_empty_gateway_is_treated_as_missing() {
        let mut network = network();
        network.gateway = Some(String::new());
        network.fallback_host = Some("platform.example.com".to_string());

        let strategy = DefaultStrategy::default();
        let servers = strategy.resolve(&network, &confs());

        assert_eq!(servers["4301/tcp"].address, "platform.example.com:32100");
    }

    #[test]
    fn test_without_any_host_information_localhost_is_used() {
        let mut network = network();
        network.gateway = None;

        let servers = DefaultStrategy::default().resolve(&network, &confs());
        assert_eq!(servers["4301/tcp"].address, format!("{}:32100", DEFAULT_HOSTNAME));
    }

    #[test]
    fn test_host_port_external_falls_back_to_internal_override() {
        let strategy = HostPortStrategy::new(overrides(Some(INTERNAL_OVERRIDE), None, false));
        let servers = strategy.resolve(&network(), &confs());

        let tcp = &servers["4301/tcp"];
        assert_eq!(tcp.properties.internal_address, "internal.example.com:32100");
        assert_eq!(tcp.address, "internal.example.com:32100");
    }

    #[test]
    fn test_host_port_prefers_external_override() {
        let strategy = HostPortStrategy::new(overrides(
            Some(INTERNAL_OVERRIDE),
            Some(EXTERNAL_OVERRIDE),
            false,
        ));
        let servers = strategy.resolve(&network(), &confs());
        assert_eq!(servers["4301/tcp"].address, "external.example.com:32100");
    }

    #[test]
    fn test_unbound_ports_are_skipped() {
        let mut network = network();
        network.ports.insert("9000/tcp".to_string(), Vec::new());

        let servers = DefaultStrategy::default().resolve(&network, &confs());
        assert_eq!(servers.len(), 2);
        assert!(!servers.contains_key("9000/tcp"));
    }

    #[test]
    fn test_labels_supply_conf_when_no_override() {
        let mut network = network();
        network.labels.insert(
            server_label_key("4301/tcp", ServerLabelField::Ref),
            "wsagent".to_string(),
        );
        network.labels.insert(
            server_label_key("4301/tcp", ServerLabelField::Protocol),
            "http".to_string(),
        );
        network.labels.insert(
            server_label_key("4301/tcp", ServerLabelField::Path),
            "api".to_string(),
        );

        let servers = DefaultStrategy::default().resolve(&network, &ServerConfMap::new());

        let tcp = &servers["4301/tcp"];
        assert_eq!(tcp.ref_name, "wsagent");
        assert_eq!(tcp.url.as_deref(), Some("http://172.17.0.1:32100/api"));

        let udp = &servers["4305/udp"];
        assert_eq!(udp.ref_name, "Server-4305-udp");
        assert!(udp.url.is_none());
    }

    #[test]
    fn test_plan_through_enum_matches_variant() {
        let overrides = overrides(Some(INTERNAL_OVERRIDE), None, false);
        let network = network();

        let direct = HostPortStrategy::new(overrides.clone()).plan(&network);
        let wrapped = AddressStrategy::HostPort(HostPortStrategy::new(overrides)).plan(&network);
        assert_eq!(direct, wrapped);
    }
}

#[cfg(test)]
mod conf_tests {
    use crate::labels::{server_label_key, ServerLabelField};
    use crate::models::ServerConf;
    use crate::servers::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_override_is_returned_verbatim() {
        let mut overrides = ServerConfMap::new();
        overrides.insert(
            "8080/tcp".to_string(),
            ServerConf::new(None, "8080/tcp", Some("https"), None),
        );
        let mut labels = BTreeMap::new();
        labels.insert(
            server_label_key("8080/tcp", ServerLabelField::Ref),
            "tomcat".to_string(),
        );

        let conf = resolve_server_conf("8080/tcp", &overrides, &labels);
        assert_eq!(conf, ServerConf::new(None, "8080/tcp", Some("https"), None));
    }

    #[test]
    fn test_token_label_wins_over_bare_port_label() {
        let mut labels = BTreeMap::new();
        labels.insert(
            server_label_key("8080/tcp", ServerLabelField::Ref),
            "from-token".to_string(),
        );
        labels.insert(
            server_label_key("8080", ServerLabelField::Ref),
            "from-port".to_string(),
        );
        labels.insert(
            server_label_key("8080", ServerLabelField::Protocol),
            "http".to_string(),
        );

        let conf = resolve_server_conf("8080/tcp", &ServerConfMap::new(), &labels);
        assert_eq!(conf.ref_name.as_deref(), Some("from-token"));
        assert_eq!(conf.protocol.as_deref(), Some("http"));
        assert!(conf.path.is_none());
    }

    #[test]
    fn test_missing_ref_is_synthesized() {
        let conf = resolve_server_conf("8080/tcp", &ServerConfMap::new(), &BTreeMap::new());
        assert_eq!(conf.ref_name.as_deref(), Some("Server-8080-tcp"));
        assert_eq!(conf.port, "8080/tcp");
    }

    #[test]
    fn test_normalize_appends_tcp() {
        let confs = normalize_server_confs(vec![
            ServerConf::new(Some("wsagent"), "4401", Some("http"), None),
            ServerConf::new(Some("dns"), "53/udp", None, None),
        ]);

        assert!(confs.contains_key("4401/tcp"));
        assert_eq!(confs["4401/tcp"].port, "4401/tcp");
        assert!(confs.contains_key("53/udp"));
    }
}

#[cfg(test)]
mod selector_tests {
    use crate::servers::*;

    #[test]
    fn test_registered_names() {
        let selector = StrategySelector::default();
        let names: Vec<&str> = selector.names().collect();
        assert_eq!(names, vec![DEFAULT_STRATEGY, LOCAL_ENGINE_STRATEGY, HOST_PORT_STRATEGY]);
    }

    #[test]
    fn test_get_known_strategy() {
        let selector = StrategySelector::default();
        assert_eq!(selector.get(LOCAL_ENGINE_STRATEGY).variant_name(), "local-engine");
        assert_eq!(selector.get(HOST_PORT_STRATEGY).variant_name(), "host-port");
    }

    #[test]
    fn test_unknown_name_falls_back_to_default() {
        let selector = StrategySelector::default();
        assert_eq!(selector.get("no-such-strategy").variant_name(), "default");
        assert_eq!(selector.get("").variant_name(), "default");
    }

    #[test]
    fn test_registering_default_replaces_fallback() {
        let mut selector = StrategySelector::default();
        selector.register(
            DEFAULT_STRATEGY,
            AddressStrategy::HostPort(HostPortStrategy::default()),
        );
        assert_eq!(selector.get("unknown").variant_name(), "host-port");
    }
}
