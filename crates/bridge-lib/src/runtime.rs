//! Runtime view of an inspected container
//!
//! Flattens engine inspect output into string properties and an env map,
//! and resolves servers through an address strategy.

use crate::engine::ContainerInfo;
use crate::labels::server_labels;
use crate::lifecycle::naming::env_map;
use crate::models::{PortBinding, RuntimeInfo};
use crate::servers::{ObservedNetwork, ServerAddressStrategy, ServerConfMap};
use std::collections::BTreeMap;

/// Network state the strategies work from
pub fn observed_network(info: &ContainerInfo, fallback_host: Option<&str>) -> ObservedNetwork {
    let network = &info.network_settings;
    let ports: BTreeMap<String, Vec<PortBinding>> = network
        .ports
        .iter()
        .map(|(token, bindings)| (token.clone(), bindings.clone().unwrap_or_default()))
        .collect();
    let labels = info
        .config
        .labels
        .as_ref()
        .map(|labels| server_labels(labels))
        .unwrap_or_default();

    ObservedNetwork {
        gateway: network.gateway.clone(),
        container_address: network.ip_address.clone(),
        ports,
        labels,
        fallback_host: fallback_host.map(str::to_string),
    }
}

/// Properties, environment and servers of a container
pub fn runtime_info(
    info: &ContainerInfo,
    strategy: &dyn ServerAddressStrategy,
    confs: &ServerConfMap,
    fallback_host: Option<&str>,
) -> RuntimeInfo {
    let network = observed_network(info, fallback_host);
    RuntimeInfo {
        properties: properties(info),
        env: info
            .config
            .env
            .as_deref()
            .map(env_map)
            .unwrap_or_default(),
        servers: strategy.resolve(&network, confs),
    }
}

/// Flattened `section.field` properties; absent values are omitted
pub fn properties(info: &ContainerInfo) -> BTreeMap<String, String> {
    let mut props = Properties::default();

    props.put("id", Some(info.id.clone()));
    props.put("created", info.created.clone());
    props.put("image", info.image.clone());
    props.put("name", info.name.clone());

    let config = &info.config;
    props.put("config.hostname", config.hostname.clone());
    props.put("config.image", config.image.clone());
    props.put("config.user", config.user.clone());
    props.put("config.workingDir", config.working_dir.clone());
    props.put("config.env", config.env.as_ref().map(|env| env.join(",")));
    props.put(
        "config.exposedPorts",
        config
            .exposed_ports
            .as_ref()
            .map(|ports| ports.keys().cloned().collect::<Vec<_>>().join(",")),
    );
    props.put(
        "config.labels",
        config.labels.as_ref().map(|labels| {
            labels
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join(",")
        }),
    );

    let state = &info.state;
    props.put("state.status", state.status.clone());
    props.put("state.running", Some(state.running.to_string()));
    props.put("state.pid", Some(state.pid.to_string()));
    props.put("state.exitCode", Some(state.exit_code.to_string()));
    props.put("state.startedAt", state.started_at.clone());
    props.put("state.finishedAt", state.finished_at.clone());

    let network = &info.network_settings;
    props.put("network.gateway", network.gateway.clone());
    props.put("network.ipAddress", network.ip_address.clone());
    props.put("network.macAddress", network.mac_address.clone());
    if !network.ports.is_empty() {
        let ports = network
            .ports
            .iter()
            .map(|(token, bindings)| {
                let bound = bindings
                    .iter()
                    .flatten()
                    .map(|binding| match binding.host_ip.as_deref() {
                        Some(ip) if !ip.is_empty() => format!("{}:{}", ip, binding.host_port),
                        _ => binding.host_port.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join("|");
                format!("{}->{}", token, bound)
            })
            .collect::<Vec<_>>()
            .join(",");
        props.put("network.ports", Some(ports));
    }

    let host = &info.host_config;
    props.put("hostConfig.networkMode", host.network_mode.clone());
    props.put("hostConfig.privileged", Some(host.privileged.to_string()));
    props.put("hostConfig.memory", Some(host.memory.to_string()));
    props.put("hostConfig.binds", host.binds.as_ref().map(|binds| binds.join(",")));

    props.0
}

#[derive(Default)]
struct Properties(BTreeMap<String, String>);

impl Properties {
    fn put(&mut self, key: &str, value: Option<String>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.0.insert(key.to_string(), value);
        }
    }
}
