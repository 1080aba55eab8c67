//! Container commands: create, inspect, servers, rm

use anyhow::{Context, Result};
use bridge_lib::{ContainerSpec, RuntimeInfo, ServerConf};
use colored::Colorize;
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_state, format_timestamp, or_dash, print_info, print_json, print_success, print_warning,
    short_id, OutputFormat,
};

/// Row for servers table
#[derive(Tabled)]
struct ServerRow {
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "Ref")]
    ref_name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Internal")]
    internal: String,
}

/// Row for port bindings table
#[derive(Tabled)]
struct PortRow {
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "Host")]
    host: String,
}

/// Arguments of `bridgectl create`
#[derive(Debug, Default)]
pub struct CreateArgs {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub labels: Vec<String>,
}

/// `KEY=VALUE` labels; a bare `KEY` carries no value
pub fn parse_labels(labels: &[String]) -> BTreeMap<String, Option<String>> {
    labels
        .iter()
        .map(|label| match label.split_once('=') {
            Some((key, value)) => (key.to_string(), Some(value.to_string())),
            None => (label.clone(), None),
        })
        .collect()
}

/// `REF=PORT[,PROTOCOL[,PATH]]`
pub fn parse_server(spec: &str) -> Result<ServerConf> {
    let (ref_name, rest) = spec
        .split_once('=')
        .with_context(|| format!("server '{}' is not REF=PORT[,PROTOCOL[,PATH]]", spec))?;
    let mut parts = rest.splitn(3, ',');
    let port = parts.next().filter(|p| !p.is_empty()).with_context(|| {
        format!("server '{}' has no port", spec)
    })?;
    let protocol = parts.next().filter(|p| !p.is_empty());
    let path = parts.next().filter(|p| !p.is_empty());

    Ok(ServerConf::new(
        Some(ref_name).filter(|r| !r.is_empty()),
        port,
        protocol,
        path,
    ))
}

impl CreateArgs {
    pub fn into_spec(self) -> ContainerSpec {
        ContainerSpec {
            name: self.name,
            image: self.image,
            env: self.env,
            exposed_ports: self
                .ports
                .into_iter()
                .map(|port| {
                    if port.contains('/') {
                        port
                    } else {
                        format!("{}/tcp", port)
                    }
                })
                .collect(),
            binds: self.volumes,
            labels: parse_labels(&self.labels),
        }
    }
}

/// Create a workspace container
pub async fn create(client: &ApiClient, args: CreateArgs, format: OutputFormat) -> Result<()> {
    let spec = args.into_spec();
    if format == OutputFormat::Table {
        print_info(&format!(
            "Creating {} from {} (waiting for the pod to start)",
            spec.name.cyan(),
            spec.image
        ));
    }

    let created = client.create(&spec).await?;

    match format {
        OutputFormat::Json => print_json(&created)?,
        OutputFormat::Table => {
            print_success(&format!("Container {} created", short_id(&created.id).bold()));
            println!("{}", created.id);
            for warning in &created.warnings {
                print_warning(warning);
            }
        }
    }
    Ok(())
}

/// Show the engine view of a container
pub async fn inspect(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let info = client.inspect(id).await?;

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            println!("{}", "Container".bold());
            println!("{}", "=".repeat(60));
            println!("ID:       {}", info.id.cyan());
            println!("Name:     {}", or_dash(info.name.as_deref()));
            println!("Image:    {}", or_dash(info.image.as_deref()));
            if let Some(created) = &info.created {
                println!("Created:  {}", format_timestamp(created));
            }
            println!(
                "State:    {}",
                color_state(info.state.status.as_deref().unwrap_or("unknown"))
            );
            println!(
                "Address:  {}",
                or_dash(info.network_settings.ip_address.as_deref())
            );
            println!();

            let rows: Vec<PortRow> = info
                .network_settings
                .ports
                .iter()
                .map(|(port, bindings)| PortRow {
                    port: port.clone(),
                    host: bindings
                        .iter()
                        .flatten()
                        .map(|b| format!("{}:{}", b.host_ip.as_deref().unwrap_or(""), b.host_port))
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();

            if rows.is_empty() {
                print_warning("No exposed ports");
            } else {
                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
            }

            if let Some(labels) = info.config.labels.as_ref().filter(|l| !l.is_empty()) {
                println!("\n{}", "Server labels".bold());
                for (key, value) in labels {
                    println!("  {} = {}", key, value);
                }
            }
        }
    }
    Ok(())
}

fn server_rows(runtime: &RuntimeInfo) -> Vec<ServerRow> {
    runtime
        .servers
        .iter()
        .map(|(port, server)| ServerRow {
            port: port.clone(),
            ref_name: server.ref_name.clone(),
            address: server.address.clone(),
            url: or_dash(server.url.as_deref()),
            internal: server
                .properties
                .internal_url
                .clone()
                .unwrap_or_else(|| server.properties.internal_address.clone()),
        })
        .collect()
}

/// Show the resolved servers of a container
pub async fn servers(
    client: &ApiClient,
    id: &str,
    servers: &[String],
    format: OutputFormat,
) -> Result<()> {
    let overrides = servers
        .iter()
        .map(|spec| parse_server(spec))
        .collect::<Result<Vec<_>>>()?;
    let runtime = client.runtime(id, &overrides).await?;

    match format {
        OutputFormat::Json => print_json(&runtime)?,
        OutputFormat::Table => {
            let rows = server_rows(&runtime);
            if rows.is_empty() {
                print_warning("No servers: the container has no bound ports");
                return Ok(());
            }
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} servers", runtime.servers.len());
        }
    }
    Ok(())
}

/// Remove a workspace container and its cluster resources
pub async fn remove(
    client: &ApiClient,
    id: &str,
    force: bool,
    remove_volumes: bool,
    format: OutputFormat,
) -> Result<()> {
    client.remove(id, force, remove_volumes).await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "id": id, "removed": true }))?,
        OutputFormat::Table => print_success(&format!("Container {} removed", short_id(id))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_labels() {
        let labels = parse_labels(&strings(&["che:server:4401/tcp:ref=wsagent", "flag"]));
        assert_eq!(
            labels["che:server:4401/tcp:ref"].as_deref(),
            Some("wsagent")
        );
        assert_eq!(labels["flag"], None);
    }

    #[test]
    fn test_parse_server() {
        let conf = parse_server("wsagent=4401/tcp,http,/api").unwrap();
        assert_eq!(conf.ref_name.as_deref(), Some("wsagent"));
        assert_eq!(conf.port, "4401/tcp");
        assert_eq!(conf.protocol.as_deref(), Some("http"));
        assert_eq!(conf.path.as_deref(), Some("/api"));

        let bare = parse_server("ssh=22").unwrap();
        assert_eq!(bare.port, "22");
        assert!(bare.protocol.is_none());

        assert!(parse_server("4401/tcp").is_err());
        assert!(parse_server("wsagent=").is_err());
    }

    #[test]
    fn test_ports_default_to_tcp() {
        let spec = CreateArgs {
            name: "workspacez9_machine1".to_string(),
            image: "eclipse/ubuntu_jdk8".to_string(),
            ports: strings(&["4401", "53/udp"]),
            ..Default::default()
        }
        .into_spec();

        assert!(spec.exposed_ports.contains("4401/tcp"));
        assert!(spec.exposed_ports.contains("53/udp"));
    }
}
