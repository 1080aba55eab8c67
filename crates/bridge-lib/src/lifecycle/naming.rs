//! Naming conventions for workspace resources

use crate::error::{Error, Result};
use crate::platform::{EnvVar, HostPathVolume, VolumeMount};
use std::collections::BTreeMap;

/// Prefix of every generated resource name
pub const RESOURCE_PREFIX: &str = "che-ws-";

/// Environment variable carrying `workspace<id>`
pub const WORKSPACE_ID_ENV: &str = "CHE_WORKSPACE_ID";

/// Kubernetes names and label values are capped at 63 characters
pub const MAX_NAME_LEN: usize = 63;

/// Leading characters of the requested container name ("workspace") dropped
/// when naming the pod container
const CONTAINER_NAME_SKIP: usize = 9;

/// Truncate to the Kubernetes name limit
pub fn normalize_name(input: &str) -> String {
    input.chars().take(MAX_NAME_LEN).collect()
}

/// `che-ws-<id>`
pub fn resource_name(workspace_id: &str) -> String {
    normalize_name(&format!("{}{}", RESOURCE_PREFIX, workspace_id))
}

/// Extract the workspace id from `CHE_WORKSPACE_ID=workspace<id>`
pub fn workspace_id(env: &[String]) -> Result<String> {
    let value = env
        .iter()
        .filter(|entry| entry.starts_with(WORKSPACE_ID_ENV))
        .find_map(|entry| entry.split_once('=').map(|(_, value)| value))
        .ok_or_else(|| {
            Error::invalid_spec(format!("environment does not define {}", WORKSPACE_ID_ENV))
        })?;

    let id = value.replacen("workspace", "", 1);
    if id.is_empty() {
        return Err(Error::invalid_spec(format!(
            "{} does not carry a workspace id",
            WORKSPACE_ID_ENV
        )));
    }
    Ok(id)
}

/// Pod container name: requested name without its first nine characters,
/// underscores replaced by dashes
pub fn container_name(requested: &str) -> Result<String> {
    if requested.chars().count() <= CONTAINER_NAME_SKIP {
        return Err(Error::invalid_spec(format!(
            "container name '{}' is too short",
            requested
        )));
    }
    let name: String = requested
        .chars()
        .skip(CONTAINER_NAME_SKIP)
        .map(|c| if c == '_' { '-' } else { c })
        .collect();
    Ok(normalize_name(&name))
}

/// `NAME=VALUE` entries split at the first `=`
pub fn env_vars(env: &[String]) -> Vec<EnvVar> {
    env.iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) => EnvVar {
                name: name.to_string(),
                value: Some(value.to_string()),
            },
            None => EnvVar {
                name: entry.clone(),
                value: None,
            },
        })
        .collect()
}

/// Same as [`env_vars`], keyed by name
pub fn env_map(env: &[String]) -> BTreeMap<String, String> {
    env_vars(env)
        .into_iter()
        .map(|var| (var.name, var.value.unwrap_or_default()))
        .collect()
}

fn volume_kind(bind: &str) -> &'static str {
    if bind.contains("ws-agent") {
        "wsagent-lib"
    } else if bind.contains("terminal") {
        "terminal"
    } else if bind.contains("workspaces") {
        "project"
    } else {
        "unknown-volume"
    }
}

/// Host path volumes and their mounts for `hostPath:mountPath[:mode]` binds
pub fn volumes(workspace_id: &str, binds: &[String]) -> Result<(Vec<HostPathVolume>, Vec<VolumeMount>)> {
    let mut volumes = Vec::with_capacity(binds.len());
    let mut mounts = Vec::with_capacity(binds.len());
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();

    for bind in binds {
        let mut parts = bind.splitn(3, ':');
        let host_path = parts.next().filter(|p| !p.is_empty());
        let mount_path = parts.next().filter(|p| !p.is_empty());
        let mode = parts.next();

        let (Some(host_path), Some(mount_path)) = (host_path, mount_path) else {
            return Err(Error::invalid_spec(format!(
                "bind '{}' is not hostPath:mountPath[:mode]",
                bind
            )));
        };

        let base = format!("ws-{}-{}", workspace_id, volume_kind(bind));
        let count = seen.entry(base.clone()).or_insert(0);
        *count += 1;
        let name = if *count == 1 {
            normalize_name(&base)
        } else {
            normalize_name(&format!("{}-{}", base, count))
        };

        volumes.push(HostPathVolume {
            name: name.clone(),
            path: host_path.to_string(),
        });
        mounts.push(VolumeMount {
            name,
            mount_path: mount_path.to_string(),
            read_only: mode.map(|m| m.split(',').any(|opt| opt == "ro")).unwrap_or(false),
        });
    }

    Ok((volumes, mounts))
}
