//! Locating the runtime container behind a workspace deployment

use crate::error::{Error, Result};
use crate::platform::{selector_string, OrchestrationPlatform, PlatformPod, PlatformResult};
use std::collections::BTreeMap;
use tracing::debug;

/// Label the bridge stamps on a discovered pod (short container id)
pub const CONTAINER_ID_LABEL: &str = "cheContainerIdentifier";

/// Present on deployer pods while a rollout is in progress
pub const DEPLOYER_LABEL: &str = "openshift.io/deployer-pod-for.name";

/// Label selecting the pods of a deployment config
pub const DEPLOYMENT_CONFIG_LABEL: &str = "deploymentConfig";

/// Label naming the replication controller a pod belongs to
pub const REPLICATION_CONTROLLER_LABEL: &str = "deployment";

/// Length of the id prefix used as the pod label value
pub const SHORT_ID_LEN: usize = 12;

/// Container found for a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredContainer {
    pub pod: String,
    pub container_id: String,
}

/// First [`SHORT_ID_LEN`] characters of a container id
pub fn short_id(container_id: &str) -> &str {
    match container_id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &container_id[..end],
        None => container_id,
    }
}

/// "docker://abc" -> "abc"; ids without a scheme pass through
pub fn strip_runtime_scheme(raw: &str) -> &str {
    raw.split_once("://").map(|(_, id)| id).unwrap_or(raw)
}

/// One discovery attempt.
///
/// `Ok(None)` while a deployer pod is still around, the deployment has no
/// pod yet, or the pod's container has not reported an id.
pub async fn probe(
    platform: &dyn OrchestrationPlatform,
    namespace: &str,
    deployment: &str,
) -> PlatformResult<Option<DiscoveredContainer>> {
    let pods = platform.list_pods(namespace, &BTreeMap::new()).await?;

    if pods.iter().any(|pod| pod.labels.contains_key(DEPLOYER_LABEL)) {
        debug!(deployment = %deployment, "Deployer pod still running");
        return Ok(None);
    }

    let Some(pod) = pods.iter().find(|pod| {
        pod.labels.get(DEPLOYMENT_CONFIG_LABEL).map(String::as_str) == Some(deployment)
    }) else {
        return Ok(None);
    };

    let Some(container_id) = pod
        .container_ids
        .first()
        .map(|raw| strip_runtime_scheme(raw))
        .filter(|id| !id.is_empty())
    else {
        debug!(pod = %pod.name, "Container id not reported yet");
        return Ok(None);
    };

    platform
        .label_pod(namespace, &pod.name, CONTAINER_ID_LABEL, short_id(container_id))
        .await?;

    Ok(Some(DiscoveredContainer {
        pod: pod.name.clone(),
        container_id: container_id.to_string(),
    }))
}

/// The single pod labelled with the short form of `container_id`
pub async fn pod_by_container_id(
    platform: &dyn OrchestrationPlatform,
    namespace: &str,
    container_id: &str,
) -> Result<PlatformPod> {
    let selector: BTreeMap<String, String> = [(
        CONTAINER_ID_LABEL.to_string(),
        short_id(container_id).to_string(),
    )]
    .into_iter()
    .collect();

    let mut pods = platform.list_pods(namespace, &selector).await?;
    if pods.len() != 1 {
        return Err(Error::AmbiguousDiscovery {
            selector: selector_string(&selector),
            matches: pods.len(),
        });
    }
    Ok(pods.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("8d5e2f0c41a7b3e9"), "8d5e2f0c41a7");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_strip_runtime_scheme() {
        assert_eq!(strip_runtime_scheme("docker://8d5e2f0c"), "8d5e2f0c");
        assert_eq!(strip_runtime_scheme("cri-o://ff00"), "ff00");
        assert_eq!(strip_runtime_scheme("8d5e2f0c"), "8d5e2f0c");
    }
}
