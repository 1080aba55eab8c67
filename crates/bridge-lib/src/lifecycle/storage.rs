//! Workspace project files on the shared workspaces claim
//!
//! Every workspace keeps its projects in `/projects/<workspace name>` on one
//! persistent volume claim. Creating or clearing that directory runs a
//! short-lived busybox pod with the claim mounted, waits for it to reach
//! `Succeeded` or `Failed`, and deletes it.

use super::naming;
use crate::config::BridgeConfig;
use crate::error::{Error, PlatformError, Result};
use crate::observability::StructuredLogger;
use crate::platform::{OrchestrationPlatform, PlatformJobPod, PlatformResult};
use crate::poll::{poll_until, PollConfig, PollError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub const JOB_IMAGE: &str = "busybox";
pub const PROJECTS_MOUNT_PATH: &str = "/projects";

const PHASE_SUCCEEDED: &str = "Succeeded";
const PHASE_FAILED: &str = "Failed";

/// What a files job does to the workspace directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesCommand {
    /// `mkdir -p`
    Make,
    /// `rm -rf`
    Remove,
}

impl FilesCommand {
    fn argv(&self) -> [&'static str; 2] {
        match self {
            FilesCommand::Make => ["mkdir", "-p"],
            FilesCommand::Remove => ["rm", "-rf"],
        }
    }

    fn job_prefix(&self) -> &'static str {
        match self {
            FilesCommand::Make => "make-",
            FilesCommand::Remove => "delete-",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilesCommand::Make => "make",
            FilesCommand::Remove => "remove",
        }
    }
}

/// Runs files jobs in the workspace project
pub struct WorkspaceFiles {
    platform: Arc<dyn OrchestrationPlatform>,
    namespace: String,
    claim_name: String,
    poll: PollConfig,
    logger: StructuredLogger,
}

impl WorkspaceFiles {
    pub fn new(
        platform: Arc<dyn OrchestrationPlatform>,
        namespace: impl Into<String>,
        claim_name: impl Into<String>,
        poll: PollConfig,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            platform,
            logger: StructuredLogger::new(namespace.clone()),
            namespace,
            claim_name: claim_name.into(),
            poll,
        }
    }

    pub fn from_config(platform: Arc<dyn OrchestrationPlatform>, config: &BridgeConfig) -> Self {
        Self::new(
            platform,
            config.platform.namespace.clone(),
            config.platform.workspaces_pvc_name.clone(),
            config.platform.files_job.clone(),
        )
    }

    /// Create `/projects/<workspace>` if missing
    pub async fn make(&self, workspace: &str, cancel: &CancellationToken) -> Result<()> {
        self.run(FilesCommand::Make, workspace, cancel).await
    }

    /// Delete `/projects/<workspace>` and everything below it
    pub async fn clear(&self, workspace: &str, cancel: &CancellationToken) -> Result<()> {
        self.run(FilesCommand::Remove, workspace, cancel).await
    }

    /// Start the job pod and wait for it to finish.
    ///
    /// The pod is deleted once it succeeds, fails or runs past the polling
    /// ceiling; a cancelled wait leaves it in place.
    pub async fn run(
        &self,
        command: FilesCommand,
        workspace: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pod = job_pod(command, workspace, &self.namespace, &self.claim_name)?;
        self.platform.create_job_pod(&pod).await?;
        self.logger
            .log_files_job_started(workspace, &pod.name, command.as_str());

        let platform = self.platform.as_ref();
        let namespace = self.namespace.as_str();
        let name = pod.name.as_str();
        let outcome = poll_until(&self.poll, "workspace_files_job", cancel, || {
            finished_phase(platform, namespace, name)
        })
        .await;

        let polled = match outcome {
            Ok(polled) => polled,
            Err(PollError::Exhausted { attempts, waited }) => {
                self.delete_job(name).await?;
                return Err(Error::JobTimeout {
                    pod: name.to_string(),
                    attempts,
                    waited,
                });
            }
            Err(PollError::Cancelled { attempts }) => {
                return Err(Error::Cancelled(format!(
                    "files job {} cancelled after {} attempts",
                    name, attempts
                )));
            }
            Err(PollError::Failed(e)) => return Err(Error::Platform(e)),
        };

        self.logger
            .log_files_job_finished(name, &polled.value, polled.attempts);
        self.delete_job(name).await?;

        if polled.value == PHASE_FAILED {
            return Err(Error::JobFailed {
                pod: name.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_job(&self, name: &str) -> Result<()> {
        if !self.platform.delete_pod(&self.namespace, name).await? {
            warn!(pod = %name, "Files job pod already gone");
        }
        Ok(())
    }
}

/// Terminal phase of the job pod, `None` while it is still running
async fn finished_phase(
    platform: &dyn OrchestrationPlatform,
    namespace: &str,
    name: &str,
) -> PlatformResult<Option<String>> {
    match platform.pod_phase(namespace, name).await? {
        Some(phase) if phase == PHASE_SUCCEEDED || phase == PHASE_FAILED => Ok(Some(phase)),
        Some(_) => Ok(None),
        None => Err(PlatformError::api(
            404,
            format!("job pod {} disappeared", name),
        )),
    }
}

/// The busybox pod for `command` on `workspace`
pub fn job_pod(
    command: FilesCommand,
    workspace: &str,
    namespace: &str,
    claim_name: &str,
) -> Result<PlatformJobPod> {
    if workspace.is_empty() || workspace == "." || workspace == ".." || workspace.contains('/') {
        return Err(Error::invalid_spec(format!(
            "'{}' is not a workspace directory name",
            workspace
        )));
    }

    let directory = format!("{}/{}", PROJECTS_MOUNT_PATH, workspace);
    let command_line = command
        .argv()
        .iter()
        .map(|arg| arg.to_string())
        .chain(std::iter::once(directory))
        .collect();

    Ok(PlatformJobPod {
        namespace: namespace.to_string(),
        name: naming::normalize_name(&format!(
            "{}{}",
            command.job_prefix(),
            dns_label(workspace)
        )),
        image: JOB_IMAGE.to_string(),
        command: command_line,
        claim_name: claim_name.to_string(),
        mount_path: PROJECTS_MOUNT_PATH.to_string(),
    })
}

/// Lowercase, with anything outside `[a-z0-9-]` turned into `-`
fn dns_label(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}
