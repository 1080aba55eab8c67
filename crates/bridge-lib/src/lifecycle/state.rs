//! Creation state machine

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Progress of one container creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Requested,
    ServiceCreated,
    DeploymentCreated,
    Discovering,
    Ready,
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Requested => "requested",
            LifecycleState::ServiceCreated => "service_created",
            LifecycleState::DeploymentCreated => "deployment_created",
            LifecycleState::Discovering => "discovering",
            LifecycleState::Ready => "ready",
            LifecycleState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Ready | LifecycleState::Failed)
    }

    /// Forward-only; any non-terminal state may fail
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Requested, ServiceCreated)
            | (ServiceCreated, DeploymentCreated)
            | (DeploymentCreated, Discovering)
            | (Discovering, Ready) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and logs the state of one creation
#[derive(Debug)]
pub struct CreationProgress {
    container: String,
    state: LifecycleState,
}

impl CreationProgress {
    /// Start tracking the creation of the named container
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            state: LifecycleState::Requested,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Move to `next`; illegal transitions are logged and ignored
    pub fn advance(&mut self, next: LifecycleState) {
        if !self.state.can_transition_to(next) {
            warn!(
                container = %self.container,
                from = %self.state,
                to = %next,
                "Ignoring illegal lifecycle transition"
            );
            return;
        }
        debug!(
            container = %self.container,
            from = %self.state,
            to = %next,
            "Lifecycle transition"
        );
        self.state = next;
    }

    pub fn fail(&mut self) {
        self.advance(LifecycleState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut progress = CreationProgress::new("abc");
        for next in [
            LifecycleState::ServiceCreated,
            LifecycleState::DeploymentCreated,
            LifecycleState::Discovering,
            LifecycleState::Ready,
        ] {
            progress.advance(next);
            assert_eq!(progress.state(), next);
        }
        assert!(progress.state().is_terminal());
    }

    #[test]
    fn test_skipping_states_is_ignored() {
        let mut progress = CreationProgress::new("abc");
        progress.advance(LifecycleState::Discovering);
        assert_eq!(progress.state(), LifecycleState::Requested);
    }

    #[test]
    fn test_failure_from_any_live_state() {
        let mut progress = CreationProgress::new("abc");
        progress.advance(LifecycleState::ServiceCreated);
        progress.fail();
        assert_eq!(progress.state(), LifecycleState::Failed);

        assert!(!LifecycleState::Ready.can_transition_to(LifecycleState::Failed));
        assert!(!LifecycleState::Failed.can_transition_to(LifecycleState::Failed));
    }
}
