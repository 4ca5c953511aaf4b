//! Host execution status and its reconciliation with the internal
//! release state.

use std::fmt;

use serde::{Deserialize, Serialize};
use wavefront_engine::{EngineResult, EngineError, Interrupted, ReleaseOutcome};
use wavefront_state::{EntitySnapshot, EntityState, ObservedState};

/// What the host knows about an instance, independent of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Running,
    /// The run returned normally. A release cancelled by signal lands
    /// here too.
    Completed,
    Failed,
    /// Stopped by a host shutdown.
    Cancelled,
    /// Destroyed by an explicit terminate.
    Terminated,
    /// Destroyed for exceeding the app timeout.
    TimedOut,
}

impl HostStatus {
    pub fn is_terminal(self) -> bool {
        self != HostStatus::Running
    }

    /// Status for a run that ended on its own.
    pub fn from_run(result: &EngineResult<ReleaseOutcome>) -> Self {
        match result {
            Ok(ReleaseOutcome::Completed | ReleaseOutcome::Cancelled) => HostStatus::Completed,
            Ok(ReleaseOutcome::Failed(_)) => HostStatus::Failed,
            Err(EngineError::Interrupted(Interrupted::TimedOut { .. })) => HostStatus::TimedOut,
            Err(EngineError::Interrupted(Interrupted::Terminated(_))) => HostStatus::Terminated,
            Err(EngineError::Interrupted(Interrupted::DuplicateResume(_)))
            | Err(EngineError::State(_)) => HostStatus::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostStatus::Running => "running",
            HostStatus::Completed => "completed",
            HostStatus::Failed => "failed",
            HostStatus::Cancelled => "cancelled",
            HostStatus::Terminated => "terminated",
            HostStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective state of a release as seen from outside.
///
/// A host-side ending (terminated, timed out, cancelled, failed) wins over
/// whatever the tree last showed; otherwise the tree's own state stands.
pub fn reconcile(internal: EntityState, host: HostStatus) -> ObservedState {
    match host {
        HostStatus::Terminated => ObservedState::Terminated,
        HostStatus::TimedOut => ObservedState::TimedOut,
        HostStatus::Cancelled => ObservedState::Cancelled,
        HostStatus::Failed => ObservedState::Failed,
        HostStatus::Running | HostStatus::Completed => internal.into(),
    }
}

/// Release snapshot with both views side by side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseView {
    pub internal: EntitySnapshot,
    pub host_status: HostStatus,
    pub effective: ObservedState,
}

impl ReleaseView {
    pub fn new(internal: EntitySnapshot, host_status: HostStatus) -> Self {
        let effective = reconcile(internal.record.state, host_status);
        Self {
            internal,
            host_status,
            effective,
        }
    }

    /// Whether a monitor should stop polling.
    pub fn is_finished(&self) -> bool {
        self.host_status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavefront_state::{EntityId, FailureKind, FailureReport};

    #[test]
    fn host_endings_win() {
        assert_eq!(
            reconcile(EntityState::Deploying, HostStatus::Terminated),
            ObservedState::Terminated
        );
        assert_eq!(
            reconcile(EntityState::Deploying, HostStatus::TimedOut),
            ObservedState::TimedOut
        );
        assert_eq!(
            reconcile(EntityState::Deploying, HostStatus::Cancelled),
            ObservedState::Cancelled
        );
        assert_eq!(
            reconcile(EntityState::Completed, HostStatus::Failed),
            ObservedState::Failed
        );
    }

    #[test]
    fn internal_state_otherwise() {
        assert_eq!(
            reconcile(EntityState::Deploying, HostStatus::Running),
            ObservedState::Deploying
        );
        assert_eq!(
            reconcile(EntityState::Cancelled, HostStatus::Completed),
            ObservedState::Cancelled
        );
        assert_eq!(
            reconcile(EntityState::Failed, HostStatus::Completed),
            ObservedState::Failed
        );
    }

    #[test]
    fn run_results_map_to_host_status() {
        let app = EntityId::parse("app:a").unwrap();
        let failed = Ok(ReleaseOutcome::Failed(FailureReport {
            entity_id: app.clone(),
            kind: FailureKind::EntityFailure,
            message: "boom".into(),
        }));
        assert_eq!(HostStatus::from_run(&Ok(ReleaseOutcome::Completed)), HostStatus::Completed);
        assert_eq!(HostStatus::from_run(&Ok(ReleaseOutcome::Cancelled)), HostStatus::Completed);
        assert_eq!(HostStatus::from_run(&failed), HostStatus::Failed);
        let timed_out = Err(EngineError::Interrupted(Interrupted::TimedOut {
            entity: app,
            limit: std::time::Duration::from_secs(1),
        }));
        assert_eq!(HostStatus::from_run(&timed_out), HostStatus::TimedOut);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&HostStatus::TimedOut).unwrap(), "\"timed_out\"");
        assert_eq!(HostStatus::TimedOut.to_string(), "timed_out");
    }
}
