//! Failure aggregator — first failure wins.

use std::sync::OnceLock;

use wavefront_state::{EntityId, FailureKind, FailureReport};

/// Holds the first entity failure of a run. Later failures are dropped.
#[derive(Debug, Default)]
pub struct FailureLatch {
    first: OnceLock<FailureReport>,
}

impl FailureLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. Returns `true` if this one was first.
    pub fn record(&self, report: FailureReport) -> bool {
        self.first.set(report).is_ok()
    }

    pub fn get(&self) -> Option<&FailureReport> {
        self.first.get()
    }

    pub fn is_failed(&self) -> bool {
        self.first.get().is_some()
    }
}

/// Report for a simulated app failure.
pub fn app_failure(app: &EntityId) -> FailureReport {
    FailureReport {
        entity_id: app.clone(),
        kind: FailureKind::EntityFailure,
        message: format!("App deployment failed: {app} - Simulated failure scenario"),
    }
}

/// Report stored on a release that ended by cancellation.
pub fn cancelled_by_user(release: &EntityId) -> FailureReport {
    FailureReport {
        entity_id: release.clone(),
        kind: FailureKind::Cancelled,
        message: "Release cancelled by user".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_wins() {
        let latch = FailureLatch::new();
        let a = EntityId::parse("app:a").unwrap();
        let b = EntityId::parse("app:b").unwrap();

        assert!(!latch.is_failed());
        assert!(latch.record(app_failure(&a)));
        assert!(!latch.record(app_failure(&b)));
        assert_eq!(latch.get().unwrap().entity_id, a);
    }

    #[test]
    fn app_failure_message_names_the_app() {
        let app = EntityId::parse("app:cluster-1-1-bundle-app-2").unwrap();
        let report = app_failure(&app);
        assert_eq!(report.kind, FailureKind::EntityFailure);
        assert!(report.message.contains("app:cluster-1-1-bundle-app-2"));
    }
}
