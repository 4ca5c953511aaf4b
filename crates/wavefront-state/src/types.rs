//! Domain types for the entity state table.
//!
//! Lifecycle states, the logical clock that stamps every mutation, and
//! the per-entity record held in the table.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::id::EntityId;

// ── Lifecycle ─────────────────────────────────────────────────────

/// Lifecycle state assigned by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    Pending,
    Deploying,
    Completed,
    Failed,
    Cancelled,
}

impl EntityState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EntityState::Completed | EntityState::Failed | EntityState::Cancelled
        )
    }

    /// Whether `self -> next` is a forward move.
    ///
    /// `pending -> cancelled` is forward too: it covers units that were
    /// never reached before a cancellation.
    pub fn can_transition_to(self, next: EntityState) -> bool {
        use EntityState::*;
        matches!(
            (self, next),
            (Pending, Deploying)
                | (Pending, Cancelled)
                | (Deploying, Completed)
                | (Deploying, Failed)
                | (Deploying, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityState::Pending => "pending",
            EntityState::Deploying => "deploying",
            EntityState::Completed => "completed",
            EntityState::Failed => "failed",
            EntityState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State as seen by an outside observer that also knows the host's
/// execution status. `Terminated` and `TimedOut` come only from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedState {
    Pending,
    Deploying,
    Completed,
    Failed,
    Cancelled,
    Terminated,
    TimedOut,
}

impl From<EntityState> for ObservedState {
    fn from(state: EntityState) -> Self {
        match state {
            EntityState::Pending => ObservedState::Pending,
            EntityState::Deploying => ObservedState::Deploying,
            EntityState::Completed => ObservedState::Completed,
            EntityState::Failed => ObservedState::Failed,
            EntityState::Cancelled => ObservedState::Cancelled,
        }
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObservedState::Pending => "pending",
            ObservedState::Deploying => "deploying",
            ObservedState::Completed => "completed",
            ObservedState::Failed => "failed",
            ObservedState::Cancelled => "cancelled",
            ObservedState::Terminated => "terminated",
            ObservedState::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

// ── Logical clock ─────────────────────────────────────────────────

/// A logical timestamp: the tick at which a mutation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Per-instance monotonic clock. Never reads wall-clock time, so two runs
/// of the same plan stamp identical timestamps.
#[derive(Debug, Default)]
pub struct LogicalClock {
    ticks: AtomicU64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next tick.
    pub fn tick(&self) -> Timestamp {
        Timestamp(self.ticks.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// The last tick issued (zero before the first).
    pub fn now(&self) -> Timestamp {
        Timestamp(self.ticks.load(Ordering::Relaxed))
    }
}

// ── Records ───────────────────────────────────────────────────────

/// Category of a recorded release outcome, as exposed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A simulated entity failure (non-retryable).
    EntityFailure,
    /// Cooperative cancellation. Not an error, but reported the same way.
    Cancelled,
}

/// What happened and why, stored on the release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub entity_id: EntityId,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One node of the release tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub state: EntityState,
    /// Human-readable name, e.g. `Cluster 1-2`.
    pub name: String,
    /// Parent node; `None` only for the release.
    pub parent: Option<EntityId>,
    /// Child IDs in declared order (a cluster has exactly one bundle).
    pub children: Vec<EntityId>,
    /// Wave position, 1-based. Waves only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    /// Version being deployed. Apps only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl EntityRecord {
    /// A fresh `pending` record stamped at `at`.
    pub fn pending(id: EntityId, name: impl Into<String>, parent: Option<EntityId>, at: Timestamp) -> Self {
        Self {
            id,
            state: EntityState::Pending,
            name: name.into(),
            parent,
            children: Vec::new(),
            sequence: None,
            version: None,
            created_at: at,
            updated_at: at,
        }
    }
}
