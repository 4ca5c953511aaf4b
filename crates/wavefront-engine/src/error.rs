//! Engine error types.

use std::time::Duration;

use thiserror::Error;
use wavefront_state::{EntityId, StateError};

use crate::suspend::Interrupted;

/// Rejected plan input. Raised before any state exists.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    #[error("invalid release id: {0}")]
    InvalidReleaseId(StateError),

    #[error("{field} must be between 1 and {max}, got {value}", max = crate::plan::MAX_COUNT)]
    CountOutOfRange { field: &'static str, value: u32 },

    #[error("app deploy duration {0:?} exceeds the 1h limit")]
    DurationTooLong(Duration),

    #[error("app timeout must be greater than zero")]
    ZeroTimeout,

    #[error("invalid failure scenario: {0:?}")]
    InvalidScenario(String),

    #[error("plan parse error: {0}")]
    Parse(String),

    #[error("plan read error: {0}")]
    Io(String),

    #[error("state error: {0}")]
    State(#[from] StateError),
}

pub type PlanResult<T> = Result<T, PlanError>;

/// Why a run stopped without reaching a terminal release state.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The host destroyed the instance; the table keeps its last state.
    #[error("interrupted by host: {0}")]
    Interrupted(#[from] Interrupted),

    #[error("state table error: {0}")]
    State(#[from] StateError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Query gateway errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid query target: {0}")]
    InvalidTarget(StateError),

    #[error("entity not found: {0}")]
    NotFound(EntityId),
}
