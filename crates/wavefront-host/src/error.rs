//! Host error types.

use thiserror::Error;
use wavefront_engine::{PlanError, QueryError};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("instance not found: {0}")]
    NotFound(String),

    #[error("instance already running: {0}")]
    AlreadyRunning(String),

    #[error("plan rejected: {0}")]
    Plan(#[from] PlanError),

    #[error("query failed: {0}")]
    Query(#[from] QueryError),
}

pub type HostResult<T> = Result<T, HostError>;
