//! Error types for the entity state table.

use thiserror::Error;

use crate::types::EntityState;

/// Result type alias for state table operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while building or mutating an entity table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid entity id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate entity: {0}")]
    Duplicate(String),

    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: EntityState,
        to: EntityState,
    },
}
