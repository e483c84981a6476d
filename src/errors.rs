//! Typed error taxonomy for the ticket workflow engine.
//!
//! Every operation of the engine returns [`WorkflowError`]. The first four
//! variants are caller-facing and are never retried by the engine:
//! - `Validation`: missing or empty input, bad enum value, empty remark
//! - `Forbidden`: the access gate or visibility resolver denied the actor
//! - `NotFound`: the ticket does not exist (or was deleted concurrently)
//! - `Conflict`: lost an optimistic-concurrency race, or a double forward
//!
//! The remaining variants are infrastructure failures.

use thiserror::Error;
use triage_common::TicketId;

use crate::workflow::access::Rule;

pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Forbidden by rule {rule}")]
    Forbidden { rule: Rule },

    #[error("Ticket {id} not found")]
    NotFound { id: TicketId },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(id: &TicketId) -> Self {
        Self::NotFound { id: id.clone() }
    }

    /// Whether the caller can fix this by changing its input or identity,
    /// as opposed to an infrastructure fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Forbidden { .. } | Self::NotFound { .. } | Self::Conflict(_)
        )
    }
}

impl From<Rule> for WorkflowError {
    fn from(rule: Rule) -> Self {
        Self::Forbidden { rule }
    }
}
