//! Core error kinds shared across every pipeline component.
//!
//! Components return typed results; the orchestrator is the only layer
//! that decides what is fatal to a driver tick versus fatal to the process.

use thiserror::Error;

/// The four error kinds surfaced by the core, per the error handling design.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Network timeout, 429/5xx from an external service, or a transient
    /// store error (serialization failure). Retried with backoff inside
    /// the component; never marks a broadcast entry delivered.
    #[error("transient error: {0}")]
    Transient(String),

    /// 4xx from an external service, an unparseable feed, or an invalid
    /// webhook URL. The offending resource (channel or feed source) is
    /// deactivated and an admin event recorded.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Vector or model input dimension disagreement. Fatal to the driver
    /// tick; no automatic remediation.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A bug: duplicate-inserting a delivered broadcast, referencing a
    /// nonexistent model, etc. Surfaced as a logged, aborted transaction.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<crate::store::DatabaseError> for CoreError {
    fn from(err: crate::store::DatabaseError) -> Self {
        match err {
            crate::store::DatabaseError::Other(e) => CoreError::Database(e),
            other => CoreError::Transient(other.to_string()),
        }
    }
}

impl CoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }

    pub fn is_fatal_to_process(&self) -> bool {
        matches!(self, CoreError::SchemaMismatch(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
