//! Unified error handling for the session engine.
//!
//! Every failure inside an operation surfaces as a single [`OperationError`],
//! which becomes the Kill reason shown to the ejected client and the label
//! recorded in metrics.

pub use crate::namedb::NameDbError;
pub use crate::store::StoreError;
use thiserror::Error;

// ============================================================================
// Router Errors
// ============================================================================

/// Failure to hand a command to the server fabric.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("fabric router is closed")]
    Closed,
}

// ============================================================================
// Operation Errors
// ============================================================================

/// Why an operation was killed.
///
/// The `Display` text is the human-readable reason sent with the eject.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// Malformed input: bad slot index, bad DNA, bad name pattern.
    #[error("{0}")]
    Validation(String),

    /// Record type mismatch, membership failure, or wrong-state precondition.
    #[error("{0}")]
    Integrity(String),

    /// Expected-previous-value guard failed on update.
    #[error("{0}")]
    StoreConflict(String),

    /// The record store or name database reported an error.
    #[error("{0}")]
    StoreFailure(String),

    /// The fabric router refused a command.
    #[error("{0}")]
    RouterFailure(String),

    /// The client went away while the operation was in flight.
    #[error("Connection lost.")]
    Disconnected,

    /// No reply arrived within the configured deadline.
    #[error("Timed out waiting for {0}.")]
    TimedOut(&'static str),
}

impl OperationError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Integrity(_) => "integrity",
            Self::StoreConflict(_) => "store_conflict",
            Self::StoreFailure(_) => "store_failure",
            Self::RouterFailure(_) => "router_failure",
            Self::Disconnected => "disconnected",
            Self::TimedOut(_) => "timed_out",
        }
    }

    /// Classify a record-store error, attaching the operation's reason text.
    pub fn from_store(err: &StoreError, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match err {
            StoreError::GuardMismatch(_) => Self::StoreConflict(reason),
            StoreError::NotFound(_) | StoreError::TypeMismatch { .. } => Self::Integrity(reason),
            StoreError::InvalidField(_) | StoreError::Backend(_) => Self::StoreFailure(reason),
        }
    }
}

impl From<RouterError> for OperationError {
    fn from(err: RouterError) -> Self {
        Self::RouterFailure(err.to_string())
    }
}
