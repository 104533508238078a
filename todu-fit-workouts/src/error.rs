//! Error types for the save engine.

use thiserror::Error;

use crate::models::LogKey;

/// Malformed input: a bad exercise entry or save request.
///
/// Never retried; the caller has to fix the data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation error: {0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// A persistence collaborator failed to read or write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Persistence error during {operation}: {message}")]
pub struct PersistenceError {
    pub operation: String,
    pub message: String,
}

impl PersistenceError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Final, user-visible failure of a save.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Metadata-only save requires an existing workout log for {0}")]
    MissingLog(LogKey),

    #[error("Full-save fallback failed after '{original}': {source}")]
    FallbackFailed {
        original: String,
        #[source]
        source: PersistenceError,
    },
}

impl SaveError {
    /// True for failures caused by the caller's input rather than storage.
    pub fn is_validation(&self) -> bool {
        matches!(self, SaveError::Validation(_) | SaveError::MissingLog(_))
    }
}
