//! Error types for flashdeck operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failure reported by the remote document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreErrorKind {
    NotFound,
    PermissionDenied,
    Unauthenticated,
    Unavailable,
    Aborted,
    InvalidArgument,
    Internal,
}

/// A remote fetch/subscribe failure.
///
/// These are captured verbatim as entity state and surfaced to readers as an
/// `error` tuple. The cache never decides whether an error is terminal; that
/// policy belongs to whoever reads the tuple, using [`StoreError::is_retryable`]
/// or the raw [`StoreErrorKind`].
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::PermissionDenied, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Internal, message)
    }

    /// True when the same request may succeed later, e.g. a permission error
    /// that clears once re-authentication completes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::PermissionDenied
                | StoreErrorKind::Unauthenticated
                | StoreErrorKind::Unavailable
                | StoreErrorKind::Aborted
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Boundary errors for the fbase layer.
///
/// Normal business outcomes (missing data, permission errors) never appear
/// here; they are entity state. Only programming errors at the boundary and
/// the transactional write path produce an `FbaseError`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FbaseError {
    #[error("Entity client not initialized")]
    NotInitialized,

    #[error("Entity client already initialized")]
    AlreadyInitialized,

    #[error("Key is not ready (missing segment): {key}")]
    KeyNotReady { key: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FbaseError {
    fn from(err: serde_json::Error) -> Self {
        FbaseError::Serialization(err.to_string())
    }
}

/// Result type for fbase boundary operations.
pub type FbaseResult<T> = Result<T, FbaseError>;
