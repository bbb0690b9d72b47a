//! Error types for engine operations.

use forage_codec::CodecError;
use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Classification of engine failures.
///
/// Callers decide recovery on the kind alone, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineErrorKind {
    /// The connection or transaction is no longer usable (e.g. closed).
    InvalidState,
    /// A named object store or database does not exist.
    NotFound,
    /// A schema change conflicts with existing schema (e.g. duplicate store).
    Constraint,
    /// A write would exceed the storage quota.
    QuotaExceeded,
    /// A version request cannot be honoured (e.g. downgrade).
    Version,
    /// The value cannot be persisted by this engine.
    DataClone,
    /// A write was attempted in a read-only transaction.
    ReadOnly,
    /// An argument was out of range.
    InvalidArgument,
    /// The transaction was aborted.
    Aborted,
    /// Any other failure.
    Unknown,
}

impl EngineErrorKind {
    /// Returns the conventional name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidState => "InvalidStateError",
            Self::NotFound => "NotFoundError",
            Self::Constraint => "ConstraintError",
            Self::QuotaExceeded => "QuotaExceededError",
            Self::Version => "VersionError",
            Self::DataClone => "DataCloneError",
            Self::ReadOnly => "ReadOnlyError",
            Self::InvalidArgument => "TypeError",
            Self::Aborted => "AbortError",
            Self::Unknown => "UnknownError",
        }
    }
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by a storage engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    kind: EngineErrorKind,
    message: String,
}

impl EngineError {
    /// Creates an error of the given kind.
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::InvalidState, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::NotFound, message)
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Constraint, message)
    }

    /// Creates a quota exceeded error.
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::QuotaExceeded, message)
    }

    /// Creates a version error.
    pub fn version(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Version, message)
    }

    /// Creates a data clone error.
    pub fn data_clone(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::DataClone, message)
    }

    /// Creates a read-only error.
    pub fn read_only(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::ReadOnly, message)
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::InvalidArgument, message)
    }

    /// Creates an aborted error.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Aborted, message)
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> EngineErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the error means the connection went stale and a
    /// reconnect may fix it.
    #[must_use]
    pub fn is_invalidation(&self) -> bool {
        matches!(
            self.kind,
            EngineErrorKind::InvalidState | EngineErrorKind::NotFound
        )
    }
}

impl From<CodecError> for EngineError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::EncodingFailed { .. } | CodecError::UnsupportedType { .. } => {
                Self::data_clone(err.to_string())
            }
            _ => Self::new(EngineErrorKind::Unknown, err.to_string()),
        }
    }
}
