//! Error types for forage operations.

use forage_codec::CodecError;
use forage_engine::EngineError;
use thiserror::Error;

/// Result type for forage operations.
pub type ForageResult<T> = Result<T, ForageError>;

/// Errors surfaced to forage callers.
///
/// Cloneable because the outcome of a readiness change is observed by every
/// operation waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForageError {
    /// Error reported by the storage engine, passed through unmodified.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Arguments to an operation were invalid.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Description of the problem.
        message: String,
    },

    /// Configuration was rejected.
    #[error("invalid config: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The instance has already been used and can no longer be configured.
    #[error("can't call configure() after the instance has been used")]
    ConfigLocked,

    /// The selected driver is not supported in this environment.
    #[error("no available storage method found")]
    NoAvailableDriver,

    /// An operation ran before the driver was initialised.
    #[error("driver has not been initialised")]
    NotInitialized,

    /// A pending connection change was dropped without settling.
    #[error("pending connection change was abandoned")]
    ReadinessAbandoned,
}

impl ForageError {
    /// Creates an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Creates an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns the engine error, if this wraps one.
    #[must_use]
    pub fn as_engine(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forage_engine::EngineErrorKind;

    #[test]
    fn engine_errors_pass_through() {
        let engine = EngineError::quota_exceeded("full");
        let err: ForageError = engine.clone().into();
        assert_eq!(err.to_string(), engine.to_string());
        assert_eq!(
            err.as_engine().map(EngineError::kind),
            Some(EngineErrorKind::QuotaExceeded)
        );
    }

    #[test]
    fn non_engine_errors_have_no_kind() {
        assert!(ForageError::ConfigLocked.as_engine().is_none());
        assert!(ForageError::invalid_arguments("x").as_engine().is_none());
    }
}
