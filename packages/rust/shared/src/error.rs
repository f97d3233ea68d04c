//! Error types for aulabot.
//!
//! Library crates use [`AulabotError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all aulabot operations.
#[derive(Debug, thiserror::Error)]
pub enum AulabotError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Connection-level failure talking to the backend (retryable).
    #[error("network error: {0}")]
    Network(String),

    /// The backend did not answer within the configured timeout (retryable).
    #[error("timeout: {0}")]
    Timeout(String),

    /// The backend answered but reported a failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend answer could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A query was rejected before execution.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A transient failure persisted through every retry.
    #[error("{source} (after {attempts} attempts)")]
    Exhausted {
        attempts: u32,
        source: Box<AulabotError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AulabotError>;

impl AulabotError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry may succeed. Only connection failures and timeouts qualify.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = AulabotError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = AulabotError::validation("action 'drop' not allowed");
        assert!(err.to_string().contains("'drop'"));
    }

    #[test]
    fn transient_classification() {
        assert!(AulabotError::Timeout("api".into()).is_transient());
        assert!(AulabotError::Network("refused".into()).is_transient());
        assert!(!AulabotError::Backend("Acción no encontrada".into()).is_transient());
        assert!(!AulabotError::Decode("not json".into()).is_transient());
    }

    #[test]
    fn exhausted_keeps_cause_in_message() {
        let err = AulabotError::Exhausted {
            attempts: 3,
            source: Box::new(AulabotError::Timeout("estudiantes".into())),
        };
        assert_eq!(err.to_string(), "timeout: estudiantes (after 3 attempts)");
        assert!(!err.is_transient());
    }
}
