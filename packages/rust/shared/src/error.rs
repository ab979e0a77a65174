//! Error types for deepqa.
//!
//! Library crates use [`DeepQaError`] via `thiserror`.
//! The server binary wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all deepqa operations.
#[derive(Debug, thiserror::Error)]
pub enum DeepQaError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A searcher's external backend failed (unreachable, bad status, timeout).
    ///
    /// Recovered inside the pipeline: the searcher contributes no passages.
    #[error("search backend '{searcher}' unavailable: {message}")]
    BackendUnavailable { searcher: String, message: String },

    /// A researcher or scorer raised an unexpected condition.
    ///
    /// Not recovered inside the pipeline; surfaces to the caller of `ask`.
    #[error("stage '{stage}' failed: {message}")]
    StageFailure { stage: String, message: String },

    /// No pipeline instance became free within the acquisition bound.
    #[error("no pipeline instance available after {waited:?}")]
    PoolExhausted { waited: Duration },

    /// Inbound message with an unknown verb or an unusable payload.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Network/HTTP error outside of a searcher call.
    #[error("network error: {0}")]
    Network(String),

    /// Response or input parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DeepQaError>;

impl DeepQaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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

    /// A searcher backend failure.
    pub fn backend(searcher: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            searcher: searcher.into(),
            message: msg.into(),
        }
    }

    /// A researcher or scorer failure, tagged with the stage name.
    pub fn stage(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StageFailure {
            stage: stage.into(),
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DeepQaError::config("pool_size must be > 0");
        assert_eq!(err.to_string(), "config error: pool_size must be > 0");

        let err = DeepQaError::backend("web", "connection refused");
        assert_eq!(
            err.to_string(),
            "search backend 'web' unavailable: connection refused"
        );

        let err = DeepQaError::stage("date-matches", "bad regex");
        assert!(err.to_string().contains("date-matches"));
    }

    #[test]
    fn pool_exhausted_reports_wait() {
        let err = DeepQaError::PoolExhausted {
            waited: Duration::from_secs(60),
        };
        assert!(err.to_string().contains("60s"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DeepQaError>();
    }
}
