//! Error types for ProfileSynth.
//!
//! Library crates use [`ProfileSynthError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ProfileSynth operations.
#[derive(Debug, thiserror::Error)]
pub enum ProfileSynthError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The document store could not be opened or enumerated.
    #[error("store connection error: {0}")]
    StoreConnection(String),

    /// A query against a single collection failed.
    #[error("query on collection '{collection}' failed: {message}")]
    StoreQuery { collection: String, message: String },

    /// Any other database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Network/HTTP failure talking to the generation endpoint.
    #[error("transport error: {0}")]
    Transport(String),

    /// A generation response that should be JSON is not.
    #[error("response is not valid JSON: {message}")]
    ResponseParse { message: String, raw: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input file, invalid identifier, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ProfileSynthError>;

impl ProfileSynthError {
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

    /// Create a per-collection query error.
    pub fn store_query(collection: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StoreQuery {
            collection: collection.into(),
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ProfileSynthError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ProfileSynthError::store_query("students_info", "no such table");
        assert_eq!(
            err.to_string(),
            "query on collection 'students_info' failed: no such table"
        );
    }

    #[test]
    fn response_parse_keeps_raw_text_out_of_display() {
        let err = ProfileSynthError::ResponseParse {
            message: "expected value at line 1 column 1".into(),
            raw: "not json at all".into(),
        };
        let shown = err.to_string();
        assert!(shown.contains("line 1 column 1"));
        assert!(!shown.contains("not json at all"));
    }
}
