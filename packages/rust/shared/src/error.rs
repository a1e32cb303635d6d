//! Error types for RanoPress.
//!
//! Library crates use [`RanopressError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Fatal conditions (unresolvable reference, missing metadata, unreadable
//! record, unwritable output) propagate as typed errors with stable,
//! user-presentable messages. Per-item failures during a run never surface
//! here — they are logged and the item is skipped.

use std::path::PathBuf;

/// Top-level error type for all RanoPress operations.
#[derive(Debug, thiserror::Error)]
pub enum RanopressError {
    /// The input reference did not contain a recognizable book identifier.
    #[error("could not extract a book id from the reference: {message}")]
    Reference { message: String },

    /// Book metadata could not be fetched. Without it a run cannot proceed.
    #[error("could not fetch book metadata: {message}")]
    Metadata { message: String },

    /// Network/HTTP error outside the best-effort retry loops.
    #[error("network error: {0}")]
    Network(String),

    /// The intermediate record is missing or unparseable.
    #[error("record error: {message}")]
    Record { message: String },

    /// EPUB container serialization error.
    #[error("epub error: {0}")]
    Epub(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RanopressError>;

impl RanopressError {
    /// Create a reference error from any displayable message.
    pub fn reference(msg: impl Into<String>) -> Self {
        Self::Reference {
            message: msg.into(),
        }
    }

    /// Create a metadata error from any displayable message.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata {
            message: msg.into(),
        }
    }

    /// Create a record error from any displayable message.
    pub fn record(msg: impl Into<String>) -> Self {
        Self::Record {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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
        let err = RanopressError::reference("no pattern matched 'https://example.com'");
        assert!(err.to_string().starts_with("could not extract a book id"));

        let err = RanopressError::record("ranobe.json not found");
        assert_eq!(err.to_string(), "record error: ranobe.json not found");
    }
}
