//! Centralized error types for mboxsave.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while reading a message out of a [`MessageStore`].
///
/// [`MessageStore`]: crate::store::MessageStore
#[derive(Error, Debug)]
pub enum StoreError {
    /// No message with this identifier exists in the store.
    #[error("Message not found: {0}")]
    NotFound(String),

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The stored bytes could not be turned into a message.
    #[error("Could not parse message '{uid}': {reason}")]
    Parse { uid: String, reason: String },
}

impl StoreError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Terminal outcome of a failed save operation.
///
/// Every variant is fatal to the whole operation: there is no per-message
/// retry and no skip-and-continue.
#[derive(Error, Debug)]
pub enum SaveError {
    /// The caller broke the input contract (e.g. no message identifiers).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The destination could not be created or replaced.
    #[error("Cannot create '{path}': {source}")]
    DestinationUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A message could not be retrieved from the store.
    #[error("Failed to fetch message '{uid}': {source}")]
    FetchFailed { uid: String, source: StoreError },

    /// Appending a record to the destination failed.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The operation was cancelled between two messages.
    #[error("Operation cancelled by user")]
    Cancelled,

    /// The worker panicked; the partial archive has been removed.
    #[error("Save aborted: {0}")]
    Aborted(String),
}

impl SaveError {
    /// `true` for [`SaveError::Cancelled`], which callers usually do not
    /// present to the user as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for `Result<T, SaveError>`.
pub type Result<T> = std::result::Result<T, SaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_cancelled() {
        assert!(SaveError::Cancelled.is_cancelled());
        assert!(!SaveError::InvalidInput("empty".into()).is_cancelled());
    }

    #[test]
    fn test_fetch_failed_message_names_uid() {
        let err = SaveError::FetchFailed {
            uid: "42".into(),
            source: StoreError::NotFound("42".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("'42'"));
        assert!(msg.contains("not found"));
    }
}
