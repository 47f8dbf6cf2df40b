//! Error types for resource store access.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing platform resources.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object vanished between read and write.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write was based on a stale `resourceVersion`.
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("object has no {0}")]
    MissingMetadata(&'static str),

    #[error("serialization error: {0}")]
    Serialize(String),

    /// Any other failure talking to the API server.
    #[error("api error: {0}")]
    Api(String),
}

impl StoreError {
    /// True for errors that a fresh read on the next pass resolves.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::AlreadyExists(_))
    }
}
