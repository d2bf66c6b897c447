//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation was called with an empty set of conversation IDs.
    #[error("no conversation IDs were provided")]
    EmptyConversationIds,

    /// A folder move was requested without a destination label.
    #[error("no destination label was provided")]
    EmptyLabel,

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The remote executor rejected a mutation. Local state is unaffected;
    /// the already-applied optimistic update stands until the next resync.
    #[error(transparent)]
    Remote(#[from] crate::service::RemoteError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
