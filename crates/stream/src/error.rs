//! Error types for the item stream core

use thiserror::Error;

/// Result type for item stream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mutating or traversing an item stream
///
/// Nothing here is retried internally; recovery policy (for example
/// re-fetch-and-retry after an authorization failure) belongs to the caller.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Removal presented a stale or incorrect lock token. The caller's view
    /// of the item is out of date; re-fetch and retry if still relevant.
    #[error("Authorization failed: {0}")]
    AuthorizationFailure(String),

    /// The stream cannot accept the insertion (full or closed).
    #[error("Stream not available for insertion: {0}")]
    CapacityExceeded(String),

    /// Operation attempted on a transaction that already resolved.
    #[error("Transaction already complete: {0}")]
    TransactionComplete(String),

    /// A cursor or handle outlived its stream (closed or reset).
    #[error("Stream unavailable: {0}")]
    StreamUnavailable(String),

    /// The item is already a member of a stream.
    #[error("Item already added: {0}")]
    AlreadyAdded(String),
}
