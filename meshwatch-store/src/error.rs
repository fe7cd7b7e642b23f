//! Error types for the persistence layer.

use meshwatch_crypto::KeyError;
use meshwatch_types::ChannelId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The submitted key failed validation or normalization.
    #[error("invalid key: {0}")]
    Key(#[from] KeyError),

    /// The channel name is empty after trimming.
    #[error("channel name must not be empty")]
    NameEmpty,

    /// The channel name fails the protocol naming rule.
    #[error("invalid channel name: {0}")]
    NameInvalid(String),

    /// No channel key record with the given id.
    #[error("channel key not found: {0}")]
    NotFound(ChannelId),

    /// Underlying SQLite failure.
    #[error("storage error: {0}")]
    Storage(String),
}
