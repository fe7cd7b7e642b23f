//! Error types for the decryption engine.
//!
//! These cover trigger-time admission only. Failures during a running scan
//! never surface here; they land in the polled `JobState::error`.

use meshwatch_store::StoreError;
use meshwatch_types::ChannelId;
use thiserror::Error;

/// Result type for decryption-engine operations.
pub type DecryptResult<T> = Result<T, DecryptError>;

/// Errors that can occur when triggering or configuring decryption.
#[derive(Debug, Error)]
pub enum DecryptError {
    /// A retroactive job holds the single-flight slot.
    #[error("a retroactive decryption job is already in progress")]
    Busy,

    /// The requested channel key does not exist.
    #[error("channel key not found: {0}")]
    ChannelNotFound(ChannelId),

    /// The requested channel key is disabled.
    #[error("channel key is disabled: {0}")]
    ChannelDisabled(ChannelId),

    /// Storage error from the key store or packet archive.
    #[error(transparent)]
    Store(#[from] StoreError),
}
