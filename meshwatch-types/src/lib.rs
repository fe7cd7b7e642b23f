//! Core type definitions for Meshwatch.
//!
//! This crate defines the fundamental, transport-agnostic types used
//! throughout the engine:
//! - Channel key and archived packet identifiers (UUID v7)
//! - Mesh node addresses (32-bit, displayed in `!hex` form)
//!
//! All domain-specific types (keys, packets, job state, etc.) belong in
//! their respective crates, not here.

mod ids;

pub use ids::{ChannelId, NodeId, PacketId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid node address: {0}")]
    InvalidNodeAddress(String),
}
