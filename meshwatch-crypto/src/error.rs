//! Error types for the key codec.

use thiserror::Error;

/// Result type for key codec operations.
pub type CryptoResult<T> = Result<T, KeyError>;

/// Errors that can occur when validating or normalizing a channel key.
///
/// Decryption itself never produces an error: a wrong key simply yields
/// plaintext that fails frame parsing, reported as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key is empty or the explicit no-encryption shorthand. A stored
    /// channel record must always carry real key material.
    #[error("key disables encryption; channels without a key cannot be stored")]
    NoCrypto,

    /// Key length is not one of the canonical sizes.
    #[error("invalid key length: expected 16 or 32 bytes, got {actual}")]
    InvalidLength { actual: usize },

    /// 1-byte shorthand outside the range the protocol defines.
    #[error("invalid shorthand key value: {0} (defined range is 0..=10)")]
    InvalidShorthand(u8),

    /// The submitted key was not valid base64.
    #[error("invalid key encoding: {0}")]
    InvalidEncoding(String),
}
