//! Channel key normalization and shorthand expansion.
//!
//! Mesh radios transmit channel keys in compact forms: empty (encryption
//! disabled), a single shorthand byte selecting a variant of the well-known
//! default key, or full 16/32-byte AES material. Everything stored or used
//! for decryption is first expanded to the canonical full-length form, so
//! the rest of the engine only ever sees real key bytes.

use crate::error::{CryptoResult, KeyError};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of an AES-128 channel key in bytes.
pub const KEY_SIZE_128: usize = 16;

/// Size of an AES-256 channel key in bytes.
pub const KEY_SIZE_256: usize = 32;

/// Highest shorthand byte the protocol defines.
pub const MAX_SHORTHAND: u8 = 10;

/// How many leading key bytes a [`KeyPreview`] reveals.
const PREVIEW_BYTES: usize = 3;

/// The protocol's well-known default key, selected by shorthand value 1.
/// Shorthand values 2..=10 derive from it by bumping the final byte.
pub const DEFAULT_PSK: [u8; KEY_SIZE_128] = [
    0xd4, 0xf1, 0xbb, 0x3a, 0x20, 0x29, 0x07, 0x59, 0xf0, 0xbc, 0xff, 0xab, 0xcf, 0x4e, 0x69, 0x01,
];

/// Cipher selected by a key's length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherKind {
    /// 16-byte key.
    Aes128,
    /// 32-byte key.
    Aes256,
}

impl CipherKind {
    /// Key length in bytes for this cipher.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            CipherKind::Aes128 => KEY_SIZE_128,
            CipherKind::Aes256 => KEY_SIZE_256,
        }
    }

    /// Label shown in channel listings.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            CipherKind::Aes128 => "AES-128",
            CipherKind::Aes256 => "AES-256",
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A normalized channel encryption key with automatic zeroization on drop.
///
/// Every live value is full-length (16 or 32 bytes): construction always
/// goes through [`ChannelKey::normalize`] or [`expand_shorthand`], which
/// reject everything else. The raw bytes never appear in `Debug` output and
/// the type is deliberately not serializable; listings expose a
/// [`KeyPreview`] instead.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChannelKey {
    bytes: Vec<u8>,
}

impl ChannelKey {
    /// Normalizes raw key material into its canonical full-length form.
    ///
    /// - empty input or the `0x00` shorthand: rejected as [`KeyError::NoCrypto`]
    /// - a single byte: expanded via [`expand_shorthand`]
    /// - 16 or 32 bytes: accepted as-is
    /// - anything else: rejected as [`KeyError::InvalidLength`]
    pub fn normalize(raw: &[u8]) -> CryptoResult<Self> {
        match raw.len() {
            0 => Err(KeyError::NoCrypto),
            1 => expand_shorthand(raw[0])?.ok_or(KeyError::NoCrypto),
            KEY_SIZE_128 | KEY_SIZE_256 => Ok(Self {
                bytes: raw.to_vec(),
            }),
            actual => Err(KeyError::InvalidLength { actual }),
        }
    }

    /// Decodes a base64-encoded key and normalizes it.
    ///
    /// This is the transport form clients submit; surrounding whitespace is
    /// ignored.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeyError::InvalidEncoding(e.to_string()))?;
        Self::normalize(&raw)
    }

    /// Encodes the key in its base64 transport form.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Generates a random key for the given cipher.
    #[must_use]
    pub fn generate(kind: CipherKind) -> Self {
        let mut bytes = vec![0u8; kind.key_len()];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// The well-known default key (shorthand value 1).
    #[must_use]
    pub fn default_key() -> Self {
        Self {
            bytes: DEFAULT_PSK.to_vec(),
        }
    }

    /// Cipher implied by the key length.
    #[must_use]
    pub fn cipher(&self) -> CipherKind {
        // The length invariant is enforced at construction.
        match self.bytes.len() {
            KEY_SIZE_128 => CipherKind::Aes128,
            _ => CipherKind::Aes256,
        }
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bounded rendering for listings; see [`KeyPreview`].
    #[must_use]
    pub fn preview(&self) -> KeyPreview {
        KeyPreview {
            text: format!("{}…", hex::encode(&self.bytes[..PREVIEW_BYTES])),
            cipher: self.cipher(),
        }
    }
}

impl std::fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Bounded, non-reversible rendering of a channel key for listings.
///
/// Shows the first three bytes in hex plus the cipher label; the remaining
/// material never leaves [`ChannelKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPreview {
    /// Leading bytes in hex followed by an ellipsis, e.g. `d4f1bb…`.
    pub text: String,
    /// Cipher implied by the key length.
    pub cipher: CipherKind,
}

impl fmt::Display for KeyPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.text, self.cipher)
    }
}

/// Expands a 1-byte shorthand key.
///
/// `0` means encryption disabled and yields `Ok(None)`. `1` selects the
/// default key. `2..=10` select the default key with its final byte bumped
/// by `value - 1`, wrapping on overflow. Higher values are not defined by
/// the protocol and are rejected rather than guessed at.
pub fn expand_shorthand(value: u8) -> CryptoResult<Option<ChannelKey>> {
    match value {
        0 => Ok(None),
        1..=MAX_SHORTHAND => {
            let mut bytes = DEFAULT_PSK.to_vec();
            bytes[KEY_SIZE_128 - 1] = bytes[KEY_SIZE_128 - 1].wrapping_add(value - 1);
            Ok(Some(ChannelKey { bytes }))
        }
        _ => Err(KeyError::InvalidShorthand(value)),
    }
}

/// Computes the protocol's channel hash: the XOR fold of the channel name
/// bytes XORed with the XOR fold of the key bytes.
///
/// Radios stamp this byte on packet headers to say which channel a packet
/// was encrypted under without revealing the key. It is a routing hint, not
/// an integrity check.
#[must_use]
pub fn channel_hash(name: &str, key: &ChannelKey) -> u8 {
    xor_fold(name.as_bytes()) ^ xor_fold(key.as_bytes())
}

fn xor_fold(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}
