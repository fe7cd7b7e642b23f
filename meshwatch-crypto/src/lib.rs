//! Channel key codec and packet decryption for Meshwatch.
//!
//! This crate owns everything cryptographic and keeps it pure:
//! - Key normalization and 1-byte shorthand expansion (the compact forms
//!   radios transmit)
//! - AES-CTR keystream application with the protocol's per-packet counter
//!   block
//! - Strict parsing of the decrypted `Data` frame, which doubles as the
//!   wrong-key test since CTR has no authentication tag
//!
//! Persistence and job orchestration live in `meshwatch-store` and
//! `meshwatch-decrypt`; nothing here touches a database or a runtime.

mod cipher;
mod error;
mod frame;
mod psk;

pub use cipher::{apply_keystream, attempt_decrypt, packet_nonce, Decrypted, NONCE_SIZE};
pub use error::{CryptoResult, KeyError};
pub use frame::{parse_frame, DataFrame, MAX_PORT};
pub use psk::{
    channel_hash, expand_shorthand, ChannelKey, CipherKind, KeyPreview, DEFAULT_PSK, KEY_SIZE_128,
    KEY_SIZE_256, MAX_SHORTHAND,
};
