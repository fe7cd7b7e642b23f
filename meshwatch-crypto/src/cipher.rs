//! Packet payload encryption using AES-CTR.
//!
//! Radios key AES-128 or AES-256 in counter mode per channel, with a
//! counter block built from per-packet header fields. CTR carries no
//! authentication tag, so there is no cryptographic signal for a wrong
//! key: the only test is whether the resulting plaintext parses as a
//! well-formed protocol frame (see [`crate::frame`]).

use crate::frame::{self, DataFrame};
use crate::psk::{ChannelKey, CipherKind};
use aes::cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher};
use aes::{Aes128, Aes256};
use meshwatch_types::NodeId;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Size of the CTR counter block in bytes.
pub const NONCE_SIZE: usize = 16;

/// Builds the CTR counter block for one packet: the wire packet id
/// zero-extended to a little-endian u64, then the sending node as a
/// little-endian u32, then four zero bytes of block counter.
#[must_use]
pub fn packet_nonce(packet_id: u32, from_node: NodeId) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..8].copy_from_slice(&u64::from(packet_id).to_le_bytes());
    nonce[8..12].copy_from_slice(&from_node.as_u32().to_le_bytes());
    nonce
}

/// Applies the keystream for one packet to `data`.
///
/// CTR is an involution: the same call both encrypts and decrypts.
#[must_use]
pub fn apply_keystream(
    key: &ChannelKey,
    packet_id: u32,
    from_node: NodeId,
    data: &[u8],
) -> Vec<u8> {
    let nonce = packet_nonce(packet_id, from_node);
    let mut out = data.to_vec();
    // from_slice lengths hold by construction: keys are validated and the
    // nonce is a fixed array.
    match key.cipher() {
        CipherKind::Aes128 => {
            let mut cipher = Aes128Ctr::new(
                GenericArray::from_slice(key.as_bytes()),
                GenericArray::from_slice(&nonce),
            );
            cipher.apply_keystream(&mut out);
        }
        CipherKind::Aes256 => {
            let mut cipher = Aes256Ctr::new(
                GenericArray::from_slice(key.as_bytes()),
                GenericArray::from_slice(&nonce),
            );
            cipher.apply_keystream(&mut out);
        }
    }
    out
}

/// A successful decryption: the plaintext and its parsed frame.
#[derive(Debug, Clone)]
pub struct Decrypted {
    /// Decrypted payload bytes (the serialized protocol frame).
    pub plaintext: Vec<u8>,
    /// Parsed view of the plaintext.
    pub frame: DataFrame,
}

/// Attempts to decrypt one captured payload under one candidate key.
///
/// Returns the decryption only when the plaintext is a well-formed protocol
/// frame. `None` is the expected outcome for every key that did not encrypt
/// this packet; it is not an error. Empty ciphertexts never match.
#[must_use]
pub fn attempt_decrypt(
    key: &ChannelKey,
    packet_id: u32,
    from_node: NodeId,
    ciphertext: &[u8],
) -> Option<Decrypted> {
    if ciphertext.is_empty() {
        return None;
    }
    let plaintext = apply_keystream(key, packet_id, from_node, ciphertext);
    let frame = frame::parse_frame(&plaintext)?;
    Some(Decrypted { plaintext, frame })
}
