//! First-match decryption for freshly captured traffic.
//!
//! The capture pipeline calls this once per encrypted packet, before the
//! packet is archived. It applies the same frame validation as the
//! retroactive scan, so a packet either decodes identically on both paths
//! or on neither.

use chrono::Utc;
use meshwatch_crypto::{attempt_decrypt, channel_hash, Decrypted};
use meshwatch_store::{ChannelKeyStore, StoreResult};
use meshwatch_types::{ChannelId, NodeId};

/// A successful live decode and the key that produced it.
#[derive(Debug, Clone)]
pub struct LiveDecode {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub decoded: Decrypted,
}

/// Tries every enabled key against one captured payload, in store order,
/// and returns the first that yields a valid frame.
///
/// When the packet header carried a channel hash, keys whose computed hash
/// differs are skipped without a decryption attempt; the sender derives the
/// hash from the encrypting channel, so a mismatched key cannot be the one.
/// A successful decode bumps the owning key's usage counter.
pub fn decrypt_with_any(
    channels: &ChannelKeyStore,
    packet_id: u32,
    from_node: NodeId,
    channel_hash_hint: Option<u8>,
    ciphertext: &[u8],
) -> StoreResult<Option<LiveDecode>> {
    for candidate in channels.enabled_keys()? {
        if let Some(hint) = channel_hash_hint {
            if channel_hash(&candidate.name, &candidate.key) != hint {
                continue;
            }
        }
        if let Some(decoded) = attempt_decrypt(&candidate.key, packet_id, from_node, ciphertext) {
            channels.record_decryption(candidate.id, Utc::now())?;
            return Ok(Some(LiveDecode {
                channel_id: candidate.id,
                channel_name: candidate.name,
                decoded,
            }));
        }
    }
    Ok(None)
}
