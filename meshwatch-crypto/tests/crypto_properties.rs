//! Property-based tests for the key codec and packet cipher.
//!
//! These verify invariants the engine leans on:
//! - CTR application is an involution for every key and nonce input
//! - A frame encrypted under a key always decodes under that key
//! - Normalization only ever yields full-length keys
//! - Shorthand expansion touches nothing but the final byte
//! - The frame parser is total (never panics) on arbitrary bytes

use meshwatch_crypto::{
    apply_keystream, attempt_decrypt, expand_shorthand, packet_nonce, parse_frame, ChannelKey,
    DataFrame, DEFAULT_PSK, MAX_PORT,
};
use meshwatch_types::NodeId;
use proptest::prelude::*;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn key_strategy() -> impl Strategy<Value = ChannelKey> {
    prop_oneof![
        prop::array::uniform16(any::<u8>()).prop_map(|b| ChannelKey::normalize(&b).unwrap()),
        prop::array::uniform32(any::<u8>()).prop_map(|b| ChannelKey::normalize(&b).unwrap()),
    ]
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

fn node_strategy() -> impl Strategy<Value = NodeId> {
    any::<u32>().prop_map(NodeId::from_u32)
}

fn frame_strategy() -> impl Strategy<Value = DataFrame> {
    (
        1u32..=MAX_PORT,
        prop::collection::vec(any::<u8>(), 0..256),
        any::<bool>(),
        prop::option::of(any::<u32>()),
        prop::option::of(any::<u32>()),
        prop::option::of(any::<u32>()),
    )
        .prop_map(
            |(port, payload, want_response, dest, request_id, bitfield)| DataFrame {
                port,
                payload,
                want_response,
                dest: dest.map(NodeId::from_u32),
                source: None,
                request_id,
                reply_id: None,
                emoji: None,
                bitfield,
            },
        )
}

// =============================================================================
// CIPHER PROPERTIES
// =============================================================================

mod cipher_properties {
    use super::*;

    proptest! {
        /// Applying the keystream twice returns the original bytes.
        #[test]
        fn keystream_is_involutive(
            key in key_strategy(),
            packet_id in any::<u32>(),
            from in node_strategy(),
            data in payload_strategy(),
        ) {
            let once = apply_keystream(&key, packet_id, from, &data);
            let twice = apply_keystream(&key, packet_id, from, &once);
            prop_assert_eq!(twice, data);
        }

        /// A frame encrypted under a key always decodes under that key with
        /// the same nonce inputs.
        #[test]
        fn encrypt_then_attempt_succeeds(
            key in key_strategy(),
            packet_id in any::<u32>(),
            from in node_strategy(),
            frame in frame_strategy(),
        ) {
            let ciphertext = apply_keystream(&key, packet_id, from, &frame.encode());
            let decoded = attempt_decrypt(&key, packet_id, from, &ciphertext);
            prop_assert!(decoded.is_some());
            prop_assert_eq!(decoded.unwrap().frame, frame);
        }

        /// The counter block embeds its inputs at fixed offsets and leaves
        /// the block counter zeroed.
        #[test]
        fn nonce_layout_is_stable(packet_id in any::<u32>(), from in node_strategy()) {
            let nonce = packet_nonce(packet_id, from);
            prop_assert_eq!(&nonce[..8], &u64::from(packet_id).to_le_bytes());
            prop_assert_eq!(&nonce[8..12], &from.as_u32().to_le_bytes());
            prop_assert_eq!(&nonce[12..], &[0u8; 4]);
        }
    }
}

// =============================================================================
// KEY CODEC PROPERTIES
// =============================================================================

mod codec_properties {
    use super::*;

    proptest! {
        /// Normalization either rejects the input or yields a full-length key.
        #[test]
        fn normalize_only_yields_canonical_lengths(raw in prop::collection::vec(any::<u8>(), 0..64)) {
            if let Ok(key) = ChannelKey::normalize(&raw) {
                let len = key.as_bytes().len();
                prop_assert!(len == 16 || len == 32);
            }
        }

        /// Shorthand expansion only ever varies the final byte of the
        /// default key.
        #[test]
        fn shorthand_varies_only_the_final_byte(value in 1u8..=10) {
            let key = expand_shorthand(value).unwrap().unwrap();
            prop_assert_eq!(&key.as_bytes()[..15], &DEFAULT_PSK[..15]);
            prop_assert_eq!(key.as_bytes()[15], DEFAULT_PSK[15].wrapping_add(value - 1));
        }

        /// The base64 transport form roundtrips every valid key.
        #[test]
        fn base64_roundtrips(key in key_strategy()) {
            let reloaded = ChannelKey::from_base64(&key.to_base64()).unwrap();
            prop_assert_eq!(reloaded.as_bytes(), key.as_bytes());
        }
    }
}

// =============================================================================
// FRAME PROPERTIES
// =============================================================================

mod frame_properties {
    use super::*;

    proptest! {
        /// Encoding a valid frame always parses back to the same frame.
        #[test]
        fn encode_parse_roundtrip(frame in frame_strategy()) {
            prop_assert_eq!(parse_frame(&frame.encode()), Some(frame));
        }

        /// The parser is total: arbitrary bytes never panic it.
        #[test]
        fn parse_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..1024)) {
            let _ = parse_frame(&bytes);
        }

        /// Anything the parser accepts carries an in-range port.
        #[test]
        fn accepted_frames_have_valid_ports(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            if let Some(frame) = parse_frame(&bytes) {
                prop_assert!(frame.port >= 1 && frame.port <= MAX_PORT);
            }
        }
    }
}
