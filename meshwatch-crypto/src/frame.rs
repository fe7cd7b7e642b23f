//! Strict parser for the protocol's inner `Data` frame.
//!
//! A decrypted payload is a protobuf-encoded `Data` message. Because the
//! cipher cannot distinguish a wrong key from a right one, parse success is
//! the validity test, so this parser is deliberately stricter than a
//! general protobuf reader: unknown fields, wrong wire types, truncated
//! values, out-of-range ports and trailing bytes all reject. Keystream
//! garbage essentially never survives those checks.

use meshwatch_types::NodeId;

/// Highest port number the protocol assigns.
pub const MAX_PORT: u32 = 511;

const WIRE_VARINT: u8 = 0;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Parsed protocol `Data` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFrame {
    /// Application port (1..=511). Zero is never transmitted.
    pub port: u32,
    /// Application payload bytes.
    pub payload: Vec<u8>,
    /// Whether the sender asked for an acknowledging response.
    pub want_response: bool,
    /// Original destination node, for multi-hop delivery.
    pub dest: Option<NodeId>,
    /// Original source node, for multi-hop delivery.
    pub source: Option<NodeId>,
    /// Request id for request/response ports.
    pub request_id: Option<u32>,
    /// Id of the request this frame replies to.
    pub reply_id: Option<u32>,
    /// Emoji/tapback marker for text messages.
    pub emoji: Option<u32>,
    /// Capability bitfield appended by newer firmware.
    pub bitfield: Option<u32>,
}

impl DataFrame {
    /// Creates a minimal frame with just a port and payload.
    #[must_use]
    pub fn new(port: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            port,
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Serializes the frame to its wire form.
    ///
    /// The result round-trips through [`parse_frame`] provided `port` is in
    /// `1..=MAX_PORT`; a zero port encodes to a frame [`parse_frame`] rejects.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload.len() + 16);
        if self.port != 0 {
            buf.push(tag(1, WIRE_VARINT));
            write_varint(&mut buf, u64::from(self.port));
        }
        if !self.payload.is_empty() {
            buf.push(tag(2, WIRE_LEN));
            write_varint(&mut buf, self.payload.len() as u64);
            buf.extend_from_slice(&self.payload);
        }
        if self.want_response {
            buf.push(tag(3, WIRE_VARINT));
            buf.push(1);
        }
        if let Some(dest) = self.dest {
            buf.push(tag(4, WIRE_FIXED32));
            buf.extend_from_slice(&dest.as_u32().to_le_bytes());
        }
        if let Some(source) = self.source {
            buf.push(tag(5, WIRE_FIXED32));
            buf.extend_from_slice(&source.as_u32().to_le_bytes());
        }
        if let Some(request_id) = self.request_id {
            buf.push(tag(6, WIRE_FIXED32));
            buf.extend_from_slice(&request_id.to_le_bytes());
        }
        if let Some(reply_id) = self.reply_id {
            buf.push(tag(7, WIRE_FIXED32));
            buf.extend_from_slice(&reply_id.to_le_bytes());
        }
        if let Some(emoji) = self.emoji {
            buf.push(tag(8, WIRE_FIXED32));
            buf.extend_from_slice(&emoji.to_le_bytes());
        }
        if let Some(bitfield) = self.bitfield {
            buf.push(tag(9, WIRE_VARINT));
            write_varint(&mut buf, u64::from(bitfield));
        }
        buf
    }
}

/// Parses `bytes` as a `Data` frame.
///
/// Returns `None` unless every byte is consumed by known, well-formed
/// fields and a port in `1..=MAX_PORT` is present.
#[must_use]
pub fn parse_frame(bytes: &[u8]) -> Option<DataFrame> {
    let mut frame = DataFrame::default();
    let mut saw_port = false;
    let mut cursor = bytes;

    while !cursor.is_empty() {
        let (key, rest) = read_varint(cursor)?;
        cursor = rest;
        let field = u32::try_from(key >> 3).ok()?;
        let wire = (key & 0x7) as u8;
        match (field, wire) {
            (1, WIRE_VARINT) => {
                let (v, rest) = read_varint(cursor)?;
                cursor = rest;
                let port = u32::try_from(v).ok()?;
                if port == 0 || port > MAX_PORT {
                    return None;
                }
                frame.port = port;
                saw_port = true;
            }
            (2, WIRE_LEN) => {
                let (v, rest) = read_varint(cursor)?;
                let len = usize::try_from(v).ok()?;
                if len > rest.len() {
                    return None;
                }
                frame.payload = rest[..len].to_vec();
                cursor = &rest[len..];
            }
            (3, WIRE_VARINT) => {
                let (v, rest) = read_varint(cursor)?;
                cursor = rest;
                // A real encoder only ever emits 0 or 1 here.
                frame.want_response = match v {
                    0 => false,
                    1 => true,
                    _ => return None,
                };
            }
            (4, WIRE_FIXED32) => {
                let (v, rest) = read_fixed32(cursor)?;
                cursor = rest;
                frame.dest = Some(NodeId::from_u32(v));
            }
            (5, WIRE_FIXED32) => {
                let (v, rest) = read_fixed32(cursor)?;
                cursor = rest;
                frame.source = Some(NodeId::from_u32(v));
            }
            (6, WIRE_FIXED32) => {
                let (v, rest) = read_fixed32(cursor)?;
                cursor = rest;
                frame.request_id = Some(v);
            }
            (7, WIRE_FIXED32) => {
                let (v, rest) = read_fixed32(cursor)?;
                cursor = rest;
                frame.reply_id = Some(v);
            }
            (8, WIRE_FIXED32) => {
                let (v, rest) = read_fixed32(cursor)?;
                cursor = rest;
                frame.emoji = Some(v);
            }
            (9, WIRE_VARINT) => {
                let (v, rest) = read_varint(cursor)?;
                cursor = rest;
                frame.bitfield = Some(u32::try_from(v).ok()?);
            }
            _ => return None,
        }
    }

    if !saw_port {
        return None;
    }
    Some(frame)
}

const fn tag(field: u8, wire: u8) -> u8 {
    (field << 3) | wire
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn read_varint(bytes: &[u8]) -> Option<(u64, &[u8])> {
    let mut value = 0u64;
    for (i, &b) in bytes.iter().enumerate() {
        if i == 10 {
            // longer than any valid u64 encoding
            return None;
        }
        value |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Some((value, &bytes[i + 1..]));
        }
    }
    // ran out of input mid-varint
    None
}

fn read_fixed32(bytes: &[u8]) -> Option<(u32, &[u8])> {
    if bytes.len() < 4 {
        return None;
    }
    let (head, rest) = bytes.split_at(4);
    let mut raw = [0u8; 4];
    raw.copy_from_slice(head);
    Some((u32::from_le_bytes(raw), rest))
}
