//! Captured-packet archive.
//!
//! The capture pipeline appends encrypted packets as they arrive off the
//! mesh; decryption fills in the `decoded` column later, one atomic row
//! update at a time. A packet whose `decoded` is still NULL is a candidate
//! for every future retroactive job. [`PacketArchive`] is the seam the
//! decryption engine works through, so tests can substitute a controllable
//! archive.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use meshwatch_types::{ChannelId, NodeId, PacketId};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One captured, still-encrypted packet as the decryption paths see it.
#[derive(Debug, Clone)]
pub struct EncryptedPacket {
    /// Archive row id; time-ordered, doubles as the scan cursor.
    pub id: PacketId,
    /// Wire packet id from the mesh header (counter block input).
    pub packet_id: u32,
    /// Sending node (counter block input).
    pub from_node: NodeId,
    /// Channel-hash byte from the packet header, when the radio supplied it.
    pub channel_hash: Option<u8>,
    /// Encrypted payload.
    pub ciphertext: Vec<u8>,
    /// When the capture pipeline stored the packet.
    pub received_at: DateTime<Utc>,
}

/// Input for archiving one captured packet.
#[derive(Debug, Clone)]
pub struct NewPacket {
    pub packet_id: u32,
    pub from_node: NodeId,
    pub channel_hash: Option<u8>,
    pub ciphertext: Vec<u8>,
}

/// A full archive row, decode results included.
#[derive(Debug, Clone)]
pub struct ArchivedPacket {
    pub id: PacketId,
    pub packet_id: u32,
    pub from_node: NodeId,
    pub channel_hash: Option<u8>,
    pub ciphertext: Vec<u8>,
    pub received_at: DateTime<Utc>,
    /// Decrypted frame bytes, once some key decoded this packet.
    pub decoded: Option<Vec<u8>>,
    /// The key credited with the decode.
    pub decrypted_by: Option<ChannelId>,
}

/// What the decryption engine needs from packet storage.
///
/// Implementations must keep `fetch_undecoded` ordering stable across calls
/// (ascending row id, which tracks arrival time) and make `mark_decoded` a
/// single atomic row update, so a crash mid-scan never leaves half-written
/// rows.
pub trait PacketArchive: Send + Sync {
    /// Number of packets no key has decoded yet.
    fn count_undecoded(&self) -> StoreResult<u64>;

    /// Next batch of undecoded packets after the cursor, in ascending id
    /// order. An empty result means the scan caught up.
    fn fetch_undecoded(
        &self,
        after: Option<PacketId>,
        limit: usize,
    ) -> StoreResult<Vec<EncryptedPacket>>;

    /// Persists a successful decode: plaintext plus the key that produced
    /// it. A packet some other writer already decoded is left untouched.
    fn mark_decoded(&self, id: PacketId, plaintext: &[u8], key_id: ChannelId) -> StoreResult<()>;
}

/// Packet archive backed by SQLite.
pub struct SqlitePacketArchive {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePacketArchive {
    /// Opens (or creates) a packet archive at the given path.
    pub fn new(path: &str) -> StoreResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Storage(format!("failed to open packet archive: {e}")))?;
        let archive = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        archive.init_schema()?;
        Ok(archive)
    }

    /// Opens an in-memory packet archive (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::Storage(format!("failed to open in-memory packet archive: {e}"))
        })?;
        let archive = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        archive.init_schema()?;
        Ok(archive)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS packets (
                id TEXT PRIMARY KEY,
                packet_id INTEGER NOT NULL,
                from_node INTEGER NOT NULL,
                channel_hash INTEGER,
                ciphertext BLOB NOT NULL,
                received_at TEXT NOT NULL,
                decoded BLOB,
                decrypted_by TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_packets_undecoded
                ON packets (id) WHERE decoded IS NULL;
            ",
        )
        .map_err(|e| StoreError::Storage(format!("failed to init packet schema: {e}")))?;
        Ok(())
    }

    /// Archives one captured packet and returns it with its assigned row id.
    pub fn insert(&self, new: NewPacket) -> StoreResult<EncryptedPacket> {
        let packet = EncryptedPacket {
            id: PacketId::new(),
            packet_id: new.packet_id,
            from_node: new.from_node,
            channel_hash: new.channel_hash,
            ciphertext: new.ciphertext,
            received_at: Utc::now(),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO packets (id, packet_id, from_node, channel_hash, ciphertext, received_at, decoded, decrypted_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL)",
            params![
                packet.id.to_string(),
                packet.packet_id,
                packet.from_node.as_u32(),
                packet.channel_hash,
                packet.ciphertext,
                packet.received_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Storage(format!("failed to archive packet: {e}")))?;
        Ok(packet)
    }

    /// Loads one archive row by id.
    pub fn get(&self, id: PacketId) -> StoreResult<Option<ArchivedPacket>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                "SELECT id, packet_id, from_node, channel_hash, ciphertext, received_at, decoded, decrypted_by
                 FROM packets WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, Option<u8>>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<Vec<u8>>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StoreError::Storage(format!("failed to load packet: {e}")))?;

        let Some((id_str, packet_id, from_node, channel_hash, ciphertext, received_at, decoded, decrypted_by)) =
            raw
        else {
            return Ok(None);
        };
        let id: PacketId = id_str
            .parse()
            .map_err(|e| StoreError::Storage(format!("invalid packet id in row: {e}")))?;
        let decrypted_by = match decrypted_by {
            Some(s) => Some(
                s.parse::<ChannelId>()
                    .map_err(|e| StoreError::Storage(format!("invalid key id in packet row: {e}")))?,
            ),
            None => None,
        };
        Ok(Some(ArchivedPacket {
            id,
            packet_id,
            from_node: NodeId::from_u32(from_node),
            channel_hash,
            ciphertext,
            received_at: parse_timestamp(&received_at)?,
            decoded,
            decrypted_by,
        }))
    }

    /// Total number of archived packets, decoded or not.
    pub fn count(&self) -> StoreResult<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM packets", [], |row| row.get(0))
            .map_err(|e| StoreError::Storage(format!("failed to count packets: {e}")))?;
        Ok(count.max(0) as u64)
    }
}

impl PacketArchive for SqlitePacketArchive {
    fn count_undecoded(&self) -> StoreResult<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM packets WHERE decoded IS NULL",
                [],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Storage(format!("failed to count undecoded packets: {e}")))?;
        Ok(count.max(0) as u64)
    }

    fn fetch_undecoded(
        &self,
        after: Option<PacketId>,
        limit: usize,
    ) -> StoreResult<Vec<EncryptedPacket>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, packet_id, from_node, channel_hash, ciphertext, received_at
                 FROM packets
                 WHERE decoded IS NULL AND (?1 IS NULL OR id > ?1)
                 ORDER BY id
                 LIMIT ?2",
            )
            .map_err(|e| StoreError::Storage(format!("failed to prepare undecoded scan: {e}")))?;
        let rows = stmt
            .query_map(
                params![after.map(|id| id.to_string()), limit as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, Option<u8>>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .map_err(|e| StoreError::Storage(format!("failed to query undecoded packets: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let (id_str, packet_id, from_node, channel_hash, ciphertext, received_at) =
                row.map_err(|e| StoreError::Storage(format!("failed to read packet row: {e}")))?;
            let id: PacketId = id_str
                .parse()
                .map_err(|e| StoreError::Storage(format!("invalid packet id in row: {e}")))?;
            result.push(EncryptedPacket {
                id,
                packet_id,
                from_node: NodeId::from_u32(from_node),
                channel_hash,
                ciphertext,
                received_at: parse_timestamp(&received_at)?,
            });
        }
        Ok(result)
    }

    fn mark_decoded(&self, id: PacketId, plaintext: &[u8], key_id: ChannelId) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE packets SET decoded = ?2, decrypted_by = ?3
                 WHERE id = ?1 AND decoded IS NULL",
                params![id.to_string(), plaintext, key_id.to_string()],
            )
            .map_err(|e| StoreError::Storage(format!("failed to mark packet decoded: {e}")))?;
        if changed == 0 {
            debug!("packet {} was already decoded; keeping the first result", id);
        }
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Storage(format!("invalid timestamp in packet row: {e}")))
}
