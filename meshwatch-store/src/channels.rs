//! Persistent storage for channel key records.
//!
//! Keys are normalized before anything touches the database, so every stored
//! row holds a full-length key in its base64 transport form. Store order
//! (insertion order) is meaningful: live decryption tries keys in this order
//! and attributes a packet to the first one that decodes it.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use meshwatch_crypto::{ChannelKey, CipherKind, KeyPreview};
use meshwatch_types::ChannelId;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Longest channel name the mesh protocol allows, in bytes.
pub const MAX_CHANNEL_NAME_LEN: usize = 11;

/// A stored channel key record, including the key material.
///
/// This is the internal form; anything leaving the engine gets a
/// [`ChannelKeyView`] instead, which carries only a preview.
#[derive(Debug, Clone)]
pub struct ChannelKeyRecord {
    pub id: ChannelId,
    pub name: String,
    pub key: ChannelKey,
    pub description: Option<String>,
    pub enabled: bool,
    /// Packets this key has decrypted, live and retroactive combined.
    pub decrypted_count: u64,
    pub last_decrypted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ChannelKeyRecord {
    /// External listing form; replaces the key with its bounded preview.
    #[must_use]
    pub fn to_view(&self) -> ChannelKeyView {
        ChannelKeyView {
            id: self.id,
            name: self.name.clone(),
            key_preview: self.key.preview(),
            cipher: self.key.cipher(),
            psk_len: self.key.as_bytes().len(),
            description: self.description.clone(),
            enabled: self.enabled,
            decrypted_count: self.decrypted_count,
            last_decrypted_at: self.last_decrypted_at,
            created_at: self.created_at,
        }
    }
}

/// Non-secret view of a channel key record, safe to list over any transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelKeyView {
    pub id: ChannelId,
    pub name: String,
    pub key_preview: KeyPreview,
    pub cipher: CipherKind,
    pub psk_len: usize,
    pub description: Option<String>,
    pub enabled: bool,
    pub decrypted_count: u64,
    pub last_decrypted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating one channel key record.
///
/// `key` is the submitted base64 form, pre-normalization; shorthand bytes
/// and full-length material are both accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChannelKey {
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Partial update for a channel key record; `None` fields stay unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelKeyPatch {
    pub name: Option<String>,
    /// Submitted base64 form, re-normalized under the same rules as create.
    pub key: Option<String>,
    /// `Some("")` clears the description.
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

/// An enabled key as the decryption paths consume it, in store order.
#[derive(Debug, Clone)]
pub struct EnabledKey {
    pub id: ChannelId,
    pub name: String,
    pub key: ChannelKey,
}

/// Outcome for one record of a bulk import.
#[derive(Debug)]
pub struct ImportOutcome {
    /// Name as submitted, so rejects can be matched to input rows.
    pub name: String,
    pub result: StoreResult<ChannelId>,
}

/// Summary of a bulk import. Records are validated independently; partial
/// success is the normal case, not an error.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: usize,
    pub rejected: usize,
    pub outcomes: Vec<ImportOutcome>,
}

/// Persistent store for channel keys backed by SQLite.
pub struct ChannelKeyStore {
    conn: Arc<Mutex<Connection>>,
}

impl ChannelKeyStore {
    /// Opens (or creates) a channel key store at the given path.
    pub fn new(path: &str) -> StoreResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Storage(format!("failed to open channel key store: {e}")))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory channel key store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::Storage(format!("failed to open in-memory channel key store: {e}"))
        })?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS channel_keys (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                psk TEXT NOT NULL,
                description TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                decrypted_count INTEGER NOT NULL DEFAULT 0,
                last_decrypted_at TEXT,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| StoreError::Storage(format!("failed to init channel key schema: {e}")))?;
        Ok(())
    }

    // ── CRUD ─────────────────────────────────────────────────────

    /// Validates, normalizes and persists one channel key.
    ///
    /// `enforce_name_validation` switches the protocol naming rule on; the
    /// empty-name check always applies. Nothing is written unless the whole
    /// record passes.
    pub fn create(
        &self,
        new: NewChannelKey,
        enforce_name_validation: bool,
    ) -> StoreResult<ChannelKeyRecord> {
        let name = new.name.trim().to_string();
        validate_name(&name, enforce_name_validation)?;
        let key = ChannelKey::from_base64(&new.key)?;

        let record = ChannelKeyRecord {
            id: ChannelId::new(),
            name,
            key,
            description: new.description.filter(|d| !d.trim().is_empty()),
            enabled: new.enabled,
            decrypted_count: 0,
            last_decrypted_at: None,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO channel_keys (id, name, psk, description, enabled, decrypted_count, last_decrypted_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6)",
            params![
                record.id.to_string(),
                record.name,
                record.key.to_base64(),
                record.description,
                record.enabled,
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Storage(format!("failed to insert channel key: {e}")))?;

        debug!("created channel key '{}' ({})", record.name, record.id);
        Ok(record)
    }

    /// Applies a partial update. Submitted keys and names go through the
    /// same validation as [`create`](Self::create); decryption counters are
    /// never touched, so historical attribution survives key edits.
    pub fn update(
        &self,
        id: ChannelId,
        patch: ChannelKeyPatch,
        enforce_name_validation: bool,
    ) -> StoreResult<ChannelKeyRecord> {
        let conn = self.conn.lock().unwrap();
        let mut record = fetch(&conn, id)?;

        if let Some(name) = &patch.name {
            let name = name.trim();
            validate_name(name, enforce_name_validation)?;
            record.name = name.to_string();
        }
        if let Some(key) = &patch.key {
            record.key = ChannelKey::from_base64(key)?;
        }
        if let Some(description) = patch.description {
            record.description = if description.trim().is_empty() {
                None
            } else {
                Some(description)
            };
        }
        if let Some(enabled) = patch.enabled {
            record.enabled = enabled;
        }

        conn.execute(
            "UPDATE channel_keys SET name = ?2, psk = ?3, description = ?4, enabled = ?5 WHERE id = ?1",
            params![
                record.id.to_string(),
                record.name,
                record.key.to_base64(),
                record.description,
                record.enabled,
            ],
        )
        .map_err(|e| StoreError::Storage(format!("failed to update channel key: {e}")))?;

        debug!("updated channel key '{}' ({})", record.name, record.id);
        Ok(record)
    }

    /// Flips the enabled flag and returns the updated record.
    pub fn toggle_enabled(&self, id: ChannelId) -> StoreResult<ChannelKeyRecord> {
        let conn = self.conn.lock().unwrap();
        let mut record = fetch(&conn, id)?;
        record.enabled = !record.enabled;
        conn.execute(
            "UPDATE channel_keys SET enabled = ?2 WHERE id = ?1",
            params![record.id.to_string(), record.enabled],
        )
        .map_err(|e| StoreError::Storage(format!("failed to toggle channel key: {e}")))?;
        debug!(
            "channel key '{}' ({}) now {}",
            record.name,
            record.id,
            if record.enabled { "enabled" } else { "disabled" }
        );
        Ok(record)
    }

    /// Deletes a channel key record. Packets it already decoded keep their
    /// plaintext and their `decrypted_by` attribution.
    pub fn delete(&self, id: ChannelId) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "DELETE FROM channel_keys WHERE id = ?1",
                params![id.to_string()],
            )
            .map_err(|e| StoreError::Storage(format!("failed to delete channel key: {e}")))?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        debug!("deleted channel key {}", id);
        Ok(())
    }

    /// Loads one record, key material included.
    pub fn get(&self, id: ChannelId) -> StoreResult<ChannelKeyRecord> {
        let conn = self.conn.lock().unwrap();
        fetch(&conn, id)
    }

    /// Lists all records as non-secret views, in store order.
    pub fn list(&self) -> StoreResult<Vec<ChannelKeyView>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, psk, description, enabled, decrypted_count, last_decrypted_at, created_at
                 FROM channel_keys ORDER BY rowid",
            )
            .map_err(|e| StoreError::Storage(format!("failed to prepare channel list: {e}")))?;
        let rows = stmt
            .query_map([], row_to_raw)
            .map_err(|e| StoreError::Storage(format!("failed to query channel keys: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let raw =
                row.map_err(|e| StoreError::Storage(format!("failed to read channel row: {e}")))?;
            result.push(record_from_raw(raw)?.to_view());
        }
        Ok(result)
    }

    /// Returns the number of stored channel keys.
    pub fn count(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM channel_keys", [], |row| row.get(0))
            .map_err(|e| StoreError::Storage(format!("failed to count channel keys: {e}")))?;
        Ok(count as usize)
    }

    /// Imports a batch of records, validating each independently. One bad
    /// record never blocks the rest.
    pub fn import(
        &self,
        records: Vec<NewChannelKey>,
        enforce_name_validation: bool,
    ) -> ImportReport {
        let mut report = ImportReport::default();
        for new in records {
            let name = new.name.clone();
            match self.create(new, enforce_name_validation) {
                Ok(record) => {
                    report.imported += 1;
                    report.outcomes.push(ImportOutcome {
                        name,
                        result: Ok(record.id),
                    });
                }
                Err(e) => {
                    report.rejected += 1;
                    report.outcomes.push(ImportOutcome {
                        name,
                        result: Err(e),
                    });
                }
            }
        }
        info!(
            "imported {} channel keys, rejected {}",
            report.imported, report.rejected
        );
        report
    }

    // ── Decryption support ───────────────────────────────────────

    /// All enabled keys in store order, ready for decryption attempts.
    pub fn enabled_keys(&self) -> StoreResult<Vec<EnabledKey>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, name, psk FROM channel_keys WHERE enabled = 1 ORDER BY rowid")
            .map_err(|e| StoreError::Storage(format!("failed to prepare enabled keys: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| StoreError::Storage(format!("failed to query enabled keys: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let (id_str, name, psk) =
                row.map_err(|e| StoreError::Storage(format!("failed to read enabled key: {e}")))?;
            let id: ChannelId = id_str
                .parse()
                .map_err(|e| StoreError::Storage(format!("invalid channel id in row: {e}")))?;
            let key = ChannelKey::from_base64(&psk)
                .map_err(|e| StoreError::Storage(format!("corrupt key in channel {id}: {e}")))?;
            result.push(EnabledKey { id, name, key });
        }
        Ok(result)
    }

    /// Credits one decoded packet to a key: bumps its counter and stamps
    /// `last_decrypted_at`.
    ///
    /// Zero affected rows is fine: the key may have been deleted while a
    /// retroactive job was still scanning, and the packet keeps its plaintext.
    pub fn record_decryption(&self, id: ChannelId, at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE channel_keys
             SET decrypted_count = decrypted_count + 1, last_decrypted_at = ?2
             WHERE id = ?1",
            params![id.to_string(), at.to_rfc3339()],
        )
        .map_err(|e| StoreError::Storage(format!("failed to record decryption: {e}")))?;
        Ok(())
    }
}

// ── Row plumbing ─────────────────────────────────────────────────

type RawChannelRow = (
    String,
    String,
    String,
    Option<String>,
    bool,
    i64,
    Option<String>,
    String,
);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawChannelRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn record_from_raw(raw: RawChannelRow) -> StoreResult<ChannelKeyRecord> {
    let (id_str, name, psk, description, enabled, decrypted_count, last_decrypted_at, created_at) =
        raw;
    let id: ChannelId = id_str
        .parse()
        .map_err(|e| StoreError::Storage(format!("invalid channel id in row: {e}")))?;
    let key = ChannelKey::from_base64(&psk)
        .map_err(|e| StoreError::Storage(format!("corrupt key in channel {id}: {e}")))?;
    let last_decrypted_at = match last_decrypted_at {
        Some(ts) => Some(parse_timestamp(&ts)?),
        None => None,
    };
    Ok(ChannelKeyRecord {
        id,
        name,
        key,
        description,
        enabled,
        decrypted_count: decrypted_count.max(0) as u64,
        last_decrypted_at,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn fetch(conn: &Connection, id: ChannelId) -> StoreResult<ChannelKeyRecord> {
    let raw = conn
        .query_row(
            "SELECT id, name, psk, description, enabled, decrypted_count, last_decrypted_at, created_at
             FROM channel_keys WHERE id = ?1",
            params![id.to_string()],
            row_to_raw,
        )
        .optional()
        .map_err(|e| StoreError::Storage(format!("failed to load channel key: {e}")))?;
    match raw {
        Some(raw) => record_from_raw(raw),
        None => Err(StoreError::NotFound(id)),
    }
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Storage(format!("invalid timestamp in channel row: {e}")))
}

fn validate_name(name: &str, enforce: bool) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::NameEmpty);
    }
    if !enforce {
        return Ok(());
    }
    if name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(StoreError::NameInvalid(format!(
            "'{name}' is longer than {MAX_CHANNEL_NAME_LEN} bytes"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(StoreError::NameInvalid(format!(
            "'{name}' contains characters outside ASCII letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}
