//! Persistent storage for the retroactive decryption job state.
//!
//! A single-row SQLite table holding the last published `JobState` as JSON.
//! Kept in its own file so engine restarts can tell whether a scan was cut
//! short, without touching the key or packet databases.

use crate::state::JobState;
use meshwatch_store::{StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// Persistent store for the job-state singleton backed by SQLite.
pub struct JobStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl JobStateStore {
    /// Opens (or creates) a job-state store at the given path.
    pub fn new(path: &str) -> StoreResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Storage(format!("failed to open job-state store: {e}")))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory job-state store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::Storage(format!("failed to open in-memory job-state store: {e}"))
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
            CREATE TABLE IF NOT EXISTS job_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| StoreError::Storage(format!("failed to init job-state schema: {e}")))?;
        Ok(())
    }

    /// Replaces the persisted state with the given snapshot.
    pub fn save(&self, state: &JobState) -> StoreResult<()> {
        let json = serde_json::to_string(state)
            .map_err(|e| StoreError::Storage(format!("failed to encode job state: {e}")))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO job_state (id, state) VALUES (1, ?1)",
            params![json],
        )
        .map_err(|e| StoreError::Storage(format!("failed to save job state: {e}")))?;
        Ok(())
    }

    /// Loads the persisted state, or `None` if nothing was ever saved.
    pub fn load(&self) -> StoreResult<Option<JobState>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row("SELECT state FROM job_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| StoreError::Storage(format!("failed to load job state: {e}")))?;

        match json {
            Some(json) => {
                let state = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Storage(format!("corrupt job state: {e}")))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }
}
