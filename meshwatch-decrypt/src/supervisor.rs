//! Single-flight admission and status reporting for retroactive jobs.
//!
//! At most one scan exists per supervisor, and one supervisor per engine.
//! Two jobs racing to claim the same undecoded packet under different keys
//! is therefore impossible by construction.

use crate::error::{DecryptError, DecryptResult};
use crate::job::{JobConfig, RetroJob};
use crate::state::JobState;
use crate::state_store::JobStateStore;
use meshwatch_store::{ChannelKeyStore, PacketArchive, StoreError};
use meshwatch_types::ChannelId;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Owns the job-state slot and decides which triggers get to run.
pub struct JobSupervisor {
    channels: Arc<ChannelKeyStore>,
    archive: Arc<dyn PacketArchive>,
    state_store: Arc<JobStateStore>,
    state: Arc<RwLock<JobState>>,
    config: JobConfig,
}

impl JobSupervisor {
    /// Creates the supervisor and runs restart recovery.
    ///
    /// A persisted `Pending`/`Running` state means the process died
    /// mid-scan. Scan progress is not durable, so the slot is reported as
    /// failed; committed per-packet decodes are unaffected and a fresh
    /// trigger resumes over whatever is still undecoded.
    pub fn new(
        channels: Arc<ChannelKeyStore>,
        archive: Arc<dyn PacketArchive>,
        state_store: Arc<JobStateStore>,
        config: JobConfig,
    ) -> DecryptResult<Self> {
        let mut state = state_store.load()?.unwrap_or_default();

        if state.status.is_active() {
            warn!(
                "found a {} decryption job from a previous run; marking it failed",
                state.status
            );
            state.fail("interrupted by process restart");
            state_store.save(&state)?;
        }

        Ok(Self {
            channels,
            archive,
            state_store,
            state: Arc::new(RwLock::new(state)),
            config,
        })
    }

    /// Snapshot of the current job state. Cheap enough to poll every second.
    pub async fn status(&self) -> JobState {
        self.state.read().await.clone()
    }

    /// Admits and spawns a retroactive decryption job for one channel key.
    ///
    /// Returns the initial `Pending` snapshot immediately; progress and the
    /// terminal outcome are observed via [`status`](Self::status).
    pub async fn trigger(&self, channel_id: ChannelId) -> DecryptResult<JobState> {
        // Resolve the key before taking the slot, so admission errors never
        // perturb the published state.
        let channels = self.channels.clone();
        let record = tokio::task::spawn_blocking(move || channels.get(channel_id))
            .await
            .map_err(|e| StoreError::Storage(format!("blocking task panicked: {e}")))?;
        let record = match record {
            Ok(record) => record,
            Err(StoreError::NotFound(id)) => return Err(DecryptError::ChannelNotFound(id)),
            Err(e) => return Err(e.into()),
        };
        if !record.enabled {
            return Err(DecryptError::ChannelDisabled(channel_id));
        }

        // Check-and-set under the write lock: at most one active job.
        let snapshot = {
            let mut state = self.state.write().await;
            if state.status.is_active() {
                return Err(DecryptError::Busy);
            }
            *state = JobState::pending(channel_id, record.name.clone());
            state.clone()
        };

        // Best effort: an unsaved Pending only costs restart fidelity.
        let store = self.state_store.clone();
        let to_save = snapshot.clone();
        let saved = tokio::task::spawn_blocking(move || store.save(&to_save))
            .await
            .unwrap_or_else(|e| {
                warn!("spawn_blocking panicked saving job state: {}", e);
                Ok(())
            });
        if let Err(e) = saved {
            warn!("failed to persist pending job state: {}", e);
        }

        info!(
            "retroactive decryption admitted for channel {} ({})",
            channel_id, record.name
        );

        let job = RetroJob {
            channels: self.channels.clone(),
            archive: self.archive.clone(),
            state_store: self.state_store.clone(),
            state: self.state.clone(),
            config: self.config.clone(),
            channel_id,
            key: record.key,
        };
        tokio::spawn(job.run());

        Ok(snapshot)
    }
}
