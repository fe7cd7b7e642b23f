//! The retroactive decryption scan.
//!
//! A job walks every undecoded packet in the archive once, in arrival
//! order, attempting each under a single candidate key. Successful decodes
//! commit immediately, so a failed or interrupted scan never loses work:
//! re-triggering picks up whatever is still undecoded.

use crate::state::JobState;
use crate::state_store::JobStateStore;
use chrono::Utc;
use meshwatch_crypto::{attempt_decrypt, ChannelKey};
use meshwatch_store::{ChannelKeyStore, PacketArchive, StoreError, StoreResult};
use meshwatch_types::{ChannelId, PacketId};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Configuration for the retroactive scan.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Packets fetched per archive query.
    pub batch_size: usize,
    /// Persist the shared state after this many processed packets.
    pub persist_every: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            persist_every: 256,
        }
    }
}

/// One admitted scan over the undecoded backlog.
///
/// The job is the single writer of the shared [`JobState`]; the supervisor
/// and pollers only read it.
pub(crate) struct RetroJob {
    pub(crate) channels: Arc<ChannelKeyStore>,
    pub(crate) archive: Arc<dyn PacketArchive>,
    pub(crate) state_store: Arc<JobStateStore>,
    pub(crate) state: Arc<RwLock<JobState>>,
    pub(crate) config: JobConfig,
    pub(crate) channel_id: ChannelId,
    pub(crate) key: ChannelKey,
}

impl RetroJob {
    /// Runs the scan to a terminal state and publishes it.
    pub(crate) async fn run(self) {
        match self.scan().await {
            Ok(()) => {
                let (processed, decrypted) = {
                    let mut state = self.state.write().await;
                    state.complete();
                    (state.processed, state.decrypted)
                };
                self.persist().await;
                info!(
                    "retroactive decryption completed: {} of {} packets decoded",
                    decrypted, processed
                );
            }
            Err(e) => {
                {
                    let mut state = self.state.write().await;
                    state.fail(e.to_string());
                }
                self.persist().await;
                warn!("retroactive decryption failed: {}", e);
            }
        }
    }

    /// Walks the backlog in batches, committing each successful decode as
    /// it happens. Counters live in job-local variables and are mirrored
    /// into the shared state after every packet.
    async fn scan(&self) -> StoreResult<()> {
        let archive = self.archive.clone();
        let total = blocking(move || archive.count_undecoded()).await?;

        self.state.write().await.begin(total);
        self.persist().await;
        info!(
            "retroactive decryption started for channel {}: {} undecoded packets",
            self.channel_id, total
        );

        let mut cursor: Option<PacketId> = None;
        let mut processed: u64 = 0;
        let mut decrypted: u64 = 0;
        let mut since_persist: u64 = 0;

        'scan: while processed < total {
            let archive = self.archive.clone();
            let after = cursor;
            let limit = self.config.batch_size;
            let batch = blocking(move || archive.fetch_undecoded(after, limit)).await?;
            if batch.is_empty() {
                // fewer undecoded packets than counted; stop rather than spin
                break;
            }

            for packet in batch {
                cursor = Some(packet.id);

                // Failure is the expected majority outcome: the packet
                // simply belongs to some other channel.
                if let Some(decoded) = attempt_decrypt(
                    &self.key,
                    packet.packet_id,
                    packet.from_node,
                    &packet.ciphertext,
                ) {
                    let archive = self.archive.clone();
                    let channels = self.channels.clone();
                    let channel_id = self.channel_id;
                    let id = packet.id;
                    blocking(move || {
                        archive.mark_decoded(id, &decoded.plaintext, channel_id)?;
                        channels.record_decryption(channel_id, Utc::now())
                    })
                    .await?;
                    decrypted += 1;
                }
                processed += 1;
                since_persist += 1;

                {
                    let mut state = self.state.write().await;
                    state.processed = processed;
                    state.decrypted = decrypted;
                }

                if since_persist >= self.config.persist_every {
                    since_persist = 0;
                    self.persist().await;
                }

                // packets inserted after the count are left for the next run
                if processed >= total {
                    break 'scan;
                }
            }

            debug!(
                "scan progress: {}/{} packets, {} decoded",
                processed, total, decrypted
            );
        }

        Ok(())
    }

    /// Persists the current shared state, best effort. A failed save only
    /// costs restart-recovery fidelity, never the scan itself.
    async fn persist(&self) {
        let snapshot = self.state.read().await.clone();
        let store = self.state_store.clone();
        let result = tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .unwrap_or_else(|e| {
                warn!("spawn_blocking panicked saving job state: {}", e);
                Ok(())
            });
        if let Err(e) = result {
            warn!("failed to persist job state: {}", e);
        }
    }
}

/// Runs a blocking store or archive call off the async runtime.
async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(StoreError::Storage(format!("blocking task panicked: {e}"))),
    }
}
