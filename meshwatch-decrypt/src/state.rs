//! Retroactive decryption job state.
//!
//! One `JobState` value describes the single job the engine runs at a time.
//! It is shared behind `Arc<RwLock<_>>` for cheap status polling and
//! persisted across restarts by [`JobStateStore`](crate::JobStateStore).

use chrono::{DateTime, Utc};
use meshwatch_types::ChannelId;
use serde::{Deserialize, Serialize};

/// Lifecycle of the retroactive decryption job.
///
/// Transitions are forward-only within a run: `Idle → Pending → Running →
/// Completed | Failed`. A new trigger replaces a terminal state with a fresh
/// `Pending` snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No job has run since startup.
    Idle,
    /// A job was admitted but has not started scanning yet.
    Pending,
    /// The scan is in progress.
    Running,
    /// The scan covered every packet it set out to.
    Completed,
    /// The scan stopped early; `JobState::error` says why.
    Failed,
}

impl JobStatus {
    /// True while a job holds the single-flight slot.
    pub const fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// True once a job has finished, successfully or not.
    pub const fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobStatus::Idle => "idle",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Snapshot of the retroactive decryption job, as reported to pollers.
///
/// Counters are non-decreasing within a run: `processed` counts every packet
/// the scan has attempted, `decrypted` the subset that produced a valid
/// frame, and `processed <= total` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
    /// Key the job is scanning with.
    pub channel_id: Option<ChannelId>,
    /// Channel name at trigger time, for display.
    pub channel_name: Option<String>,
    /// Undecoded packets counted when the scan started.
    pub total: u64,
    /// Packets attempted so far.
    pub processed: u64,
    /// Packets that decoded to a valid frame.
    pub decrypted: u64,
    /// Populated only when `status` is `Failed`.
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobState {
    /// The state before any job has been triggered.
    pub fn idle() -> Self {
        Self {
            status: JobStatus::Idle,
            channel_id: None,
            channel_name: None,
            total: 0,
            processed: 0,
            decrypted: 0,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// A freshly admitted job for the given channel, counters zeroed.
    pub fn pending(channel_id: ChannelId, channel_name: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Pending,
            channel_id: Some(channel_id),
            channel_name: Some(channel_name.into()),
            ..Self::idle()
        }
    }

    /// Marks the scan started over `total` undecoded packets.
    pub fn begin(&mut self, total: u64) {
        self.status = JobStatus::Running;
        self.total = total;
        self.started_at = Some(Utc::now());
    }

    /// Marks the scan finished successfully.
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Marks the scan failed with the given reason.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(message.into());
        self.finished_at = Some(Utc::now());
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::idle()
    }
}
