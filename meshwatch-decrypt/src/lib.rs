//! Live and retroactive packet decryption for MeshWatch.
//!
//! Decryption happens on two paths that share every validation rule:
//!
//! - **Live**: the capture pipeline tries all enabled keys against each
//!   incoming packet ([`decrypt_with_any`]).
//! - **Retroactive**: adding a key later triggers a background scan that
//!   replays the undecoded archive under that key ([`JobSupervisor`]).
//!
//! At most one retroactive job runs at a time. Its progress is published
//! as a [`JobState`] snapshot for polling and persisted across restarts by
//! [`JobStateStore`]; an interrupted scan is reported as failed and can be
//! re-triggered safely, because every successful decode commits as it
//! happens.
//!
//! # Example
//!
//! ```
//! use meshwatch_decrypt::{JobConfig, JobStateStore, JobSupervisor};
//! use meshwatch_store::{ChannelKeyStore, SqlitePacketArchive};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let channels = Arc::new(ChannelKeyStore::open_in_memory()?);
//! let archive = Arc::new(SqlitePacketArchive::open_in_memory()?);
//! let job_state = Arc::new(JobStateStore::open_in_memory()?);
//!
//! let supervisor = JobSupervisor::new(channels, archive, job_state, JobConfig::default())?;
//! # Ok(())
//! # }
//! ```

mod error;
mod job;
mod live;
mod state;
mod state_store;
mod supervisor;

pub use error::{DecryptError, DecryptResult};
pub use job::JobConfig;
pub use live::{decrypt_with_any, LiveDecode};
pub use state::{JobState, JobStatus};
pub use state_store::JobStateStore;
pub use supervisor::JobSupervisor;
