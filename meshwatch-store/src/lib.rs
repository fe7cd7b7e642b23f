//! SQLite persistence for Meshwatch.
//!
//! Two stores, deliberately separate:
//! - [`ChannelKeyStore`]: channel key records, normalized before they are
//!   written, listed in store order
//! - [`SqlitePacketArchive`]: captured packets with their decode state;
//!   the decryption engine consumes it through the [`PacketArchive`] trait
//!
//! All operations are synchronous; async callers wrap them in blocking
//! tasks. Connections are `Arc<Mutex<_>>`-shared, so stores are cheap to
//! hand to background jobs.

mod channels;
mod error;
mod packets;

pub use channels::{
    ChannelKeyPatch, ChannelKeyRecord, ChannelKeyStore, ChannelKeyView, EnabledKey, ImportOutcome,
    ImportReport, NewChannelKey, MAX_CHANNEL_NAME_LEN,
};
pub use error::{StoreError, StoreResult};
pub use packets::{ArchivedPacket, EncryptedPacket, NewPacket, PacketArchive, SqlitePacketArchive};
