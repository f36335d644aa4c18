//! A teaching-grade replicated key-value store.
//!
//! Every replica owns a [`KvStore`] and serves a line-based text protocol over TCP. The
//! replication behaviour is chosen once at startup from one of the [`Scheme`]s: eventual
//! (queued gossip), linear (synchronous fan-out), sequential (single sequencer) or causal
//! (per-origin timestamp gate).

pub mod address;
pub mod client;
pub mod command;
pub mod config;
mod engine;
mod error;
pub mod replication;
pub mod server;
mod store;
pub mod transport;

pub use address::{ReplicaAddr, ReplicaIdentity};
pub use config::{ClusterSettings, OutputConfig, ReplicaConfig};
pub use engine::{KvsEngine, SetOutcome};
pub use error::KvStoreError;
pub use replication::{Engine, Scheme};
pub use server::{Replica, ReplicaServer};
pub use store::KvStore;

use tracing_subscriber::filter::LevelFilter;

pub type Result<T> = std::result::Result<T, KvStoreError>;

/// Reply for a `set` that was applied locally.
pub const KEY_ADDED: &str = "Key-value pair added";
/// Reply for a `set` that a non-sequencer handed to the sequencer.
pub const KEY_FORWARDED: &str = "Key-value pair forwarded to sequencer";
/// Reply for a causal write whose timestamp did not advance its origin's clock.
pub const STALE_WRITE: &str = "Stale write ignored";
pub const KEY_DELETED: &str = "Key deleted";
pub const KEY_NOT_FOUND: &str = "Key does not exist";
pub const UPDATE_OK: &str = "Update successful";
pub const SAVE_OK: &str = "Save successful";
pub const INVALID_COMMAND: &str = "Invalid command";

/// Install the global `fmt` subscriber used by the binaries. Logs go to stderr.
pub fn setup_logging(level: LevelFilter) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
