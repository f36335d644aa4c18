use std::fmt::Display;
use std::future::Future;

use crate::command::Write;
use crate::{KvStore, Result};
use crate::{KEY_ADDED, KEY_FORWARDED, STALE_WRITE};

/// What a `set` did locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Written to the local map (and replicated as the scheme dictates).
    Added,
    /// Handed to the sequencer without touching the local map.
    Forwarded,
    /// A causal write whose timestamp was not newer than its origin's clock.
    Stale,
}

impl Display for SetOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => f.write_str(KEY_ADDED),
            Self::Forwarded => f.write_str(KEY_FORWARDED),
            Self::Stale => f.write_str(STALE_WRITE),
        }
    }
}

/// The capability set shared by every consistency scheme.
///
/// Reads, deletes and incoming `update` batches only ever touch the local map; `set` is
/// where the schemes differ.
pub trait KvsEngine: Clone + Send + Sync + 'static {
    /// The local map backing this replica.
    fn store(&self) -> &KvStore;

    fn set(&self, write: Write) -> impl Future<Output = Result<SetOutcome>> + Send;

    fn get(&self, key: &str) -> Option<String> {
        self.store().get(key)
    }

    /// Deletes are local only, no scheme replicates them.
    fn remove(&self, key: String) -> impl Future<Output = Result<()>> + Send {
        async move { self.store().remove(&key).await }
    }

    /// Apply a batch received from a peer. Returns how many writes took effect.
    fn update(&self, writes: Vec<Write>) -> impl Future<Output = Result<usize>> + Send {
        async move { Ok(self.store().bulk_update(&writes).await) }
    }
}
