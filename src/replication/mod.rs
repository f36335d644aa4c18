//! The consistency schemes a replica can run.
//!
//! A scheme is picked once, when the replica is constructed, and the resulting [`Engine`]
//! wraps the replica's [`KvStore`] for the rest of its life.

mod causal;
mod eventual;
mod linear;
mod outbox;
mod sequential;
mod standalone;

use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub use causal::Causal;
pub use eventual::Eventual;
pub use linear::Linear;
pub use outbox::Outbox;
pub use sequential::Sequential;
pub use standalone::Standalone;

use crate::command::{UpdateFormat, Write};
use crate::engine::SetOutcome;
use crate::{KvStore, KvsEngine, ReplicaConfig, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    None,
    Eventual,
    Linear,
    Sequential,
    Causal,
}

impl Scheme {
    /// How incoming `update` arguments are grouped under this scheme.
    pub fn update_format(&self) -> UpdateFormat {
        match self {
            Scheme::Causal => UpdateFormat::Stamped,
            _ => UpdateFormat::Pairs,
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::None => write!(f, "none"),
            Scheme::Eventual => write!(f, "eventual"),
            Scheme::Linear => write!(f, "linear"),
            Scheme::Sequential => write!(f, "sequential"),
            Scheme::Causal => write!(f, "causal"),
        }
    }
}

impl From<Scheme> for clap::builder::OsStr {
    fn from(value: Scheme) -> Self {
        value.to_string().into()
    }
}

/// One of the schemes, carrying its scheme-specific state.
#[derive(Clone, Debug)]
pub enum Engine {
    Standalone(Standalone),
    Eventual(Eventual),
    Linear(Linear),
    Sequential(Sequential),
    Causal(Causal),
}

impl Engine {
    /// Wrap `store` in the scheme named by `config`.
    ///
    /// Background tasks (periodic gossip, sequencer links) are spawned here, so this must be
    /// called from within a tokio runtime.
    pub fn new(store: KvStore, config: &ReplicaConfig) -> Result<Self> {
        let engine = match config.scheme {
            Scheme::None => Engine::Standalone(Standalone::new(store)),
            Scheme::Eventual => {
                let eventual = Eventual::new(store, config);
                eventual.start_gossip();
                Engine::Eventual(eventual)
            }
            Scheme::Linear => Engine::Linear(Linear::new(store, config)),
            Scheme::Sequential => Engine::Sequential(Sequential::new(store, config)?),
            Scheme::Causal => Engine::Causal(Causal::new(store, config)),
        };
        Ok(engine)
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            Engine::Standalone(_) => Scheme::None,
            Engine::Eventual(_) => Scheme::Eventual,
            Engine::Linear(_) => Scheme::Linear,
            Engine::Sequential(_) => Scheme::Sequential,
            Engine::Causal(_) => Scheme::Causal,
        }
    }
}

impl KvsEngine for Engine {
    fn store(&self) -> &KvStore {
        match self {
            Engine::Standalone(e) => e.store(),
            Engine::Eventual(e) => e.store(),
            Engine::Linear(e) => e.store(),
            Engine::Sequential(e) => e.store(),
            Engine::Causal(e) => e.store(),
        }
    }

    async fn set(&self, write: Write) -> Result<SetOutcome> {
        match self {
            Engine::Standalone(e) => e.set(write).await,
            Engine::Eventual(e) => e.set(write).await,
            Engine::Linear(e) => e.set(write).await,
            Engine::Sequential(e) => e.set(write).await,
            Engine::Causal(e) => e.set(write).await,
        }
    }
}
