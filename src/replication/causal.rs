use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use super::outbox::Outbox;
use crate::command::Write;
use crate::engine::SetOutcome;
use crate::{KvStore, KvsEngine, ReplicaConfig, Result};

/// Gossip carrying per-origin timestamps.
///
/// A write without a stamp is a local one and gets this replica's next timestamp. Stamped
/// writes only apply when they advance their origin's clock. Applied writes are queued for
/// every peer as `key value origin timestamp` groups and flushed immediately.
///
/// Writes from different origins are not ordered against each other: the gate compares a
/// write with the last one seen from the same origin only.
#[derive(Clone, Debug)]
pub struct Causal {
    store: KvStore,
    origin: String,
    outbox: Arc<Mutex<Outbox>>,
    timeout: Duration,
}

impl Causal {
    pub fn new(store: KvStore, config: &ReplicaConfig) -> Self {
        Self {
            store,
            origin: config.identity.id.clone(),
            outbox: Arc::new(Mutex::new(Outbox::new(config.remote_peers()))),
            timeout: config.timeout,
        }
    }
}

impl KvsEngine for Causal {
    fn store(&self) -> &KvStore {
        &self.store
    }

    async fn set(&self, write: Write) -> Result<SetOutcome> {
        let mut outbox = self.outbox.lock().await;
        let stamped = match write.stamp {
            None => {
                let stamp = self
                    .store
                    .apply_local(&write.key, &write.value, &self.origin)
                    .await;
                Write::stamped(write.key, write.value, stamp)
            }
            Some(stamp) => {
                if !self
                    .store
                    .apply_stamped(&write.key, &write.value, &stamp)
                    .await
                {
                    return Ok(SetOutcome::Stale);
                }
                Write::stamped(write.key, write.value, stamp)
            }
        };

        debug!(key = stamped.key, stamp = ?stamped.stamp, "Queued causal write");
        outbox.enqueue(stamped);
        outbox.flush(self.timeout).await;
        Ok(SetOutcome::Added)
    }
}
