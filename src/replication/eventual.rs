use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::outbox::Outbox;
use crate::command::Write;
use crate::engine::SetOutcome;
use crate::{KvStore, KvsEngine, ReplicaConfig, Result};

/// Anti-entropy by gossip.
///
/// A local `set` is applied immediately and queued for every other replica. By default the
/// queues are flushed right away; with a gossip interval configured they are flushed by a
/// background task instead, so peers can lag by up to one interval.
#[derive(Clone, Debug)]
pub struct Eventual {
    store: KvStore,

    /// Held from the local write through the flush so queue order matches apply order.
    outbox: Arc<Mutex<Outbox>>,

    timeout: Duration,
    gossip_interval: Option<Duration>,
}

impl Eventual {
    pub fn new(store: KvStore, config: &ReplicaConfig) -> Self {
        Self {
            store,
            outbox: Arc::new(Mutex::new(Outbox::new(config.remote_peers()))),
            timeout: config.timeout,
            gossip_interval: config.gossip_interval,
        }
    }

    /// Flush every pending queue now. Returns the number of peers reached.
    pub async fn flush(&self) -> usize {
        self.outbox.lock().await.flush(self.timeout).await
    }

    pub async fn has_pending(&self) -> bool {
        !self.outbox.lock().await.is_empty()
    }

    /// Start the periodic flush task when a gossip interval is configured.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_gossip(&self) -> Option<JoinHandle<()>> {
        let period = self.gossip_interval?;
        let this = self.clone();
        info!(?period, "Starting periodic gossip");
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reached = this.flush().await;
                if reached > 0 {
                    debug!(reached, "Periodic gossip round");
                }
            }
        }))
    }
}

impl KvsEngine for Eventual {
    fn store(&self) -> &KvStore {
        &self.store
    }

    async fn set(&self, write: Write) -> Result<SetOutcome> {
        let mut outbox = self.outbox.lock().await;
        self.store
            .set(write.key.clone(), write.value.clone())
            .await;
        outbox.enqueue(Write::new(write.key, write.value));
        if self.gossip_interval.is_none() {
            outbox.flush(self.timeout).await;
        }
        Ok(SetOutcome::Added)
    }
}
