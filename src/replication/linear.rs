use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::command::{encode_update, Write};
use crate::engine::SetOutcome;
use crate::{transport, KvStore, KvsEngine, ReplicaAddr, ReplicaConfig, Result};

/// Synchronous fan-out: `set` returns only after every peer's exchange has completed.
///
/// Each peer gets its own future that resolves once its `update` exchange returns, whether
/// that exchange succeeded, failed or timed out, so an unreachable peer delays the writer by
/// at most the transport timeout.
#[derive(Clone, Debug)]
pub struct Linear {
    store: KvStore,
    peers: Arc<Vec<ReplicaAddr>>,

    /// Serializes local writes so peers see them in the order they were applied here.
    order: Arc<Mutex<()>>,

    timeout: Duration,
    latency: Option<Duration>,
}

impl Linear {
    pub fn new(store: KvStore, config: &ReplicaConfig) -> Self {
        Self {
            store,
            peers: Arc::new(config.remote_peers()),
            order: Arc::new(Mutex::new(())),
            timeout: config.timeout,
            latency: config.linear_latency,
        }
    }

    /// Send `request` to `peer` and resolve once the exchange is over.
    async fn acknowledge(&self, peer: &ReplicaAddr, request: &str) -> bool {
        let delivered = match transport::send(peer, request, self.timeout).await {
            Ok(_) => true,
            Err(e) => {
                warn!(peer = %peer, "Replication failed: {e}");
                false
            }
        };
        if let Some(max) = self.latency {
            tokio::time::sleep(random_delay(max)).await;
        }
        delivered
    }
}

fn random_delay(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

impl KvsEngine for Linear {
    fn store(&self) -> &KvStore {
        &self.store
    }

    async fn set(&self, write: Write) -> Result<SetOutcome> {
        let _order = self.order.lock().await;
        self.store
            .set(write.key.clone(), write.value.clone())
            .await;

        let request = encode_update(&[Write::new(write.key, write.value)]);
        let acks = join_all(
            self.peers
                .iter()
                .map(|peer| self.acknowledge(peer, &request)),
        )
        .await;
        debug!(
            acknowledged = acks.iter().filter(|ok| **ok).count(),
            peers = acks.len(),
            "Linear write complete"
        );
        Ok(SetOutcome::Added)
    }
}
