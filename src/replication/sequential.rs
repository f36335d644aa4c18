use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::command::{encode_update, Write};
use crate::engine::SetOutcome;
use crate::{transport, KvStore, KvStoreError, KvsEngine, ReplicaAddr, ReplicaConfig, Result};

/// Total order through a single sequencer.
///
/// The sequencer applies each write and queues an `update` for every other replica on a
/// per-peer channel. One sender task per peer drains its channel in order, so every replica
/// applies the writes in the order the sequencer did. Any other replica forwards its `set`
/// to the sequencer and does not apply it locally.
#[derive(Clone, Debug)]
pub struct Sequential {
    store: KvStore,
    sequencer: ReplicaAddr,
    is_sequencer: bool,

    /// Outgoing links, only populated on the sequencer.
    links: Arc<Vec<PeerLink>>,

    order: Arc<Mutex<()>>,
    timeout: Duration,
}

#[derive(Debug)]
struct PeerLink {
    peer: ReplicaAddr,
    tx: mpsc::UnboundedSender<String>,
}

impl PeerLink {
    /// Spawn the ordered sender for `peer`. Must be called from within a tokio runtime.
    fn spawn(peer: ReplicaAddr, timeout: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let target = peer.clone();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                if let Err(e) = transport::send(&target, &request, timeout).await {
                    warn!(peer = %target, "Sequenced update lost: {e}");
                }
            }
        });
        Self { peer, tx }
    }
}

impl Sequential {
    pub fn new(store: KvStore, config: &ReplicaConfig) -> Result<Self> {
        let sequencer = config.sequencer.clone().ok_or(KvStoreError::NoSequencer)?;
        let is_sequencer = sequencer == config.identity.addr;
        let links = if is_sequencer {
            info!(replica = %config.identity.id, "Acting as sequencer");
            config
                .remote_peers()
                .into_iter()
                .map(|peer| PeerLink::spawn(peer, config.timeout))
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            store,
            sequencer,
            is_sequencer,
            links: Arc::new(links),
            order: Arc::new(Mutex::new(())),
            timeout: config.timeout,
        })
    }

    pub fn is_sequencer(&self) -> bool {
        self.is_sequencer
    }
}

impl KvsEngine for Sequential {
    fn store(&self) -> &KvStore {
        &self.store
    }

    async fn set(&self, write: Write) -> Result<SetOutcome> {
        if !self.is_sequencer() {
            let request = format!("set {} {}", write.key, write.value);
            let response = transport::send(&self.sequencer, &request, self.timeout).await?;
            debug!(sequencer = %self.sequencer, response, "Forwarded write");
            return Ok(SetOutcome::Forwarded);
        }

        let _order = self.order.lock().await;
        self.store
            .set(write.key.clone(), write.value.clone())
            .await;
        let request = encode_update(&[Write::new(write.key, write.value)]);
        for link in self.links.iter() {
            if link.tx.send(request.clone()).is_err() {
                warn!(peer = %link.peer, "Sender task is gone, update not queued");
            }
        }
        Ok(SetOutcome::Added)
    }
}
