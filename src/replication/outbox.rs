use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::command::{encode_update, Write};
use crate::{transport, ReplicaAddr};

/// Writes waiting to be gossiped, queued separately for every remote peer.
///
/// Entries keep FIFO order per peer. Nothing orders one peer's queue against another's.
#[derive(Debug, Default)]
pub struct Outbox {
    queues: Vec<(ReplicaAddr, Vec<Write>)>,
}

impl Outbox {
    pub fn new(peers: Vec<ReplicaAddr>) -> Self {
        Self {
            queues: peers.into_iter().map(|peer| (peer, Vec::new())).collect(),
        }
    }

    /// Queue `write` for every peer.
    pub fn enqueue(&mut self, write: Write) {
        for (_, queue) in self.queues.iter_mut() {
            queue.push(write.clone());
        }
    }

    pub fn pending(&self, peer: &ReplicaAddr) -> &[Write] {
        self.queues
            .iter()
            .find(|(addr, _)| addr == peer)
            .map(|(_, queue)| queue.as_slice())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|(_, queue)| queue.is_empty())
    }

    /// Take every non-empty queue, leaving all of them empty.
    fn drain(&mut self) -> Vec<(ReplicaAddr, Vec<Write>)> {
        self.queues
            .iter_mut()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(peer, queue)| (peer.clone(), std::mem::take(queue)))
            .collect()
    }

    /// Send one `update` batch to each peer with pending writes and clear its queue.
    ///
    /// Delivery is at most once: a batch that fails to send is dropped. Returns the number
    /// of peers that acknowledged their batch.
    pub async fn flush(&mut self, timeout: Duration) -> usize {
        let batches = self.drain();
        if batches.is_empty() {
            return 0;
        }

        let sends = batches.iter().map(|(peer, writes)| async move {
            let request = encode_update(writes);
            match transport::send(peer, &request, timeout).await {
                Ok(_) => {
                    debug!(peer = %peer, writes = writes.len(), "Flushed gossip batch");
                    true
                }
                Err(e) => {
                    warn!(peer = %peer, writes = writes.len(), "Dropped gossip batch: {e}");
                    false
                }
            }
        });
        join_all(sends).await.into_iter().filter(|ok| *ok).count()
    }
}
