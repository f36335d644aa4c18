use crate::command::Write;
use crate::engine::SetOutcome;
use crate::{KvStore, KvsEngine, Result};

/// A replica with no awareness of its peers. It simply services requests from its own
/// internal [`KvStore`].
#[derive(Clone, Debug)]
pub struct Standalone {
    store: KvStore,
}

impl Standalone {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }
}

impl KvsEngine for Standalone {
    fn store(&self) -> &KvStore {
        &self.store
    }

    async fn set(&self, write: Write) -> Result<SetOutcome> {
        self.store.set(write.key, write.value).await;
        Ok(SetOutcome::Added)
    }
}
