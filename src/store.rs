use crate::command::{Stamp, Write};
use crate::{KvStoreError, Result};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// The base mutating key-value map of a single replica.
///
/// Values and the per-origin vector clock are kept in [`DashMap`]s so reads never wait.
/// Every mutation and every snapshot goes through `writer`, which linearizes the writes
/// issued by concurrently served connections and keeps snapshot output from interleaving.
#[derive(Clone, Debug, Default)]
pub struct KvStore {
    data: Arc<DashMap<String, String>>,

    /// Highest timestamp applied per origin replica. Only the causal scheme populates it.
    clock: Arc<DashMap<String, u64>>,

    writer: Arc<Mutex<()>>,
}

impl KvStore {
    pub fn new() -> KvStore {
        KvStore::default()
    }

    /// Rebuild a store from a snapshot file previously written by [`KvStore::snapshot`].
    pub async fn load<P>(path: P) -> Result<KvStore>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| KvStoreError::FileError {
                source,
                filename: path.display().to_string(),
            })?;

        let store = KvStore::new();
        for (n, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) =
                line.split_once(' ')
                    .ok_or_else(|| KvStoreError::MalformedSnapshot {
                        filename: path.display().to_string(),
                        line: n + 1,
                    })?;
            store.data.insert(key.to_string(), value.to_string());
        }
        info!(file = %path.display(), entries = store.len(), "Loaded snapshot");
        Ok(store)
    }

    /// Retrieve the value of a key from the store.
    /// If the key does not exist, then [`None`] is returned.
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|v| v.value().clone())
    }

    /// Set the value of a key, overwriting any previous value.
    pub async fn set(&self, key: String, value: String) {
        let _guard = self.writer.lock().await;
        debug!(key, value, "Setting key");
        self.data.insert(key, value);
    }

    /// Remove a key from the store.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        match self.data.remove(key) {
            Some(_) => {
                debug!(key, "Removed key");
                Ok(())
            }
            None => Err(KvStoreError::RemoveOperationWithNoKey),
        }
    }

    /// Apply a batch of writes in order, returning how many of them took effect.
    ///
    /// Unstamped writes always apply. Stamped writes pass through the same gate as
    /// [`KvStore::apply_stamped`].
    pub async fn bulk_update(&self, writes: &[Write]) -> usize {
        let _guard = self.writer.lock().await;
        let mut applied = 0;
        for write in writes {
            let took_effect = match &write.stamp {
                None => {
                    self.data.insert(write.key.clone(), write.value.clone());
                    true
                }
                Some(stamp) => self.gate(&write.key, &write.value, stamp),
            };
            if took_effect {
                applied += 1;
            }
        }
        applied
    }

    /// Apply a causally tagged write only if its timestamp is newer than anything already
    /// applied from the same origin. Stale writes leave both the value and the clock untouched.
    pub async fn apply_stamped(&self, key: &str, value: &str, stamp: &Stamp) -> bool {
        let _guard = self.writer.lock().await;
        self.gate(key, value, stamp)
    }

    /// Stamp a local write with the next timestamp for `origin` and apply it.
    pub async fn apply_local(&self, key: &str, value: &str, origin: &str) -> Stamp {
        let _guard = self.writer.lock().await;
        let timestamp = self.timestamp(origin).unwrap_or(0) + 1;
        let stamp = Stamp::new(origin, timestamp);
        self.gate(key, value, &stamp);
        stamp
    }

    // Callers must hold `writer`.
    fn gate(&self, key: &str, value: &str, stamp: &Stamp) -> bool {
        if let Some(seen) = self.timestamp(&stamp.origin) {
            if stamp.timestamp <= seen {
                debug!(
                    key,
                    origin = stamp.origin,
                    timestamp = stamp.timestamp,
                    seen,
                    "Rejected stale write"
                );
                return false;
            }
        }
        self.data.insert(key.to_string(), value.to_string());
        self.clock.insert(stamp.origin.clone(), stamp.timestamp);
        true
    }

    /// The last timestamp applied from `origin`, if any.
    pub fn timestamp(&self, origin: &str) -> Option<u64> {
        self.clock.get(origin).map(|t| *t.value())
    }

    /// All entries sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .data
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Overwrite `path` with every entry, one `key value` line each, sorted by key.
    ///
    /// Missing parent directories are created.
    pub async fn snapshot<P>(&self, path: P) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let _guard = self.writer.lock().await;
        write_lines(path.as_ref(), self.entries()).await
    }

    /// Like [`KvStore::snapshot`], also writing the per-origin clock to `clock_path` as
    /// `origin timestamp` lines. Both files are taken under the same write lock, so they
    /// always describe the same state.
    pub async fn snapshot_with_clock<P, Q>(&self, path: P, clock_path: Q) -> Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let _guard = self.writer.lock().await;
        write_lines(path.as_ref(), self.entries()).await?;
        let mut clock: Vec<(String, u64)> = self
            .clock
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        clock.sort();
        write_lines(clock_path.as_ref(), clock).await
    }

    /// Merge a clock file written by [`KvStore::snapshot_with_clock`]. Each origin keeps the
    /// higher of its current and stored timestamps.
    pub async fn restore_clock<P>(&self, path: P) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| KvStoreError::FileError {
                source,
                filename: path.display().to_string(),
            })?;

        let _guard = self.writer.lock().await;
        for (n, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let malformed = || KvStoreError::MalformedSnapshot {
                filename: path.display().to_string(),
                line: n + 1,
            };
            let (origin, timestamp) = line.split_once(' ').ok_or_else(malformed)?;
            let timestamp: u64 = timestamp.parse().map_err(|_| malformed())?;
            let mut seen = self.clock.entry(origin.to_string()).or_insert(timestamp);
            if *seen < timestamp {
                *seen = timestamp;
            }
        }
        info!(file = %path.display(), origins = self.clock.len(), "Restored clock");
        Ok(())
    }
}

async fn write_lines<K, V>(path: &Path, lines: Vec<(K, V)>) -> Result<()>
where
    K: std::fmt::Display,
    V: std::fmt::Display,
{
    let file_error = |source| KvStoreError::FileError {
        source,
        filename: path.display().to_string(),
    };

    let mut contents = String::new();
    for (key, value) in lines {
        contents.push_str(&format!("{key} {value}\n"));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(file_error)?;
    }
    tokio::fs::write(path, contents).await.map_err(file_error)?;
    debug!(file = %path.display(), "Wrote snapshot");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn stale_stamp_is_rejected() {
        let store = KvStore::new();
        assert!(
            store
                .apply_stamped("a", "5", &Stamp::new("replica_1", 5))
                .await
        );
        assert!(
            !store
                .apply_stamped("a", "1", &Stamp::new("replica_1", 1))
                .await
        );
        assert!(
            !store
                .apply_stamped("a", "7", &Stamp::new("replica_1", 5))
                .await
        );
        assert_eq!(store.get("a"), Some("5".to_string()));
        assert_eq!(store.timestamp("replica_1"), Some(5));
    }

    #[tokio::test]
    async fn origins_are_gated_independently() {
        let store = KvStore::new();
        store
            .apply_stamped("a", "5", &Stamp::new("replica_1", 5))
            .await;
        assert!(
            store
                .apply_stamped("a", "2", &Stamp::new("replica_2", 1))
                .await
        );
        assert_eq!(store.get("a"), Some("2".to_string()));
    }

    #[tokio::test]
    async fn local_writes_advance_own_clock() {
        let store = KvStore::new();
        let first = store.apply_local("a", "1", "replica_0").await;
        let second = store.apply_local("b", "2", "replica_0").await;
        assert_eq!(first, Stamp::new("replica_0", 1));
        assert_eq!(second, Stamp::new("replica_0", 2));
        assert_eq!(store.timestamp("replica_0"), Some(2));
    }

    #[tokio::test]
    async fn bulk_update_counts_applied_writes() {
        let store = KvStore::new();
        let applied = store
            .bulk_update(&[
                Write::new("a", "1"),
                Write::stamped("b", "2", Stamp::new("replica_1", 2)),
                Write::stamped("b", "3", Stamp::new("replica_1", 1)),
            ])
            .await;
        assert_eq!(applied, 2);
        assert_eq!(store.get("a"), Some("1".to_string()));
        assert_eq!(store.get("b"), Some("2".to_string()));
    }

    #[tokio::test]
    async fn clock_survives_snapshot_and_restore() {
        let dir = tempfile::TempDir::new().unwrap();
        let data = dir.path().join("replica_0_kvstore.txt");
        let clock = dir.path().join("replica_0_kvstore.txt.clock");

        let store = KvStore::new();
        store.apply_local("a", "1", "replica_0").await;
        store.apply_local("a", "2", "replica_0").await;
        store
            .apply_stamped("b", "9", &Stamp::new("replica_1", 4))
            .await;
        store.snapshot_with_clock(&data, &clock).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&clock).unwrap(),
            "replica_0 2\nreplica_1 4\n"
        );

        let restored = KvStore::load(&data).await.unwrap();
        restored.restore_clock(&clock).await.unwrap();
        assert_eq!(
            restored.apply_local("c", "3", "replica_0").await,
            Stamp::new("replica_0", 3)
        );
        assert!(
            !restored
                .apply_stamped("b", "0", &Stamp::new("replica_1", 4))
                .await
        );
    }
}
