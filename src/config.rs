//! Plain configuration values consumed by the replica core.
//!
//! Binaries build these from command line flags and environment variables. The
//! cluster launcher can additionally read a [`ClusterSettings`] JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::DEFAULT_TIMEOUT;
use crate::{KvStoreError, ReplicaAddr, ReplicaIdentity, Result, Scheme};

pub const DEFAULT_OUTPUT_LOCATION: &str = "./results";
pub const DEFAULT_OUTPUT_SUFFIX: &str = "kvstore.txt";

/// Where a replica writes its snapshot: `<location>/<replica id>_<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub location: PathBuf,
    pub suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            location: PathBuf::from(DEFAULT_OUTPUT_LOCATION),
            suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
        }
    }
}

impl OutputConfig {
    pub fn new(location: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            suffix: suffix.into(),
        }
    }

    pub fn snapshot_path(&self, replica_id: &str) -> PathBuf {
        self.location.join(format!("{}_{}", replica_id, self.suffix))
    }

    /// The causal clock is kept next to the snapshot, with a `.clock` extension appended.
    pub fn clock_path(&self, replica_id: &str) -> PathBuf {
        self.location.join(format!("{}_{}.clock", replica_id, self.suffix))
    }
}

#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub identity: ReplicaIdentity,
    pub scheme: Scheme,

    /// Every replica in the cluster, this one included.
    pub peers: Vec<ReplicaAddr>,

    /// Only consulted by the sequential scheme.
    pub sequencer: Option<ReplicaAddr>,

    pub output: OutputConfig,

    /// Bound on each outgoing exchange.
    pub timeout: Duration,

    /// When set, eventual gossip is flushed on this period instead of on every write.
    pub gossip_interval: Option<Duration>,

    /// Upper bound of the random delay injected before each linear acknowledgement.
    pub linear_latency: Option<Duration>,

    /// Reload this replica's own snapshot on startup.
    pub restore: bool,
}

impl ReplicaConfig {
    pub fn new(identity: ReplicaIdentity, scheme: Scheme, peers: Vec<ReplicaAddr>) -> Self {
        Self {
            identity,
            scheme,
            peers,
            sequencer: None,
            output: OutputConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            gossip_interval: None,
            linear_latency: None,
            restore: false,
        }
    }

    pub fn with_sequencer(mut self, sequencer: ReplicaAddr) -> Self {
        self.sequencer = Some(sequencer);
        self
    }

    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval = Some(interval);
        self
    }

    pub fn with_linear_latency(mut self, max: Duration) -> Self {
        self.linear_latency = Some(max);
        self
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.output.snapshot_path(&self.identity.id)
    }

    pub fn clock_path(&self) -> PathBuf {
        self.output.clock_path(&self.identity.id)
    }

    /// Peers other than this replica, in configured order.
    pub fn remote_peers(&self) -> Vec<ReplicaAddr> {
        self.peers
            .iter()
            .filter(|addr| **addr != self.identity.addr)
            .cloned()
            .collect()
    }
}

/// Settings for launching a whole local cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub num_replicas: u16,
    pub num_clients: u16,
    pub replica: ReplicaSettings,
    pub client: ClientSettings,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaSettings {
    pub ip: String,
    /// Replica `N` listens on `port + N`.
    pub port: u16,
    pub output_location: PathBuf,
    pub output_suffix: String,
    pub gossip_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub command_file: Option<PathBuf>,
    /// Pause between two commands played by the same client.
    pub pause_ms: u64,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            num_replicas: 3,
            num_clients: 2,
            replica: ReplicaSettings::default(),
            client: ClientSettings::default(),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Default for ReplicaSettings {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 9500,
            output_location: PathBuf::from(DEFAULT_OUTPUT_LOCATION),
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            gossip_interval_ms: None,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            command_file: None,
            pause_ms: 3000,
        }
    }
}

impl ClusterSettings {
    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| {
            KvStoreError::FileError {
                source,
                filename: path.display().to_string(),
            }
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn replica_id(index: u16) -> String {
        format!("replica_{index}")
    }

    /// Replica `index` listens on `port + index`. Fails when that passes the last port.
    pub fn replica_addr(&self, index: u16) -> Result<ReplicaAddr> {
        let port = self
            .replica
            .port
            .checked_add(index)
            .ok_or(KvStoreError::PortOutOfRange {
                base: self.replica.port,
                index,
            })?;
        Ok(ReplicaAddr::new(self.replica.ip.clone(), port))
    }

    pub fn replica_addresses(&self) -> Result<Vec<ReplicaAddr>> {
        (0..self.num_replicas)
            .map(|i| self.replica_addr(i))
            .collect()
    }

    /// The configuration of replica `index` under `scheme`.
    pub fn replica_config(
        &self,
        index: u16,
        scheme: Scheme,
        sequencer: Option<ReplicaAddr>,
    ) -> Result<ReplicaConfig> {
        let identity = ReplicaIdentity::new(Self::replica_id(index), self.replica_addr(index)?);
        let mut config = ReplicaConfig::new(identity, scheme, self.replica_addresses()?)
            .with_output(OutputConfig::new(
                self.replica.output_location.clone(),
                self.replica.output_suffix.clone(),
            ))
            .with_timeout(self.timeout());
        config.sequencer = sequencer;
        config.gossip_interval = self.replica.gossip_interval_ms.map(Duration::from_millis);
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn snapshot_path_joins_id_and_suffix() {
        let output = OutputConfig::new("/tmp/results", "kvstore.txt");
        assert_eq!(
            output.snapshot_path("replica_1"),
            PathBuf::from("/tmp/results/replica_1_kvstore.txt")
        );
    }

    #[test]
    fn remote_peers_exclude_self() {
        let peers = vec![
            ReplicaAddr::new("127.0.0.1", 9500),
            ReplicaAddr::new("127.0.0.1", 9501),
            ReplicaAddr::new("127.0.0.1", 9502),
        ];
        let identity = ReplicaIdentity::new("replica_1", peers[1].clone());
        let config = ReplicaConfig::new(identity, Scheme::Eventual, peers.clone());
        assert_eq!(config.remote_peers(), vec![peers[0].clone(), peers[2].clone()]);
    }

    #[test]
    fn partial_settings_take_defaults() {
        let settings: ClusterSettings =
            serde_json::from_str(r#"{"num_replicas": 5, "replica": {"port": 7000}}"#).unwrap();
        assert_eq!(settings.num_replicas, 5);
        assert_eq!(settings.replica.ip, "127.0.0.1");
        assert_eq!(
            settings.replica_addr(4).unwrap(),
            ReplicaAddr::new("127.0.0.1", 7004)
        );
        assert_eq!(settings.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn replica_config_from_settings() {
        let settings = ClusterSettings::default();
        let config = settings.replica_config(2, Scheme::Causal, None).unwrap();
        assert_eq!(config.identity.id, "replica_2");
        assert_eq!(config.identity.addr.port, 9502);
        assert_eq!(config.peers.len(), 3);
        assert_eq!(
            config.snapshot_path(),
            PathBuf::from("./results/replica_2_kvstore.txt")
        );
    }

    #[test]
    fn replica_ports_past_u16_are_rejected() {
        let mut settings = ClusterSettings::default();
        settings.replica.port = u16::MAX - 1;
        settings.num_replicas = 3;

        assert_eq!(settings.replica_addr(1).unwrap().port, u16::MAX);
        assert!(matches!(
            settings.replica_addr(2),
            Err(KvStoreError::PortOutOfRange { index: 2, .. })
        ));
        assert!(settings.replica_addresses().is_err());
        assert!(settings.replica_config(0, Scheme::None, None).is_err());
    }
}
