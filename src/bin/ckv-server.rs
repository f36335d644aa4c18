use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ckv::config::{DEFAULT_OUTPUT_LOCATION, DEFAULT_OUTPUT_SUFFIX};
use ckv::{OutputConfig, ReplicaAddr, ReplicaConfig, ReplicaIdentity, ReplicaServer, Scheme};
use tokio::signal::ctrl_c;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about = "Run a single replica", long_about = None)]
struct App {
    #[clap(long, default_value = "replica_0", env = "CKV_REPLICA_ID")]
    id: String,

    #[clap(long, default_value = "127.0.0.1:9500", env = "CKV_ADDR")]
    addr: ReplicaAddr,

    #[clap(long, default_value = Scheme::None, env = "CKV_SCHEME")]
    scheme: Scheme,

    /// Every replica in the cluster, this one included.
    #[clap(long, value_delimiter = ',', env = "CKV_PEERS")]
    peers: Vec<ReplicaAddr>,

    /// Required by the sequential scheme.
    #[clap(long, env = "CKV_SEQUENCER")]
    sequencer: Option<ReplicaAddr>,

    #[clap(long, default_value = DEFAULT_OUTPUT_LOCATION, env = "CKV_OUTPUT_LOCATION")]
    output_location: PathBuf,

    #[clap(long, default_value = DEFAULT_OUTPUT_SUFFIX, env = "CKV_OUTPUT_SUFFIX")]
    output_suffix: String,

    /// Flush eventual gossip on this period instead of on every write.
    #[clap(long, env = "CKV_GOSSIP_INTERVAL_MS")]
    gossip_interval_ms: Option<u64>,

    #[clap(long, default_value = "5000", env = "CKV_TIMEOUT_MS")]
    timeout_ms: u64,

    /// Maximum random delay before each linear acknowledgement.
    #[clap(long, env = "CKV_LINEAR_LATENCY_MS")]
    linear_latency_ms: Option<u64>,

    /// Reload this replica's snapshot before serving.
    #[clap(long)]
    restore: bool,

    #[clap(long, default_value = "info", env = "CKV_LOG")]
    log_level: tracing_subscriber::filter::LevelFilter,
}

impl App {
    fn replica_config(self) -> ReplicaConfig {
        let mut peers = self.peers;
        if !peers.contains(&self.addr) {
            peers.push(self.addr.clone());
        }

        let mut config = ReplicaConfig::new(
            ReplicaIdentity::new(self.id, self.addr),
            self.scheme,
            peers,
        )
        .with_output(OutputConfig::new(self.output_location, self.output_suffix))
        .with_timeout(Duration::from_millis(self.timeout_ms));
        config.sequencer = self.sequencer;
        config.gossip_interval = self.gossip_interval_ms.map(Duration::from_millis);
        config.linear_latency = self.linear_latency_ms.map(Duration::from_millis);
        config.restore = self.restore;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::parse();
    ckv::setup_logging(app.log_level)?;

    let config = app.replica_config();
    info!(
        "ckv-server version: {}, replica: {}, scheme: {}",
        env!("CARGO_PKG_VERSION"),
        config.identity.id,
        config.scheme,
    );
    let server = ReplicaServer::bind(config).await?;

    tokio::select! {
        res = server.run() => res?,
        signal = ctrl_c() => match signal {
            Ok(_) => info!("Received shutdown signal"),
            Err(e) => error!("Error receiving Ctrl-C: {e}"),
        },
    }

    Ok(())
}
