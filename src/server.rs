use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::{
    transport, Engine, KvStore, KvStoreError, KvsEngine, ReplicaConfig, Result, Scheme,
    INVALID_COMMAND, KEY_DELETED, KEY_NOT_FOUND, SAVE_OK, UPDATE_OK,
};

/// Command dispatch for one replica: decodes a request line, drives the engine and
/// persists the snapshot after every write.
#[derive(Clone, Debug)]
pub struct Replica {
    engine: Engine,
    config: Arc<ReplicaConfig>,
}

impl Replica {
    /// Build the engine for `config`, reloading the previous snapshot when asked to.
    ///
    /// A causal replica also reloads its clock, so its next local write is stamped past
    /// everything it stamped before the restart.
    pub async fn new(config: ReplicaConfig) -> Result<Self> {
        let snapshot = config.snapshot_path();
        let store = if config.restore && snapshot.exists() {
            KvStore::load(&snapshot).await?
        } else {
            KvStore::new()
        };
        let clock = config.clock_path();
        if config.restore && config.scheme == Scheme::Causal && clock.exists() {
            store.restore_clock(&clock).await?;
        }
        let engine = Engine::new(store, &config)?;
        Ok(Self {
            engine,
            config: Arc::new(config),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.config.identity.id
    }

    /// Answer one request line. Every input yields a response, malformed ones included.
    pub async fn handle_command(&self, line: &str) -> String {
        let command = match Command::parse(line, self.engine.scheme().update_format()) {
            Ok(command) => command,
            Err(e) => {
                debug!(replica = self.id(), "{e}");
                return INVALID_COMMAND.to_string();
            }
        };

        match command {
            Command::Get { key } => self
                .engine
                .get(&key)
                .unwrap_or_else(|| KEY_NOT_FOUND.to_string()),
            Command::Set(write) => match self.engine.set(write).await {
                Ok(outcome) => {
                    self.persist().await;
                    outcome.to_string()
                }
                Err(e) => e.to_string(),
            },
            Command::Delete { key } => match self.engine.remove(key).await {
                Ok(()) => KEY_DELETED.to_string(),
                Err(KvStoreError::RemoveOperationWithNoKey) => KEY_NOT_FOUND.to_string(),
                Err(e) => e.to_string(),
            },
            Command::Update(writes) => match self.engine.update(writes).await {
                Ok(applied) => {
                    debug!(replica = self.id(), applied, "Applied update batch");
                    self.persist().await;
                    UPDATE_OK.to_string()
                }
                Err(e) => e.to_string(),
            },
            Command::Save => match self.save().await {
                Ok(()) => SAVE_OK.to_string(),
                Err(e) => {
                    error!(replica = self.id(), "{e}");
                    e.to_string()
                }
            },
        }
    }

    /// Write the snapshot to `<output_location>/<id>_<output_suffix>`. A causal replica
    /// writes its clock next to it.
    pub async fn save(&self) -> Result<()> {
        let store = self.engine.store();
        match self.engine.scheme() {
            Scheme::Causal => {
                store
                    .snapshot_with_clock(self.config.snapshot_path(), self.config.clock_path())
                    .await
            }
            _ => store.snapshot(self.config.snapshot_path()).await,
        }
    }

    // Snapshot failures after a write are logged, never returned to the client.
    async fn persist(&self) {
        if let Err(e) = self.save().await {
            error!(replica = self.id(), "Snapshot failed: {e}");
        }
    }
}

/// A replica bound to its listening socket.
pub struct ReplicaServer {
    replica: Replica,
    listener: TcpListener,
}

impl ReplicaServer {
    /// Bind the configured address. Failing to bind is fatal for a replica.
    pub async fn bind(config: ReplicaConfig) -> Result<Self> {
        let addr = &config.identity.addr;
        let listener = TcpListener::bind((addr.host.as_str(), addr.port)).await?;
        Self::with_listener(config, listener).await
    }

    /// Serve on an already bound listener.
    pub async fn with_listener(config: ReplicaConfig, listener: TcpListener) -> Result<Self> {
        let replica = Replica::new(config).await?;
        debug!(
            replica = replica.id(),
            addr = %replica.config().identity.addr,
            "Replica initialized"
        );
        Ok(Self { replica, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle on the replica this server dispatches to.
    pub fn replica(&self) -> Replica {
        self.replica.clone()
    }

    /// Accept connections until the process ends, one task per connection.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            replica = self.replica.id(),
            scheme = %self.replica.engine().scheme(),
            "Listening on {}",
            self.local_addr()?
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("Connection established: {peer}");
                    let replica = self.replica.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, replica).await {
                            warn!(%peer, "Connection dropped: {e}");
                        }
                    });
                }
                Err(e) => error!("Failed to accept connection: {e}"),
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, replica: Replica) -> anyhow::Result<()> {
    let timeout = replica.config().timeout;
    let read = tokio::time::timeout(timeout, transport::read_request(&mut stream)).await;
    let response = match read {
        Ok(Ok(request)) => {
            debug!(replica = replica.id(), request, "Received request");
            replica.handle_command(&request).await
        }
        Ok(Err(KvStoreError::InvalidCommand(reason))) => {
            debug!(replica = replica.id(), reason, "Unreadable request");
            INVALID_COMMAND.to_string()
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => anyhow::bail!("no request within {timeout:?}"),
    };
    transport::write_response(&mut stream, &response).await?;
    Ok(())
}
