use std::path::PathBuf;
use std::time::Duration;

use clap::Subcommand;
use tracing::{info, warn};

use crate::address::replica_index;
use crate::{transport, ReplicaAddr, Result};

/// Actions that can be performed by the client.
///
/// Each one except `play` maps onto a single request line sent to one replica.
#[derive(Debug, Subcommand)]
pub enum Action {
    /// Enter a key-value pair into the store.
    Set { key: String, value: String },

    /// Get a value from the store with the provided key.
    Get { key: String },

    /// Remove a value from the store with the provided key.
    #[clap(name = "rm", alias = "delete")]
    Remove { key: String },

    /// Apply raw `key value` groups, as a peer replica would.
    Update {
        #[arg(required = true)]
        args: Vec<String>,
    },

    /// Ask the replica to write its snapshot.
    Save,

    /// Play the lines of a command file that belong to one client.
    Play {
        file: PathBuf,

        #[clap(long, default_value = "client_0")]
        client_id: String,

        /// Replica `N` is reached at `host:(base_port + N)`.
        #[clap(long, default_value = "127.0.0.1")]
        replica_host: String,

        #[clap(long, default_value = "9500")]
        base_port: u16,

        /// Pause between two commands, in milliseconds.
        #[clap(long, default_value = "3000")]
        pause_ms: u64,
    },
}

impl Action {
    /// The request line for single-command actions.
    pub fn request(&self) -> Option<String> {
        match self {
            Action::Set { key, value } => Some(format!("set {key} {value}")),
            Action::Get { key } => Some(format!("get {key}")),
            Action::Remove { key } => Some(format!("delete {key}")),
            Action::Update { args } => Some(format!("update {}", args.join(" "))),
            Action::Save => Some("save".to_string()),
            Action::Play { .. } => None,
        }
    }
}

/// One line of a command file: `<client_id> <replica_id> <verb> <args...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub client_id: String,
    pub replica_id: String,
    pub request: String,
}

/// Parse a command file. Blank lines and lines without a verb are skipped.
pub fn parse_script(text: &str) -> Vec<ScriptLine> {
    text.lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                [client_id, replica_id, command @ ..] if !command.is_empty() => Some(ScriptLine {
                    client_id: client_id.to_string(),
                    replica_id: replica_id.to_string(),
                    request: command.join(" "),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Replays a client's share of a command file against the cluster.
#[derive(Debug, Clone)]
pub struct Player {
    pub client_id: String,
    pub replica_host: String,
    pub base_port: u16,
    pub pause: Duration,
    pub timeout: Duration,
}

impl Player {
    pub fn replica_addr(&self, replica_id: &str) -> Option<ReplicaAddr> {
        let index = replica_index(replica_id)?;
        Some(ReplicaAddr::new(
            self.replica_host.clone(),
            self.base_port.checked_add(index)?,
        ))
    }

    /// Send this client's lines in file order, returning `(replica_id, response)` pairs.
    pub async fn play(&self, script: &[ScriptLine]) -> Vec<(String, String)> {
        let mut responses = Vec::new();
        let own = script.iter().filter(|l| l.client_id == self.client_id);
        for (n, line) in own.enumerate() {
            if n > 0 {
                tokio::time::sleep(self.pause).await;
            }
            let Some(addr) = self.replica_addr(&line.replica_id) else {
                warn!(client = self.client_id, replica = line.replica_id, "Unknown replica");
                continue;
            };
            info!(
                client = self.client_id,
                "Sending command \"{}\" to {}", line.request, line.replica_id
            );
            let response = transport::send_text(&addr, &line.request, self.timeout).await;
            info!(
                client = self.client_id,
                "Received response \"{}\" from {}", response, line.replica_id
            );
            responses.push((line.replica_id.clone(), response));
        }
        responses
    }

    pub async fn play_file(&self, file: &std::path::Path) -> Result<Vec<(String, String)>> {
        let text = tokio::fs::read_to_string(file)
            .await
            .map_err(|source| crate::KvStoreError::FileError {
                source,
                filename: file.display().to_string(),
            })?;
        Ok(self.play(&parse_script(&text)).await)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn script_lines_are_split() {
        let script = parse_script(
            "client_0 replica_1 set a 1\n\nclient_1 replica_0 get a\nclient_0 replica_2\n",
        );
        assert_eq!(
            script,
            vec![
                ScriptLine {
                    client_id: "client_0".into(),
                    replica_id: "replica_1".into(),
                    request: "set a 1".into(),
                },
                ScriptLine {
                    client_id: "client_1".into(),
                    replica_id: "replica_0".into(),
                    request: "get a".into(),
                },
            ]
        );
    }

    #[test]
    fn replica_ids_resolve_from_base_port() {
        let player = Player {
            client_id: "client_0".into(),
            replica_host: "localhost".into(),
            base_port: 9500,
            pause: Duration::ZERO,
            timeout: transport::DEFAULT_TIMEOUT,
        };
        assert_eq!(
            player.replica_addr("replica_2"),
            Some(ReplicaAddr::new("localhost", 9502))
        );
        assert_eq!(player.replica_addr("primary"), None);
    }

    #[test]
    fn actions_map_to_requests() {
        assert_eq!(
            Action::Remove { key: "a".into() }.request().as_deref(),
            Some("delete a")
        );
        assert_eq!(
            Action::Update {
                args: vec!["a".into(), "1".into()]
            }
            .request()
            .as_deref(),
            Some("update a 1")
        );
    }
}
