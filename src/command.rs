//! The text command grammar spoken between clients and replicas.
//!
//! A request is a single line of whitespace-delimited tokens whose first token is the verb:
//!
//! ```text
//! get <key>
//! set <key> <value> [<origin> <timestamp>]
//! delete <key>
//! update <k1> <v1> [<k2> <v2> ...]                      (2-wide groups)
//! update <k1> <v1> <origin1> <ts1> [...]                (4-wide groups, causal)
//! save
//! ```

use std::fmt::Display;

use crate::{KvStoreError, Result};

/// The origin replica and its logical timestamp attached to a causal write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub origin: String,
    pub timestamp: u64,
}

impl Stamp {
    pub fn new(origin: impl Into<String>, timestamp: u64) -> Self {
        Self {
            origin: origin.into(),
            timestamp,
        }
    }
}

/// A single key-value write, optionally tagged with causal metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub key: String,
    pub value: String,
    pub stamp: Option<Stamp>,
}

impl Write {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            stamp: None,
        }
    }

    pub fn stamped(key: impl Into<String>, value: impl Into<String>, stamp: Stamp) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            stamp: Some(stamp),
        }
    }
}

/// Width of the groups carried by an `update` command. Stamped also admits the
/// 4-argument form of `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateFormat {
    /// `key value` pairs.
    Pairs,
    /// `key value origin timestamp` quadruples.
    Stamped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { key: String },
    Set(Write),
    Delete { key: String },
    Update(Vec<Write>),
    Save,
}

impl Command {
    /// Parse one request line. `format` selects how `update` arguments are grouped.
    pub fn parse(line: &str, format: UpdateFormat) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let invalid = || KvStoreError::InvalidCommand(line.trim().to_string());

        match tokens.as_slice() {
            ["get", key] => Ok(Command::Get {
                key: key.to_string(),
            }),
            ["set", key, value] => Ok(Command::Set(Write::new(*key, *value))),
            ["set", key, value, origin, timestamp] if format == UpdateFormat::Stamped => {
                let timestamp = timestamp.parse().map_err(|_| invalid())?;
                Ok(Command::Set(Write::stamped(
                    *key,
                    *value,
                    Stamp::new(*origin, timestamp),
                )))
            }
            ["delete", key] => Ok(Command::Delete {
                key: key.to_string(),
            }),
            ["save"] => Ok(Command::Save),
            ["update", args @ ..] => parse_updates(args, format)
                .map(Command::Update)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

fn parse_updates(args: &[&str], format: UpdateFormat) -> Option<Vec<Write>> {
    match format {
        UpdateFormat::Pairs => {
            if args.len() % 2 != 0 {
                return None;
            }
            Some(
                args.chunks_exact(2)
                    .map(|pair| Write::new(pair[0], pair[1]))
                    .collect(),
            )
        }
        UpdateFormat::Stamped => {
            if args.len() % 4 != 0 {
                return None;
            }
            args.chunks_exact(4)
                .map(|group| {
                    let timestamp = group[3].parse().ok()?;
                    Some(Write::stamped(
                        group[0],
                        group[1],
                        Stamp::new(group[2], timestamp),
                    ))
                })
                .collect()
        }
    }
}

/// Encode a batch of writes as an `update` request. Stamped writes use 4-wide groups.
pub fn encode_update(writes: &[Write]) -> String {
    let mut line = String::from("update");
    for write in writes {
        line.push(' ');
        line.push_str(&write.key);
        line.push(' ');
        line.push_str(&write.value);
        if let Some(stamp) = &write.stamp {
            line.push_str(&format!(" {} {}", stamp.origin, stamp.timestamp));
        }
    }
    line
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Get { key } => write!(f, "get {key}"),
            Command::Set(Write {
                key,
                value,
                stamp: None,
            }) => write!(f, "set {key} {value}"),
            Command::Set(Write {
                key,
                value,
                stamp: Some(stamp),
            }) => write!(f, "set {key} {value} {} {}", stamp.origin, stamp.timestamp),
            Command::Delete { key } => write!(f, "delete {key}"),
            Command::Update(writes) => f.write_str(&encode_update(writes)),
            Command::Save => f.write_str("save"),
        }
    }
}
