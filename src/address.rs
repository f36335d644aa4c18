use std::fmt::Display;
use std::str::FromStr;

use crate::KvStoreError;

/// A `host:port` pair naming a replica endpoint.
///
/// Hosts are kept as given rather than resolved, so `localhost:9500` and
/// `127.0.0.1:9500` are different peers as far as self-exclusion is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplicaAddr {
    pub host: String,
    pub port: u16,
}

impl ReplicaAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for ReplicaAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ReplicaAddr {
    type Err = KvStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| KvStoreError::InvalidAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(KvStoreError::InvalidAddress(s.to_string()));
        }
        let port = port
            .parse()
            .map_err(|_| KvStoreError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

impl From<std::net::SocketAddr> for ReplicaAddr {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// The immutable `(id, host, port)` triple a replica is started with.
///
/// The id doubles as the origin tag carried by causal updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaIdentity {
    pub id: String,
    pub addr: ReplicaAddr,
}

impl ReplicaIdentity {
    pub fn new(id: impl Into<String>, addr: ReplicaAddr) -> Self {
        Self {
            id: id.into(),
            addr,
        }
    }
}

/// Extract `N` from a `replica_N` style identifier.
pub fn replica_index(replica_id: &str) -> Option<u16> {
    replica_id.rsplit_once('_')?.1.parse().ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_host_port() {
        let addr: ReplicaAddr = "localhost:9500".parse().unwrap();
        assert_eq!(addr, ReplicaAddr::new("localhost", 9500));
        assert_eq!(addr.to_string(), "localhost:9500");
    }

    #[test]
    fn reject_missing_port() {
        assert!("localhost".parse::<ReplicaAddr>().is_err());
        assert!("localhost:http".parse::<ReplicaAddr>().is_err());
        assert!(":9500".parse::<ReplicaAddr>().is_err());
    }

    #[test]
    fn index_from_replica_id() {
        assert_eq!(replica_index("replica_2"), Some(2));
        assert_eq!(replica_index("replica"), None);
        assert_eq!(replica_index("replica_x"), None);
    }
}
