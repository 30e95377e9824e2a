use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::raft::{NodeId, RaftConfig};

pub const ENV_ADDR: &str = "QUORUMKV_ADDR";
pub const ENV_DATA: &str = "QUORUMKV_DATA";
pub const ENV_PEERS: &str = "QUORUMKV_PEERS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// gRPC listen address; also this node's identity in the cluster.
    pub addr: String,
    pub data_dir: String,
    pub peers: Vec<String>,
    /// Liveness endpoint. Defaults to the gRPC port + 1.
    pub health_addr: Option<String>,
    /// Protocol timings. `node_id` and `peers` are filled from the fields above.
    pub raft: RaftConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: ":4000".to_string(),
            data_dir: "data".to_string(),
            peers: vec![],
            health_addr: None,
            raft: RaftConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then the optional JSON file, then environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_ADDR).filter(|v| !v.is_empty()) {
            self.addr = addr;
        }
        if let Some(data_dir) = lookup(ENV_DATA).filter(|v| !v.is_empty()) {
            self.data_dir = data_dir;
        }
        if let Some(peers) = lookup(ENV_PEERS).filter(|v| !v.is_empty()) {
            self.peers = split_peers(&peers);
        }
    }

    pub fn raft_config(&self) -> RaftConfig {
        let mut raft = self.raft.clone();
        raft.node_id = NodeId::from(self.addr.as_str());
        raft.peers.clear();
        for peer in &self.peers {
            raft.add_peer(peer.as_str());
        }
        raft
    }

    pub fn health_addr(&self) -> Result<String, ConfigError> {
        match &self.health_addr {
            Some(addr) => Ok(addr.clone()),
            None => health_addr_for(&self.addr)
                .ok_or_else(|| ConfigError::InvalidAddress(self.addr.clone())),
        }
    }
}

/// Splits `a,b,c` and drops empty entries.
pub fn split_peers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Address to listen on. A bare `:port` binds every interface.
pub fn bind_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// Address to connect to. A bare `:port` means this host.
pub fn dial_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("127.0.0.1{addr}")
    } else {
        addr.to_string()
    }
}

/// The liveness endpoint of a node listening on `addr`: same host, next port.
pub fn health_addr_for(addr: &str) -> Option<String> {
    let (host, port) = addr.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some(format!("{host}:{}", port.checked_add(1)?))
}
