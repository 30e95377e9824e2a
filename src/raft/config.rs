use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{NodeId, RaftError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    pub node_id: NodeId,
    pub peers: Vec<NodeId>,
    pub tick_interval: u64,        // in milliseconds
    pub election_timeout_min: u64, // in milliseconds, inclusive
    pub election_timeout_max: u64, // in milliseconds, exclusive
    pub heartbeat_interval: u64,   // in milliseconds
    pub connect_timeout: u64,      // in milliseconds
    pub vote_timeout: u64,         // in milliseconds
    pub heartbeat_timeout: u64,    // in milliseconds
    /// Fixed seed for the election timeout generator. `None` uses OS entropy.
    pub seed: Option<u64>,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::from(":4000"),
            peers: Vec::new(),
            tick_interval: 50,
            election_timeout_min: 150,
            election_timeout_max: 300,
            heartbeat_interval: 75,
            connect_timeout: 300,
            vote_timeout: 400,
            heartbeat_timeout: 200,
            seed: None,
        }
    }
}

impl RaftConfig {
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    /// Adds a peer unless it is empty, this node, or already known.
    pub fn add_peer(&mut self, peer: impl Into<NodeId>) {
        let peer = peer.into();
        if peer.is_empty() || peer == self.node_id || self.peers.contains(&peer) {
            return;
        }
        self.peers.push(peer);
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), RaftError> {
        if self.node_id.is_empty() {
            return Err(RaftError::InvalidConfig("node id must not be empty".into()));
        }
        if self.tick_interval == 0 || self.heartbeat_interval == 0 {
            return Err(RaftError::InvalidConfig(
                "tick and heartbeat intervals must be positive".into(),
            ));
        }
        if self.election_timeout_min >= self.election_timeout_max {
            return Err(RaftError::InvalidConfig(format!(
                "election timeout range [{}, {}) is empty",
                self.election_timeout_min, self.election_timeout_max
            )));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_interval)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn vote_rpc(&self) -> Duration {
        Duration::from_millis(self.vote_timeout)
    }

    pub fn heartbeat_rpc(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timings() {
        let cfg = RaftConfig::new("127.0.0.1:4000");
        assert_eq!(cfg.tick(), Duration::from_millis(50));
        assert_eq!(cfg.election_timeout_min, 150);
        assert_eq!(cfg.election_timeout_max, 300);
        assert_eq!(cfg.heartbeat(), Duration::from_millis(75));
        assert_eq!(cfg.connect(), Duration::from_millis(300));
        assert_eq!(cfg.vote_rpc(), Duration::from_millis(400));
        assert_eq!(cfg.heartbeat_rpc(), Duration::from_millis(200));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn add_peer_skips_self_empty_and_duplicates() {
        let mut cfg = RaftConfig::new("a:1");
        cfg.add_peer("a:1");
        cfg.add_peer("");
        cfg.add_peer("b:2");
        cfg.add_peer("b:2");
        assert_eq!(cfg.peers, vec![NodeId::from("b:2")]);
    }

    #[test]
    fn validate_rejects_empty_timeout_range() {
        let mut cfg = RaftConfig::new("a:1");
        cfg.election_timeout_min = 300;
        assert!(matches!(cfg.validate(), Err(RaftError::InvalidConfig(_))));
    }
}
