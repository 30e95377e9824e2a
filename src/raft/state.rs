use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a cluster member. The value is the member's RPC address,
/// e.g. `127.0.0.1:4000` or `:4000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(addr: &str) -> Self {
        Self(addr.to_string())
    }
}

impl From<String> for NodeId {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeRole::Follower => "follower",
            NodeRole::Candidate => "candidate",
            NodeRole::Leader => "leader",
        };
        f.write_str(s)
    }
}

/// The slice of consensus state that must be on stable storage before a
/// node answers any RPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardState {
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
}

/// Point-in-time view of a node, taken under the state lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftStatus {
    pub id: NodeId,
    pub role: NodeRole,
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    pub vote_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_equality_is_by_value() {
        let a = NodeId::from("127.0.0.1:4000");
        let b = NodeId::new(String::from("127.0.0.1:4000"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "127.0.0.1:4000");
    }

    #[test]
    fn hard_state_default_is_term_zero_without_vote() {
        let hs = HardState::default();
        assert_eq!(hs.current_term, 0);
        assert!(hs.voted_for.is_none());
    }
}
