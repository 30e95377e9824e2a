use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::NetworkError;
use crate::raft::{AppendRequest, AppendResponse, NodeId, Raft, VoteRequest, VoteResponse};

/// Outbound half of the Raft RPC contract.
///
/// Any failure means "no answer from this peer"; callers never retry
/// within a round.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn request_vote(
        &self,
        peer: &NodeId,
        request: VoteRequest,
    ) -> Result<VoteResponse, NetworkError>;

    async fn append_entries(
        &self,
        peer: &NodeId,
        request: AppendRequest,
    ) -> Result<AppendResponse, NetworkError>;
}

#[derive(Default)]
struct Registry {
    nodes: HashMap<NodeId, Raft>,
    isolated: HashSet<NodeId>,
}

/// In-process network that delivers calls straight to registered nodes.
/// Isolating a node drops every call to or from it.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    registry: Arc<RwLock<Registry>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport for the node `from`; used when starting that node.
    pub fn transport_for(&self, from: impl Into<NodeId>) -> Arc<LocalTransport> {
        Arc::new(LocalTransport {
            from: from.into(),
            network: self.clone(),
        })
    }

    pub fn register(&self, raft: Raft) {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.nodes.insert(raft.id().clone(), raft);
    }

    pub fn isolate(&self, id: &NodeId) {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.isolated.insert(id.clone());
    }

    pub fn heal(&self, id: &NodeId) {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.isolated.remove(id);
    }

    fn route(&self, from: &NodeId, to: &NodeId) -> Result<Raft, NetworkError> {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        if registry.isolated.contains(from) || registry.isolated.contains(to) {
            return Err(NetworkError::ConnectionError(format!(
                "{from} cannot reach {to}"
            )));
        }
        registry
            .nodes
            .get(to)
            .cloned()
            .ok_or_else(|| NetworkError::ConnectionError(format!("unknown peer {to}")))
    }
}

pub struct LocalTransport {
    from: NodeId,
    network: LocalNetwork,
}

#[async_trait]
impl PeerTransport for LocalTransport {
    async fn request_vote(
        &self,
        peer: &NodeId,
        request: VoteRequest,
    ) -> Result<VoteResponse, NetworkError> {
        let target = self.network.route(&self.from, peer)?;
        target
            .request_vote(request)
            .await
            .map_err(|e| NetworkError::RpcError(e.to_string()))
    }

    async fn append_entries(
        &self,
        peer: &NodeId,
        request: AppendRequest,
    ) -> Result<AppendResponse, NetworkError> {
        let target = self.network.route(&self.from, peer)?;
        target
            .append_entries(request)
            .await
            .map_err(|e| NetworkError::RpcError(e.to_string()))
    }
}
