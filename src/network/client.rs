use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use crate::config::dial_addr;
use crate::raft::{AppendRequest, AppendResponse, NodeId, RaftConfig, VoteRequest, VoteResponse};

use super::proto::kv::kv_service_client::KvServiceClient;
use super::proto::kv::{DeleteRequest, GetRequest, HealthRequest, PutRequest};
use super::proto::raft::raft_service_client::RaftServiceClient;
use super::proto::raft::{AppendEntriesRequest, RequestVoteRequest};
use super::{NetworkError, PeerTransport};

fn endpoint_for(address: &str) -> Result<Endpoint, NetworkError> {
    Endpoint::from_shared(format!("http://{}", dial_addr(address)))
        .map_err(|e| NetworkError::ConnectionError(e.to_string()))
}

/// Dials a fresh connection for every call and drops it afterwards.
pub struct GrpcTransport {
    connect_timeout: Duration,
    vote_timeout: Duration,
    heartbeat_timeout: Duration,
}

impl GrpcTransport {
    pub fn new(config: &RaftConfig) -> Self {
        Self {
            connect_timeout: config.connect(),
            vote_timeout: config.vote_rpc(),
            heartbeat_timeout: config.heartbeat_rpc(),
        }
    }

    async fn connect(&self, peer: &NodeId) -> Result<RaftServiceClient<Channel>, NetworkError> {
        let endpoint = endpoint_for(peer.as_str())?.connect_timeout(self.connect_timeout);
        let channel = timeout(self.connect_timeout, endpoint.connect())
            .await
            .map_err(|_| NetworkError::TimeoutError)??;
        Ok(RaftServiceClient::new(channel))
    }
}

#[async_trait]
impl PeerTransport for GrpcTransport {
    async fn request_vote(
        &self,
        peer: &NodeId,
        request: VoteRequest,
    ) -> Result<VoteResponse, NetworkError> {
        let mut client = self.connect(peer).await?;

        let request = RequestVoteRequest {
            term: request.term,
            candidate_id: request.candidate_id.to_string(),
        };

        let response = timeout(self.vote_timeout, client.request_vote(Request::new(request)))
            .await
            .map_err(|_| NetworkError::TimeoutError)??
            .into_inner();

        Ok(VoteResponse {
            term: response.term,
            vote_granted: response.vote_granted,
        })
    }

    async fn append_entries(
        &self,
        peer: &NodeId,
        request: AppendRequest,
    ) -> Result<AppendResponse, NetworkError> {
        let mut client = self.connect(peer).await?;

        let request = AppendEntriesRequest {
            term: request.term,
            leader_id: request.leader_id.to_string(),
        };

        let response = timeout(
            self.heartbeat_timeout,
            client.append_entries(Request::new(request)),
        )
        .await
        .map_err(|_| NetworkError::TimeoutError)??
        .into_inner();

        Ok(AppendResponse {
            term: response.term,
            success: response.success,
        })
    }
}

pub struct KvClient {
    address: String,
    client: Option<KvServiceClient<Channel>>,
}

impl KvClient {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            client: None,
        }
    }

    pub async fn connect(&mut self) -> Result<(), NetworkError> {
        let channel = endpoint_for(&self.address)?
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(3))
            .connect()
            .await?;

        self.client = Some(KvServiceClient::new(channel));

        Ok(())
    }

    async fn client(&mut self) -> Result<&mut KvServiceClient<Channel>, NetworkError> {
        if self.client.is_none() {
            self.connect().await?;
        }
        self.client
            .as_mut()
            .ok_or_else(|| NetworkError::ConnectionError("Client not connected".to_string()))
    }

    pub async fn put(&mut self, key: &[u8], value: &[u8]) -> Result<bool, NetworkError> {
        let request = PutRequest {
            key: key.to_vec(),
            value: value.to_vec(),
        };
        let response = self
            .client()
            .await?
            .put(Request::new(request))
            .await?
            .into_inner();
        Ok(response.ok)
    }

    /// `None` when the key does not exist.
    pub async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, NetworkError> {
        let request = GetRequest { key: key.to_vec() };
        let response = self
            .client()
            .await?
            .get(Request::new(request))
            .await?
            .into_inner();
        Ok(response.found.then_some(response.value))
    }

    pub async fn delete(&mut self, key: &[u8]) -> Result<bool, NetworkError> {
        let request = DeleteRequest { key: key.to_vec() };
        let response = self
            .client()
            .await?
            .delete(Request::new(request))
            .await?
            .into_inner();
        Ok(response.deleted)
    }

    pub async fn health(&mut self) -> Result<String, NetworkError> {
        let response = self
            .client()
            .await?
            .health(Request::new(HealthRequest {}))
            .await?
            .into_inner();
        Ok(response.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_fills_in_loopback_for_bare_port() {
        let endpoint = endpoint_for(":4000").expect("endpoint");
        assert_eq!(endpoint.uri().host(), Some("127.0.0.1"));
        assert_eq!(endpoint.uri().port_u16(), Some(4000));
    }

    #[tokio::test]
    async fn unreachable_peer_is_an_error_not_a_hang() {
        let mut cfg = RaftConfig::new("127.0.0.1:1");
        cfg.connect_timeout = 100;
        let transport = GrpcTransport::new(&cfg);

        // Port 0 is never a valid remote port.
        let result = transport
            .request_vote(
                &NodeId::from("127.0.0.1:0"),
                VoteRequest {
                    term: 1,
                    candidate_id: NodeId::from("127.0.0.1:1"),
                },
            )
            .await;
        assert!(result.is_err());
    }
}
