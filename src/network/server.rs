use std::sync::Arc;

use log::{debug, error};
use tonic::{Request, Response, Status};

use crate::raft::{AppendRequest, NodeId, Raft, VoteRequest};
use crate::storage::KvStore;

use super::proto::kv::kv_service_server::KvService;
use super::proto::kv::{
    DeleteRequest, DeleteResponse, GetRequest, GetResponse, HealthRequest, HealthResponse,
    PutRequest, PutResponse,
};
use super::proto::raft::raft_service_server::RaftService;
use super::proto::raft::{
    AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse,
};

pub struct RaftServer {
    raft: Raft,
}

impl RaftServer {
    pub fn new(raft: Raft) -> Self {
        Self { raft }
    }
}

#[tonic::async_trait]
impl RaftService for RaftServer {
    async fn request_vote(
        &self,
        request: Request<RequestVoteRequest>,
    ) -> Result<Response<RequestVoteResponse>, Status> {
        let req = request.into_inner();
        debug!("Received RequestVote: {:?}", req);

        let response = self
            .raft
            .request_vote(VoteRequest {
                term: req.term,
                candidate_id: NodeId::from(req.candidate_id),
            })
            .await
            .map_err(|e| {
                error!("Error handling RequestVote: {e}");
                Status::internal(format!("Internal error: {e}"))
            })?;

        Ok(Response::new(RequestVoteResponse {
            term: response.term,
            vote_granted: response.vote_granted,
        }))
    }

    async fn append_entries(
        &self,
        request: Request<AppendEntriesRequest>,
    ) -> Result<Response<AppendEntriesResponse>, Status> {
        let req = request.into_inner();

        let response = self
            .raft
            .append_entries(AppendRequest {
                term: req.term,
                leader_id: NodeId::from(req.leader_id),
            })
            .await
            .map_err(|e| {
                error!("Error handling AppendEntries: {e}");
                Status::internal(format!("Internal error: {e}"))
            })?;

        Ok(Response::new(AppendEntriesResponse {
            term: response.term,
            success: response.success,
        }))
    }
}

pub struct KvServer {
    store: Arc<dyn KvStore>,
}

impl KvServer {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }
}

fn require_key(key: &[u8]) -> Result<(), Status> {
    if key.is_empty() {
        return Err(Status::invalid_argument("key must not be empty"));
    }
    Ok(())
}

#[tonic::async_trait]
impl KvService for KvServer {
    async fn put(&self, request: Request<PutRequest>) -> Result<Response<PutResponse>, Status> {
        let req = request.into_inner();
        require_key(&req.key)?;

        self.store.put(&req.key, &req.value).await.map_err(|e| {
            error!("Put failed: {e}");
            Status::internal(format!("Storage error: {e}"))
        })?;

        Ok(Response::new(PutResponse { ok: true }))
    }

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = request.into_inner();
        require_key(&req.key)?;

        let value = self
            .store
            .get(&req.key)
            .await
            .map_err(|e| Status::internal(format!("Storage error: {e}")))?;

        let response = match value {
            Some(value) => GetResponse { value, found: true },
            None => GetResponse {
                value: Vec::new(),
                found: false,
            },
        };
        Ok(Response::new(response))
    }

    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        let req = request.into_inner();
        require_key(&req.key)?;

        self.store.delete(&req.key).await.map_err(|e| {
            error!("Delete failed: {e}");
            Status::internal(format!("Storage error: {e}"))
        })?;

        Ok(Response::new(DeleteResponse { deleted: true }))
    }

    async fn health(
        &self,
        _request: Request<HealthRequest>,
    ) -> Result<Response<HealthResponse>, Status> {
        Ok(Response::new(HealthResponse {
            status: "ok".to_string(),
        }))
    }
}
