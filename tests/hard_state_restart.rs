use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quorumkv::network::LocalNetwork;
use quorumkv::raft::{
    HardState, HardStateStore, MemoryHardStateStore, NodeId, NodeRole, Raft, RaftConfig,
    RaftError, SledHardStateStore, VoteRequest,
};
use quorumkv::storage::SledStore;
use tempfile::TempDir;

fn start(dir: &TempDir, id: &str, peers: &[&str]) -> (Raft, SledStore) {
    let store = SledStore::open(dir.path()).expect("open store");
    let hard_state = Arc::new(SledHardStateStore::open(store.db()).expect("open hard state"));
    let mut config = RaftConfig::new(id).with_seed(3);
    for peer in peers {
        config.add_peer(*peer);
    }
    let raft = Raft::start(config, LocalNetwork::new().transport_for(id), hard_state)
        .expect("start node");
    (raft, store)
}

#[tokio::test]
async fn term_and_vote_survive_restart() {
    let tmp = TempDir::new().expect("tempdir");

    {
        let (raft, _store) = start(&tmp, "a", &["b", "c"]);
        raft.set_election_timeout(Duration::from_secs(3600))
            .await;
        let resp = raft
            .request_vote(VoteRequest {
                term: 7,
                candidate_id: NodeId::from("b"),
            })
            .await
            .expect("vote");
        assert!(resp.vote_granted);
        raft.shutdown().await;
    }

    let (raft, _store) = start(&tmp, "a", &["b", "c"]);
    raft.set_election_timeout(Duration::from_secs(3600))
        .await;
    let status = raft.status().await;
    assert_eq!(status.current_term, 7);
    assert_eq!(status.voted_for, Some(NodeId::from("b")));
    assert_eq!(status.role, NodeRole::Follower);

    // Still bound to the vote it gave before the restart.
    let resp = raft
        .request_vote(VoteRequest {
            term: 7,
            candidate_id: NodeId::from("c"),
        })
        .await
        .expect("vote");
    assert!(!resp.vote_granted);

    raft.shutdown().await;
}

/// Memory store whose next save can be made to fail.
#[derive(Default)]
struct FailingOnceStore {
    inner: MemoryHardStateStore,
    fail_next: AtomicBool,
}

#[async_trait]
impl HardStateStore for FailingOnceStore {
    fn load(&self) -> Result<HardState, RaftError> {
        self.inner.load()
    }

    async fn save(&self, state: &HardState) -> Result<(), RaftError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RaftError::SerializationError("disk full".to_string()));
        }
        self.inner.save(state).await
    }
}

fn start_with(store: Arc<FailingOnceStore>) -> Raft {
    let mut config = RaftConfig::new("a").with_seed(3);
    config.add_peer("b");
    config.add_peer("c");
    Raft::start(config, LocalNetwork::new().transport_for("a"), store).expect("start node")
}

#[tokio::test]
async fn failed_save_is_retried_before_granting() {
    let store = Arc::new(FailingOnceStore::default());
    store.fail_next.store(true, Ordering::SeqCst);

    let raft = start_with(store.clone());
    raft.set_election_timeout(Duration::from_secs(3600)).await;

    let vote_for_b = VoteRequest {
        term: 5,
        candidate_id: NodeId::from("b"),
    };
    assert!(raft.request_vote(vote_for_b.clone()).await.is_err());
    assert_eq!(store.load().unwrap(), HardState::default());

    // Same request again: the pending vote must reach storage this time.
    let resp = raft.request_vote(vote_for_b).await.expect("vote");
    assert!(resp.vote_granted);
    assert_eq!(
        store.load().unwrap(),
        HardState {
            current_term: 5,
            voted_for: Some(NodeId::from("b")),
        }
    );
    raft.shutdown().await;

    let restarted = start_with(store);
    restarted
        .set_election_timeout(Duration::from_secs(3600))
        .await;
    let resp = restarted
        .request_vote(VoteRequest {
            term: 5,
            candidate_id: NodeId::from("c"),
        })
        .await
        .expect("vote");
    assert!(!resp.vote_granted);
    restarted.shutdown().await;
}
