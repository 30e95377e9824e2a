mod config;
mod error;
mod message;
pub mod metrics;
mod node;
mod persist;
mod state;
mod timer;

pub use self::config::RaftConfig;
pub use self::error::RaftError;
pub use self::message::{AppendRequest, AppendResponse, VoteRequest, VoteResponse};
pub use self::node::{Election, RaftNode, VoteOutcome};
pub use self::persist::{HardStateStore, MemoryHardStateStore, SledHardStateStore};
pub use self::state::{HardState, NodeId, NodeRole, RaftStatus};
pub use self::timer::ElectionTimer;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::network::PeerTransport;

/// Handle to a running consensus node. Clones share the same node.
///
/// Every read and write of the consensus state goes through one mutex.
/// Network calls are made only after that lock is released, and their
/// results are applied under a fresh acquisition.
#[derive(Clone)]
pub struct Raft {
    inner: Arc<RaftInner>,
}

struct RaftInner {
    id: NodeId,
    peers: Vec<NodeId>,
    config: RaftConfig,
    node: Mutex<RaftNode>,
    transport: Arc<dyn PeerTransport>,
    hard_state: Arc<dyn HardStateStore>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    // The vote round currently in flight, aborted when a newer one starts.
    election_round: Mutex<Option<AbortHandle>>,
}

impl Raft {
    /// Restores the persisted term and vote, then starts the election timer.
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: RaftConfig,
        transport: Arc<dyn PeerTransport>,
        hard_state: Arc<dyn HardStateStore>,
    ) -> Result<Self, RaftError> {
        config.validate()?;
        let restored = hard_state.load()?;
        let node = RaftNode::new(&config, restored, Instant::now());

        info!(
            "Starting Raft node {} at term {} with {} peers",
            node.id(),
            node.current_term(),
            node.peers().len()
        );

        let raft = Self {
            inner: Arc::new(RaftInner {
                id: node.id().clone(),
                peers: node.peers().to_vec(),
                config,
                node: Mutex::new(node),
                transport,
                hard_state,
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
                election_round: Mutex::new(None),
            }),
        };

        let timer = raft.clone();
        raft.inner
            .tasks
            .spawn(async move { timer.run_election_timer().await });

        Ok(raft)
    }

    pub fn id(&self) -> &NodeId {
        &self.inner.id
    }

    pub fn peers(&self) -> &[NodeId] {
        &self.inner.peers
    }

    pub async fn status(&self) -> RaftStatus {
        self.inner.node.lock().await.status()
    }

    pub async fn is_leader(&self) -> bool {
        self.inner.node.lock().await.is_leader()
    }

    /// Replaces the pending election deadline, e.g. to make one node fire
    /// first in a test cluster.
    pub async fn set_election_timeout(&self, timeout: Duration) {
        self.inner.node.lock().await.set_election_timeout(timeout);
    }

    /// Inbound RequestVote. The updated term and vote are on stable storage
    /// before the response is returned.
    pub async fn request_vote(&self, request: VoteRequest) -> Result<VoteResponse, RaftError> {
        let mut node = self.inner.node.lock().await;
        let response = node.handle_request_vote(&request, Instant::now());
        self.persist_if_changed(&mut node).await?;

        if response.vote_granted {
            metrics::record_vote_granted();
        }
        Ok(response)
    }

    /// Inbound heartbeat from a leader.
    pub async fn append_entries(
        &self,
        request: AppendRequest,
    ) -> Result<AppendResponse, RaftError> {
        let mut node = self.inner.node.lock().await;
        let response = node.handle_append_entries(&request, Instant::now());
        self.persist_if_changed(&mut node).await?;
        Ok(response)
    }

    /// One election-timer step: starts a candidacy if the deadline passed.
    pub async fn tick(&self) -> Result<(), RaftError> {
        let election = {
            let mut node = self.inner.node.lock().await;
            let election = node.tick(Instant::now());
            self.persist_if_changed(&mut node).await?;
            election
        };

        if let Some(election) = election {
            self.launch(election).await;
        }
        Ok(())
    }

    /// Starts a candidacy immediately and waits for its vote round to finish.
    pub async fn campaign(&self) -> Result<(), RaftError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(RaftError::Shutdown);
        }

        let election = {
            let mut node = self.inner.node.lock().await;
            let election = node.become_candidate(Instant::now());
            self.persist_if_changed(&mut node).await?;
            election
        };

        metrics::record_election();
        self.abort_election_round().await;
        if election.won {
            self.spawn_heartbeats(election.request.term);
        } else {
            self.solicit_votes(election.request).await;
        }
        Ok(())
    }

    /// Stops the timer, any vote round and heartbeat loop, and waits for them.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.abort_election_round().await;
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        info!("Raft node {} stopped", self.inner.id);
    }

    async fn run_election_timer(self) {
        let mut ticker = tokio::time::interval(self.inner.config.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.tick().await {
                error!("Election timer step failed on {}: {e}", self.inner.id);
            }
        }

        debug!("Election timer for {} exited", self.inner.id);
    }

    async fn launch(&self, election: Election) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        metrics::record_election();

        if election.won {
            self.abort_election_round().await;
            self.spawn_heartbeats(election.request.term);
            return;
        }

        let raft = self.clone();
        let handle = self
            .inner
            .tasks
            .spawn(async move { raft.solicit_votes(election.request).await });

        let mut round = self.inner.election_round.lock().await;
        if let Some(previous) = round.replace(handle.abort_handle()) {
            previous.abort();
        }
    }

    async fn abort_election_round(&self) {
        if let Some(previous) = self.inner.election_round.lock().await.take() {
            previous.abort();
        }
    }

    /// Fans the vote request out to every peer and tallies answers as they
    /// arrive. Failed or timed-out calls count as no vote.
    async fn solicit_votes(&self, request: VoteRequest) {
        let term = request.term;
        let mut round = JoinSet::new();

        for peer in self.peers() {
            let transport = Arc::clone(&self.inner.transport);
            let peer = peer.clone();
            let request = request.clone();
            round.spawn(async move {
                let result = transport.request_vote(&peer, request).await;
                (peer, result)
            });
        }

        loop {
            let joined = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                joined = round.join_next() => joined,
            };
            let Some(joined) = joined else { break };

            let (peer, result) = match joined {
                Ok(answer) => answer,
                Err(e) => {
                    debug!("Vote request task failed: {e}");
                    continue;
                }
            };

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    debug!("RequestVote to {peer} for term {term} failed: {e}");
                    continue;
                }
            };

            match self.apply_vote_response(&peer, term, response).await {
                Ok(VoteOutcome::Elected) | Ok(VoteOutcome::SteppedDown) => break,
                Ok(_) => {}
                Err(e) => error!("Failed to record vote response from {peer}: {e}"),
            }
        }
    }

    async fn apply_vote_response(
        &self,
        peer: &NodeId,
        term: u64,
        response: VoteResponse,
    ) -> Result<VoteOutcome, RaftError> {
        let outcome = {
            let mut node = self.inner.node.lock().await;
            let outcome = node.handle_vote_response(peer, term, response);
            self.persist_if_changed(&mut node).await?;
            outcome
        };

        if outcome == VoteOutcome::Elected {
            self.spawn_heartbeats(term);
        }
        Ok(outcome)
    }

    fn spawn_heartbeats(&self, term: u64) {
        let raft = self.clone();
        self.inner
            .tasks
            .spawn(async move { raft.run_heartbeats(term).await });
    }

    /// Leader loop. Ends as soon as this node is no longer leader of `term`.
    async fn run_heartbeats(self, term: u64) {
        let mut ticker = tokio::time::interval(self.inner.config.heartbeat());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: Option<JoinSet<()>> = None;

        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let leading = {
                let node = self.inner.node.lock().await;
                node.is_leader() && node.current_term() == term
            };
            if !leading {
                debug!(
                    "Node {} no longer leader for term {term}, stopping heartbeats",
                    self.inner.id
                );
                break;
            }

            // Whatever is left of the previous wave is abandoned.
            drop(in_flight.replace(self.broadcast_heartbeat(term)));
        }
    }

    fn broadcast_heartbeat(&self, term: u64) -> JoinSet<()> {
        let request = AppendRequest {
            term,
            leader_id: self.inner.id.clone(),
        };
        let mut wave = JoinSet::new();

        for peer in self.peers() {
            let transport = Arc::clone(&self.inner.transport);
            let peer = peer.clone();
            let request = request.clone();
            wave.spawn(async move {
                match transport.append_entries(&peer, request).await {
                    Ok(resp) => trace!(
                        "Heartbeat to {peer} answered: term={} success={}",
                        resp.term,
                        resp.success
                    ),
                    Err(e) => trace!("Heartbeat to {peer} failed: {e}"),
                }
            });
        }

        metrics::record_heartbeat_wave();
        wave
    }

    /// Saves the term and vote if they moved since the last successful
    /// save. Must run under the state lock, before any reply leaves.
    async fn persist_if_changed(&self, node: &mut RaftNode) -> Result<(), RaftError> {
        let Some(pending) = node.unpersisted() else {
            return Ok(());
        };
        if let Err(e) = self.inner.hard_state.save(&pending).await {
            warn!(
                "Node {} failed to persist term {}: {e}",
                self.inner.id, pending.current_term
            );
            return Err(e);
        }
        node.mark_persisted(pending);
        Ok(())
    }
}
