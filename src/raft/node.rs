use log::{debug, info};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

use super::timer::ElectionTimer;
use super::{
    AppendRequest, AppendResponse, HardState, NodeId, NodeRole, RaftConfig, RaftStatus,
    VoteRequest, VoteResponse,
};

/// A candidacy that has just begun. `request` must be sent to every peer
/// once the state lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Election {
    pub request: VoteRequest,
    /// The self-vote alone was a quorum (single-node cluster).
    pub won: bool,
}

/// Effect of applying one vote response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The responder knew a newer term; this node is now a follower.
    SteppedDown,
    /// Stale, denied, or already counted.
    Ignored,
    Counted,
    Elected,
}

/// Consensus state of one node. Not thread-safe on its own: the driver
/// keeps it behind a single mutex and every method runs under that lock.
pub struct RaftNode {
    id: NodeId,
    peers: Vec<NodeId>,

    role: NodeRole,
    current_term: u64,
    voted_for: Option<NodeId>,
    // Last term/vote acknowledged by stable storage.
    persisted: HardState,

    // Candidacy tally; meaningful only while role == Candidate.
    vote_count: usize,
    voters: HashSet<NodeId>,

    last_contact: Instant,
    election_timeout: Duration,
    timer: ElectionTimer,
}

impl RaftNode {
    pub fn new(config: &RaftConfig, hard_state: HardState, now: Instant) -> Self {
        let mut timer = ElectionTimer::new(
            config.election_timeout_min,
            config.election_timeout_max,
            config.seed,
        );
        let election_timeout = timer.next_timeout();

        let peers = config
            .peers
            .iter()
            .filter(|p| !p.is_empty() && **p != config.node_id)
            .cloned()
            .collect();

        Self {
            id: config.node_id.clone(),
            peers,
            role: NodeRole::Follower,
            current_term: hard_state.current_term,
            voted_for: hard_state.voted_for.clone(),
            persisted: hard_state,
            vote_count: 0,
            voters: HashSet::new(),
            last_contact: now,
            election_timeout,
            timer,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn peers(&self) -> &[NodeId] {
        &self.peers
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == NodeRole::Leader
    }

    pub fn current_term(&self) -> u64 {
        self.current_term
    }

    pub fn voted_for(&self) -> Option<&NodeId> {
        self.voted_for.as_ref()
    }

    pub fn vote_count(&self) -> usize {
        self.vote_count
    }

    pub fn last_contact(&self) -> Instant {
        self.last_contact
    }

    pub fn election_timeout(&self) -> Duration {
        self.election_timeout
    }

    /// Overrides the current election deadline until the timer next fires.
    pub fn set_election_timeout(&mut self, timeout: Duration) {
        self.election_timeout = timeout;
    }

    pub fn hard_state(&self) -> HardState {
        HardState {
            current_term: self.current_term,
            voted_for: self.voted_for.clone(),
        }
    }

    /// The current term and vote when they differ from what was last
    /// saved. A failed save leaves them pending until one succeeds.
    pub fn unpersisted(&self) -> Option<HardState> {
        let current = self.hard_state();
        (current != self.persisted).then_some(current)
    }

    pub fn mark_persisted(&mut self, state: HardState) {
        self.persisted = state;
    }

    pub fn status(&self) -> RaftStatus {
        RaftStatus {
            id: self.id.clone(),
            role: self.role,
            current_term: self.current_term,
            voted_for: self.voted_for.clone(),
            vote_count: self.vote_count,
        }
    }

    /// Strict majority of the whole cluster, self included.
    fn has_quorum(&self) -> bool {
        self.vote_count > (self.peers.len() + 1) / 2
    }

    /// One election-timer step. Returns the new candidacy when the deadline
    /// has passed without leader contact.
    pub fn tick(&mut self, now: Instant) -> Option<Election> {
        if self.role == NodeRole::Leader {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.last_contact);
        if elapsed < self.election_timeout {
            return None;
        }

        debug!(
            "Node {} heard no leader for {}ms (deadline {}ms)",
            self.id,
            elapsed.as_millis(),
            self.election_timeout.as_millis()
        );
        let election = self.become_candidate(now);
        self.election_timeout = self.timer.next_timeout();
        Some(election)
    }

    pub fn become_candidate(&mut self, now: Instant) -> Election {
        self.role = NodeRole::Candidate;
        self.current_term += 1;
        self.voted_for = Some(self.id.clone());
        self.last_contact = now;
        self.vote_count = 1;
        self.voters.clear();

        info!(
            "Node {} starting election for term {}",
            self.id, self.current_term
        );

        let won = self.has_quorum();
        if won {
            self.become_leader();
        }

        Election {
            request: VoteRequest {
                term: self.current_term,
                candidate_id: self.id.clone(),
            },
            won,
        }
    }

    fn become_leader(&mut self) {
        self.role = NodeRole::Leader;
        info!(
            "Node {} became leader for term {} with {} votes",
            self.id, self.current_term, self.vote_count
        );
    }

    fn step_down(&mut self, term: u64) {
        if self.role != NodeRole::Follower {
            info!(
                "Node {} stepping down from {} at term {}: saw term {}",
                self.id, self.role, self.current_term, term
            );
        }
        self.current_term = term;
        self.voted_for = None;
        self.role = NodeRole::Follower;
    }

    /// Applies a peer's answer to the vote request sent for `solicited_term`.
    pub fn handle_vote_response(
        &mut self,
        from: &NodeId,
        solicited_term: u64,
        response: VoteResponse,
    ) -> VoteOutcome {
        if response.term > self.current_term {
            self.step_down(response.term);
            return VoteOutcome::SteppedDown;
        }

        if self.role != NodeRole::Candidate || solicited_term != self.current_term {
            return VoteOutcome::Ignored;
        }

        if !response.vote_granted {
            debug!("Node {} denied vote to {} for term {}", from, self.id, solicited_term);
            return VoteOutcome::Ignored;
        }

        // A repeated grant from the same peer is one logical vote.
        if !self.voters.insert(from.clone()) {
            return VoteOutcome::Ignored;
        }

        self.vote_count += 1;
        debug!(
            "Node {} received vote from {} for term {} ({} votes)",
            self.id, from, self.current_term, self.vote_count
        );

        if self.has_quorum() {
            self.become_leader();
            VoteOutcome::Elected
        } else {
            VoteOutcome::Counted
        }
    }

    pub fn handle_request_vote(&mut self, request: &VoteRequest, now: Instant) -> VoteResponse {
        if request.term < self.current_term {
            return VoteResponse {
                term: self.current_term,
                vote_granted: false,
            };
        }

        if request.term > self.current_term {
            self.step_down(request.term);
        }

        let vote_granted = match &self.voted_for {
            None => true,
            Some(voted) => *voted == request.candidate_id,
        };

        if vote_granted {
            self.voted_for = Some(request.candidate_id.clone());
            self.last_contact = now;
        }

        debug!(
            "Node {} RequestVote from {} term {}: granted={}",
            self.id, request.candidate_id, request.term, vote_granted
        );

        VoteResponse {
            term: self.current_term,
            vote_granted,
        }
    }

    pub fn handle_append_entries(
        &mut self,
        request: &AppendRequest,
        now: Instant,
    ) -> AppendResponse {
        if request.term < self.current_term {
            return AppendResponse {
                term: self.current_term,
                success: false,
            };
        }

        if self.role != NodeRole::Follower {
            info!(
                "Node {} following {} at term {} (was {})",
                self.id, request.leader_id, request.term, self.role
            );
        }

        self.role = NodeRole::Follower;
        self.current_term = request.term;
        self.voted_for = Some(request.leader_id.clone());
        self.last_contact = now;

        AppendResponse {
            term: self.current_term,
            success: true,
        }
    }
}
