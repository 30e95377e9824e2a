use std::sync::atomic::{AtomicU64, Ordering};

pub static ELECTIONS_STARTED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static VOTES_GRANTED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static HEARTBEAT_WAVES_TOTAL: AtomicU64 = AtomicU64::new(0);

pub fn record_election() {
    ELECTIONS_STARTED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_vote_granted() {
    VOTES_GRANTED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_heartbeat_wave() {
    HEARTBEAT_WAVES_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Counters as Prometheus text exposition.
pub fn render() -> String {
    format!(
        "# TYPE raft_elections_started_total counter\n\
         raft_elections_started_total {}\n\
         # TYPE raft_votes_granted_total counter\n\
         raft_votes_granted_total {}\n\
         # TYPE raft_heartbeat_waves_total counter\n\
         raft_heartbeat_waves_total {}\n",
        ELECTIONS_STARTED_TOTAL.load(Ordering::Relaxed),
        VOTES_GRANTED_TOTAL.load(Ordering::Relaxed),
        HEARTBEAT_WAVES_TOTAL.load(Ordering::Relaxed),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_every_counter() {
        record_election();
        let text = render();
        assert!(text.contains("raft_elections_started_total"));
        assert!(text.contains("raft_votes_granted_total"));
        assert!(text.contains("raft_heartbeat_waves_total"));
    }
}
