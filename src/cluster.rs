//! HTTP liveness tracking of peers.
//!
//! Independent of the consensus core: nothing here reads or changes Raft
//! state, and Raft does not consult liveness.

use std::sync::Arc;
use std::time::Duration;

use hyper::client::HttpConnector;
use hyper::{Client, StatusCode, Uri};
use log::{info, warn};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{dial_addr, health_addr_for};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    pub addr: String,
    pub alive: bool,
    pub last_ok: Option<Instant>,
}

pub struct ClusterMonitor {
    self_addr: String,
    peers: RwLock<Vec<PeerStatus>>,
    interval: Duration,
    probe_timeout: Duration,
    client: Client<HttpConnector>,
}

impl ClusterMonitor {
    /// `peers` are gRPC addresses; this node's own address is skipped.
    pub fn new(self_addr: &str, peers: &[String]) -> Self {
        let peers = peers
            .iter()
            .filter(|addr| !addr.is_empty() && addr.as_str() != self_addr)
            .map(|addr| PeerStatus {
                addr: addr.clone(),
                alive: false,
                last_ok: None,
            })
            .collect();

        Self {
            self_addr: self_addr.to_string(),
            peers: RwLock::new(peers),
            interval: Duration::from_secs(2),
            probe_timeout: Duration::from_millis(800),
            client: Client::new(),
        }
    }

    /// Pings every peer each interval until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let count = self.peers.read().await.len();
        info!("Cluster monitor for {} started with {count} peers", self.self_addr);

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.ping_peers().await,
            }
        }

        info!("Cluster monitor stopped");
    }

    /// Probes all peers concurrently, then records the results.
    pub async fn ping_peers(&self) {
        let addrs: Vec<String> = self
            .peers
            .read()
            .await
            .iter()
            .map(|p| p.addr.clone())
            .collect();

        let mut probes = JoinSet::new();
        for addr in addrs {
            let client = self.client.clone();
            let probe_timeout = self.probe_timeout;
            probes.spawn(async move {
                let alive = match health_addr_for(&addr) {
                    Some(health) => probe(&client, &health, probe_timeout).await,
                    None => false,
                };
                (addr, alive)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = probes.join_next().await {
            if let Ok(result) = joined {
                results.push(result);
            }
        }

        let now = Instant::now();
        let mut peers = self.peers.write().await;
        for (addr, alive) in results {
            let Some(peer) = peers.iter_mut().find(|p| p.addr == addr) else {
                continue;
            };
            if alive {
                if !peer.alive {
                    info!("Peer {addr} is now alive");
                }
                peer.alive = true;
                peer.last_ok = Some(now);
            } else {
                if peer.alive {
                    warn!("Peer {addr} seems dead");
                }
                peer.alive = false;
            }
        }
    }

    pub async fn peers_status(&self) -> Vec<PeerStatus> {
        self.peers.read().await.clone()
    }

    /// One probe of a health endpoint (`host:port`, not the gRPC address).
    pub async fn check_once(health_addr: &str) -> bool {
        probe(&Client::new(), health_addr, Duration::from_millis(800)).await
    }
}

async fn probe(client: &Client<HttpConnector>, health_addr: &str, limit: Duration) -> bool {
    let uri: Uri = match format!("http://{}/healthz", dial_addr(health_addr)).parse() {
        Ok(uri) => uri,
        Err(_) => return false,
    };

    match timeout(limit, client.get(uri)).await {
        Ok(Ok(resp)) => resp.status() == StatusCode::OK,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_filters_out_self() {
        let peers = vec![":4000".to_string(), ":4001".to_string(), String::new()];
        let monitor = ClusterMonitor::new(":4000", &peers);
        let status = monitor.peers_status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].addr, ":4001");
        assert!(!status[0].alive);
    }

    #[tokio::test]
    async fn unreachable_peer_stays_dead() {
        // Port 0 is never a valid remote port; its health port 1 is closed.
        let monitor = ClusterMonitor::new(":4000", &["127.0.0.1:0".to_string()]);
        monitor.ping_peers().await;
        let status = monitor.peers_status().await;
        assert!(!status[0].alive);
        assert!(status[0].last_ok.is_none());
    }
}
