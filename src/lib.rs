// Consensus core
pub mod raft;

// Node plumbing
pub mod cluster;
pub mod config;
pub mod network;
pub mod shutdown;
pub mod storage;

// Public exports
pub use cluster::{ClusterMonitor, PeerStatus};
pub use config::Config;
pub use raft::{NodeId, NodeRole, Raft, RaftConfig};
pub use storage::{KvStore, SledStore};
