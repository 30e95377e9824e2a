pub mod client;
mod error;
pub mod health;
pub mod server;
mod transport;

pub use self::client::{GrpcTransport, KvClient};
pub use self::error::NetworkError;
pub use self::server::{KvServer, RaftServer};
pub use self::transport::{LocalNetwork, LocalTransport, PeerTransport};

pub mod proto {
    pub mod raft {
        tonic::include_proto!("raft");
    }

    pub mod kv {
        tonic::include_proto!("kv");
    }
}
