//! Raft RPCs over real gRPC connections on loopback.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quorumkv::network::proto::raft::raft_service_server::RaftServiceServer;
use quorumkv::network::{GrpcTransport, PeerTransport, RaftServer};
use quorumkv::raft::{
    AppendRequest, MemoryHardStateStore, NodeId, NodeRole, Raft, RaftConfig, VoteRequest,
};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

fn serve(listener: TcpListener, raft: Raft) {
    tokio::spawn(async move {
        Server::builder()
            .add_service(RaftServiceServer::new(RaftServer::new(raft)))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("serve");
    });
}

fn start_node(config: RaftConfig) -> Raft {
    let transport = Arc::new(GrpcTransport::new(&config));
    Raft::start(config, transport, Arc::new(MemoryHardStateStore::new())).expect("start node")
}

#[tokio::test]
async fn vote_and_heartbeat_round_trip() {
    let (listener, addr) = bind().await;
    let raft = start_node(RaftConfig::new(addr.to_string()).with_seed(1));
    raft.set_election_timeout(Duration::from_secs(3600)).await;
    serve(listener, raft.clone());

    let transport = GrpcTransport::new(&RaftConfig::new("client"));
    let target = NodeId::from(addr.to_string());

    let granted = transport
        .request_vote(
            &target,
            VoteRequest {
                term: 5,
                candidate_id: NodeId::from("x"),
            },
        )
        .await
        .expect("vote rpc");
    assert!(granted.vote_granted);
    assert_eq!(granted.term, 5);

    let denied = transport
        .request_vote(
            &target,
            VoteRequest {
                term: 5,
                candidate_id: NodeId::from("y"),
            },
        )
        .await
        .expect("vote rpc");
    assert!(!denied.vote_granted);
    assert_eq!(denied.term, 5);

    let stale = transport
        .append_entries(
            &target,
            AppendRequest {
                term: 4,
                leader_id: NodeId::from("y"),
            },
        )
        .await
        .expect("append rpc");
    assert!(!stale.success);
    assert_eq!(stale.term, 5);

    let accepted = transport
        .append_entries(
            &target,
            AppendRequest {
                term: 6,
                leader_id: NodeId::from("y"),
            },
        )
        .await
        .expect("append rpc");
    assert!(accepted.success);
    assert_eq!(accepted.term, 6);

    let status = raft.status().await;
    assert_eq!(status.role, NodeRole::Follower);
    assert_eq!(status.voted_for, Some(NodeId::from("y")));

    raft.shutdown().await;
}

#[tokio::test]
async fn two_nodes_elect_a_leader_over_grpc() {
    let (l1, a1) = bind().await;
    let (l2, a2) = bind().await;

    let mut c1 = RaftConfig::new(a1.to_string()).with_seed(10);
    c1.add_peer(a2.to_string());
    let mut c2 = RaftConfig::new(a2.to_string()).with_seed(20);
    c2.add_peer(a1.to_string());

    let n1 = start_node(c1);
    let n2 = start_node(c2);
    serve(l1, n1.clone());
    serve(l2, n2.clone());

    let mut elected = false;
    for _ in 0..60 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let s1 = n1.status().await;
        let s2 = n2.status().await;
        let leaders = [s1.role, s2.role]
            .iter()
            .filter(|r| **r == NodeRole::Leader)
            .count();
        if leaders == 1 && s1.current_term == s2.current_term {
            elected = true;
            break;
        }
    }
    assert!(elected, "no stable leader within 6s");

    n1.shutdown().await;
    n2.shutdown().await;
}
