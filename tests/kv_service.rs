use std::net::SocketAddr;
use std::sync::Arc;

use quorumkv::network::proto::kv::kv_service_server::KvServiceServer;
use quorumkv::network::{KvClient, KvServer};
use quorumkv::storage::SledStore;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

async fn start_server(store: Arc<SledStore>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        Server::builder()
            .add_service(KvServiceServer::new(KvServer::new(store)))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("serve");
    });
    addr
}

#[tokio::test]
async fn put_get_delete_over_grpc() {
    let tmp = TempDir::new().expect("tempdir");
    let store = Arc::new(SledStore::open(tmp.path()).expect("open"));
    let addr = start_server(store).await;

    let mut client = KvClient::new(&addr.to_string());
    client.connect().await.expect("connect");

    assert_eq!(client.health().await.expect("health"), "ok");
    assert!(client.put(b"color", b"blue").await.expect("put"));
    assert_eq!(
        client.get(b"color").await.expect("get"),
        Some(b"blue".to_vec())
    );
    assert_eq!(client.get(b"shape").await.expect("get"), None);

    assert!(client.delete(b"color").await.expect("delete"));
    assert_eq!(client.get(b"color").await.expect("get"), None);

    // Deleting again is not an error.
    assert!(client.delete(b"color").await.expect("delete"));
}

#[tokio::test]
async fn empty_value_is_distinct_from_missing() {
    let tmp = TempDir::new().expect("tempdir");
    let store = Arc::new(SledStore::open(tmp.path()).expect("open"));
    let addr = start_server(store).await;

    let mut client = KvClient::new(&addr.to_string());
    client.put(b"k", b"").await.expect("put");
    assert_eq!(client.get(b"k").await.expect("get"), Some(Vec::new()));
}

#[tokio::test]
async fn empty_key_is_rejected() {
    let tmp = TempDir::new().expect("tempdir");
    let store = Arc::new(SledStore::open(tmp.path()).expect("open"));
    let addr = start_server(store).await;

    let mut client = KvClient::new(&addr.to_string());
    assert!(client.put(b"", b"v").await.is_err());
    assert!(client.get(b"").await.is_err());
}
