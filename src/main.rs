use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use log::{error, info};
use tonic::transport::Server;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quorumkv::cluster::ClusterMonitor;
use quorumkv::config::{self, Config};
use quorumkv::network::health::serve_health;
use quorumkv::network::proto::kv::kv_service_server::KvServiceServer;
use quorumkv::network::proto::raft::raft_service_server::RaftServiceServer;
use quorumkv::network::{GrpcTransport, KvClient, KvServer, RaftServer};
use quorumkv::raft::{Raft, SledHardStateStore};
use quorumkv::shutdown::install_shutdown_handler;
use quorumkv::storage::{KvStore, SledStore};

const DEFAULT_CLIENT_ADDR: &str = "127.0.0.1:4000";

#[derive(Parser)]
#[command(name = "quorumkv")]
#[command(about = "A key-value store node with Raft leader election")]
struct Cli {
    /// Node address. For `node`, the address to listen on; otherwise the node to talk to
    #[arg(long, global = true)]
    addr: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a cluster node
    Node {
        /// Directory to store data
        #[arg(short, long)]
        data_dir: Option<String>,

        /// Comma-separated list of peer addresses
        #[arg(short, long)]
        peers: Option<String>,

        /// JSON config file, applied before environment and flags
        #[arg(short, long = "config")]
        config_path: Option<PathBuf>,

        /// Seed for election timeouts (reproducible runs)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Store a value
    Put { key: String, value: String },

    /// Fetch a value
    Get { key: String },

    /// Delete a key
    Del { key: String },

    /// Check that a node is serving
    Health,
}

fn init_logging() {
    let _ = LogTracer::init();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Node {
            data_dir,
            peers,
            config_path,
            seed,
        } => {
            let mut cfg = Config::load(config_path.as_deref())?;
            if let Some(addr) = cli.addr {
                cfg.addr = addr;
            }
            if let Some(data_dir) = data_dir {
                cfg.data_dir = data_dir;
            }
            if let Some(peers) = peers {
                cfg.peers = config::split_peers(&peers);
            }
            if seed.is_some() {
                cfg.raft.seed = seed;
            }
            run_node(cfg).await?;
        }
        Command::Put { key, value } => {
            let mut client = connect(cli.addr).await?;
            client.put(key.as_bytes(), value.as_bytes()).await?;
            println!("ok");
        }
        Command::Get { key } => {
            let mut client = connect(cli.addr).await?;
            match client.get(key.as_bytes()).await? {
                Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                None => println!("(nil)"),
            }
        }
        Command::Del { key } => {
            let mut client = connect(cli.addr).await?;
            client.delete(key.as_bytes()).await?;
            println!("deleted");
        }
        Command::Health => {
            let mut client = connect(cli.addr).await?;
            println!("{}", client.health().await?);
        }
    }

    Ok(())
}

async fn connect(addr: Option<String>) -> anyhow::Result<KvClient> {
    let addr = addr.unwrap_or_else(|| DEFAULT_CLIENT_ADDR.to_string());
    let mut client = KvClient::new(&addr);
    client
        .connect()
        .await
        .with_context(|| format!("could not reach node at {addr}"))?;
    Ok(client)
}

async fn run_node(cfg: Config) -> anyhow::Result<()> {
    let raft_config = cfg.raft_config();
    let listen: SocketAddr = config::bind_addr(&cfg.addr)
        .parse()
        .with_context(|| format!("invalid listen address {}", cfg.addr))?;
    let health: SocketAddr = config::bind_addr(&cfg.health_addr()?)
        .parse()
        .map_err(|e| anyhow!("invalid health address: {e}"))?;

    info!("Starting quorumkv node {} with peers {:?}", cfg.addr, cfg.peers);

    let store = Arc::new(SledStore::open(&cfg.data_dir)?);
    let hard_state = Arc::new(SledHardStateStore::open(store.db())?);
    let transport = Arc::new(GrpcTransport::new(&raft_config));

    let shutdown = install_shutdown_handler();

    let raft = Raft::start(raft_config, transport, hard_state)?;

    let health_server = {
        let raft = raft.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_health(health, Some(raft), shutdown).await {
                error!("Health endpoint failed: {e}");
            }
        })
    };

    let monitor = Arc::new(ClusterMonitor::new(&cfg.addr, &cfg.peers));
    let monitor_task = tokio::spawn(monitor.run(shutdown.clone()));

    info!("gRPC server listening on {listen}");
    let serve_result = Server::builder()
        .add_service(RaftServiceServer::new(RaftServer::new(raft.clone())))
        .add_service(KvServiceServer::new(KvServer::new(store.clone())))
        .serve_with_shutdown(listen, shutdown.clone().cancelled_owned())
        .await;

    // A server error also takes the rest of the node down.
    shutdown.cancel();
    raft.shutdown().await;
    let _ = health_server.await;
    let _ = monitor_task.await;
    store.flush().await?;

    info!("Node {} stopped", cfg.addr);
    serve_result?;
    Ok(())
}
