use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use tokio::task::JoinSet;

use kvmesh_cluster::{parse_node_spec, NodeRegistry};
use kvmesh_server::{grpc_routing, serve, ForwardOptions};
use kvmesh_types::{NodeInfo, WriteMode};

#[derive(clap::Parser, Debug)]
#[command(name = "kvmesh-node", about = "kvmesh partitioned KV node")]
struct Cli {
    /// Member to serve; omit to serve every member in this process.
    #[arg(long)]
    node: Option<String>,
    /// Member specs: "name=host:port" format, repeatable. Replaces the
    /// configured member list.
    #[arg(long = "peer")]
    peers: Vec<String>,
    /// Generate members node1..nodeN on --host, ports 50051.., instead of
    /// using the configured list.
    #[arg(long, conflicts_with = "peers")]
    node_count: Option<u16>,
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ClusterConfig {
    virtual_nodes: usize,
    #[serde(default)]
    nodes: Vec<NodeInfo>,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    write_mode: WriteMode,
    forward_timeout_ms: u64,
    connect_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    log_level: String,
    log_format: String,
}

#[derive(Debug, Deserialize)]
struct Config {
    cluster: ClusterConfig,
    server: ServerConfig,
    observability: ObservabilityConfig,
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let mut figment = Figment::new()
        .merge(Toml::string(include_str!("../../../config/default.toml")));

    if let Some(config_path) = path {
        figment = figment.merge(Toml::file_exact(config_path));
    }

    figment
        .merge(Env::prefixed("KVMESH_").split("__"))
        .extract()
        .context("failed to load configuration")
}

/// Membership precedence: `--peer` specs, then `--node-count`, then config.
fn resolve_registry(cli: &Cli, configured: &[NodeInfo]) -> anyhow::Result<NodeRegistry> {
    let registry = if !cli.peers.is_empty() {
        let nodes = cli
            .peers
            .iter()
            .map(|spec| parse_node_spec(spec))
            .collect::<Result<Vec<_>, _>>()
            .context("invalid --peer")?;
        NodeRegistry::new(nodes)
    } else if let Some(count) = cli.node_count {
        NodeRegistry::reference(&cli.host, count)
    } else {
        NodeRegistry::new(configured.to_vec())
    }
    .context("invalid cluster membership")?;

    anyhow::ensure!(!registry.is_empty(), "cluster membership is empty");
    Ok(registry)
}

async fn bind_addr(node: &NodeInfo) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host(node.address.as_str())
        .await
        .with_context(|| format!("cannot resolve {}", node.address))?
        .next()
        .with_context(|| format!("no address for {}", node.address))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match config.observability.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
    }

    let registry = Arc::new(resolve_registry(&cli, &config.cluster.nodes)?);
    let ring = Arc::new(registry.build_ring(config.cluster.virtual_nodes));
    let forward = ForwardOptions {
        timeout: Duration::from_millis(config.server.forward_timeout_ms),
        connect_timeout: Duration::from_millis(config.server.connect_timeout_ms),
    };

    let local: Vec<NodeInfo> = match &cli.node {
        Some(name) => vec![registry
            .lookup(name)
            .cloned()
            .with_context(|| format!("node '{name}' is not a cluster member"))?],
        None => registry.nodes().to_vec(),
    };

    tracing::info!(
        members = registry.len(),
        serving = local.len(),
        virtual_nodes = ring.replicas(),
        write_mode = ?config.server.write_mode,
        "node starting"
    );

    let mut servers = JoinSet::new();
    for node in local {
        let addr = bind_addr(&node).await?;
        let routing = grpc_routing(
            &node.name,
            ring.clone(),
            registry.clone(),
            config.server.write_mode,
            forward,
        )
        .with_context(|| format!("failed to set up {}", node.name))?;
        servers.spawn(serve(addr, routing));
    }

    while let Some(joined) = servers.join_next().await {
        joined.context("server task panicked")??;
    }
    Ok(())
}
