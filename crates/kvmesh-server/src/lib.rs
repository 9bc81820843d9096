pub mod forward;
mod kv_service;
pub mod routing;

use std::net::SocketAddr;
use std::sync::Arc;

use kvmesh_cluster::{HashRing, NodeRegistry};
use kvmesh_proto::KvServiceServer;
use kvmesh_types::{KvError, WriteMode};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;
use tonic_reflection::server::Builder as ReflectionBuilder;

pub use forward::{ForwardOptions, Forwarder, GrpcForwarder};
pub use kv_service::KvServiceImpl;
pub use routing::{Route, RoutingService};

/// Build the routing service for `local`, forwarding over gRPC.
pub fn grpc_routing(
    local: &str,
    ring: Arc<HashRing>,
    registry: Arc<NodeRegistry>,
    write_mode: WriteMode,
    forward: ForwardOptions,
) -> Result<Arc<RoutingService<GrpcForwarder>>, KvError> {
    let info = registry
        .lookup(local)
        .cloned()
        .ok_or_else(|| KvError::TargetNotFound { node: local.to_string() })?;
    let forwarder = GrpcForwarder::new(&registry, local, forward)?;
    Ok(Arc::new(
        RoutingService::new(info, ring, registry, forwarder).with_write_mode(write_mode),
    ))
}

fn router<F: Forwarder>(routing: Arc<RoutingService<F>>) -> anyhow::Result<Router> {
    let reflection = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(kvmesh_proto::FILE_DESCRIPTOR_SET)
        .build_v1()?;
    Ok(tonic::transport::Server::builder()
        .add_service(KvServiceServer::new(KvServiceImpl::new(routing)))
        .add_service(reflection))
}

pub async fn serve<F: Forwarder>(
    addr: SocketAddr,
    routing: Arc<RoutingService<F>>,
) -> anyhow::Result<()> {
    let node = routing.local().name.clone();
    let router = router(routing)?;
    tracing::info!(%node, %addr, "kv gRPC server starting");
    router.serve(addr).await.map_err(Into::into)
}

/// Serve on an already bound listener (lets callers bind port 0).
pub async fn serve_with_listener<F: Forwarder>(
    listener: TcpListener,
    routing: Arc<RoutingService<F>>,
) -> anyhow::Result<()> {
    let node = routing.local().name.clone();
    let addr = listener.local_addr()?;
    let router = router(routing)?;
    tracing::info!(%node, %addr, "kv gRPC server starting");
    router
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await
        .map_err(Into::into)
}
