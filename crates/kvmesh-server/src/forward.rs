use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use kvmesh_cluster::NodeRegistry;
use kvmesh_proto::convert::status_to_kv_error;
use kvmesh_proto::v1::{DelRequest, GetRequest, PutRequest};
use kvmesh_proto::KvServiceClient;
use kvmesh_types::{Entry, KvError, NodeInfo, PutAck};
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

// ---------------------------------------------------------------------------
// Forwarder trait
// The single hop from a non-owner to the owner. Implementations must relay
// classified failures from the target unchanged and report anything else
// (unreachable peer, deadline, codec) as `KvError::ForwardFailed`.
// ---------------------------------------------------------------------------

pub trait Forwarder: Send + Sync + 'static {
    fn put(
        &self,
        target: &NodeInfo,
        key: &str,
        value: Vec<u8>,
        version: i64,
    ) -> impl Future<Output = Result<PutAck, KvError>> + Send;

    fn get(
        &self,
        target: &NodeInfo,
        key: &str,
    ) -> impl Future<Output = Result<Entry, KvError>> + Send;

    fn del(&self, target: &NodeInfo, key: &str) -> impl Future<Output = Result<(), KvError>> + Send;
}

#[derive(Debug, Clone, Copy)]
pub struct ForwardOptions {
    /// Deadline on each forwarded call.
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        ForwardOptions {
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// GrpcForwarder — one lazily connected channel per peer
// ---------------------------------------------------------------------------

pub struct GrpcForwarder {
    clients: HashMap<String, KvServiceClient<Channel>>,
}

impl GrpcForwarder {
    /// Prepares a channel to every member except `local`. No connection is
    /// made until the first forward. Must run inside a tokio runtime.
    pub fn new(registry: &NodeRegistry, local: &str, opts: ForwardOptions) -> Result<Self, KvError> {
        let mut clients = HashMap::new();
        for node in registry.nodes().iter().filter(|n| n.name != local) {
            let endpoint = Endpoint::from_shared(format!("http://{}", node.address))
                .map_err(|e| {
                    KvError::InvalidArgument(format!("bad address for {}: {e}", node.name))
                })?
                .timeout(opts.timeout)
                .connect_timeout(opts.connect_timeout);
            clients.insert(node.name.clone(), KvServiceClient::new(endpoint.connect_lazy()));
        }
        Ok(GrpcForwarder { clients })
    }

    fn client(&self, target: &NodeInfo) -> Result<KvServiceClient<Channel>, KvError> {
        self.clients
            .get(&target.name)
            .cloned()
            .ok_or_else(|| KvError::TargetNotFound { node: target.name.clone() })
    }
}

fn relay(target: &NodeInfo, key: &str, status: Status) -> KvError {
    match status_to_kv_error(&status, key) {
        Some(err) => err,
        None => {
            tracing::warn!(node = %target, %key, code = ?status.code(), "forward failed");
            KvError::ForwardFailed {
                node: target.name.clone(),
                reason: status.message().to_string(),
            }
        }
    }
}

impl Forwarder for GrpcForwarder {
    async fn put(
        &self,
        target: &NodeInfo,
        key: &str,
        value: Vec<u8>,
        version: i64,
    ) -> Result<PutAck, KvError> {
        let mut client = self.client(target)?;
        let req = PutRequest {
            key: key.to_string(),
            value,
            version,
            forwarded: true,
        };
        let resp = client
            .put(req)
            .await
            .map_err(|s| relay(target, key, s))?
            .into_inner();
        Ok(PutAck {
            previous_version: resp.version,
            applied_version: resp.applied_version,
        })
    }

    async fn get(&self, target: &NodeInfo, key: &str) -> Result<Entry, KvError> {
        let mut client = self.client(target)?;
        let req = GetRequest { key: key.to_string(), forwarded: true };
        let resp = client
            .get(req)
            .await
            .map_err(|s| relay(target, key, s))?
            .into_inner();
        if !resp.found {
            return Err(KvError::not_found(key));
        }
        Ok(Entry { value: resp.value, version: resp.version })
    }

    async fn del(&self, target: &NodeInfo, key: &str) -> Result<(), KvError> {
        let mut client = self.client(target)?;
        let req = DelRequest { key: key.to_string(), forwarded: true };
        let resp = client
            .del(req)
            .await
            .map_err(|s| relay(target, key, s))?
            .into_inner();
        if !resp.success {
            return Err(KvError::not_found(key));
        }
        Ok(())
    }
}
