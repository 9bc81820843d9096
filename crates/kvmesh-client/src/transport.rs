use std::future::Future;
use std::time::Duration;

use kvmesh_proto::convert::status_to_kv_error;
use kvmesh_proto::v1::{DelRequest, GetRequest, PutRequest};
use kvmesh_proto::KvServiceClient;
use kvmesh_types::{Entry, KvError, PutAck};
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

/// The three calls a session makes against a node.
///
/// Classified failures come back as the matching [`KvError`]; anything the
/// node did not classify is [`KvError::Transport`].
pub trait KvTransport: Send + Sync + 'static {
    fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        version: i64,
    ) -> impl Future<Output = Result<PutAck, KvError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Entry, KvError>> + Send;

    fn del(&self, key: &str) -> impl Future<Output = Result<(), KvError>> + Send;
}

/// gRPC transport to a single node.
#[derive(Clone)]
pub struct GrpcTransport {
    client: KvServiceClient<Channel>,
}

impl GrpcTransport {
    pub async fn connect(addr: &str) -> Result<Self, KvError> {
        Self::connect_with_timeout(addr, None).await
    }

    /// `timeout` bounds every call; expiry surfaces as `KvError::Transport`.
    pub async fn connect_with_timeout(
        addr: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, KvError> {
        let mut endpoint = Endpoint::from_shared(format!("http://{addr}"))
            .map_err(|e| KvError::InvalidArgument(format!("bad address '{addr}': {e}")))?;
        if let Some(timeout) = timeout {
            endpoint = endpoint.timeout(timeout);
        }
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| KvError::Transport(format!("connect to {addr}: {e}")))?;
        tracing::debug!(%addr, "connected");
        Ok(GrpcTransport { client: KvServiceClient::new(channel) })
    }
}

fn classify(key: &str, status: Status) -> KvError {
    status_to_kv_error(&status, key)
        .unwrap_or_else(|| KvError::Transport(format!("{:?}: {}", status.code(), status.message())))
}

impl KvTransport for GrpcTransport {
    async fn put(&self, key: &str, value: Vec<u8>, version: i64) -> Result<PutAck, KvError> {
        let req = PutRequest {
            key: key.to_string(),
            value,
            version,
            forwarded: false,
        };
        let resp = self
            .client
            .clone()
            .put(req)
            .await
            .map_err(|s| classify(key, s))?
            .into_inner();
        Ok(PutAck {
            previous_version: resp.version,
            applied_version: resp.applied_version,
        })
    }

    async fn get(&self, key: &str) -> Result<Entry, KvError> {
        let req = GetRequest { key: key.to_string(), forwarded: false };
        let resp = self
            .client
            .clone()
            .get(req)
            .await
            .map_err(|s| classify(key, s))?
            .into_inner();
        if !resp.found {
            return Err(KvError::not_found(key));
        }
        Ok(Entry { value: resp.value, version: resp.version })
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        let req = DelRequest { key: key.to_string(), forwarded: false };
        let resp = self
            .client
            .clone()
            .del(req)
            .await
            .map_err(|s| classify(key, s))?
            .into_inner();
        if !resp.success {
            return Err(KvError::not_found(key));
        }
        Ok(())
    }
}
