use std::sync::Arc;

use kvmesh_proto::convert::kv_error_to_status;
use kvmesh_proto::v1::{
    DelRequest, DelResponse, GetRequest, GetResponse, PutRequest, PutResponse,
};
use kvmesh_proto::KvService;
use kvmesh_types::KvError;
use tonic::{Request, Response, Status};

use crate::forward::Forwarder;
use crate::routing::RoutingService;

pub struct KvServiceImpl<F> {
    routing: Arc<RoutingService<F>>,
}

impl<F: Forwarder> KvServiceImpl<F> {
    pub fn new(routing: Arc<RoutingService<F>>) -> Self {
        KvServiceImpl { routing }
    }
}

fn require_key(key: &str) -> Result<(), Status> {
    if key.is_empty() {
        return Err(kv_error_to_status(KvError::InvalidArgument(
            "key must not be empty".into(),
        )));
    }
    Ok(())
}

#[tonic::async_trait]
impl<F: Forwarder> KvService for KvServiceImpl<F> {
    async fn put(&self, request: Request<PutRequest>) -> Result<Response<PutResponse>, Status> {
        let req = request.into_inner();
        require_key(&req.key)?;
        let ack = self
            .routing
            .put(&req.key, req.value, req.version, req.forwarded)
            .await
            .map_err(kv_error_to_status)?;
        Ok(Response::new(PutResponse {
            success: true,
            version: ack.previous_version,
            applied_version: ack.applied_version,
        }))
    }

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = request.into_inner();
        require_key(&req.key)?;
        let entry = self
            .routing
            .get(&req.key, req.forwarded)
            .await
            .map_err(kv_error_to_status)?;
        Ok(Response::new(GetResponse {
            found: true,
            value: entry.value,
            version: entry.version,
        }))
    }

    async fn del(&self, request: Request<DelRequest>) -> Result<Response<DelResponse>, Status> {
        let req = request.into_inner();
        require_key(&req.key)?;
        self.routing
            .del(&req.key, req.forwarded)
            .await
            .map_err(kv_error_to_status)?;
        Ok(Response::new(DelResponse { success: true }))
    }
}
