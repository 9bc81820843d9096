//! gRPC contract for kvmesh nodes.
//!
//! Generated `prost`/`tonic` types for `kvmesh.v1` plus the mapping between
//! [`kvmesh_types::KvError`] and `tonic::Status` used on both sides of the
//! wire.

pub mod convert;

#[allow(clippy::derive_partial_eq_without_eq)]
pub mod v1 {
    tonic::include_proto!("kvmesh.v1");
}

/// Encoded descriptor set for server reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptor");

pub use v1::kv_service_client::KvServiceClient;
pub use v1::kv_service_server::{KvService, KvServiceServer};
