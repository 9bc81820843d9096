//! Static cluster topology: which node owns a key and where that node lives.

pub mod registry;
pub mod ring;

pub use registry::{parse_host_port, parse_node_spec, NodeRegistry, REFERENCE_BASE_PORT};
pub use ring::HashRing;
