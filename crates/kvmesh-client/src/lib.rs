//! Client library for kvmesh clusters.
//!
//! A [`ClientSession`] talks to any one node, which routes each key to its
//! owner. The session numbers its writes from a local counter and keeps a
//! small LRU cache of recent reads and writes, served without a round trip
//! while the cached version is at most one behind what the session knows.
//!
//! ```ignore
//! use kvmesh_client::{ClientSession, GrpcTransport};
//!
//! let transport = GrpcTransport::connect("127.0.0.1:50051").await?;
//! let session = ClientSession::new(transport, 128);
//! session.put("x", b"1".to_vec()).await?;
//! let entry = session.get("x").await?;
//! ```

pub mod cache;
pub mod session;
pub mod transport;

pub use cache::{CachedValue, ClientCache};
pub use session::{ClientSession, STALENESS_BOUND};
pub use transport::{GrpcTransport, KvTransport};
