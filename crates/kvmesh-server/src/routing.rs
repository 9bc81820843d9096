use std::sync::Arc;

use kvmesh_cluster::{HashRing, NodeRegistry};
use kvmesh_storage::{PutOutcome, VersionedStore};
use kvmesh_types::{Entry, KvError, NodeInfo, PutAck, WriteMode};

use crate::forward::Forwarder;

/// Where a request for a key is served.
#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Local,
    Remote(&'a NodeInfo),
}

/// Per-node request handler.
///
/// Serves keys this node owns from its [`VersionedStore`] and relays
/// everything else to the owner through `F`, exactly once. A request that
/// was already forwarded is never forwarded again: if it lands on a node
/// that does not own the key the rings disagree and the request fails with
/// [`KvError::NotOwner`].
pub struct RoutingService<F> {
    local: NodeInfo,
    ring: Arc<HashRing>,
    registry: Arc<NodeRegistry>,
    store: VersionedStore,
    forwarder: F,
    write_mode: WriteMode,
}

impl<F: Forwarder> RoutingService<F> {
    pub fn new(
        local: NodeInfo,
        ring: Arc<HashRing>,
        registry: Arc<NodeRegistry>,
        forwarder: F,
    ) -> Self {
        RoutingService {
            local,
            ring,
            registry,
            store: VersionedStore::new(),
            forwarder,
            write_mode: WriteMode::Versioned,
        }
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    pub fn local(&self) -> &NodeInfo {
        &self.local
    }

    pub fn store(&self) -> &VersionedStore {
        &self.store
    }

    pub fn route(&self, key: &str, forwarded: bool) -> Result<Route<'_>, KvError> {
        let owner = self
            .ring
            .get_node(key)
            .ok_or_else(|| KvError::TargetNotFound { node: String::new() })?;
        if owner == self.local.name {
            return Ok(Route::Local);
        }
        if forwarded {
            tracing::warn!(node = %self.local.name, %owner, %key, "forwarded request for a key this node does not own");
            return Err(KvError::NotOwner {
                node: self.local.name.clone(),
                owner: owner.to_string(),
            });
        }
        match self.registry.lookup(owner) {
            Some(target) => Ok(Route::Remote(target)),
            None => Err(KvError::TargetNotFound { node: owner.to_string() }),
        }
    }

    pub async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        version: i64,
        forwarded: bool,
    ) -> Result<PutAck, KvError> {
        match self.route(key, forwarded)? {
            Route::Local => self.put_local(key, value, version).await,
            Route::Remote(target) => {
                tracing::debug!(%key, owner = %target.name, version, "forwarding put");
                self.forwarder.put(target, key, value, version).await
            }
        }
    }

    pub async fn get(&self, key: &str, forwarded: bool) -> Result<Entry, KvError> {
        match self.route(key, forwarded)? {
            Route::Local => self.store.get(key).await.ok_or_else(|| KvError::not_found(key)),
            Route::Remote(target) => {
                tracing::debug!(%key, owner = %target.name, "forwarding get");
                self.forwarder.get(target, key).await
            }
        }
    }

    pub async fn del(&self, key: &str, forwarded: bool) -> Result<(), KvError> {
        match self.route(key, forwarded)? {
            Route::Local => {
                if self.store.del(key).await {
                    Ok(())
                } else {
                    Err(KvError::not_found(key))
                }
            }
            Route::Remote(target) => {
                tracing::debug!(%key, owner = %target.name, "forwarding del");
                self.forwarder.del(target, key).await
            }
        }
    }

    async fn put_local(&self, key: &str, value: Vec<u8>, version: i64) -> Result<PutAck, KvError> {
        if self.write_mode == WriteMode::Unconditional {
            return Ok(self.store.put_unconditional(key, value).await);
        }
        match self.store.put(key, value, version).await {
            PutOutcome::Accepted(ack) => Ok(ack),
            PutOutcome::Rejected { current_version } => {
                // Valid at read time only; a concurrent writer may take it first.
                let next_version = current_version.saturating_add(1);
                tracing::debug!(%key, version, current_version, "stale write rejected");
                Err(KvError::VersionConflict { next_version })
            }
        }
    }
}
