use parking_lot::Mutex;

use kvmesh_types::{Entry, KvError, PutAck};

use crate::cache::ClientCache;
use crate::transport::KvTransport;

/// A cached entry is served locally only while
/// `current_version - cached_version < STALENESS_BOUND`.
pub const STALENESS_BOUND: i64 = 2;

/// Version bookkeeping and read cache in front of a [`KvTransport`].
///
/// `current_version` is a per-session request sequence, not a confirmed
/// server version: each `put` takes the current value and advances it
/// whether or not the write lands. It is pulled forward by server answers:
/// a conflict adopts the suggested version, a network read adopts
/// `read_version + 1`.
///
/// The counter and the cache have independent locks and are never held
/// together. A reader may see them one step apart, which the staleness
/// bound already tolerates.
pub struct ClientSession<T> {
    transport: T,
    cache: ClientCache,
    current_version: Mutex<i64>,
}

impl<T: KvTransport> ClientSession<T> {
    pub fn new(transport: T, cache_capacity: usize) -> Self {
        ClientSession {
            transport,
            cache: ClientCache::new(cache_capacity),
            current_version: Mutex::new(0),
        }
    }

    pub fn current_version(&self) -> i64 {
        *self.current_version.lock()
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Write `value` under the next session version.
    ///
    /// On [`KvError::VersionConflict`] the counter has already moved to the
    /// suggested version; calling `put` again retries with it. The session
    /// never resubmits on its own.
    pub async fn put(&self, key: &str, value: Vec<u8>) -> Result<PutAck, KvError> {
        let version = {
            let mut current = self.current_version.lock();
            let assigned = *current;
            *current = assigned.saturating_add(1);
            assigned
        };
        self.put_with_version(key, value, version).await
    }

    /// Write with a caller-chosen version. The counter is not advanced,
    /// but a conflict still adopts the suggested version.
    ///
    /// On success the value is cached at the version it was stored with
    /// (`ack.applied_version`), not at the pre-update version the server
    /// echoes in `ack.previous_version`, so a read right after this write
    /// stays within [`STALENESS_BOUND`] and is served locally.
    pub async fn put_with_version(
        &self,
        key: &str,
        value: Vec<u8>,
        version: i64,
    ) -> Result<PutAck, KvError> {
        let cached = self.cache.is_enabled().then(|| value.clone());
        let epoch = self.cache.epoch();
        match self.transport.put(key, value, version).await {
            Ok(ack) => {
                if let Some(value) = cached {
                    self.cache.set_if_unchanged(key, value, ack.applied_version, epoch);
                }
                Ok(ack)
            }
            Err(KvError::VersionConflict { next_version }) => {
                *self.current_version.lock() = next_version;
                tracing::debug!(%key, version, next_version, "write conflicted; counter adopted suggestion");
                Err(KvError::VersionConflict { next_version })
            }
            Err(e) => Err(e),
        }
    }

    /// Read `key`, from the cache when fresh enough, else from the cluster.
    pub async fn get(&self, key: &str) -> Result<Entry, KvError> {
        if let Some(hit) = self.cache.get(key) {
            let current = self.current_version();
            if current.saturating_sub(hit.version) < STALENESS_BOUND {
                tracing::trace!(%key, version = hit.version, current, "cache hit");
                return Ok(Entry { value: hit.value, version: hit.version });
            }
            tracing::trace!(%key, version = hit.version, current, "cached entry too stale");
        }

        // A `del` finishing while this read is in flight must win.
        let epoch = self.cache.epoch();
        let entry = self.transport.get(key).await?;
        *self.current_version.lock() = entry.version.saturating_add(1);
        if !self.cache.set_if_unchanged(key, entry.value.clone(), entry.version, epoch) {
            tracing::trace!(%key, "cache fill dropped after invalidation");
        }
        Ok(entry)
    }

    /// Delete `key`; the cached copy is dropped only if the delete landed.
    pub async fn del(&self, key: &str) -> Result<(), KvError> {
        self.transport.del(key).await?;
        self.cache.clear(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use kvmesh_storage::{PutOutcome, VersionedStore};
    use kvmesh_types::{ErrorKind, ABSENT_VERSION};
    use tokio::sync::{mpsc, Notify};

    use super::*;

    /// Single-node stand-in with owner semantics; counts round trips.
    #[derive(Clone, Default)]
    struct FakeNode {
        store: VersionedStore,
        calls: Arc<AtomicUsize>,
    }

    impl FakeNode {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl KvTransport for FakeNode {
        async fn put(&self, key: &str, value: Vec<u8>, version: i64) -> Result<PutAck, KvError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.store.put(key, value, version).await {
                PutOutcome::Accepted(ack) => Ok(ack),
                PutOutcome::Rejected { current_version } => {
                    Err(KvError::VersionConflict { next_version: current_version + 1 })
                }
            }
        }

        async fn get(&self, key: &str) -> Result<Entry, KvError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.store.get(key).await.ok_or_else(|| KvError::not_found(key))
        }

        async fn del(&self, key: &str) -> Result<(), KvError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.store.del(key).await {
                Ok(())
            } else {
                Err(KvError::not_found(key))
            }
        }
    }

    #[tokio::test]
    async fn put_assigns_sequential_versions() {
        let node = FakeNode::default();
        let session = ClientSession::new(node.clone(), 8);

        let first = session.put("a", b"1".to_vec()).await.unwrap();
        assert_eq!(first, PutAck { previous_version: ABSENT_VERSION, applied_version: 0 });
        let second = session.put("a", b"2".to_vec()).await.unwrap();
        assert_eq!(second, PutAck { previous_version: 0, applied_version: 1 });
        assert_eq!(session.current_version(), 2);
        assert_eq!(node.store.get_version("a").await, 1);
    }

    #[tokio::test]
    async fn read_after_own_write_is_served_from_cache() {
        let node = FakeNode::default();
        let session = ClientSession::new(node.clone(), 8);
        session.put("a", b"1".to_vec()).await.unwrap();
        let calls = node.calls();

        let entry = session.get("a").await.unwrap();
        assert_eq!(entry, Entry { value: b"1".to_vec(), version: 0 });
        assert_eq!(node.calls(), calls);
    }

    #[tokio::test]
    async fn cache_bypassed_once_two_versions_behind() {
        let node = FakeNode::default();
        let session = ClientSession::new(node.clone(), 8);
        session.put("x", b"1".to_vec()).await.unwrap(); // v0, counter 1
        session.put("y", b"1".to_vec()).await.unwrap(); // v1, counter 2

        // Someone else moved x on; the session's copy of x is now two behind.
        node.store.put("x", b"fresh".to_vec(), 5).await;
        let calls = node.calls();
        let entry = session.get("x").await.unwrap();
        assert_eq!(node.calls(), calls + 1);
        assert_eq!(entry, Entry { value: b"fresh".to_vec(), version: 5 });
        assert_eq!(session.current_version(), 6);

        // Freshly read, so the next read is local again.
        session.get("x").await.unwrap();
        assert_eq!(node.calls(), calls + 1);
    }

    #[tokio::test]
    async fn one_version_stale_read_is_tolerated() {
        let node = FakeNode::default();
        let session = ClientSession::new(node.clone(), 8);
        session.put("x", b"old".to_vec()).await.unwrap(); // cached at v0, counter 1
        node.store.put("x", b"new".to_vec(), 1).await;

        let entry = session.get("x").await.unwrap();
        assert_eq!(entry.value, b"old".to_vec());
    }

    #[tokio::test]
    async fn conflict_adopts_suggested_version_without_retrying() {
        let node = FakeNode::default();
        node.store.put("x", b"theirs".to_vec(), 5).await;
        let session = ClientSession::new(node.clone(), 8);

        let err = session.put("x", b"mine".to_vec()).await.unwrap_err();
        assert_eq!(err, KvError::VersionConflict { next_version: 6 });
        assert_eq!(session.current_version(), 6);
        assert_eq!(node.calls(), 1);
        assert!(!session.cache().contains("x"));

        session.put("x", b"mine".to_vec()).await.unwrap();
        assert_eq!(node.store.get("x").await.unwrap().version, 6);
    }

    #[tokio::test]
    async fn missing_key_is_not_cached() {
        let node = FakeNode::default();
        let session = ClientSession::new(node.clone(), 8);
        assert_eq!(session.get("nope").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(session.current_version(), 0);
        assert!(session.cache().is_empty());
    }

    #[tokio::test]
    async fn del_invalidates_cache() {
        let node = FakeNode::default();
        let session = ClientSession::new(node.clone(), 8);
        session.put("x", b"1".to_vec()).await.unwrap();
        session.del("x").await.unwrap();
        assert!(!session.cache().contains("x"));
        assert_eq!(session.get("x").await, Err(KvError::not_found("x")));
    }

    /// Holds every `put` and `get` after the node has answered until released.
    #[derive(Clone, Default)]
    struct HeldCalls {
        node: FakeNode,
        answered: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl HeldCalls {
        async fn hold(&self) {
            self.answered.notify_one();
            self.release.notified().await;
        }
    }

    impl KvTransport for HeldCalls {
        async fn put(&self, key: &str, value: Vec<u8>, version: i64) -> Result<PutAck, KvError> {
            let res = self.node.put(key, value, version).await;
            self.hold().await;
            res
        }

        async fn get(&self, key: &str) -> Result<Entry, KvError> {
            let res = self.node.get(key).await;
            self.hold().await;
            res
        }

        async fn del(&self, key: &str) -> Result<(), KvError> {
            self.node.del(key).await
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn del_during_read_keeps_deleted_value_out_of_cache() {
        let calls = HeldCalls::default();
        calls.node.store.put("x", b"old".to_vec(), 5).await;
        let session = Arc::new(ClientSession::new(calls.clone(), 8));

        let reader = tokio::spawn({
            let session = session.clone();
            async move { session.get("x").await }
        });
        calls.answered.notified().await;

        session.del("x").await.unwrap();
        calls.release.notify_one();
        let read = reader.await.unwrap().unwrap();
        assert_eq!(read, Entry { value: b"old".to_vec(), version: 5 });
        assert!(!session.cache().contains("x"));

        // Let the next read through without holding it.
        calls.release.notify_one();
        assert_eq!(session.get("x").await, Err(KvError::not_found("x")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn del_during_put_keeps_written_value_out_of_cache() {
        let calls = HeldCalls::default();
        let session = Arc::new(ClientSession::new(calls.clone(), 8));

        let writer = tokio::spawn({
            let session = session.clone();
            async move { session.put("x", b"1".to_vec()).await }
        });
        calls.answered.notified().await;

        session.del("x").await.unwrap();
        calls.release.notify_one();
        writer.await.unwrap().unwrap();
        assert!(!session.cache().contains("x"));

        calls.release.notify_one();
        assert_eq!(session.get("x").await, Err(KvError::not_found("x")));
    }

    #[tokio::test]
    async fn failed_del_leaves_cache_alone() {
        let node = FakeNode::default();
        let session = ClientSession::new(node.clone(), 8);
        session.put("x", b"1".to_vec()).await.unwrap();
        node.store.del("x").await;

        assert_eq!(session.del("x").await, Err(KvError::not_found("x")));
        assert!(session.cache().contains("x"));
    }

    #[tokio::test]
    async fn zero_capacity_always_reads_through() {
        let node = FakeNode::default();
        let session = ClientSession::new(node.clone(), 0);
        session.put("x", b"1".to_vec()).await.unwrap();
        session.get("x").await.unwrap();
        session.get("x").await.unwrap();
        assert_eq!(node.calls(), 3);
    }

    #[tokio::test]
    async fn explicit_version_does_not_advance_counter() {
        let node = FakeNode::default();
        let session = ClientSession::new(node.clone(), 8);
        session.put_with_version("x", b"1".to_vec(), 10).await.unwrap();
        assert_eq!(session.current_version(), 0);
        assert_eq!(session.cache().get("x").unwrap().version, 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_puts_take_distinct_versions() {
        let node = FakeNode::default();
        let session = Arc::new(ClientSession::new(node.clone(), 64));

        let (send, mut recv) = mpsc::unbounded_channel();
        for n in 0..100 {
            let send = send.clone();
            let session = session.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(rand::random::<u64>() % 10))
                    .await;
                let res = session.put(&format!("k{n}"), vec![n as u8]).await;
                let _ = send.send(res);
            });
        }
        drop(send);

        let mut versions = Vec::new();
        while let Some(res) = recv.recv().await {
            versions.push(res.unwrap().applied_version);
        }
        versions.sort_unstable();
        assert_eq!(versions, (0..100).collect::<Vec<i64>>());
        assert_eq!(session.current_version(), 100);
    }
}
