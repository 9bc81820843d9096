use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use kvmesh_types::{Entry, PutAck, ABSENT_VERSION};

/// Result of a versioned write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Accepted(PutAck),
    /// The supplied version did not exceed `current_version`; nothing changed.
    Rejected { current_version: i64 },
}

impl PutOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PutOutcome::Accepted(_))
    }
}

/// In-memory key → (value, version) map owned by one node.
///
/// One mutex guards the whole map, so every operation is observed as a
/// single step. Nothing here fails: absence and rejection are return values.
#[derive(Clone, Default)]
pub struct VersionedStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl VersionedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the write iff `version` exceeds the stored version. An absent
    /// key accepts any version.
    pub async fn put(&self, key: &str, value: Vec<u8>, version: i64) -> PutOutcome {
        let mut g = self.inner.lock().await;
        let previous_version = match g.get(key) {
            Some(entry) if version <= entry.version => {
                return PutOutcome::Rejected { current_version: entry.version };
            }
            Some(entry) => entry.version,
            None => ABSENT_VERSION,
        };
        g.insert(key.to_string(), Entry { value, version });
        PutOutcome::Accepted(PutAck { previous_version, applied_version: version })
    }

    /// Overwrite regardless of the stored version, bumping it by one
    /// (a first write is stored at version 0).
    pub async fn put_unconditional(&self, key: &str, value: Vec<u8>) -> PutAck {
        let mut g = self.inner.lock().await;
        let previous_version = g.get(key).map(|e| e.version).unwrap_or(ABSENT_VERSION);
        let applied_version = previous_version.saturating_add(1);
        g.insert(key.to_string(), Entry { value, version: applied_version });
        PutAck { previous_version, applied_version }
    }

    pub async fn get(&self, key: &str) -> Option<Entry> {
        self.inner.lock().await.get(key).cloned()
    }

    /// Returns `true` if the key was present.
    pub async fn del(&self, key: &str) -> bool {
        self.inner.lock().await.remove(key).is_some()
    }

    /// Stored version, or [`ABSENT_VERSION`].
    pub async fn get_version(&self, key: &str) -> i64 {
        self.inner
            .lock()
            .await
            .get(key)
            .map(|e| e.version)
            .unwrap_or(ABSENT_VERSION)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
