use std::collections::BTreeMap;
use std::hash::Hasher;

use siphasher::sip::SipHasher13;

/// Consistent-hash ring mapping keys to node names.
///
/// Each node contributes `replicas` points at `hash("<name>#<i>")`. A key is
/// owned by the node holding the first point at or after `hash(key)`,
/// wrapping to the lowest point. Membership is fixed once traffic starts;
/// there is no removal.
#[derive(Debug, Clone)]
pub struct HashRing {
    replicas: usize,
    points: BTreeMap<u64, String>,
    nodes: Vec<String>,
}

impl HashRing {
    /// `replicas` is clamped to at least one point per node.
    pub fn new(replicas: usize) -> Self {
        HashRing {
            replicas: replicas.max(1),
            points: BTreeMap::new(),
            nodes: Vec::new(),
        }
    }

    pub fn add_node(&mut self, name: &str) {
        if self.nodes.iter().any(|n| n == name) {
            return;
        }
        for i in 0..self.replicas {
            let point = hash(format!("{name}#{i}").as_bytes());
            // First writer keeps a colliding point; insertion order is the
            // registry order, identical on every node.
            self.points.entry(point).or_insert_with(|| name.to_string());
        }
        self.nodes.push(name.to_string());
    }

    /// Owner of `key`, or `None` when no node has been added.
    pub fn get_node(&self, key: &str) -> Option<&str> {
        let h = hash(key.as_bytes());
        self.points
            .range(h..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, name)| name.as_str())
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Number of ring points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Node names in insertion order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }
}

/// SipHash-1-3 with fixed zero keys, stable across processes.
fn hash(bytes: &[u8]) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write(bytes);
    hasher.finish()
}
