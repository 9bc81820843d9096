use std::collections::HashSet;

use kvmesh_types::{KvError, NodeInfo};

use crate::ring::HashRing;

/// Port offset of the reference deployment: `node<i>` listens on `base + i`.
pub const REFERENCE_BASE_PORT: u16 = 50050;

/// Static list of every cluster member, identical on all nodes.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    nodes: Vec<NodeInfo>,
}

impl NodeRegistry {
    /// Rejects duplicate names and malformed addresses.
    pub fn new(nodes: Vec<NodeInfo>) -> Result<Self, KvError> {
        validate(&nodes)?;
        Ok(NodeRegistry { nodes })
    }

    /// `node1..=nodeN` at `host:50050+i`.
    pub fn reference(host: &str, count: u16) -> Result<Self, KvError> {
        let nodes = (1..=count)
            .map(|i| -> Result<NodeInfo, KvError> {
                let port = REFERENCE_BASE_PORT.checked_add(i).ok_or_else(|| {
                    KvError::InvalidArgument(format!("node count {count} overflows port range"))
                })?;
                Ok(NodeInfo::new(format!("node{i}"), format!("{host}:{port}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(nodes)
    }

    pub fn lookup(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ring holding every member, added in registry order.
    pub fn build_ring(&self, replicas: usize) -> HashRing {
        let mut ring = HashRing::new(replicas);
        for node in &self.nodes {
            ring.add_node(&node.name);
        }
        tracing::debug!(nodes = self.nodes.len(), points = ring.len(), "hash ring built");
        ring
    }
}

fn validate(nodes: &[NodeInfo]) -> Result<(), KvError> {
    let mut seen = HashSet::new();
    for node in nodes {
        if node.name.is_empty() {
            return Err(KvError::InvalidArgument("node name must not be empty".into()));
        }
        if !seen.insert(node.name.as_str()) {
            return Err(KvError::InvalidArgument(format!("duplicate node name '{}'", node.name)));
        }
        parse_host_port(&node.address)?;
    }
    Ok(())
}

/// Split `host:port`. The split is on the last colon so bracketed IPv6
/// hosts survive.
pub fn parse_host_port(input: &str) -> Result<(String, u16), KvError> {
    if input.is_empty() {
        return Err(KvError::InvalidArgument("address is empty".into()));
    }
    let (host, port) = input
        .rsplit_once(':')
        .filter(|(host, port)| !host.is_empty() && !port.is_empty())
        .ok_or_else(|| {
            KvError::InvalidArgument(format!("invalid host:port format: '{input}'"))
        })?;
    let port = port
        .parse::<u16>()
        .map_err(|_| KvError::InvalidArgument(format!("invalid port number in '{input}'")))?;
    Ok((host.to_string(), port))
}

/// Parse a `name=host:port` member spec.
pub fn parse_node_spec(spec: &str) -> Result<NodeInfo, KvError> {
    let (name, address) = spec.split_once('=').ok_or_else(|| {
        KvError::InvalidArgument(format!("expected name=host:port, got '{spec}'"))
    })?;
    let name = name.trim();
    let address = address.trim();
    if name.is_empty() {
        return Err(KvError::InvalidArgument(format!("missing node name in '{spec}'")));
    }
    parse_host_port(address)?;
    Ok(NodeInfo::new(name, address))
}
