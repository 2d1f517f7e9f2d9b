//! Wiring between node ports.

use crate::core::error::{ConnectionId, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of a connection: a node and one of its ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub node_id: NodeId,
    pub port_name: String,
}

impl Endpoint {
    pub fn new(node_id: NodeId, port_name: impl Into<String>) -> Self {
        Self {
            node_id,
            port_name: port_name.into(),
        }
    }

    /// Whether this endpoint is `port` on `node_id`.
    pub fn is(&self, node_id: NodeId, port: &str) -> bool {
        self.node_id == node_id && self.port_name == port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_id, self.port_name)
    }
}

/// A producer output feeding a consumer input.
///
/// An output may feed any number of inputs; an input is fed by at most one
/// output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    /// Producer side (output port).
    pub from: Endpoint,
    /// Consumer side (input port).
    pub to: Endpoint,
}

impl Connection {
    pub fn new(from: Endpoint, to: Endpoint) -> Self {
        Self {
            id: ConnectionId::new(),
            from,
            to,
        }
    }

    /// Whether this connection touches `node_id` on either side.
    pub fn involves(&self, node_id: NodeId) -> bool {
        self.from.node_id == node_id || self.to.node_id == node_id
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_matching() {
        let node_id = NodeId::new();
        let endpoint = Endpoint::new(node_id, "output");
        assert!(endpoint.is(node_id, "output"));
        assert!(!endpoint.is(node_id, "input"));
        assert!(!endpoint.is(NodeId::new(), "output"));
    }

    #[test]
    fn test_connection_involves_both_sides() {
        let producer = NodeId::new();
        let consumer = NodeId::new();
        let conn = Connection::new(
            Endpoint::new(producer, "output"),
            Endpoint::new(consumer, "input"),
        );
        assert!(conn.involves(producer));
        assert!(conn.involves(consumer));
        assert!(!conn.involves(NodeId::new()));
        assert!(conn.to_string().ends_with(":input"));
    }
}
