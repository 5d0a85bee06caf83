// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted edge definitions.

use crate::graph::Graph;
use crate::port::{InputRef, OutputRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A connection between two ports, addressed by persistent node identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Source node
    pub from_node: Uuid,
    /// Source output index
    pub from_output: usize,
    /// Target node
    pub to_node: Uuid,
    /// Target input index
    pub to_input: usize,
    /// Position of this edge in the source output's fan-out
    pub order: usize,
}

impl Connection {
    /// Create a new connection
    pub fn new(
        from_node: Uuid,
        from_output: usize,
        to_node: Uuid,
        to_input: usize,
        order: usize,
    ) -> Self {
        Self {
            from_node,
            from_output,
            to_node,
            to_input,
            order,
        }
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, node: Uuid) -> bool {
        self.from_node == node || self.to_node == node
    }

    /// Same edge, ignoring fan-out position
    pub fn same_edge(&self, other: &Self) -> bool {
        self.from_node == other.from_node
            && self.from_output == other.from_output
            && self.to_node == other.to_node
            && self.to_input == other.to_input
    }

    /// Resolve both ends against a graph's nodes
    pub fn resolve(&self, graph: &Graph) -> Option<(OutputRef, InputRef)> {
        let from = graph.find_by_uuid(self.from_node)?;
        let to = graph.find_by_uuid(self.to_node)?;
        Some((
            OutputRef::new(from, self.from_output),
            InputRef::new(to, self.to_input),
        ))
    }
}

impl Graph {
    /// Every edge of the graph, grouped by producer in creation order
    pub fn connections(&self) -> Vec<Connection> {
        let mut connections = Vec::with_capacity(self.connection_count());
        for node in self.nodes() {
            for (index, output) in node.outputs().iter().enumerate() {
                for (order, consumer) in output.consumers().iter().enumerate() {
                    let Some(target) = self.node(consumer.node) else {
                        continue;
                    };
                    connections.push(Connection::new(
                        node.uuid(),
                        index,
                        target.uuid(),
                        consumer.index,
                        order,
                    ));
                }
            }
        }
        connections
    }
}
