// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph persistence.
//!
//! A [`GraphDescriptor`] is the serializable form of a graph: nodes by uuid
//! and type tag, their parameters, edges with fan-out positions, the output
//! node, variable values and the function library. Descriptors are written
//! as RON files, and as bincode for in-memory snapshots.
//!
//! Restoring a snapshot into a live graph is differential. Nodes that keep
//! their uuid and type are updated in place and keep their cached values.

use crate::connection::Connection;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::operator::NodeParams;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// Current graph descriptor format version
pub const GRAPH_FORMAT_VERSION: u32 = 1;

/// Serializable form of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Persistent identity
    pub id: Uuid,
    /// Registry tag
    pub node_type: String,
    /// Display name
    pub name: String,
    /// Operator parameters
    #[serde(default)]
    pub params: NodeParams,
    /// Number of inputs, including grown operand slots
    pub input_count: usize,
    /// Embedded graph of an instance node
    #[serde(default)]
    pub embedded: Option<Box<GraphDescriptor>>,
}

/// Serializable form of a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescriptor {
    /// Format version
    pub version: u32,
    /// Graph name
    pub name: String,
    /// Nodes in creation order
    pub nodes: Vec<NodeDescriptor>,
    /// Edges
    pub connections: Vec<Connection>,
    /// Output node
    #[serde(default)]
    pub output: Option<Uuid>,
    /// Variable values
    #[serde(default)]
    pub variables: IndexMap<String, Value>,
    /// Function library
    #[serde(default)]
    pub functions: Vec<GraphDescriptor>,
}

impl GraphDescriptor {
    /// Parse from RON text
    pub fn from_ron(text: &str) -> Result<Self, PersistError> {
        let descriptor: Self = ron::from_str(text)?;
        descriptor.check_version()?;
        Ok(descriptor)
    }

    /// Pretty RON text
    pub fn to_ron(&self) -> Result<String, PersistError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load from a RON file
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Save to a RON file
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    fn check_version(&self) -> Result<(), PersistError> {
        if self.version > GRAPH_FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion {
                found: self.version,
                supported: GRAPH_FORMAT_VERSION,
            });
        }
        self.functions.iter().try_for_each(Self::check_version)
    }
}

/// What a restore changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Nodes created
    pub added: usize,
    /// Nodes removed
    pub removed: usize,
    /// Surviving nodes whose name or parameters changed
    pub updated: usize,
    /// Edges created
    pub connected: usize,
    /// Edges removed
    pub disconnected: usize,
    /// Nodes or edges that could not be restored
    pub dropped: usize,
}

impl RestoreReport {
    /// Whether the restore changed nothing
    pub fn is_unchanged(&self) -> bool {
        *self == Self::default()
    }

    fn absorb(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
        self.updated += other.updated;
        self.connected += other.connected;
        self.disconnected += other.disconnected;
        self.dropped += other.dropped;
    }
}

impl Graph {
    /// Serializable description of this graph
    pub fn describe(&self) -> GraphDescriptor {
        let nodes = self
            .nodes()
            .map(|node| NodeDescriptor {
                id: node.uuid(),
                node_type: node.type_tag().to_string(),
                name: node.name.clone(),
                params: node.operator().map(|op| op.params()).unwrap_or_default(),
                input_count: node.inputs().len(),
                embedded: node
                    .operator()
                    .and_then(|op| op.instance())
                    .map(|instance| Box::new(instance.graph().describe())),
            })
            .collect();

        GraphDescriptor {
            version: GRAPH_FORMAT_VERSION,
            name: self.name.clone(),
            nodes,
            connections: self.connections(),
            output: self
                .output_node()
                .and_then(|id| self.node(id))
                .map(|n| n.uuid()),
            variables: self
                .variables()
                .iter()
                .filter_map(|(name, slot)| slot.value.map(|v| (name.to_string(), v)))
                .collect(),
            functions: self.functions().map(Graph::describe).collect(),
        }
    }

    /// Build a graph from a descriptor. Nodes of unknown types and edges that
    /// no longer fit are dropped with a warning.
    pub fn from_descriptor(descriptor: &GraphDescriptor) -> Result<Self, PersistError> {
        descriptor.check_version()?;
        let mut graph = Self::new(descriptor.name.clone());
        let report = graph.apply_descriptor(descriptor);
        if report.dropped > 0 {
            tracing::warn!(graph = %graph.name, dropped = report.dropped, "graph loaded with losses");
        }
        Ok(graph)
    }

    /// Capture the graph as bytes
    pub fn snapshot(&self) -> Result<Vec<u8>, PersistError> {
        Ok(bincode::serialize(&self.describe())?)
    }

    /// Bring the graph to the state of a snapshot, touching only what differs
    pub fn restore(&mut self, snapshot: &[u8]) -> Result<RestoreReport, PersistError> {
        let descriptor: GraphDescriptor = bincode::deserialize(snapshot)?;
        descriptor.check_version()?;
        let report = self.apply_descriptor(&descriptor);
        tracing::debug!(graph = %self.name, ?report, "snapshot restored");
        Ok(report)
    }

    fn apply_descriptor(&mut self, descriptor: &GraphDescriptor) -> RestoreReport {
        let mut report = RestoreReport::default();
        self.name.clone_from(&descriptor.name);

        // Functions first so calls can bind to them
        let stale: Vec<String> = self
            .functions()
            .map(|f| f.name.clone())
            .filter(|name| !descriptor.functions.iter().any(|f| &f.name == name))
            .collect();
        for name in stale {
            self.remove_function(&name);
        }
        for function in &descriptor.functions {
            if self.function(&function.name).is_some() {
                let sub = self.edit_function(&function.name, |f| f.apply_descriptor(function));
                report.absorb(sub.unwrap_or_default());
            } else {
                let mut graph = Self::new_function(function.name.clone());
                report.absorb(graph.apply_descriptor(function));
                self.add_function(graph);
            }
        }

        self.apply_nodes(descriptor, &mut report);
        self.apply_connections(descriptor, &mut report);

        let output = descriptor.output.and_then(|uuid| self.find_by_uuid(uuid));
        if let Err(error) = self.set_output_node(output) {
            tracing::warn!(%error, "could not restore output node");
        }
        for (name, value) in &descriptor.variables {
            if self.variables().get(name) != Some(*value) {
                self.variables_mut().set(name, *value);
            }
        }
        report
    }

    fn apply_nodes(&mut self, descriptor: &GraphDescriptor, report: &mut RestoreReport) {
        let wanted: HashMap<Uuid, &NodeDescriptor> =
            descriptor.nodes.iter().map(|n| (n.id, n)).collect();

        let doomed: Vec<NodeId> = self
            .nodes()
            .filter(|n| {
                wanted
                    .get(&n.uuid())
                    .map_or(true, |d| d.node_type != n.type_tag())
            })
            .map(|n| n.id())
            .collect();
        for id in doomed {
            if self.remove(id).is_ok() {
                report.removed += 1;
            }
        }

        for node in &descriptor.nodes {
            match self.find_by_uuid(node.id) {
                Some(id) => self.update_node(id, node, report),
                None => self.add_described(node, report),
            }
        }
    }

    fn update_node(&mut self, id: NodeId, descriptor: &NodeDescriptor, report: &mut RestoreReport) {
        let mut changed = false;
        if let Some(node) = self.node_mut(id) {
            if node.name != descriptor.name {
                node.name.clone_from(&descriptor.name);
                changed = true;
            }
        }
        if self.params(id).as_ref() != Some(&descriptor.params) && !descriptor.params.is_empty() {
            if let Err(error) = self.set_params(id, &descriptor.params) {
                tracing::warn!(node = %id, %error, "could not restore parameters");
            }
            changed = true;
        }
        if let Some(embedded) = &descriptor.embedded {
            let sub = self.restore_embedded(id, embedded);
            changed |= !sub.is_unchanged();
            report.absorb(sub);
        }
        if changed {
            report.updated += 1;
        }
    }

    fn add_described(&mut self, descriptor: &NodeDescriptor, report: &mut RestoreReport) {
        let Some(mut op) = self.registry().create(&descriptor.node_type) else {
            tracing::warn!(node_type = %descriptor.node_type, id = %descriptor.id, "unknown node type, node dropped");
            report.dropped += 1;
            return;
        };
        if let Err(error) = op.apply_params(&descriptor.params) {
            tracing::warn!(id = %descriptor.id, %error, "could not restore parameters");
        }
        let id = match self.insert_node(op, descriptor.id, Some(descriptor.name.clone())) {
            Ok(id) => id,
            Err(error) => {
                tracing::warn!(id = %descriptor.id, %error, "node dropped");
                report.dropped += 1;
                return;
            }
        };
        if let Some(embedded) = &descriptor.embedded {
            let sub = self.restore_embedded(id, embedded);
            report.absorb(sub);
        }
        report.added += 1;
    }

    fn restore_embedded(&mut self, id: NodeId, descriptor: &GraphDescriptor) -> RestoreReport {
        let Some(inner) = self
            .node_mut(id)
            .and_then(|n| n.op.as_mut())
            .and_then(|op| op.instance_mut())
            .map(|instance| instance.graph_mut())
        else {
            return RestoreReport::default();
        };
        let report = inner.apply_descriptor(descriptor);
        let arguments = inner.arguments();
        let result = inner.result_type();
        if let Err(error) = self.rebind_arguments(id, &arguments, result) {
            tracing::warn!(node = %id, %error, "could not rebind instance");
        }
        report
    }

    fn apply_connections(&mut self, descriptor: &GraphDescriptor, report: &mut RestoreReport) {
        for current in self.connections() {
            if descriptor.connections.iter().any(|c| c.same_edge(&current)) {
                continue;
            }
            if let Some((_, input)) = current.resolve(self) {
                self.disconnect(input);
                report.disconnected += 1;
            }
        }

        let existing = self.connections();
        let mut missing: Vec<&Connection> = descriptor
            .connections
            .iter()
            .filter(|c| !existing.iter().any(|e| e.same_edge(c)))
            .collect();
        missing.sort_by_key(|c| c.order);

        let input_counts: HashMap<Uuid, usize> = descriptor
            .nodes
            .iter()
            .map(|n| (n.id, n.input_count))
            .collect();
        for connection in missing {
            let Some((from, to)) = connection.resolve(self) else {
                tracing::warn!(?connection, "connection endpoint missing, dropped");
                report.dropped += 1;
                continue;
            };
            if let Some(count) = input_counts.get(&connection.to_node) {
                self.pad_inputs(to.node, *count);
            }
            match self.connect_at(from, to, connection.order) {
                Ok(()) => report.connected += 1,
                Err(error) => {
                    tracing::warn!(?connection, %error, "connection dropped");
                    report.dropped += 1;
                }
            }
        }
    }
}

/// Error when loading or saving a graph
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RON parse error
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// RON write error
    #[error("Write error: {0}")]
    Write(#[from] ron::Error),

    /// Snapshot encoding error
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),

    /// Written by a newer version
    #[error("Graph format version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest version this build reads
        supported: u32,
    },
}
