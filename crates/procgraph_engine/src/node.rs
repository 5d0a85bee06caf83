// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph engine.

use crate::operator::Operator;
use crate::port::{Input, Output, PortLayout};
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Handle of a node inside one graph's arena.
///
/// Slots are never reused, so a handle to a removed node stays invalid
/// instead of silently pointing at a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Handle for an arena slot
    pub fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    /// Arena slot of this handle
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Constants and arguments
    Input,
    /// Graph results
    Output,
    /// Arithmetic and math functions
    Math,
    /// Boolean logic and comparisons
    Logic,
    /// Vector construction and decomposition
    Vector,
    /// Variable get/set
    Variable,
    /// Control flow (execute pins)
    Flow,
    /// Function calls and embedded graphs
    Function,
}

/// Node type definition
#[derive(Debug, Clone)]
pub struct NodeType {
    /// Unique type identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Creates a fresh operator of this type
    pub factory: fn() -> Box<dyn Operator>,
}

/// A node instance in a graph
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    uuid: Uuid,
    /// Display name (can be customized)
    pub name: String,
    shader_id: String,
    pub(crate) inputs: Vec<Input>,
    pub(crate) outputs: Vec<Output>,
    pub(crate) scheduled: bool,
    pub(crate) result: Option<Value>,
    pub(crate) op: Option<Box<dyn Operator>>,
}

impl Node {
    pub(crate) fn new(id: NodeId, uuid: Uuid, name: String, op: Box<dyn Operator>) -> Self {
        let PortLayout { inputs, outputs } = op.ports();
        Self {
            id,
            uuid,
            name,
            shader_id: shader_id(&uuid),
            inputs,
            outputs,
            scheduled: false,
            result: None,
            op: Some(op),
        }
    }

    /// Arena handle
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Persistent identity
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Identifier prefix used in emitted code: `S` plus the first uuid segment
    pub fn shader_id(&self) -> &str {
        &self.shader_id
    }

    /// Registry tag of the node's operator
    pub fn type_tag(&self) -> &'static str {
        self.op.as_ref().map_or("", |op| op.type_tag())
    }

    /// The node's operator. `None` only while the operator itself is running.
    pub fn operator(&self) -> Option<&dyn Operator> {
        self.op.as_deref()
    }

    /// Input ports in order
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// Output ports in order
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Get an input port by index
    pub fn input(&self, index: usize) -> Option<&Input> {
        self.inputs.get(index)
    }

    /// Get an output port by index
    pub fn output(&self, index: usize) -> Option<&Output> {
        self.outputs.get(index)
    }

    /// Data (non-execute) inputs with their indices
    pub fn data_inputs(&self) -> impl Iterator<Item = (usize, &Input)> {
        self.inputs.iter().enumerate().filter(|(_, i)| !i.is_execute())
    }

    /// Data (non-execute) outputs with their indices
    pub fn data_outputs(&self) -> impl Iterator<Item = (usize, &Output)> {
        self.outputs.iter().enumerate().filter(|(_, o)| !o.is_execute())
    }

    /// Index of the first data output, the node's primary value
    pub fn primary_output(&self) -> Option<usize> {
        self.data_outputs().next().map(|(i, _)| i)
    }

    /// Whether the node has an execute output pin
    pub fn has_execute_output(&self) -> bool {
        self.outputs.iter().any(Output::is_execute)
    }

    /// Whether a connected execute input hands this node to a controller
    pub fn is_control_owned(&self) -> bool {
        self.inputs
            .iter()
            .any(|i| i.is_execute() && i.is_connected())
    }

    /// Whether any data output has a consumer
    pub fn has_data_consumers(&self) -> bool {
        self.data_outputs().any(|(_, o)| o.is_connected())
    }

    /// Whether any data input has a producer
    pub fn has_data_producers(&self) -> bool {
        self.data_inputs().any(|(_, i)| i.is_connected())
    }

    /// Whether the node is currently queued for evaluation
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Cached result of the last successful evaluation
    pub fn result(&self) -> Option<Value> {
        self.result
    }
}

fn shader_id(uuid: &Uuid) -> String {
    let simple = uuid.simple().to_string();
    format!("S{}", &simple[..8])
}

/// Registry of available node types
#[derive(Debug, Default)]
pub struct NodeRegistry {
    types: IndexMap<String, NodeType>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type
    pub fn register(&mut self, node_type: NodeType) {
        self.types.insert(node_type.id.clone(), node_type);
    }

    /// Get a node type by ID
    pub fn get(&self, id: &str) -> Option<&NodeType> {
        self.types.get(id)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Get types by category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeType> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Create a fresh operator from a type ID
    pub fn create(&self, type_id: &str) -> Option<Box<dyn Operator>> {
        self.get(type_id).map(|t| (t.factory)())
    }

    /// Display name registered for a type ID
    pub fn display_name(&self, type_id: &str) -> Option<&str> {
        self.get(type_id).map(|t| t.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;

    #[test]
    fn test_shader_id_is_first_uuid_segment() {
        let uuid = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        assert_eq!(shader_id(&uuid), "Sa1b2c3d4");
    }

    #[test]
    fn test_builtin_registry() {
        let registry = ops::builtin_registry();
        assert!(registry.get("add").is_some());
        assert!(registry.get("for_loop").is_some());
        assert!(registry.create("does_not_exist").is_none());
        let op = registry.create("float_constant").unwrap();
        assert_eq!(op.type_tag(), "float_constant");
        assert!(registry.types_in_category(NodeCategory::Flow).count() >= 3);
    }
}
