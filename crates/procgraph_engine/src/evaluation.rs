// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host-side evaluation.
//!
//! An operator computes its outputs through an [`EvalContext`]. Output writes
//! are staged in the context and only committed by the graph when the
//! operator returns `Ok`, so a failed evaluation leaves the node untouched.

use crate::graph::Graph;
use crate::node::{Node, NodeId};
use crate::port::PortType;
use crate::value::Value;
use crate::variables::Version;

/// Context for evaluating one node
pub struct EvalContext<'g> {
    graph: &'g mut Graph,
    node: NodeId,
    staged: Vec<(usize, Value)>,
    result: Option<Value>,
}

impl<'g> EvalContext<'g> {
    pub(crate) fn new(graph: &'g mut Graph, node: NodeId) -> Self {
        Self {
            graph,
            node,
            staged: Vec::new(),
            result: None,
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<(usize, Value)>, Option<Value>) {
        (self.staged, self.result)
    }

    /// The node being evaluated
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// The node being evaluated. Its operator is checked out while it runs.
    pub fn node(&self) -> Option<&Node> {
        self.graph.node(self.node)
    }

    /// The owning graph
    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    /// The owning graph, mutably (loops and calls evaluate other nodes)
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut *self.graph
    }

    /// Current value on the producer feeding `index`
    pub fn input(&self, index: usize) -> Option<Value> {
        let producer = self.node()?.input(index)?.producer()?;
        self.graph.node(producer.node)?.output(producer.index)?.value()
    }

    /// Resolved type of the producer feeding `index`
    pub fn input_type(&self, index: usize) -> Option<PortType> {
        let producer = self.node()?.input(index)?.producer()?;
        self.graph.node(producer.node)?.output(producer.index)?.concrete()
    }

    /// Value on `index`, failing when nothing is connected or nothing was produced yet
    pub fn require(&self, index: usize) -> Result<Value, EvalError> {
        let connected = self
            .node()
            .and_then(|n| n.input(index))
            .is_some_and(|i| i.is_connected());
        if !connected {
            return Err(EvalError::MissingInput(index));
        }
        self.input(index).ok_or(EvalError::NoValue(index))
    }

    /// Scalar on `index`
    pub fn require_float(&self, index: usize) -> Result<f32, EvalError> {
        let value = self.require(index)?;
        value.as_float().ok_or(EvalError::InvalidOperand {
            index,
            found: value.port_type(),
        })
    }

    /// Values of every connected data input from `start` on, in order
    pub fn connected_values(&self, start: usize) -> Result<Vec<Value>, EvalError> {
        let Some(node) = self.node() else {
            return Ok(Vec::new());
        };
        node.data_inputs()
            .filter(|(i, input)| *i >= start && input.is_connected())
            .map(|(i, _)| self.require(i))
            .collect()
    }

    /// Stage an output value, committed when evaluation succeeds
    pub fn set_output(&mut self, index: usize, value: Value) {
        self.staged.push((index, value));
    }

    /// Write an output value immediately. Loops publish their counter this
    /// way so body nodes read it while the loop is still running.
    pub fn publish_output(&mut self, index: usize, value: Value) {
        if let Some(output) = self
            .graph
            .node_mut(self.node)
            .and_then(|n| n.outputs.get_mut(index))
        {
            output.set_value(Some(value));
        }
    }

    /// Set the cached result. Defaults to the first staged output.
    pub fn set_result(&mut self, value: Value) {
        self.result = Some(value);
    }

    /// Current value of a graph variable
    pub fn variable(&self, name: &str) -> Option<(Value, Version)> {
        let slot = self.graph.variables().definition(name)?;
        slot.value.map(|v| (v, slot.version))
    }

    /// Write a graph variable
    pub fn write_variable(&mut self, name: &str, value: Value) -> Version {
        self.graph.write_variable(name, value)
    }
}

/// Outcome of [`Graph::try_evaluate`](crate::Graph::try_evaluate)
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    /// The node ran and its outputs were committed
    Evaluated,
    /// A required input is not connected; nothing ran
    NotReady,
    /// The node ran and failed; outputs are unchanged
    Failed(EvalError),
    /// The node no longer exists, or is already running
    Unavailable,
}

/// Error during evaluation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// Required input not connected
    #[error("Missing required input: {0}")]
    MissingInput(usize),

    /// Input connected but its producer has no value yet
    #[error("No value on input {0}")]
    NoValue(usize),

    /// Operand has a type the operator cannot use
    #[error("Invalid operand on input {index}: {found:?}")]
    InvalidOperand {
        /// Input index
        index: usize,
        /// Type found there
        found: PortType,
    },

    /// Operands have shapes that do not combine
    #[error("Incompatible operand shapes")]
    IncompatibleShapes,

    /// Variable has never been written, or was cleared
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// Called function is missing from the library
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Function or embedded graph produced no result
    #[error("Subgraph produced no result")]
    NoResult,

    /// Loop bounds would not terminate, or iterate too often
    #[error("Invalid loop bounds: {0}")]
    InvalidLoop(String),

    /// Operator is not configured (no name, no function selected)
    #[error("Node is not configured: {0}")]
    Unconfigured(&'static str),
}
