// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-node contract.
//!
//! Every node owns one [`Operator`]. The graph asks it four things: whether
//! it can run ([`Operator::is_ready`]), what its outputs resolve to
//! ([`Operator::resolve_output_type`]), how to compute values on the host
//! ([`Operator::evaluate`]) and how to express itself as shader code
//! ([`Operator::emit`]). The remaining methods are optional hooks with
//! defaults that suit plain data operators.

use crate::codegen::{EmitContext, EmitError};
use crate::evaluation::{EvalContext, EvalError};
use crate::graph::Graph;
use crate::node::Node;
use crate::ops::call::Argument;
use crate::ops::instance::Instance;
use crate::port::{PortLayout, PortType, TypeMask};
use crate::types::TypeContext;
use crate::value::Value;
use crate::variables::VariableTable;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named operator parameters, as persisted and as set by hosts
pub type NodeParams = IndexMap<String, ParamValue>;

/// A single operator parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    /// A typed value (constant payloads)
    Value(Value),
    /// Text (variable and function names)
    Text(String),
    /// Integer (vector arity and the like)
    Integer(i64),
    /// A port type selection
    Type(PortType),
}

impl ParamValue {
    /// Text payload
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Value payload
    pub fn as_value(&self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(*v),
            _ => None,
        }
    }

    /// Type payload
    pub fn as_type(&self) -> Option<PortType> {
        match self {
            Self::Type(t) => Some(*t),
            _ => None,
        }
    }
}

/// Error when applying parameters to an operator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    /// The parameter does not exist on this operator
    #[error("Unknown parameter: {0}")]
    Unknown(String),

    /// The parameter exists but the payload kind is wrong
    #[error("Parameter {name} expects {expected}")]
    WrongKind {
        /// Parameter name
        name: String,
        /// Human readable expectation
        expected: &'static str,
    },
}

/// Port-level change delivered to the operators at both ends of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// One of this node's inputs gained a producer
    InputConnected(usize),
    /// One of this node's inputs lost its producer
    InputDisconnected(usize),
    /// One of this node's outputs gained a consumer
    OutputConnected(usize),
    /// One of this node's outputs lost a consumer
    OutputDisconnected(usize),
}

/// Growth rule for operators with a variable number of operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variadic {
    /// Mask of the operand inputs
    pub mask: TypeMask,
    /// Operand inputs the node never shrinks below
    pub min: usize,
}

/// Node behaviour: readiness, typing, host evaluation and code emission
pub trait Operator: fmt::Debug {
    /// Registry tag this operator is created from
    fn type_tag(&self) -> &'static str;

    /// Ports a freshly created node starts with
    fn ports(&self) -> PortLayout;

    /// Whether the node can run. Defaults to every data input being connected.
    fn is_ready(&self, node: &Node) -> bool {
        if self.variadic().is_some() {
            node.has_data_producers()
        } else {
            node.data_inputs().all(|(_, i)| i.is_connected())
        }
    }

    /// Derive output types from input types. Must be idempotent and may only
    /// touch this node's outputs.
    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        let _ = ctx;
    }

    /// Compute output values. Writes are committed only when this returns `Ok`.
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError>;

    /// Shader statement(s) for this node, or [`EmitError::NotReady`]
    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError>;

    /// Definitions that must precede the main body (function bodies)
    fn emit_prelude(&self, node: &Node, graph: &Graph) -> Result<Option<String>, EmitError> {
        let _ = (node, graph);
        Ok(None)
    }

    /// Called by the port model when an edge at this node changes
    fn on_connection_changed(&mut self, event: ConnectionEvent, variables: &mut VariableTable) {
        let _ = (event, variables);
    }

    /// Called once when the node leaves its graph
    fn on_removed(&mut self, variables: &mut VariableTable) {
        let _ = variables;
    }

    /// Persistable parameters
    fn params(&self) -> NodeParams {
        NodeParams::new()
    }

    /// Apply persisted or host-set parameters
    fn apply_params(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        match params.keys().next() {
            Some(name) => Err(ParamError::Unknown(name.clone())),
            None => Ok(()),
        }
    }

    /// Literal inlined in place of references to this node's output
    fn literal(&self) -> Option<Value> {
        None
    }

    /// Growth rule when the node takes a variable number of operands
    fn variadic(&self) -> Option<Variadic> {
        None
    }

    /// Whether the node stands for a value supplied from outside the graph
    fn is_external_input(&self) -> bool {
        false
    }

    /// Whether the node is a flow graph's entry point
    fn is_entry(&self) -> bool {
        false
    }

    /// Execute outputs whose branches the node runs itself
    fn owned_execute_outputs(&self) -> &'static [usize] {
        &[]
    }

    /// Name of the function this node calls
    fn call_target(&self) -> Option<&str> {
        None
    }

    /// Argument this node declares when it sits in a function graph
    fn argument(&self) -> Option<Argument> {
        None
    }

    /// Index of the first argument input on call-like nodes
    fn argument_offset(&self) -> usize {
        0
    }

    /// Receive the result type of the called or embedded graph
    fn bind_result_type(&mut self, ty: Option<PortType>) {
        let _ = ty;
    }

    /// Embedded graph instance, if the node is one
    fn instance(&self) -> Option<&Instance> {
        None
    }

    /// Mutable embedded graph instance, if the node is one
    fn instance_mut(&mut self) -> Option<&mut Instance> {
        None
    }
}
