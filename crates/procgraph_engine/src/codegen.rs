// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shader code emission.
//!
//! Each operator emits the statements for its own node through an
//! [`EmitContext`]; upstream values are referenced as the producer's shader
//! id followed by the output index (`Sa1b2c3d41`). Constants are inlined as
//! literals. Emission is all-or-nothing: one node that cannot be emitted
//! fails the whole request.

use crate::graph::Graph;
use crate::node::{Node, NodeId};
use crate::overlay;
use crate::port::{OutputRef, PortType};
use crate::resolver::Resolver;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;

/// Fixed parts of the generated fragment shader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderTarget {
    /// Text after `#version`
    pub version_directive: String,
    /// Name of the `vec4` fragment output
    pub fragment_output: String,
    /// Name of the `vec2` texture coordinate input
    pub uv_input: String,
}

impl Default for ShaderTarget {
    fn default() -> Self {
        Self {
            version_directive: "330 core".to_string(),
            fragment_output: "FragColor".to_string(),
            uv_input: "UV".to_string(),
        }
    }
}

/// Declared identifiers, by block scope
#[derive(Debug, Clone)]
pub struct Emitter {
    scopes: Vec<HashSet<String>>,
}

impl Emitter {
    /// Emitter with one open scope
    pub fn new() -> Self {
        Self {
            scopes: vec![HashSet::new()],
        }
    }

    /// Declare `name` in the innermost scope. Returns false when it is
    /// already visible.
    pub fn declare(&mut self, name: &str) -> bool {
        if self.is_declared(name) {
            return false;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
        true
    }

    /// Whether `name` is visible from the innermost scope
    pub fn is_declared(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains(name))
    }

    /// Open a block scope
    pub fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    /// Close the innermost block scope
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Context handed to [`Operator::emit`](crate::Operator::emit)
pub struct EmitContext<'a> {
    graph: &'a Graph,
    node: &'a Node,
    emitter: &'a mut Emitter,
}

impl<'a> EmitContext<'a> {
    /// Context for emitting `node`
    pub fn new(graph: &'a Graph, node: &'a Node, emitter: &'a mut Emitter) -> Self {
        Self {
            graph,
            node,
            emitter,
        }
    }

    /// The graph being emitted
    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    /// The node being emitted
    pub fn node(&self) -> &'a Node {
        self.node
    }

    /// Identifier prefix of the node
    pub fn shader_id(&self) -> &'a str {
        self.node.shader_id()
    }

    /// Identifier of one of the node's outputs
    pub fn ident(&self, output: usize) -> String {
        format!("{}{}", self.node.shader_id(), output)
    }

    /// Expression for the value feeding `input`
    pub fn operand(&self, input: usize) -> Result<String, EmitError> {
        let producer = self
            .node
            .input(input)
            .and_then(|i| i.producer())
            .ok_or(EmitError::NotReady {
                node: self.node.id(),
                input,
            })?;
        value_ref(self.graph, producer)
    }

    /// Expressions for every connected data input from `start` on
    pub fn operands_from(&self, start: usize) -> Result<Vec<String>, EmitError> {
        self.node
            .data_inputs()
            .filter(|(i, input)| *i >= start && input.is_connected())
            .map(|(i, _)| self.operand(i))
            .collect()
    }

    /// Resolved type of the producer feeding `input`
    pub fn input_type(&self, input: usize) -> Option<PortType> {
        let producer = self.node.input(input)?.producer()?;
        self.graph.output_type(producer)
    }

    /// Resolved type of one of the node's outputs
    pub fn output_type(&self, output: usize) -> Option<PortType> {
        self.node.output(output)?.concrete()
    }

    /// Shader type name of one of the node's outputs
    pub fn type_name(&self, output: usize) -> Result<&'static str, EmitError> {
        self.output_type(output)
            .and_then(PortType::glsl_name)
            .ok_or(EmitError::Unresolved(self.node.id()))
    }

    /// `ty name = expr;`, or `name = expr;` when `name` is already declared
    pub fn assign(&mut self, ty: &str, name: &str, expr: &str) -> String {
        if self.emitter.declare(name) {
            format!("{ty} {name} = {expr};\n")
        } else {
            format!("{name} = {expr};\n")
        }
    }

    /// Define one of the node's outputs as `expr`
    pub fn define(&mut self, output: usize, expr: &str) -> Result<String, EmitError> {
        let ty = self.type_name(output)?;
        let name = self.ident(output);
        Ok(self.assign(ty, &name, expr))
    }

    /// Emit `nodes` inside a new block scope
    pub fn emit_block(&mut self, nodes: &[NodeId]) -> Result<String, EmitError> {
        self.emitter.push_scope();
        let block = emit_sequence(self.graph, nodes, self.emitter);
        self.emitter.pop_scope();
        block
    }
}

/// Statements for one node
pub fn emit_node(graph: &Graph, id: NodeId, emitter: &mut Emitter) -> Result<String, EmitError> {
    let node = graph.node(id).ok_or(EmitError::MissingNode(id))?;
    let op = node.operator().ok_or(EmitError::MissingNode(id))?;
    op.emit(&mut EmitContext::new(graph, node, emitter))
}

/// Statements for `nodes` in order, each node at most once
fn emit_sequence(graph: &Graph, nodes: &[NodeId], emitter: &mut Emitter) -> Result<String, EmitError> {
    let mut emitted = HashSet::new();
    let mut code = String::new();
    for id in nodes {
        if emitted.insert(*id) {
            code.push_str(&emit_node(graph, *id, emitter)?);
        }
    }
    Ok(code)
}

/// Expression for a producer's value: a literal for constants, otherwise
/// the producer's identifier
pub fn value_ref(graph: &Graph, output: OutputRef) -> Result<String, EmitError> {
    let node = graph
        .node(output.node)
        .ok_or(EmitError::MissingNode(output.node))?;
    if let Some(literal) = node.operator().and_then(|op| op.literal()) {
        return Ok(literal.glsl_literal());
    }
    Ok(format!("{}{}", node.shader_id(), output.index))
}

/// Nodes emitted for `output`, producers first
pub fn emission_order(graph: &Graph, output: NodeId) -> Result<Vec<NodeId>, EmitError> {
    if graph.node(output).is_none() {
        return Err(EmitError::MissingNode(output));
    }
    if graph.is_flow_graph() {
        let order = overlay::flow_order(graph);
        if !order.contains(&output) {
            return Err(EmitError::Unreachable(output));
        }
        return Ok(order);
    }
    Ok(Resolver::new(graph).gather(&[output], Some(output), |_| false))
}

/// Definitions required before the main body: called functions and
/// embedded graphs, each once
fn preludes(graph: &Graph) -> Result<String, EmitError> {
    let mut code = String::new();
    for node in graph.nodes() {
        let Some(op) = node.operator() else {
            continue;
        };
        if let Some(prelude) = op.emit_prelude(node, graph)? {
            if !code.contains(&prelude) {
                code.push_str(&prelude);
            }
        }
    }
    Ok(code)
}

fn result_ref(graph: &Graph, output: NodeId) -> Result<String, EmitError> {
    let node = graph.node(output).ok_or(EmitError::MissingNode(output))?;
    let index = node.primary_output().ok_or(EmitError::NoOutput)?;
    value_ref(graph, OutputRef::new(output, index))
}

/// Complete fragment shader writing `output`'s value
pub fn fragment_shader(graph: &Graph, output: NodeId, target: &ShaderTarget) -> Result<String, EmitError> {
    let order = emission_order(graph, output)?;
    let mut emitter = Emitter::new();
    let body = emit_sequence(graph, &order, &mut emitter)?;
    let result = result_ref(graph, output)?;

    let mut frag = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(frag, "#version {}", target.version_directive);
    let _ = writeln!(frag, "out vec4 {};", target.fragment_output);
    let _ = writeln!(frag, "in vec2 {};", target.uv_input);
    frag.push_str("const float PI = 3.14159265359;\n");
    frag.push_str("const float Rad2Deg = (180.0 / PI);\n");
    frag.push_str("const float Deg2Rad = (PI / 180.0);\n");
    frag.push_str(&preludes(graph)?);
    frag.push_str("void main() {\n");
    frag.push_str(&body);
    let _ = writeln!(frag, "{} = vec4({result});", target.fragment_output);
    frag.push_str("}\n");
    Ok(frag)
}

/// Identifier a graph is emitted under when used as a function
pub fn function_name(name: &str) -> String {
    name.replace(' ', "").replace('-', "_")
}

/// Definition of the library function `name` of `graph`
pub fn function_source(graph: &Graph, name: &str) -> Result<String, EmitError> {
    let function = graph
        .function(name)
        .ok_or_else(|| EmitError::UnknownFunction(name.to_string()))?;
    function_definition(function, &function_name(name))
}

/// `graph` as a shader function called `name`, preceded by the functions it
/// calls in turn
pub fn function_definition(graph: &Graph, name: &str) -> Result<String, EmitError> {
    let output = graph.output_node().ok_or(EmitError::NoOutput)?;
    let return_type = graph
        .result_type()
        .and_then(PortType::glsl_name)
        .ok_or(EmitError::NoOutput)?;

    let mut emitter = Emitter::new();
    let mut parameters = Vec::new();
    for argument in graph.arguments() {
        let ty = argument
            .mask
            .single()
            .and_then(PortType::glsl_name)
            .ok_or(EmitError::NoOutput)?;
        emitter.declare(&argument.name);
        parameters.push(format!("{ty} {}", argument.name));
    }

    let order = emission_order(graph, output)?;
    let body = emit_sequence(graph, &order, &mut emitter)?;
    let result = result_ref(graph, output)?;

    let mut code = preludes(graph)?;
    let _ = writeln!(code, "{return_type} {name}({}) {{", parameters.join(", "));
    code.push_str(&body);
    let _ = writeln!(code, "return {result};");
    code.push_str("}\n\n");
    Ok(code)
}

impl Graph {
    /// Fragment shader for `output`
    pub fn emit_shader(&self, output: NodeId, target: &ShaderTarget) -> Result<String, EmitError> {
        fragment_shader(self, output, target)
    }

    /// Fragment shader for `output`, or an empty string when any node it
    /// depends on cannot be emitted
    pub fn emit_shader_or_empty(&self, output: NodeId, target: &ShaderTarget) -> String {
        match self.emit_shader(output, target) {
            Ok(code) => code,
            Err(error) => {
                tracing::warn!(graph = %self.name, %error, "shader emission failed");
                String::new()
            }
        }
    }
}

/// Error during code emission
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmitError {
    /// A required input has no producer
    #[error("Node {node} is not ready: input {input} is not connected")]
    NotReady {
        /// Node being emitted
        node: NodeId,
        /// Unconnected input
        input: usize,
    },

    /// An output type has not resolved to a concrete type
    #[error("Unresolved output type on node {0}")]
    Unresolved(NodeId),

    /// Node not found, or its operator is checked out
    #[error("Node not found: {0}")]
    MissingNode(NodeId),

    /// The graph has no usable output
    #[error("Graph has no output")]
    NoOutput,

    /// The requested output is not on the graph's execute chain
    #[error("Node {0} is not reachable from the entry")]
    Unreachable(NodeId),

    /// Called function is missing from the library
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}
