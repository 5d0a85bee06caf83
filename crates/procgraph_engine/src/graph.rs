// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and their connections.
//!
//! Nodes live in an arena indexed by [`NodeId`]; edges live on the ports
//! themselves (an input knows its producer, an output knows its consumers in
//! order). Every structural change goes through the graph so both ends of an
//! edge stay consistent and operators and observers hear about it.

use crate::config::EngineConfig;
use crate::evaluation::{EvalContext, EvalOutcome};
use crate::node::{Node, NodeId, NodeRegistry};
use crate::observer::{GraphObserver, ObserverId};
use crate::operator::{ConnectionEvent, NodeParams, Operator, ParamError, ParamValue};
use crate::ops::{self, call::Argument};
use crate::port::{Input, InputRef, Output, OutputRef, PortType, TypeMask};
use crate::types::TypeContext;
use crate::value::Value;
use crate::variables::{VariableTable, Version};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A node graph
pub struct Graph {
    /// Graph name (also the function name when used as a subroutine)
    pub name: String,
    nodes: Vec<Option<Node>>,
    lookup: HashMap<Uuid, NodeId>,
    variables: VariableTable,
    functions: IndexMap<String, Graph>,
    registry: Arc<NodeRegistry>,
    entry: Option<NodeId>,
    output: Option<NodeId>,
    result: Option<Value>,
    pub(crate) queue: VecDeque<NodeId>,
    pub(crate) processing: bool,
    auto_schedule: bool,
    observers: Vec<(ObserverId, Box<dyn GraphObserver>)>,
    next_observer: u64,
}

impl Graph {
    /// Create a new empty graph using the built-in node types
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_registry(name, ops::builtin_registry())
    }

    /// Create a new empty graph creating nodes from `registry`
    pub fn with_registry(name: impl Into<String>, registry: Arc<NodeRegistry>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            lookup: HashMap::new(),
            variables: VariableTable::new(),
            functions: IndexMap::new(),
            registry,
            entry: None,
            output: None,
            result: None,
            queue: VecDeque::new(),
            processing: false,
            auto_schedule: false,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    /// Create an empty function graph. Function graphs pre-define the math
    /// constants `PI`, `Rad2Deg` and `Deg2Rad`.
    pub fn new_function(name: impl Into<String>) -> Self {
        let mut graph = Self::new(name);
        graph.variables = VariableTable::with_builtins();
        graph
    }

    /// Apply engine configuration
    pub fn apply_config(&mut self, config: &EngineConfig) {
        self.auto_schedule = config.auto_schedule;
    }

    /// Re-schedule automatically after each mutation
    pub fn set_auto_schedule(&mut self, enabled: bool) {
        self.auto_schedule = enabled;
    }

    /// Registry used by [`Graph::create_node`]
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Create a node from a registered type
    pub fn create_node(&mut self, type_id: &str) -> Result<NodeId, GraphError> {
        let op = self
            .registry
            .create(type_id)
            .ok_or_else(|| GraphError::UnknownNodeType(type_id.to_string()))?;
        self.add_boxed(op)
    }

    /// Add a node running `op`
    pub fn add(&mut self, op: impl Operator + 'static) -> Result<NodeId, GraphError> {
        self.add_boxed(Box::new(op))
    }

    /// Add a node running a boxed operator
    pub fn add_boxed(&mut self, op: Box<dyn Operator>) -> Result<NodeId, GraphError> {
        self.insert_node(op, Uuid::new_v4(), None)
    }

    pub(crate) fn insert_node(
        &mut self,
        op: Box<dyn Operator>,
        uuid: Uuid,
        name: Option<String>,
    ) -> Result<NodeId, GraphError> {
        if op.is_entry() && self.entry.is_some() {
            return Err(GraphError::DuplicateEntry);
        }
        if self.lookup.contains_key(&uuid) {
            return Err(GraphError::DuplicateNode(uuid));
        }
        let id = NodeId::from_index(self.nodes.len());
        let name = name.unwrap_or_else(|| {
            self.registry
                .display_name(op.type_tag())
                .unwrap_or(op.type_tag())
                .to_string()
        });
        let is_entry = op.is_entry();
        let is_call = op.call_target().is_some();
        let embedded = op
            .instance()
            .map(|i| (i.graph().arguments(), i.graph().result_type()));
        self.nodes.push(Some(Node::new(id, uuid, name, op)));
        self.lookup.insert(uuid, id);
        if is_entry {
            self.entry = Some(id);
        }
        self.resolve_output_type(id);
        if is_call {
            self.resync_call(id)?;
        }
        if let Some((arguments, result)) = embedded {
            self.rebind_arguments(id, &arguments, result)?;
        }
        tracing::trace!(node = %id, "node added");
        Ok(id)
    }

    /// Remove a node, detaching every edge that touches it
    pub fn remove(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node(id).ok_or(GraphError::NodeNotFound(id))?;
        let input_count = node.inputs.len();
        let consumers: Vec<InputRef> = node
            .outputs
            .iter()
            .flat_map(|o| o.consumers().iter().copied())
            .collect();

        for index in 0..input_count {
            self.detach(InputRef::new(id, index));
        }
        for consumer in consumers {
            self.detach(consumer);
            self.after_input_changed(consumer.node);
        }

        let Some(mut node) = self.nodes.get_mut(id.index()).and_then(Option::take) else {
            return Err(GraphError::NodeNotFound(id));
        };
        self.lookup.remove(&node.uuid());
        if self.entry == Some(id) {
            self.entry = None;
        }
        if self.output == Some(id) {
            self.output = None;
        }
        if let Some(op) = node.op.as_mut() {
            op.on_removed(&mut self.variables);
        }
        tracing::trace!(node = %id, "node removed");
        Ok(())
    }

    /// Get a node by ID
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Get all nodes in creation order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    /// Get all node IDs in creation order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes().map(Node::id)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Find a node by its persistent identity
    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<NodeId> {
        self.lookup.get(&uuid).copied()
    }

    /// Find the first node with a display name
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes().find(|n| n.name == name).map(Node::id)
    }

    /// Set parameters on a node's operator
    pub fn set_params(&mut self, id: NodeId, params: &NodeParams) -> Result<(), GraphError> {
        let node = self.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        let op = node.op.as_mut().ok_or(GraphError::Busy(id))?;
        op.apply_params(params)?;
        let is_call = op.call_target().is_some();
        let outputs = op.ports().outputs;
        self.resize_outputs(id, outputs);
        if is_call {
            self.resync_call(id)?;
        }
        self.propagate_types(id);
        if self.auto_schedule {
            self.schedule_node(id);
        }
        Ok(())
    }

    /// Match a node's outputs to the count its operator now declares.
    /// Dropped outputs lose their consumers, kept ones keep their links.
    fn resize_outputs(&mut self, id: NodeId, declared: Vec<Output>) {
        let Some(node) = self.node(id) else {
            return;
        };
        let current = node.outputs.len();
        if declared.len() == current {
            return;
        }
        let dropped: Vec<InputRef> = node.outputs[declared.len().min(current)..]
            .iter()
            .flat_map(|o| o.consumers().iter().copied())
            .collect();
        for input in dropped {
            self.disconnect(input);
        }
        let Some(node) = self.node_mut(id) else {
            return;
        };
        node.outputs.truncate(declared.len());
        node.outputs.extend(declared.into_iter().skip(current));
        tracing::trace!(node = %id, from = current, to = node.outputs.len(), "outputs resized");
    }

    /// Set a single operator parameter
    pub fn set_param(
        &mut self,
        id: NodeId,
        name: &str,
        value: ParamValue,
    ) -> Result<(), GraphError> {
        let mut params = NodeParams::new();
        params.insert(name.to_string(), value);
        self.set_params(id, &params)
    }

    /// Current operator parameters of a node
    pub fn params(&self, id: NodeId) -> Option<NodeParams> {
        self.node(id)?.operator().map(Operator::params)
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Connect an output to an input, appending to the output's fan-out
    pub fn connect(&mut self, from: OutputRef, to: InputRef) -> Result<(), ConnectionError> {
        self.connect_at(from, to, usize::MAX)
    }

    /// Connect an output to an input at a position in the output's fan-out.
    ///
    /// An input has at most one producer; connecting an already connected
    /// input replaces its producer. On error the graph is unchanged.
    pub fn connect_at(
        &mut self,
        from: OutputRef,
        to: InputRef,
        position: usize,
    ) -> Result<(), ConnectionError> {
        let source = self
            .node(from.node)
            .ok_or(ConnectionError::NodeNotFound(from.node))?;
        let target = self
            .node(to.node)
            .ok_or(ConnectionError::NodeNotFound(to.node))?;
        let output = source
            .output(from.index)
            .ok_or(ConnectionError::OutputNotFound(from))?;
        let input = target
            .input(to.index)
            .ok_or(ConnectionError::InputNotFound(to))?;

        if from.node == to.node {
            return Err(ConnectionError::SelfLoop);
        }
        if !output.can_feed(input) {
            return Err(ConnectionError::TypeMismatch {
                output: output.ty(),
                input: input.mask(),
            });
        }
        if input.producer() == Some(from) {
            return Ok(());
        }
        if self.reaches(to.node, from.node) {
            return Err(ConnectionError::Cycle);
        }

        self.detach(to);
        self.attach(from, to, position);
        self.after_input_changed(to.node);
        Ok(())
    }

    /// Disconnect an input from its producer, returning the former producer
    pub fn disconnect(&mut self, input: InputRef) -> Option<OutputRef> {
        let producer = self.detach(input)?;
        self.after_input_changed(input.node);
        Some(producer.0)
    }

    /// Producer feeding an input
    pub fn producer(&self, input: InputRef) -> Option<OutputRef> {
        self.node(input.node)?.input(input.index)?.producer()
    }

    /// Consumers of an output, in fan-out order
    pub fn consumers(&self, output: OutputRef) -> &[InputRef] {
        self.node(output.node)
            .and_then(|n| n.output(output.index))
            .map(Output::consumers)
            .unwrap_or_default()
    }

    /// Number of connected inputs in the graph
    pub fn connection_count(&self) -> usize {
        self.nodes()
            .map(|n| n.inputs.iter().filter(|i| i.is_connected()).count())
            .sum()
    }

    fn attach(&mut self, from: OutputRef, to: InputRef, position: usize) {
        if let Some(output) = self
            .node_mut(from.node)
            .and_then(|n| n.outputs.get_mut(from.index))
        {
            output.insert_consumer(position, to);
        }
        if let Some(input) = self
            .node_mut(to.node)
            .and_then(|n| n.inputs.get_mut(to.index))
        {
            input.set_producer(Some(from));
        }
        self.notify_operator(from.node, ConnectionEvent::OutputConnected(from.index));
        self.notify_operator(to.node, ConnectionEvent::InputConnected(to.index));
        self.notify(|o| o.input_connected(to, from));
    }

    /// Remove an edge without follow-up typing. Returns the former producer
    /// and the position the input held in its fan-out.
    fn detach(&mut self, to: InputRef) -> Option<(OutputRef, usize)> {
        let input = self
            .node_mut(to.node)
            .and_then(|n| n.inputs.get_mut(to.index))?;
        let from = input.producer()?;
        input.set_producer(None);
        let position = self
            .node_mut(from.node)
            .and_then(|n| n.outputs.get_mut(from.index))
            .and_then(|o| o.remove_consumer(to))
            .unwrap_or(0);
        self.notify_operator(from.node, ConnectionEvent::OutputDisconnected(from.index));
        self.notify_operator(to.node, ConnectionEvent::InputDisconnected(to.index));
        self.notify(|o| o.input_disconnected(to, from));
        Some((from, position))
    }

    fn after_input_changed(&mut self, id: NodeId) {
        self.adjust_variadic(id);
        self.propagate_types(id);
        if self.auto_schedule {
            self.schedule_node(id);
        }
    }

    /// Whether `target` is reachable from `start` along any edge
    fn reaches(&self, start: NodeId, target: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.node(id) {
                stack.extend(
                    node.outputs
                        .iter()
                        .flat_map(|o| o.consumers().iter().map(|c| c.node)),
                );
            }
        }
        false
    }

    /// Grow a trailing placeholder once every operand is connected, and trim
    /// surplus trailing placeholders once operands are removed.
    fn adjust_variadic(&mut self, id: NodeId) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        let Some(rule) = node.op.as_ref().and_then(|op| op.variadic()) else {
            return;
        };
        let operands: Vec<bool> = node.data_inputs().map(|(_, i)| i.is_connected()).collect();
        if operands.iter().all(|c| *c) {
            let name = format!("Input {}", operands.len());
            node.inputs.push(Input::new(name, rule.mask));
            return;
        }
        let mut count = operands.len();
        while count > rule.min {
            let len = node.inputs.len();
            let trailing_free = len >= 2
                && !node.inputs[len - 1].is_connected()
                && !node.inputs[len - 2].is_connected()
                && !node.inputs[len - 2].is_execute();
            if !trailing_free {
                break;
            }
            node.inputs.pop();
            count -= 1;
        }
    }

    /// Grow a variadic node to at least `count` inputs so a loaded edge can
    /// land on an operand slot the node only gains while being wired up
    pub(crate) fn pad_inputs(&mut self, id: NodeId, count: usize) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        let Some(rule) = node.op.as_ref().and_then(|op| op.variadic()) else {
            return;
        };
        while node.inputs.len() < count {
            let name = format!("Input {}", node.data_inputs().count());
            node.inputs.push(Input::new(name, rule.mask));
        }
    }

    fn notify_operator(&mut self, id: NodeId, event: ConnectionEvent) {
        let Self {
            nodes, variables, ..
        } = self;
        if let Some(op) = nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .and_then(|n| n.op.as_mut())
        {
            op.on_connection_changed(event, variables);
        }
    }

    // ------------------------------------------------------------------
    // Typing
    // ------------------------------------------------------------------

    /// Concrete type of an output
    pub fn output_type(&self, output: OutputRef) -> Option<PortType> {
        self.node(output.node)?.output(output.index)?.concrete()
    }

    /// Re-derive one node's output types. Returns whether any changed.
    pub fn resolve_output_type(&mut self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let input_types: Vec<Option<PortType>> = node
            .inputs
            .iter()
            .map(|i| i.producer().and_then(|p| self.output_type(p)))
            .collect();
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        let before: Vec<TypeMask> = node.outputs.iter().map(Output::ty).collect();
        let Node { op, outputs, .. } = node;
        if let Some(op) = op {
            op.resolve_output_type(&mut TypeContext::new(&input_types, outputs));
        }
        let changed: Vec<(usize, TypeMask)> = outputs
            .iter()
            .enumerate()
            .filter(|(i, o)| before.get(*i) != Some(&o.ty()))
            .map(|(i, o)| (i, o.ty()))
            .collect();
        for (index, ty) in &changed {
            let output = OutputRef::new(id, *index);
            self.notify(|o| o.output_type_changed(output, *ty));
        }
        !changed.is_empty()
    }

    /// Resolve `start` and cascade to consumers while types keep changing
    pub fn propagate_types(&mut self, start: NodeId) {
        let mut work = VecDeque::from([start]);
        while let Some(id) = work.pop_front() {
            if !self.resolve_output_type(id) {
                continue;
            }
            if let Some(node) = self.node(id) {
                for (_, output) in node.data_outputs() {
                    work.extend(output.consumers().iter().map(|c| c.node));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Evaluate one node now, if it is ready.
    ///
    /// Failures are logged and reported but never propagated; a failed node
    /// keeps its previous outputs and result.
    pub fn try_evaluate(&mut self, id: NodeId) -> EvalOutcome {
        let Some(node) = self.node(id) else {
            return EvalOutcome::Unavailable;
        };
        let Some(op) = node.operator() else {
            return EvalOutcome::Unavailable;
        };
        if !op.is_ready(node) {
            return EvalOutcome::NotReady;
        }
        let Some(mut op) = self.node_mut(id).and_then(|n| n.op.take()) else {
            return EvalOutcome::Unavailable;
        };

        let mut ctx = EvalContext::new(self, id);
        let outcome = op.evaluate(&mut ctx);
        let (staged, result) = ctx.into_parts();

        let Some(node) = self.node_mut(id) else {
            return EvalOutcome::Unavailable;
        };
        node.op = Some(op);
        match outcome {
            Ok(()) => {
                let primary = node.primary_output();
                let mut first = None;
                for (index, value) in staged {
                    if let Some(output) = node.outputs.get_mut(index) {
                        output.set_value(Some(value));
                        if Some(index) == primary {
                            first = Some(value);
                        }
                    }
                }
                if let Some(result) = result.or(first) {
                    node.result = Some(result);
                }
                let result = node.result;
                if self.output == Some(id) {
                    self.result = result;
                }
                EvalOutcome::Evaluated
            }
            Err(error) => {
                tracing::trace!(node = %id, %error, "evaluation failed");
                EvalOutcome::Failed(error)
            }
        }
    }

    // ------------------------------------------------------------------
    // Structure queries
    // ------------------------------------------------------------------

    /// Sinks: nodes with no data consumers that no controller owns
    pub fn end_nodes(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| !n.has_data_consumers() && !n.is_control_owned())
            .map(Node::id)
            .collect()
    }

    /// Sources: nodes with no data producers
    pub fn root_nodes(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| !n.has_data_producers())
            .map(Node::id)
            .collect()
    }

    /// Entry node of a flow graph
    pub fn entry(&self) -> Option<NodeId> {
        self.entry
    }

    /// Designated output node
    pub fn output_node(&self) -> Option<NodeId> {
        self.output
    }

    /// Designate the node whose value is the graph's result
    pub fn set_output_node(&mut self, id: Option<NodeId>) -> Result<(), GraphError> {
        if let Some(id) = id {
            self.node(id).ok_or(GraphError::NodeNotFound(id))?;
        }
        self.output = id;
        Ok(())
    }

    /// Value of the output node after the last evaluation
    pub fn result(&self) -> Option<Value> {
        self.result
    }

    pub(crate) fn set_result(&mut self, result: Option<Value>) {
        self.result = result;
    }

    /// Resolved type of the output node's primary value
    pub fn result_type(&self) -> Option<PortType> {
        let node = self.node(self.output?)?;
        node.output(node.primary_output()?)?.concrete()
    }

    /// Whether evaluation order comes from the control-flow overlay
    pub fn is_flow_graph(&self) -> bool {
        self.entry.is_some()
            || self
                .output
                .and_then(|id| self.node(id))
                .is_some_and(Node::is_control_owned)
    }

    /// Arguments declared by `Arg` nodes, in creation order
    pub fn arguments(&self) -> Vec<Argument> {
        self.nodes()
            .filter_map(|n| n.operator().and_then(Operator::argument))
            .collect()
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    /// Variable table
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// Variable table, for hosts seeding values
    pub fn variables_mut(&mut self) -> &mut VariableTable {
        &mut self.variables
    }

    /// Write a variable and tell observers
    pub fn write_variable(&mut self, name: &str, value: Value) -> Version {
        let version = self.variables.set(name, value);
        self.notify(|o| o.variable_written(name, &value, version));
        version
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// Add or replace a function, keyed by its graph name
    pub fn add_function(&mut self, function: Graph) -> Option<Graph> {
        let name = function.name.clone();
        let previous = self.functions.insert(name.clone(), function);
        self.resync_calls_to(&name);
        previous
    }

    /// Remove a function. Calls to it lose their arguments.
    pub fn remove_function(&mut self, name: &str) -> Option<Graph> {
        let removed = self.functions.shift_remove(name);
        self.resync_calls_to(name);
        removed
    }

    /// Get a function by name
    pub fn function(&self, name: &str) -> Option<&Graph> {
        self.functions.get(name)
    }

    /// All functions
    pub fn functions(&self) -> impl Iterator<Item = &Graph> {
        self.functions.values()
    }

    pub(crate) fn function_mut(&mut self, name: &str) -> Option<&mut Graph> {
        self.functions.get_mut(name)
    }

    /// Edit a function, then resync every call to it
    pub fn edit_function<R>(&mut self, name: &str, edit: impl FnOnce(&mut Graph) -> R) -> Option<R> {
        let function = self.functions.get_mut(name)?;
        let result = edit(function);
        self.resync_calls_to(name);
        Some(result)
    }

    fn resync_calls_to(&mut self, name: &str) {
        let calls: Vec<NodeId> = self
            .nodes()
            .filter(|n| n.operator().and_then(Operator::call_target) == Some(name))
            .map(Node::id)
            .collect();
        for id in calls {
            if let Err(error) = self.resync_call(id) {
                tracing::warn!(node = %id, %error, "could not resync call");
            }
        }
    }

    /// Rebind a call node's argument inputs to its function's current arguments
    pub fn resync_call(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node(id).ok_or(GraphError::NodeNotFound(id))?;
        let target = node
            .operator()
            .and_then(Operator::call_target)
            .map(str::to_string);
        let (arguments, result) = match target.as_deref().and_then(|n| self.functions.get(n)) {
            Some(function) => (function.arguments(), function.result_type()),
            None => (Vec::new(), None),
        };
        self.rebind_arguments(id, &arguments, result)
    }

    /// Replace the argument inputs of a call-like node.
    ///
    /// Previous producers are reconnected by position where the new argument
    /// still accepts their type, at the fan-out positions they held before.
    pub(crate) fn rebind_arguments(
        &mut self,
        id: NodeId,
        arguments: &[Argument],
        result: Option<PortType>,
    ) -> Result<(), GraphError> {
        let node = self.node(id).ok_or(GraphError::NodeNotFound(id))?;
        let offset = node
            .operator()
            .map_or(0, Operator::argument_offset)
            .min(node.inputs.len());
        let previous: Vec<Option<(OutputRef, usize)>> = node.inputs[offset..]
            .iter()
            .enumerate()
            .map(|(k, input)| {
                let producer = input.producer()?;
                let position = self
                    .node(producer.node)?
                    .output(producer.index)?
                    .position_of(InputRef::new(id, offset + k))?;
                Some((producer, position))
            })
            .collect();

        for (k, slot) in previous.iter().enumerate() {
            if slot.is_some() {
                self.detach(InputRef::new(id, offset + k));
            }
        }

        let node = self.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        node.inputs.truncate(offset);
        for argument in arguments {
            node.inputs
                .push(Input::new(argument.name.clone(), argument.mask));
        }
        if let Some(op) = node.op.as_mut() {
            op.bind_result_type(result);
        }

        let mut restore: Vec<(usize, OutputRef, usize)> = previous
            .iter()
            .enumerate()
            .take(arguments.len())
            .filter_map(|(k, slot)| slot.map(|(producer, position)| (k, producer, position)))
            .filter(|(k, producer, _)| {
                self.node(producer.node)
                    .and_then(|n| n.output(producer.index))
                    .is_some_and(|o| o.ty().intersects(arguments[*k].mask))
            })
            .collect();
        restore.sort_by_key(|(_, _, position)| *position);
        for (k, producer, position) in restore {
            self.attach(producer, InputRef::new(id, offset + k), position);
        }
        self.propagate_types(id);
        Ok(())
    }

    /// Replace the embedded graph of an instance node and rebind its ports
    pub fn set_instance_graph(&mut self, id: NodeId, graph: Graph) -> Result<(), GraphError> {
        let arguments = graph.arguments();
        let result = graph.result_type();
        let node = self.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        let instance = node
            .op
            .as_mut()
            .and_then(|op| op.instance_mut())
            .ok_or(GraphError::NotAnInstance(id))?;
        instance.set_graph(graph);
        self.rebind_arguments(id, &arguments, result)
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register an observer
    pub fn observe(&mut self, observer: Box<dyn GraphObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, observer));
        id
    }

    /// Unregister an observer. Returns whether it was registered.
    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(o, _)| *o != id);
        self.observers.len() != before
    }

    pub(crate) fn notify(&mut self, mut f: impl FnMut(&mut dyn GraphObserver)) {
        for (_, observer) in &mut self.observers {
            f(observer.as_mut());
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("nodes", &self.node_count())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("output", &self.output)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

/// Error when editing a graph
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// No registered node type with this ID
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// A flow graph has exactly one entry node
    #[error("Graph already has an entry node")]
    DuplicateEntry,

    /// A node with this persistent identity already exists
    #[error("Node already exists: {0}")]
    DuplicateNode(Uuid),

    /// The node's operator is currently running
    #[error("Node is busy: {0}")]
    Busy(NodeId),

    /// Parameter rejected by the operator
    #[error(transparent)]
    Param(#[from] ParamError),

    /// The node does not embed a graph
    #[error("Node is not a graph instance: {0}")]
    NotAnInstance(NodeId),
}

/// Error when creating a connection
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Input port not found
    #[error("Input not found: {0:?}")]
    InputNotFound(InputRef),

    /// Output port not found
    #[error("Output not found: {0:?}")]
    OutputNotFound(OutputRef),

    /// The output's type is not accepted by the input
    #[error("Type mismatch: {output:?} cannot feed {input:?}")]
    TypeMismatch {
        /// Output type tag
        output: TypeMask,
        /// Input's allowed types
        input: TypeMask,
    },

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// The edge would close a cycle
    #[error("Connection would create a cycle")]
    Cycle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::arithmetic::Arithmetic;
    use crate::ops::constant::Constant;
    use crate::ops::logic::Not;
    use crate::ops::output::GraphOutput;
    use crate::value::BinaryOp;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl GraphObserver for Recorder {
        fn input_connected(&mut self, input: InputRef, output: OutputRef) {
            self.events
                .borrow_mut()
                .push(format!("connected {}.{} <- {}.{}", input.node, input.index, output.node, output.index));
        }

        fn input_disconnected(&mut self, input: InputRef, _output: OutputRef) {
            self.events
                .borrow_mut()
                .push(format!("disconnected {}.{}", input.node, input.index));
        }

        fn output_type_changed(&mut self, output: OutputRef, ty: TypeMask) {
            self.events
                .borrow_mut()
                .push(format!("type {}.{} {:?}", output.node, output.index, ty));
        }
    }

    fn float(graph: &mut Graph, v: f32) -> NodeId {
        graph.add(Constant::new(Value::Float(v))).unwrap()
    }

    #[test]
    fn test_type_mismatch_leaves_graph_unchanged() {
        let mut graph = Graph::new("test");
        let c = float(&mut graph, 1.0);
        let not = graph.add(Not).unwrap();
        let err = graph
            .connect(OutputRef::new(c, 0), InputRef::new(not, 1))
            .unwrap_err();
        assert!(matches!(err, ConnectionError::TypeMismatch { .. }));
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.consumers(OutputRef::new(c, 0)).is_empty());
    }

    #[test]
    fn test_self_loop_and_cycle_rejected() {
        let mut graph = Graph::new("test");
        let a = graph.add(Arithmetic::new(BinaryOp::Add)).unwrap();
        let b = graph.add(Arithmetic::new(BinaryOp::Add)).unwrap();
        let c = float(&mut graph, 1.0);
        graph.connect(OutputRef::new(c, 0), InputRef::new(a, 1)).unwrap();
        assert_eq!(
            graph.connect(OutputRef::new(a, 1), InputRef::new(a, 2)),
            Err(ConnectionError::SelfLoop)
        );
        graph.connect(OutputRef::new(a, 1), InputRef::new(b, 1)).unwrap();
        assert_eq!(
            graph.connect(OutputRef::new(b, 1), InputRef::new(a, 2)),
            Err(ConnectionError::Cycle)
        );
    }

    #[test]
    fn test_reconnect_replaces_producer() {
        let mut graph = Graph::new("test");
        let c1 = float(&mut graph, 1.0);
        let c2 = float(&mut graph, 2.0);
        let out = graph.add(GraphOutput).unwrap();
        graph.connect(OutputRef::new(c1, 0), InputRef::new(out, 0)).unwrap();
        graph.connect(OutputRef::new(c2, 0), InputRef::new(out, 0)).unwrap();
        assert_eq!(graph.producer(InputRef::new(out, 0)), Some(OutputRef::new(c2, 0)));
        assert!(graph.consumers(OutputRef::new(c1, 0)).is_empty());
        assert_eq!(graph.connection_count(), 1);
    }

    #[test]
    fn test_fan_out_insertion_order() {
        let mut graph = Graph::new("test");
        let c = float(&mut graph, 1.0);
        let a = graph.add(GraphOutput).unwrap();
        let b = graph.add(GraphOutput).unwrap();
        let d = graph.add(GraphOutput).unwrap();
        graph.connect(OutputRef::new(c, 0), InputRef::new(a, 0)).unwrap();
        graph.connect(OutputRef::new(c, 0), InputRef::new(b, 0)).unwrap();
        graph.connect_at(OutputRef::new(c, 0), InputRef::new(d, 0), 0).unwrap();
        let order: Vec<NodeId> = graph
            .consumers(OutputRef::new(c, 0))
            .iter()
            .map(|i| i.node)
            .collect();
        assert_eq!(order, vec![d, a, b]);
    }

    #[test]
    fn test_variadic_inputs_grow_and_shrink() {
        let mut graph = Graph::new("test");
        let add = graph.add(Arithmetic::new(BinaryOp::Add)).unwrap();
        let c1 = float(&mut graph, 1.0);
        let c2 = float(&mut graph, 2.0);
        let data_inputs = |g: &Graph| g.node(add).unwrap().data_inputs().count();
        assert_eq!(data_inputs(&graph), 2);
        graph.connect(OutputRef::new(c1, 0), InputRef::new(add, 1)).unwrap();
        assert_eq!(data_inputs(&graph), 2);
        graph.connect(OutputRef::new(c2, 0), InputRef::new(add, 2)).unwrap();
        assert_eq!(data_inputs(&graph), 3);
        graph.disconnect(InputRef::new(add, 2));
        assert_eq!(data_inputs(&graph), 2);
    }

    #[test]
    fn test_types_cascade_downstream() {
        let mut graph = Graph::new("test");
        let v = graph.add(Constant::new(Value::Float3([1.0, 2.0, 3.0]))).unwrap();
        let s = float(&mut graph, 2.0);
        let mul = graph.add(Arithmetic::new(BinaryOp::Multiply)).unwrap();
        let out = graph.add(GraphOutput).unwrap();
        graph.connect(OutputRef::new(mul, 1), InputRef::new(out, 0)).unwrap();
        graph.connect(OutputRef::new(s, 0), InputRef::new(mul, 1)).unwrap();
        assert_eq!(graph.output_type(OutputRef::new(out, 0)), Some(PortType::Float));
        graph.connect(OutputRef::new(v, 0), InputRef::new(mul, 2)).unwrap();
        assert_eq!(graph.output_type(OutputRef::new(mul, 1)), Some(PortType::Float3));
        assert_eq!(graph.output_type(OutputRef::new(out, 0)), Some(PortType::Float3));
    }

    #[test]
    fn test_observer_notifications() {
        let mut graph = Graph::new("test");
        let events = Rc::new(RefCell::new(Vec::new()));
        let id = graph.observe(Box::new(Recorder { events: events.clone() }));
        let c = float(&mut graph, 1.0);
        let out = graph.add(GraphOutput).unwrap();
        graph.connect(OutputRef::new(c, 0), InputRef::new(out, 0)).unwrap();
        graph.disconnect(InputRef::new(out, 0));
        let log = events.borrow().clone();
        assert_eq!(log[0], format!("connected {out}.0 <- {c}.0"));
        assert!(log.contains(&format!("type {out}.0 Float")));
        assert_eq!(log.last().unwrap(), &format!("disconnected {out}.0"));

        assert!(graph.unobserve(id));
        graph.connect(OutputRef::new(c, 0), InputRef::new(out, 0)).unwrap();
        assert_eq!(events.borrow().len(), log.len());
    }

    #[test]
    fn test_remove_detaches_edges() {
        let mut graph = Graph::new("test");
        let c = float(&mut graph, 1.0);
        let mid = graph.add(GraphOutput).unwrap();
        let out = graph.add(GraphOutput).unwrap();
        graph.connect(OutputRef::new(c, 0), InputRef::new(mid, 0)).unwrap();
        graph.connect(OutputRef::new(mid, 0), InputRef::new(out, 0)).unwrap();
        graph.remove(mid).unwrap();
        assert!(graph.node(mid).is_none());
        assert!(graph.consumers(OutputRef::new(c, 0)).is_empty());
        assert_eq!(graph.producer(InputRef::new(out, 0)), None);
        assert!(matches!(graph.remove(mid), Err(GraphError::NodeNotFound(_))));
        // Slots are not reused
        let again = float(&mut graph, 3.0);
        assert_ne!(again, mid);
    }

    #[test]
    fn test_failed_evaluation_keeps_outputs() {
        let mut graph = Graph::new("test");
        let v2 = graph.add(Constant::new(Value::Float2([1.0, 2.0]))).unwrap();
        let v3 = graph.add(Constant::new(Value::Float3([1.0, 2.0, 3.0]))).unwrap();
        let add = graph.add(Arithmetic::new(BinaryOp::Add)).unwrap();
        graph.try_evaluate(v2);
        graph.try_evaluate(v3);
        graph.connect(OutputRef::new(v2, 0), InputRef::new(add, 1)).unwrap();
        assert_eq!(graph.try_evaluate(add), EvalOutcome::Evaluated);
        assert_eq!(graph.node(add).unwrap().result(), Some(Value::Float2([1.0, 2.0])));

        graph.connect(OutputRef::new(v3, 0), InputRef::new(add, 2)).unwrap();
        assert!(matches!(graph.try_evaluate(add), EvalOutcome::Failed(_)));
        assert_eq!(graph.node(add).unwrap().result(), Some(Value::Float2([1.0, 2.0])));
        assert_eq!(
            graph.node(add).unwrap().output(1).unwrap().value(),
            Some(Value::Float2([1.0, 2.0]))
        );
    }
}
