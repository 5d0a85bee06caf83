// SPDX-License-Identifier: MIT OR Apache-2.0
//! Embedded graph instances.
//!
//! An instance node owns a whole graph. Its inputs mirror the embedded
//! graph's arguments and its result is the embedded graph's result. When
//! scheduled it is stepped: each poll of the owner advances the embedded
//! graph by one poll, so long subgraphs interleave with the rest of the
//! owner's queue.

use super::call::{argument_operands, argument_values};
use crate::codegen::{self, EmitContext, EmitError};
use crate::evaluation::{EvalContext, EvalError};
use crate::graph::Graph;
use crate::node::Node;
use crate::operator::Operator;
use crate::port::{Output, PortLayout, PortType, TypeMask};
use crate::types::TypeContext;
use crate::value::Value;

/// A graph embedded in a node
#[derive(Debug)]
pub struct Instance {
    graph: Graph,
    started: bool,
    result_type: Option<PortType>,
}

impl Instance {
    /// Instance embedding `graph`
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            started: false,
            result_type: None,
        }
    }

    /// Replace the embedded graph. Use
    /// [`Graph::set_instance_graph`](crate::Graph::set_instance_graph) on a
    /// node that is already in a graph so its ports follow.
    pub fn set_graph(&mut self, graph: Graph) {
        self.graph = graph;
        self.started = false;
    }

    /// The embedded graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The embedded graph, mutably
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Advance the embedded graph by one poll. The first step of a run
    /// writes the arguments and schedules the graph unless work is already
    /// queued. Returns whether the embedded graph still has work.
    pub fn step(&mut self, arguments: &[(String, Value)]) -> bool {
        if !self.started {
            self.started = true;
            for (name, value) in arguments {
                self.graph.write_variable(name, *value);
            }
            if self.graph.pending() == 0 {
                self.graph.schedule();
            }
        }
        if self.graph.poll().is_idle() {
            self.started = false;
            return false;
        }
        true
    }

    fn function_name(node: &Node) -> String {
        format!("{}_graph", node.shader_id())
    }
}

impl Operator for Instance {
    fn type_tag(&self) -> &'static str {
        "graph_instance"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::flow().output(Output::new("Result", TypeMask::DATA))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        if let Some(ty) = self.result_type {
            ctx.set_output(1, ty);
        }
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        for (name, value) in argument_values(ctx, 1)? {
            self.graph.write_variable(&name, value);
        }
        self.started = false;
        let result = self.graph.evaluate_now().ok_or(EvalError::NoResult)?;
        ctx.set_output(1, result);
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let arguments = argument_operands(ctx, 1)?;
        let call = format!("{}({})", Self::function_name(ctx.node()), arguments.join(", "));
        ctx.define(1, &call)
    }

    fn emit_prelude(&self, node: &Node, _graph: &Graph) -> Result<Option<String>, EmitError> {
        codegen::function_definition(&self.graph, &Self::function_name(node)).map(Some)
    }

    fn argument_offset(&self) -> usize {
        1
    }

    fn bind_result_type(&mut self, ty: Option<PortType>) {
        self.result_type = ty;
    }

    fn instance(&self) -> Option<&Instance> {
        Some(self)
    }

    fn instance_mut(&mut self) -> Option<&mut Instance> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::ShaderTarget;
    use crate::node::NodeId;
    use crate::ops::arithmetic::Arithmetic;
    use crate::ops::call::Arg;
    use crate::ops::constant::Constant;
    use crate::ops::output::GraphOutput;
    use crate::port::{InputRef, OutputRef};
    use crate::scheduler::PollStatus;
    use crate::value::BinaryOp;

    fn link(graph: &mut Graph, from: NodeId, out: usize, to: NodeId, input: usize) {
        graph
            .connect(OutputRef::new(from, out), InputRef::new(to, input))
            .unwrap();
    }

    /// `square(x) = x * x`
    fn square() -> Graph {
        let mut inner = Graph::new_function("square");
        let x = inner.add(Arg::new("x", PortType::Float)).unwrap();
        let mul = inner.add(Arithmetic::new(BinaryOp::Multiply)).unwrap();
        let out = inner.add(GraphOutput).unwrap();
        link(&mut inner, x, 0, mul, 1);
        link(&mut inner, x, 0, mul, 2);
        link(&mut inner, mul, 1, out, 0);
        inner.set_output_node(Some(out)).unwrap();
        inner
    }

    #[test]
    fn test_instance_ports_follow_embedded_graph() {
        let mut graph = Graph::new("outer");
        let id = graph.add(Instance::new(square())).unwrap();
        let node = graph.node(id).unwrap();
        assert_eq!(node.inputs().len(), 2);
        assert_eq!(node.inputs()[1].name, "x");
        assert_eq!(graph.output_type(OutputRef::new(id, 1)), Some(PortType::Float));

        graph.set_instance_graph(id, Graph::new_function("empty")).unwrap();
        assert_eq!(graph.node(id).unwrap().inputs().len(), 1);
    }

    #[test]
    fn test_instance_is_stepped_by_owner() {
        let mut graph = Graph::new("outer");
        let c = graph.add(Constant::new(Value::Float(3.0))).unwrap();
        let id = graph.add(Instance::new(square())).unwrap();
        let out = graph.add(GraphOutput).unwrap();
        link(&mut graph, c, 0, id, 1);
        link(&mut graph, id, 1, out, 0);
        graph.set_output_node(Some(out)).unwrap();

        graph.schedule();
        let mut stepped = 0;
        loop {
            match graph.poll() {
                PollStatus::Stepped(n) => {
                    assert_eq!(n, id);
                    stepped += 1;
                }
                status if status.is_idle() => break,
                _ => {}
            }
        }
        assert!(stepped >= 3);
        assert_eq!(graph.result(), Some(Value::Float(9.0)));
        assert_eq!(graph.node(id).unwrap().result(), Some(Value::Float(9.0)));
    }

    #[test]
    fn test_failed_step_keeps_previous_result() {
        let mut graph = Graph::new("outer");
        let c = graph.add(Constant::new(Value::Float(3.0))).unwrap();
        let id = graph.add(Instance::new(square())).unwrap();
        link(&mut graph, c, 0, id, 1);
        graph.schedule_node(id);
        graph.run_until_idle();
        assert_eq!(graph.node(id).unwrap().output(1).unwrap().value(), Some(Value::Float(9.0)));

        // Output node with nothing wired into it
        let mut broken = Graph::new_function("broken");
        let out = broken.add(GraphOutput).unwrap();
        broken.set_output_node(Some(out)).unwrap();
        graph.set_instance_graph(id, broken).unwrap();

        graph.schedule_node(id);
        graph.run_until_idle();
        let node = graph.node(id).unwrap();
        assert_eq!(node.output(1).unwrap().value(), Some(Value::Float(9.0)));
        assert_eq!(node.result(), Some(Value::Float(9.0)));
    }

    #[test]
    fn test_instance_evaluates_synchronously() {
        let mut graph = Graph::new("outer");
        let c = graph.add(Constant::new(Value::Float(4.0))).unwrap();
        let id = graph.add(Instance::new(square())).unwrap();
        link(&mut graph, c, 0, id, 1);
        graph.try_evaluate(c);
        graph.try_evaluate(id);
        assert_eq!(graph.node(id).unwrap().result(), Some(Value::Float(16.0)));
    }

    #[test]
    fn test_instance_emits_embedded_function() {
        let mut graph = Graph::new("outer");
        let c = graph.add(Constant::new(Value::Float(2.0))).unwrap();
        let id = graph.add(Instance::new(square())).unwrap();
        let out = graph.add(GraphOutput).unwrap();
        link(&mut graph, c, 0, id, 1);
        link(&mut graph, id, 1, out, 0);
        let code = graph.emit_shader(out, &ShaderTarget::default()).unwrap();
        let sid = graph.node(id).unwrap().shader_id().to_string();
        assert!(code.contains(&format!("float {sid}_graph(float x) {{")));
        assert!(code.contains(&format!("float {sid}1 = {sid}_graph(2);")));
    }
}
