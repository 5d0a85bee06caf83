// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end behaviour of small graphs through the public API.

use procgraph_engine::ops::arithmetic::Arithmetic;
use procgraph_engine::ops::call::{Arg, Call};
use procgraph_engine::ops::constant::Constant;
use procgraph_engine::ops::flow::{Execute, ForLoop};
use procgraph_engine::ops::logic::Not;
use procgraph_engine::ops::output::GraphOutput;
use procgraph_engine::ops::unary::{Unary, UnaryFunc};
use procgraph_engine::ops::variable::SetVar;
use procgraph_engine::{
    BinaryOp, ConnectionError, Graph, GraphDescriptor, GraphObserver, InputRef, NodeId,
    OutputRef, PollStatus, PortType, ShaderTarget, Value, Version,
};
use std::cell::RefCell;
use std::rc::Rc;

fn link(graph: &mut Graph, from: NodeId, out: usize, to: NodeId, input: usize) {
    graph
        .connect(OutputRef::new(from, out), InputRef::new(to, input))
        .unwrap();
}

fn float(graph: &mut Graph, v: f32) -> NodeId {
    graph.add(Constant::new(Value::Float(v))).unwrap()
}

/// Drain the queue, collecting the nodes that were evaluated
fn drain(graph: &mut Graph) -> Vec<NodeId> {
    let mut processed = Vec::new();
    loop {
        match graph.poll() {
            PollStatus::Processed(id) => processed.push(id),
            PollStatus::Idle | PollStatus::Completed => return processed,
            PollStatus::Skipped(_) | PollStatus::Stepped(_) => {}
        }
    }
}

#[derive(Default)]
struct Writes(Rc<RefCell<Vec<(String, Value)>>>);

impl GraphObserver for Writes {
    fn variable_written(&mut self, name: &str, value: &Value, _version: Version) {
        self.0.borrow_mut().push((name.to_string(), *value));
    }
}

#[test]
fn test_constant_sum_evaluates_and_emits() {
    let mut graph = Graph::new("sum");
    let two = float(&mut graph, 2.0);
    let three = float(&mut graph, 3.0);
    let add = graph.add(Arithmetic::new(BinaryOp::Add)).unwrap();
    let out = graph.add(GraphOutput).unwrap();
    link(&mut graph, two, 0, add, 1);
    link(&mut graph, three, 0, add, 2);
    link(&mut graph, add, 1, out, 0);
    graph.set_output_node(Some(out)).unwrap();

    graph.schedule();
    graph.run_until_idle();
    assert_eq!(graph.result(), Some(Value::Float(5.0)));
    assert_eq!(graph.node(out).unwrap().result(), Some(Value::Float(5.0)));

    let code = graph.emit_shader(out, &ShaderTarget::default()).unwrap();
    let add_id = graph.node(add).unwrap().shader_id().to_string();
    let out_id = graph.node(out).unwrap().shader_id().to_string();
    let sum = code.find(&format!("float {add_id}1 = 2 + 3;")).unwrap();
    let read = code.find(&format!("float {out_id}0 = {add_id}1;")).unwrap();
    assert!(sum < read);
}

#[test]
fn test_diamond_schedules_root_once() {
    let mut graph = Graph::new("diamond");
    let root = float(&mut graph, 4.0);
    let x = graph.add(Unary::new(UnaryFunc::Negate)).unwrap();
    let y = graph.add(Unary::new(UnaryFunc::Sqrt)).unwrap();
    let add = graph.add(Arithmetic::new(BinaryOp::Add)).unwrap();
    let out = graph.add(GraphOutput).unwrap();
    link(&mut graph, root, 0, x, 1);
    link(&mut graph, root, 0, y, 1);
    link(&mut graph, x, 1, add, 1);
    link(&mut graph, y, 1, add, 2);
    link(&mut graph, add, 1, out, 0);
    graph.set_output_node(Some(out)).unwrap();

    assert_eq!(graph.schedule(), 5);
    let queued: Vec<NodeId> = graph.queued().collect();
    assert_eq!(queued, vec![root, x, y, add, out]);

    let processed = drain(&mut graph);
    assert_eq!(processed, vec![root, x, y, add, out]);
    assert_eq!(graph.result(), Some(Value::Float(-2.0)));
}

#[test]
fn test_for_loop_runs_body_per_iteration() {
    let mut graph = Graph::new("loop");
    let writes = Rc::new(RefCell::new(Vec::new()));
    graph.observe(Box::new(Writes(Rc::clone(&writes))));

    let entry = graph.add(Execute).unwrap();
    let start = float(&mut graph, 0.0);
    let end = float(&mut graph, 3.0);
    let step = float(&mut graph, 1.0);
    let for_loop = graph.add(ForLoop::new()).unwrap();
    let body = graph.add(SetVar::new("i")).unwrap();
    link(&mut graph, entry, 0, for_loop, 0);
    link(&mut graph, start, 0, for_loop, 1);
    link(&mut graph, end, 0, for_loop, 2);
    link(&mut graph, step, 0, for_loop, 3);
    link(&mut graph, for_loop, 0, body, 0);
    link(&mut graph, for_loop, 1, body, 1);

    graph.schedule();
    assert!(!graph.queued().any(|id| id == body));
    graph.run_until_idle();
    let seen: Vec<Value> = writes.borrow().iter().map(|(_, v)| *v).collect();
    assert_eq!(
        seen,
        vec![Value::Float(0.0), Value::Float(1.0), Value::Float(2.0)]
    );
    assert!(writes.borrow().iter().all(|(name, _)| name == "i"));
    assert_eq!(graph.variables().get("i"), Some(Value::Float(2.0)));

    // Detached from the loop, the body is no longer part of a pass
    graph.disconnect(InputRef::new(body, 0));
    writes.borrow_mut().clear();
    graph.schedule();
    assert!(!graph.queued().any(|id| id == body));
    graph.run_until_idle();
    assert!(writes.borrow().is_empty());
}

#[test]
fn test_incompatible_connection_leaves_edges_alone() {
    let mut graph = Graph::new("mismatch");
    let c = float(&mut graph, 1.0);
    let not = graph.add(Not).unwrap();
    let before = graph.connections();

    let err = graph
        .connect(OutputRef::new(c, 0), InputRef::new(not, 1))
        .unwrap_err();
    assert!(matches!(err, ConnectionError::TypeMismatch { .. }));
    assert_eq!(graph.connections(), before);
    assert_eq!(graph.producer(InputRef::new(not, 1)), None);
}

#[test]
fn test_types_follow_operand_shape() {
    let mut graph = Graph::new("shapes");
    let v = graph
        .add(Constant::new(Value::Float3([1.0, 2.0, 3.0])))
        .unwrap();
    let s = float(&mut graph, 2.0);
    let mul = graph.add(Arithmetic::new(BinaryOp::Multiply)).unwrap();
    let out = graph.add(GraphOutput).unwrap();
    link(&mut graph, s, 0, mul, 1);
    link(&mut graph, v, 0, mul, 2);
    link(&mut graph, mul, 1, out, 0);
    graph.set_output_node(Some(out)).unwrap();

    assert_eq!(graph.result_type(), Some(PortType::Float3));
    assert_eq!(graph.evaluate_now(), Some(Value::Float3([2.0, 4.0, 6.0])));
}

#[test]
fn test_saved_graph_with_function_reloads() {
    let mut function = Graph::new_function("triple");
    let x = function.add(Arg::new("x", PortType::Float)).unwrap();
    let k = float(&mut function, 3.0);
    let mul = function.add(Arithmetic::new(BinaryOp::Multiply)).unwrap();
    let result = function.add(GraphOutput).unwrap();
    link(&mut function, x, 0, mul, 1);
    link(&mut function, k, 0, mul, 2);
    link(&mut function, mul, 1, result, 0);
    function.set_output_node(Some(result)).unwrap();

    let mut graph = Graph::new("host");
    graph.add_function(function);
    let c = float(&mut graph, 5.0);
    let call = graph.add(Call::to("triple")).unwrap();
    let out = graph.add(GraphOutput).unwrap();
    link(&mut graph, c, 0, call, 1);
    link(&mut graph, call, 1, out, 0);
    graph.set_output_node(Some(out)).unwrap();
    assert_eq!(graph.evaluate_now(), Some(Value::Float(15.0)));

    let path = std::env::temp_dir().join(format!("procgraph-{}.ron", std::process::id()));
    graph.describe().save(&path).unwrap();
    let descriptor = GraphDescriptor::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let mut loaded = Graph::from_descriptor(&descriptor).unwrap();
    assert_eq!(loaded.node_count(), 3);
    assert!(loaded.function("triple").is_some());
    loaded.schedule();
    loaded.run_until_idle();
    assert_eq!(loaded.result(), Some(Value::Float(15.0)));
}

#[test]
fn test_snapshot_undoes_structural_edits() {
    let mut graph = Graph::new("undo");
    let a = float(&mut graph, 1.0);
    let neg = graph.add(Unary::new(UnaryFunc::Negate)).unwrap();
    let out = graph.add(GraphOutput).unwrap();
    link(&mut graph, a, 0, neg, 1);
    link(&mut graph, neg, 1, out, 0);
    graph.set_output_node(Some(out)).unwrap();
    let snapshot = graph.snapshot().unwrap();

    graph.remove(neg).unwrap();
    link(&mut graph, a, 0, out, 0);
    assert_eq!(graph.evaluate_now(), Some(Value::Float(1.0)));

    let report = graph.restore(&snapshot).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.evaluate_now(), Some(Value::Float(-1.0)));
}
