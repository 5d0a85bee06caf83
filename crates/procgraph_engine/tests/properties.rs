// SPDX-License-Identifier: MIT OR Apache-2.0
// Property tests for scheduling and type resolution over random DAGs.
//
// Graphs are built from constants, negations and two-operand sums, with
// every edge pointing from an earlier node to a later one.

use procgraph_engine::ops::arithmetic::Arithmetic;
use procgraph_engine::ops::constant::Constant;
use procgraph_engine::ops::unary::{Unary, UnaryFunc};
use procgraph_engine::{BinaryOp, Graph, InputRef, NodeId, OutputRef, PollStatus, Value};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
enum Shape {
    Constant(f32),
    Negate(usize),
    Sum(usize, usize),
}

fn arb_shapes() -> impl Strategy<Value = Vec<Shape>> {
    let shape = prop_oneof![
        (-100.0f32..100.0).prop_map(Shape::Constant),
        any::<usize>().prop_map(Shape::Negate),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Shape::Sum(a, b)),
    ];
    prop::collection::vec(shape, 1..16)
}

struct Dag {
    graph: Graph,
    ids: Vec<NodeId>,
    edges: Vec<(NodeId, NodeId)>,
}

/// Build a graph; parent indices are reduced modulo the node's position
fn build(shapes: &[Shape]) -> Dag {
    let mut graph = Graph::new("random");
    let mut ids: Vec<NodeId> = Vec::new();
    // Output carrying each node's value
    let mut value_out: Vec<usize> = Vec::new();
    let mut edges = Vec::new();

    for (i, shape) in shapes.iter().enumerate() {
        let shape = if i == 0 { Shape::Constant(1.0) } else { shape.clone() };
        let (id, parents, output) = match shape {
            Shape::Constant(v) => (
                graph.add(Constant::new(Value::Float(v))).unwrap(),
                vec![],
                0,
            ),
            Shape::Negate(a) => (
                graph.add(Unary::new(UnaryFunc::Negate)).unwrap(),
                vec![a % i],
                1,
            ),
            Shape::Sum(a, b) => (
                graph.add(Arithmetic::new(BinaryOp::Add)).unwrap(),
                vec![a % i, b % i],
                1,
            ),
        };
        for (slot, parent) in parents.into_iter().enumerate() {
            graph
                .connect(
                    OutputRef::new(ids[parent], value_out[parent]),
                    InputRef::new(id, slot + 1),
                )
                .unwrap();
            edges.push((ids[parent], id));
        }
        value_out.push(output);
        ids.push(id);
    }
    Dag { graph, ids, edges }
}

fn reachable(edges: &[(NodeId, NodeId)], from: NodeId, forward: bool) -> HashSet<NodeId> {
    let mut seen = HashSet::from([from]);
    let mut stack = vec![from];
    while let Some(id) = stack.pop() {
        for &(a, b) in edges {
            let (src, dst) = if forward { (a, b) } else { (b, a) };
            if src == id && seen.insert(dst) {
                stack.push(dst);
            }
        }
    }
    seen
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_producers_evaluate_before_consumers(shapes in arb_shapes()) {
        let Dag { mut graph, ids, edges } = build(&shapes);
        graph.schedule();
        let mut processed = Vec::new();
        loop {
            match graph.poll() {
                PollStatus::Processed(id) => processed.push(id),
                PollStatus::Idle | PollStatus::Completed => break,
                PollStatus::Skipped(_) | PollStatus::Stepped(_) => {}
            }
        }
        // Unconnected constants are never part of a pass
        let connected: HashSet<NodeId> = edges.iter().flat_map(|(a, b)| [*a, *b]).collect();
        for id in ids.iter().filter(|id| connected.contains(id)) {
            prop_assert!(processed.contains(id));
        }
        let position: HashMap<NodeId, usize> =
            processed.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        for (from, to) in edges {
            prop_assert!(position[&from] < position[&to]);
        }
    }

    #[test]
    fn prop_schedule_queues_each_node_once(shapes in arb_shapes()) {
        let Dag { mut graph, .. } = build(&shapes);
        let queued = graph.schedule();
        let order: Vec<NodeId> = graph.queued().collect();
        let unique: HashSet<NodeId> = order.iter().copied().collect();
        prop_assert_eq!(unique.len(), order.len());
        prop_assert_eq!(queued, order.len());

        prop_assert_eq!(graph.schedule(), 0);
        for id in &order {
            graph.schedule_node(*id);
        }
        prop_assert_eq!(graph.pending(), order.len());
    }

    #[test]
    fn prop_type_resolution_is_idempotent(shapes in arb_shapes()) {
        let Dag { mut graph, ids, .. } = build(&shapes);
        for id in ids {
            graph.resolve_output_type(id);
            let before: Vec<_> = graph
                .node(id)
                .unwrap()
                .outputs()
                .iter()
                .map(|o| o.ty())
                .collect();
            prop_assert!(!graph.resolve_output_type(id));
            let after: Vec<_> = graph
                .node(id)
                .unwrap()
                .outputs()
                .iter()
                .map(|o| o.ty())
                .collect();
            prop_assert_eq!(before, after);
        }
    }

    #[test]
    fn prop_targeted_schedule_stays_on_data_paths(
        shapes in arb_shapes(),
        pick in any::<usize>(),
    ) {
        let Dag { mut graph, ids, edges } = build(&shapes);
        prop_assume!(graph.end_nodes().len() > 1);
        let target = ids[pick % ids.len()];
        let mut related = reachable(&edges, target, true);
        related.extend(reachable(&edges, target, false));

        graph.schedule_node(target);
        for id in graph.queued() {
            prop_assert!(related.contains(&id), "{id} is unrelated to {target}");
        }
    }
}
