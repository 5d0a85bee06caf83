// SPDX-License-Identifier: MIT OR Apache-2.0
//! Control-flow overlay.
//!
//! Execute pins form a second graph on top of the data edges. The branch
//! collector walks it forward and produces the node list a controller (a
//! loop, a flow graph's entry) runs or emits in order.

use crate::graph::Graph;
use crate::node::{Node, NodeId};
use crate::port::{Input, OutputRef};
use std::collections::{HashSet, VecDeque};

/// Walk forward from `start` along execute edges.
///
/// Each visited node is preceded by its free data producers: upstream nodes
/// with no execute producer of their own (constants, variable reads,
/// arguments). Those are not marked `seen` since another node further along
/// may share them. Execute outputs with several consumers fork the walk;
/// outputs the node owns itself (a loop body) are left to the node. The walk
/// does not continue past `stop`.
pub fn collect_branch(
    graph: &Graph,
    start: NodeId,
    seen: &mut HashSet<NodeId>,
    stop: Option<NodeId>,
) -> Vec<NodeId> {
    let mut forward = Vec::new();
    let mut queue = VecDeque::from([start]);

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let Some(node) = graph.node(id) else {
            continue;
        };
        free_producers(graph, node, &mut forward);
        forward.push(id);

        if Some(id) == stop {
            continue;
        }
        let owned = node.operator().map_or(&[][..], |op| op.owned_execute_outputs());
        for (index, output) in node.outputs().iter().enumerate() {
            if !output.is_execute() || owned.contains(&index) {
                continue;
            }
            match output.consumers() {
                [] => {}
                [next] => queue.push_back(next.node),
                fork => {
                    for consumer in fork {
                        forward.extend(collect_branch(graph, consumer.node, seen, stop));
                    }
                }
            }
        }
    }
    forward
}

/// Free data producers of `node`, producers first
fn free_producers(graph: &Graph, node: &Node, out: &mut Vec<NodeId>) {
    for (_, input) in node.data_inputs() {
        let Some(producer) = input.producer().and_then(|p| graph.node(p.node)) else {
            continue;
        };
        if producer.is_control_owned() || out.contains(&producer.id()) {
            continue;
        }
        free_producers(graph, producer, out);
        out.push(producer.id());
    }
}

/// Evaluation and emission order of a flow graph.
///
/// Starts at the entry node, or without one at the head of the execute
/// chain that ends at the output node. The entry itself is dropped. An
/// output node off the chain is appended with its free producers.
pub fn flow_order(graph: &Graph) -> Vec<NodeId> {
    let Some(start) = graph.entry().or_else(|| chain_head(graph)) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut order = collect_branch(graph, start, &mut seen, graph.output_node());
    if let Some(entry) = graph.entry() {
        order.retain(|id| *id != entry);
    }

    if let Some(output) = graph.output_node().and_then(|id| graph.node(id)) {
        if !order.contains(&output.id()) && !output.is_control_owned() {
            free_producers(graph, output, &mut order);
            order.push(output.id());
        }
    }

    let mut unique = HashSet::with_capacity(order.len());
    order.retain(|id| unique.insert(*id));
    order
}

/// Head of the execute chain leading into the output node
fn chain_head(graph: &Graph) -> Option<NodeId> {
    let mut current = graph.output_node()?;
    let mut visited = HashSet::new();
    loop {
        visited.insert(current);
        let previous = graph
            .node(current)?
            .inputs()
            .iter()
            .filter(|i| i.is_execute())
            .find_map(Input::producer);
        match previous {
            Some(p) if !visited.contains(&p.node) => current = p.node,
            _ => return Some(current),
        }
    }
}

/// Nodes run by a controller for one pass of its execute output `output`
pub fn loop_body(graph: &Graph, node: NodeId, output: usize) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut body = Vec::new();
    for consumer in graph.consumers(OutputRef::new(node, output)) {
        body.extend(collect_branch(graph, consumer.node, &mut seen, None));
    }
    body
}
