// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dependency resolution.
//!
//! [`Resolver::backtrack`] walks from one input back to everything it
//! depends on; [`Resolver::gather`] turns a set of starting nodes into the
//! ordered list the scheduler enqueues. Only data edges are walked.

use crate::graph::Graph;
use crate::node::NodeId;
use crate::port::InputRef;
use std::collections::{HashSet, VecDeque};

/// Read-only dependency walker over one graph
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'g> {
    graph: &'g Graph,
}

impl<'g> Resolver<'g> {
    /// Create a resolver for `graph`
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Dependencies of one input, consumer first.
    ///
    /// `visited` is shared by every walk of one pass, so a diamond is only
    /// walked once. The `end` node is always re-included when reached so a
    /// targeted walk can tell that it converged.
    pub fn backtrack(
        &self,
        input: InputRef,
        end: Option<NodeId>,
        visited: &mut HashSet<NodeId>,
    ) -> Vec<NodeId> {
        let mut items = Vec::new();
        let Some(producer) = self.graph.producer(input) else {
            return items;
        };
        if !visited.insert(producer.node) {
            return items;
        }

        let mut queue = VecDeque::from([producer.node]);
        while let Some(previous) = queue.pop_front() {
            items.push(previous);
            if Some(previous) == end {
                break;
            }
            let Some(node) = self.graph.node(previous) else {
                continue;
            };
            let inputs: Vec<usize> = node.data_inputs().map(|(i, _)| i).collect();

            if inputs.len() > 1 {
                let mut branches: Vec<Vec<NodeId>> = inputs
                    .iter()
                    .map(|i| self.backtrack(InputRef::new(previous, *i), end, visited))
                    .filter(|b| !b.is_empty())
                    .collect();
                if branches
                    .first()
                    .and_then(|b| b.first())
                    .is_some_and(|first| self.is_external_input(*first))
                {
                    branches.reverse();
                }
                order_branches(&mut branches);
                items.extend(branches.into_iter().flatten());
            } else if let Some(index) = inputs.first() {
                let Some(next) = node.input(*index).and_then(|i| i.producer()) else {
                    continue;
                };
                if visited.contains(&next.node) {
                    if Some(next.node) == end {
                        items.push(next.node);
                    }
                    continue;
                }
                visited.insert(next.node);
                queue.push_back(next.node);
            }
        }
        items
    }

    /// Ordered evaluation list for `starts`, producers before consumers.
    ///
    /// Nodes for which `skip` returns true (already queued) are left out.
    /// With an `end` target and more than one start, only branches that reach
    /// the target are kept, trimmed to nodes on a data path through it.
    pub fn gather(
        &self,
        starts: &[NodeId],
        end: Option<NodeId>,
        skip: impl Fn(NodeId) -> bool,
    ) -> Vec<NodeId> {
        let mut visited: HashSet<NodeId> = starts.iter().copied().collect();
        let mut queued: HashSet<NodeId> = HashSet::new();
        let mut order = Vec::new();
        let target = end.filter(|_| starts.len() > 1);
        let related = target.map(|t| self.related(t));

        for &start in starts {
            if skip(start) || queued.contains(&start) {
                continue;
            }
            let Some(node) = self.graph.node(start) else {
                continue;
            };
            let inputs: Vec<usize> = node.data_inputs().map(|(i, _)| i).collect();

            let mut branches = Vec::new();
            for index in inputs {
                let mut branch = self.backtrack(InputRef::new(start, index), end, &mut visited);
                if let (Some(t), Some(related)) = (target, &related) {
                    if !branch.contains(&t) {
                        continue;
                    }
                    branch.retain(|n| related.contains(n));
                }
                if !branch.is_empty() {
                    branches.push(branch);
                }
            }

            // Producers already walked from an earlier start still count
            let did_add =
                !branches.is_empty() || (related.is_none() && node.has_data_producers());
            for branch in branches {
                for &next in branch.iter().rev() {
                    if skip(next) || !queued.insert(next) || self.is_control_owned(next) {
                        continue;
                    }
                    order.push(next);
                }
            }
            if (did_add || Some(start) == end) && queued.insert(start) {
                order.push(start);
            }
        }
        self.producers_first(order)
    }

    /// Stable repair pass: every in-set producer is placed before its
    /// consumers, otherwise the incoming order is kept.
    pub fn producers_first(&self, order: Vec<NodeId>) -> Vec<NodeId> {
        let members: HashSet<NodeId> = order.iter().copied().collect();
        let mut placed = HashSet::with_capacity(order.len());
        let mut out = Vec::with_capacity(order.len());
        for id in order {
            self.place(id, &members, &mut placed, &mut out);
        }
        out
    }

    fn place(
        &self,
        start: NodeId,
        members: &HashSet<NodeId>,
        placed: &mut HashSet<NodeId>,
        out: &mut Vec<NodeId>,
    ) {
        if !placed.insert(start) {
            return;
        }
        // Explicit stack of (node, producers still to visit)
        let mut stack = vec![(start, self.in_set_producers(start, members))];
        while let Some((id, pending)) = stack.last_mut() {
            match pending.pop() {
                Some(producer) => {
                    if placed.insert(producer) {
                        let next = self.in_set_producers(producer, members);
                        stack.push((producer, next));
                    }
                }
                None => {
                    out.push(*id);
                    stack.pop();
                }
            }
        }
    }

    /// Data producers of `id` that are part of `members`, reversed so popping
    /// visits them in input order
    fn in_set_producers(&self, id: NodeId, members: &HashSet<NodeId>) -> Vec<NodeId> {
        let Some(node) = self.graph.node(id) else {
            return Vec::new();
        };
        let mut producers: Vec<NodeId> = node
            .data_inputs()
            .filter_map(|(_, i)| i.producer())
            .map(|p| p.node)
            .filter(|n| members.contains(n))
            .collect();
        producers.reverse();
        producers
    }

    /// Nodes with a directed data path to or from `target`, and the target
    pub fn related(&self, target: NodeId) -> HashSet<NodeId> {
        let mut related = HashSet::from([target]);
        let mut stack = vec![target];
        while let Some(id) = stack.pop() {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            for (_, input) in node.data_inputs() {
                if let Some(p) = input.producer() {
                    if related.insert(p.node) {
                        stack.push(p.node);
                    }
                }
            }
        }
        let mut downstream = vec![target];
        let mut seen = HashSet::from([target]);
        while let Some(id) = downstream.pop() {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            for (_, output) in node.data_outputs() {
                for consumer in output.consumers() {
                    if seen.insert(consumer.node) {
                        related.insert(consumer.node);
                        downstream.push(consumer.node);
                    }
                }
            }
        }
        related
    }

    fn is_external_input(&self, id: NodeId) -> bool {
        self.graph
            .node(id)
            .and_then(|n| n.operator())
            .is_some_and(|op| op.is_external_input())
    }

    fn is_control_owned(&self, id: NodeId) -> bool {
        self.graph.node(id).is_some_and(|n| n.is_control_owned())
    }
}

/// Sibling branch ordering: when the first branch is at least as long as the
/// second the shortest goes first, otherwise the longest does. The sort is
/// stable, so equal lengths keep input order.
fn order_branches(branches: &mut [Vec<NodeId>]) {
    if branches.len() < 2 {
        return;
    }
    if branches[0].len() >= branches[1].len() {
        branches.sort_by_key(Vec::len);
    } else {
        branches.sort_by(|a, b| b.len().cmp(&a.len()));
    }
}
