// SPDX-License-Identifier: MIT OR Apache-2.0
//! Work queue: schedule passes and cooperative draining.
//!
//! A pass computes an order with the [`Resolver`] (or the control-flow
//! overlay for flow graphs) and appends it to the graph's queue. Hosts then
//! drain the queue with [`Graph::poll`], one unit of work per call, usually a
//! bounded number of polls per frame through [`Graph::tick`].

use crate::evaluation::{EvalError, EvalOutcome};
use crate::graph::Graph;
use crate::node::{Node, NodeId};
use crate::overlay;
use crate::resolver::Resolver;
use crate::value::Value;

/// What a single [`Graph::poll`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Nothing queued
    Idle,
    /// The node was evaluated (successfully or not)
    Processed(NodeId),
    /// The entry was stale: node removed or no longer flagged
    Skipped(NodeId),
    /// An instance node advanced its embedded graph and re-queued itself
    Stepped(NodeId),
    /// The queue drained after doing work. Reported once per pass.
    Completed,
}

impl PollStatus {
    /// Whether the poll did no work because the queue is empty
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle | Self::Completed)
    }
}

impl Graph {
    /// Queue every node needed to refresh the graph's end nodes
    pub fn schedule(&mut self) -> usize {
        let order = self.plan(None, true);
        tracing::debug!(graph = %self.name, nodes = order.len(), "schedule pass");
        self.enqueue_all(order)
    }

    /// Queue the nodes needed to refresh `id` and whatever depends on it
    pub fn schedule_node(&mut self, id: NodeId) -> usize {
        if self.node(id).is_none() {
            return 0;
        }
        let order = self.plan(Some(id), true);
        tracing::debug!(graph = %self.name, target = %id, nodes = order.len(), "targeted schedule pass");
        self.enqueue_all(order)
    }

    /// Order a full pass would evaluate in, ignoring the current queue
    pub fn evaluation_order(&self) -> Vec<NodeId> {
        self.plan(None, false)
    }

    /// Order a targeted pass would evaluate in, ignoring the current queue
    pub fn evaluation_order_for(&self, target: NodeId) -> Vec<NodeId> {
        self.plan(Some(target), false)
    }

    fn plan(&self, target: Option<NodeId>, skip_queued: bool) -> Vec<NodeId> {
        let queued = |id: NodeId| skip_queued && self.node(id).is_some_and(Node::is_scheduled);
        if self.is_flow_graph() {
            let mut order = overlay::flow_order(self);
            order.retain(|id| !queued(*id));
            return order;
        }
        let ends = self.end_nodes();
        let resolver = Resolver::new(self);
        match target {
            None => resolver.gather(&ends, None, queued),
            Some(target) if ends.contains(&target) => {
                resolver.gather(&[target], Some(target), queued)
            }
            Some(target) => resolver.gather(&ends, Some(target), queued),
        }
    }

    fn enqueue_all(&mut self, order: Vec<NodeId>) -> usize {
        order.into_iter().filter(|id| self.enqueue(*id)).count()
    }

    /// Queue one node unless it is already queued
    fn enqueue(&mut self, id: NodeId) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        if node.scheduled {
            return false;
        }
        node.scheduled = true;
        if let Some(instance) = node.op.as_mut().and_then(|op| op.instance_mut()) {
            instance.graph_mut().schedule();
        }
        self.queue.push_back(id);
        true
    }

    /// Drain one unit of work
    pub fn poll(&mut self) -> PollStatus {
        let Some(id) = self.queue.pop_front() else {
            if self.processing {
                self.processing = false;
                tracing::trace!(graph = %self.name, "pass completed");
                self.notify(|o| o.pass_completed());
                return PollStatus::Completed;
            }
            return PollStatus::Idle;
        };
        self.processing = true;

        let Some(node) = self.node_mut(id) else {
            return PollStatus::Skipped(id);
        };
        if !node.scheduled {
            return PollStatus::Skipped(id);
        }
        node.scheduled = false;

        if node.op.as_ref().is_some_and(|op| op.instance().is_some()) {
            return self.step_instance(id);
        }
        let outcome = self.try_evaluate(id);
        tracing::trace!(node = %id, ?outcome, "polled");
        PollStatus::Processed(id)
    }

    /// Advance an instance node's embedded graph by one poll
    fn step_instance(&mut self, id: NodeId) -> PollStatus {
        let arguments = self.argument_values(id);
        let Some(node) = self.node_mut(id) else {
            return PollStatus::Skipped(id);
        };
        let Some(instance) = node.op.as_mut().and_then(|op| op.instance_mut()) else {
            return PollStatus::Skipped(id);
        };
        if instance.step(&arguments) {
            node.scheduled = true;
            self.queue.push_front(id);
            return PollStatus::Stepped(id);
        }

        // A failed run keeps the previous output and result
        let Some(result) = instance.graph().result() else {
            tracing::trace!(node = %id, error = %EvalError::NoResult, "evaluation failed");
            return PollStatus::Processed(id);
        };
        let primary = node.primary_output();
        if let Some(output) = primary.and_then(|i| node.outputs.get_mut(i)) {
            output.set_value(Some(result));
        }
        node.result = Some(result);
        if self.output_node() == Some(id) {
            self.set_result(Some(result));
        }
        PollStatus::Processed(id)
    }

    /// Names and current values of a call-like node's argument inputs
    pub(crate) fn argument_values(&self, id: NodeId) -> Vec<(String, Value)> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        let offset = node.operator().map_or(0, |op| op.argument_offset());
        node.inputs()
            .iter()
            .skip(offset)
            .filter_map(|input| {
                let producer = input.producer()?;
                let value = self.node(producer.node)?.output(producer.index)?.value()?;
                Some((input.name.clone(), value))
            })
            .collect()
    }

    /// Poll up to `budget` times, stopping early when the queue is empty.
    /// Returns the number of polls that did work.
    pub fn tick(&mut self, budget: usize) -> usize {
        let mut done = 0;
        for _ in 0..budget {
            if self.poll().is_idle() {
                break;
            }
            done += 1;
        }
        done
    }

    /// Poll until the queue is empty
    pub fn run_until_idle(&mut self) -> usize {
        let mut done = 0;
        while !self.poll().is_idle() {
            done += 1;
        }
        done
    }

    /// Evaluate every node of a full pass right now, bypassing the queue,
    /// and return the graph's result
    pub fn evaluate_now(&mut self) -> Option<Value> {
        for id in self.evaluation_order() {
            if let EvalOutcome::Failed(error) = self.try_evaluate(id) {
                tracing::trace!(graph = %self.name, node = %id, %error, "synchronous evaluation failed");
            }
        }
        self.result()
    }

    /// Queued node IDs in drain order
    pub fn queued(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.queue.iter().copied()
    }

    /// Number of queued entries, stale ones included
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether a pass is being drained
    pub fn is_processing(&self) -> bool {
        self.processing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::GraphObserver;
    use crate::ops::arithmetic::Arithmetic;
    use crate::ops::constant::Constant;
    use crate::ops::output::GraphOutput;
    use crate::ops::unary::{Unary, UnaryFunc};
    use crate::port::{InputRef, OutputRef};
    use crate::value::BinaryOp;
    use std::cell::Cell;
    use std::rc::Rc;

    fn link(graph: &mut Graph, from: NodeId, out: usize, to: NodeId, input: usize) {
        graph
            .connect(OutputRef::new(from, out), InputRef::new(to, input))
            .unwrap();
    }

    /// c1 + c2 -> out, plus an unrelated c3 -> neg -> out2
    fn two_outputs() -> (Graph, Vec<NodeId>) {
        let mut graph = Graph::new("test");
        let c1 = graph.add(Constant::new(Value::Float(2.0))).unwrap();
        let c2 = graph.add(Constant::new(Value::Float(3.0))).unwrap();
        let add = graph.add(Arithmetic::new(BinaryOp::Add)).unwrap();
        let out = graph.add(GraphOutput).unwrap();
        let c3 = graph.add(Constant::new(Value::Float(7.0))).unwrap();
        let neg = graph.add(Unary::new(UnaryFunc::Negate)).unwrap();
        let out2 = graph.add(GraphOutput).unwrap();
        link(&mut graph, c1, 0, add, 1);
        link(&mut graph, c2, 0, add, 2);
        link(&mut graph, add, 1, out, 0);
        link(&mut graph, c3, 0, neg, 1);
        link(&mut graph, neg, 1, out2, 0);
        graph.set_output_node(Some(out)).unwrap();
        (graph, vec![c1, c2, add, out, c3, neg, out2])
    }

    #[test]
    fn test_schedule_and_drain() {
        let (mut graph, ids) = two_outputs();
        assert_eq!(graph.schedule(), 7);
        assert!(ids.iter().all(|id| graph.node(*id).unwrap().is_scheduled()));
        graph.run_until_idle();
        assert_eq!(graph.result(), Some(Value::Float(5.0)));
        assert_eq!(graph.node(ids[6]).unwrap().result(), Some(Value::Float(-7.0)));
        assert!(ids.iter().all(|id| !graph.node(*id).unwrap().is_scheduled()));
    }

    #[test]
    fn test_schedule_twice_queues_once() {
        let (mut graph, _) = two_outputs();
        assert_eq!(graph.schedule(), 7);
        assert_eq!(graph.schedule(), 0);
        assert_eq!(graph.pending(), 7);
    }

    #[test]
    fn test_targeted_schedule_skips_unrelated_branch() {
        let (mut graph, ids) = two_outputs();
        graph.schedule();
        graph.run_until_idle();
        let (c1, add, out) = (ids[0], ids[2], ids[3]);
        let queued = graph.schedule_node(c1);
        assert!(queued > 0);
        let order: Vec<NodeId> = graph.queued().collect();
        assert_eq!(order, vec![c1, add, out]);
    }

    #[test]
    fn test_targeted_schedule_of_end_node_refreshes_its_branch() {
        let (graph, ids) = two_outputs();
        let order = graph.evaluation_order_for(ids[6]);
        assert_eq!(order, vec![ids[4], ids[5], ids[6]]);
    }

    #[test]
    fn test_removed_node_drains_as_noop() {
        let (mut graph, ids) = two_outputs();
        graph.schedule();
        graph.remove(ids[5]).unwrap();
        let statuses: Vec<PollStatus> = std::iter::from_fn(|| {
            let status = graph.poll();
            (!status.is_idle()).then_some(status)
        })
        .collect();
        assert!(statuses.contains(&PollStatus::Skipped(ids[5])));
        assert_eq!(graph.result(), Some(Value::Float(5.0)));
    }

    #[test]
    fn test_tick_respects_budget() {
        let (mut graph, _) = two_outputs();
        graph.schedule();
        assert_eq!(graph.tick(3), 3);
        assert_eq!(graph.pending(), 4);
        assert_eq!(graph.tick(100), 4);
        assert_eq!(graph.poll(), PollStatus::Idle);
    }

    #[test]
    fn test_pass_completed_reported_once() {
        struct Counter(Rc<Cell<usize>>);
        impl GraphObserver for Counter {
            fn pass_completed(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }
        let (mut graph, _) = two_outputs();
        let count = Rc::new(Cell::new(0));
        graph.observe(Box::new(Counter(count.clone())));
        graph.schedule();
        graph.run_until_idle();
        assert_eq!(graph.poll(), PollStatus::Idle);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_evaluate_now_leaves_queue_alone() {
        let (mut graph, _) = two_outputs();
        assert_eq!(graph.evaluate_now(), Some(Value::Float(5.0)));
        assert_eq!(graph.pending(), 0);
    }

    #[test]
    fn test_auto_schedule_on_connect() {
        let mut graph = Graph::new("auto");
        graph.set_auto_schedule(true);
        let c = graph.add(Constant::new(Value::Float(4.0))).unwrap();
        let out = graph.add(GraphOutput).unwrap();
        graph.set_output_node(Some(out)).unwrap();
        link(&mut graph, c, 0, out, 0);
        assert_eq!(graph.queued().collect::<Vec<_>>(), vec![c, out]);
        graph.run_until_idle();
        assert_eq!(graph.result(), Some(Value::Float(4.0)));
    }
}
