// SPDX-License-Identifier: MIT OR Apache-2.0
//! Control-flow operators.
//!
//! These nodes only take part in the execute overlay: the entry point, an
//! ordered fan-out, and a counting loop that runs its body itself.

use crate::codegen::{EmitContext, EmitError};
use crate::evaluation::{EvalContext, EvalError};
use crate::operator::{NodeParams, Operator, ParamError, ParamValue};
use crate::overlay;
use crate::port::{Input, Output, PortLayout, PortType, TypeMask};
use crate::types::TypeContext;
use crate::value::Value;

/// Upper bound on the iterations of a single loop evaluation
pub const MAX_LOOP_ITERATIONS: usize = 100_000;

/// Entry point of a flow graph
#[derive(Debug, Clone, Copy, Default)]
pub struct Execute;

impl Operator for Execute {
    fn type_tag(&self) -> &'static str {
        "execute"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::new().output(Output::execute("Execute"))
    }

    fn evaluate(&mut self, _ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        Ok(())
    }

    fn emit(&self, _ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        Ok(String::new())
    }

    fn is_entry(&self) -> bool {
        true
    }
}

/// Runs each of its execute outputs in order
#[derive(Debug, Clone)]
pub struct Sequence {
    outputs: usize,
}

impl Sequence {
    /// Sequence with `outputs` branches, at least one
    pub fn new(outputs: usize) -> Self {
        Self {
            outputs: outputs.max(1),
        }
    }
}

impl Operator for Sequence {
    fn type_tag(&self) -> &'static str {
        "sequence"
    }

    fn ports(&self) -> PortLayout {
        (0..self.outputs).fold(
            PortLayout::new().input(Input::execute("Execute")),
            |layout, k| layout.output(Output::execute(format!("Then {k}"))),
        )
    }

    fn evaluate(&mut self, _ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        Ok(())
    }

    fn emit(&self, _ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        Ok(String::new())
    }

    fn params(&self) -> NodeParams {
        let mut params = NodeParams::new();
        params.insert("Outputs".to_string(), ParamValue::Integer(self.outputs as i64));
        params
    }

    /// Through [`Graph::set_params`](crate::Graph::set_params) the node's
    /// outputs follow the new count; dropped branches are disconnected.
    fn apply_params(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        for (name, param) in params {
            let count = match (name.as_str(), param) {
                ("Outputs", ParamValue::Integer(n)) if *n >= 1 => usize::try_from(*n).ok(),
                ("Outputs", _) => None,
                _ => return Err(ParamError::Unknown(name.clone())),
            };
            self.outputs = count.ok_or_else(|| ParamError::WrongKind {
                name: name.clone(),
                expected: "a positive integer",
            })?;
        }
        Ok(())
    }
}

/// Counting loop.
///
/// Runs the branch on its `Loop` pin once per counter value, publishing the
/// counter on `Current` before each pass, then continues along `Done`.
/// Counts up while `start <= end` (exclusive end) and down otherwise
/// (inclusive end).
#[derive(Debug, Clone, Default)]
pub struct ForLoop;

impl ForLoop {
    /// A counting loop
    pub fn new() -> Self {
        Self
    }
}

/// Counter values of one loop run
pub fn loop_counter(start: f32, end: f32, step: f32) -> Result<Vec<f32>, EvalError> {
    if !(start.is_finite() && end.is_finite()) {
        return Err(EvalError::InvalidLoop("bounds must be finite".to_string()));
    }
    if !step.is_finite() || step <= 0.0 {
        return Err(EvalError::InvalidLoop(format!(
            "increment must be positive, got {step}"
        )));
    }
    let ascending = start <= end;
    let mut values = Vec::new();
    let mut i = start;
    while if ascending { i < end } else { i >= end } {
        if values.len() == MAX_LOOP_ITERATIONS {
            return Err(EvalError::InvalidLoop(format!(
                "more than {MAX_LOOP_ITERATIONS} iterations"
            )));
        }
        values.push(i);
        let next = if ascending { i + step } else { i - step };
        if next == i {
            return Err(EvalError::InvalidLoop(format!(
                "increment {step} is lost at {i}"
            )));
        }
        i = next;
    }
    Ok(values)
}

impl Operator for ForLoop {
    fn type_tag(&self) -> &'static str {
        "for_loop"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::new()
            .input(Input::execute("Execute"))
            .input(Input::new("Start", TypeMask::FLOAT))
            .input(Input::new("End", TypeMask::FLOAT))
            .input(Input::new("Increment By", TypeMask::FLOAT))
            .output(Output::execute("Loop"))
            .output(Output::new("Current", TypeMask::FLOAT))
            .output(Output::execute("Done"))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        ctx.set_output(1, PortType::Float);
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let start = ctx.require_float(1)?;
        let end = ctx.require_float(2)?;
        let step = ctx.require_float(3)?;
        let counter = loop_counter(start, end, step)?;
        let body = overlay::loop_body(ctx.graph(), ctx.node_id(), 0);
        tracing::trace!(
            node = %ctx.node_id(),
            iterations = counter.len(),
            body = body.len(),
            "running loop"
        );
        for i in counter {
            ctx.publish_output(1, Value::Float(i));
            for id in &body {
                ctx.graph_mut().try_evaluate(*id);
            }
        }
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let start = ctx.operand(1)?;
        let end = ctx.operand(2)?;
        let step = ctx.operand(3)?;
        let counter = ctx.ident(1);
        let body_nodes = overlay::loop_body(ctx.graph(), ctx.node().id(), 0);
        let body = ctx.emit_block(&body_nodes)?;
        Ok(format!(
            "if ({start} <= {end}) {{\n\
             for (float {counter} = {start}; {counter} < {end}; {counter} += {step}) {{\n\
             {body}}}\n\
             }}\n\
             else {{\n\
             for (float {counter} = {start}; {counter} >= {end}; {counter} -= {step}) {{\n\
             {body}}}\n\
             }}\n"
        ))
    }

    fn owned_execute_outputs(&self) -> &'static [usize] {
        &[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_directions() {
        assert_eq!(loop_counter(0.0, 3.0, 1.0).unwrap(), vec![0.0, 1.0, 2.0]);
        assert_eq!(loop_counter(3.0, 1.0, 1.0).unwrap(), vec![3.0, 2.0, 1.0]);
        assert_eq!(loop_counter(0.0, 1.0, 0.5).unwrap(), vec![0.0, 0.5]);
        assert!(loop_counter(2.0, 2.0, 1.0).unwrap().is_empty());
    }

    #[test]
    fn test_counter_rejects_bad_steps() {
        assert!(matches!(
            loop_counter(0.0, 3.0, 0.0),
            Err(EvalError::InvalidLoop(_))
        ));
        assert!(matches!(
            loop_counter(0.0, 3.0, -1.0),
            Err(EvalError::InvalidLoop(_))
        ));
        assert!(matches!(
            loop_counter(0.0, f32::INFINITY, 1.0),
            Err(EvalError::InvalidLoop(_))
        ));
        assert!(matches!(
            loop_counter(0.0, 1.0e9, 1.0),
            Err(EvalError::InvalidLoop(_))
        ));
    }

    #[test]
    fn test_sequence_ports() {
        let seq = Sequence::new(3);
        let layout = seq.ports();
        assert_eq!(layout.outputs.len(), 3);
        assert!(layout.outputs.iter().all(Output::is_execute));
        assert_eq!(Sequence::new(0).ports().outputs.len(), 1);
    }

    #[test]
    fn test_sequence_outputs_follow_param() {
        use crate::graph::{Graph, GraphError};
        use crate::port::{InputRef, OutputRef};

        let mut graph = Graph::new("flow");
        let seq = graph.add(Sequence::new(3)).unwrap();
        let first = graph.add(Sequence::new(1)).unwrap();
        let last = graph.add(Sequence::new(1)).unwrap();
        graph
            .connect(OutputRef::new(seq, 0), InputRef::new(first, 0))
            .unwrap();
        graph
            .connect(OutputRef::new(seq, 2), InputRef::new(last, 0))
            .unwrap();

        graph.set_param(seq, "Outputs", ParamValue::Integer(2)).unwrap();
        assert_eq!(graph.node(seq).unwrap().outputs().len(), 2);
        assert_eq!(graph.producer(InputRef::new(first, 0)), Some(OutputRef::new(seq, 0)));
        assert_eq!(graph.producer(InputRef::new(last, 0)), None);

        graph.set_param(seq, "Outputs", ParamValue::Integer(4)).unwrap();
        let node = graph.node(seq).unwrap();
        assert_eq!(node.outputs().len(), 4);
        assert!(node.outputs().iter().all(Output::is_execute));

        assert!(matches!(
            graph.set_param(seq, "Outputs", ParamValue::Integer(0)),
            Err(GraphError::Param(ParamError::WrongKind { .. }))
        ));
        assert_eq!(graph.node(seq).unwrap().outputs().len(), 4);
    }
}
