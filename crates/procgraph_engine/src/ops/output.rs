// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph output.

use crate::codegen::{EmitContext, EmitError};
use crate::evaluation::{EvalContext, EvalError};
use crate::operator::Operator;
use crate::port::{Input, Output, PortLayout, TypeMask};
use crate::types::TypeContext;

/// Passes its input through as the graph's result. Designate it with
/// [`Graph::set_output_node`](crate::Graph::set_output_node).
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphOutput;

impl Operator for GraphOutput {
    fn type_tag(&self) -> &'static str {
        "output"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::new()
            .input(Input::new("Value", TypeMask::DATA))
            .output(Output::new("Value", TypeMask::DATA))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        if let Some(ty) = ctx.input(0) {
            ctx.set_output(0, ty);
        }
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let value = ctx.require(0)?;
        ctx.set_output(0, value);
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let x = ctx.operand(0)?;
        ctx.define(0, &x)
    }
}
