// SPDX-License-Identifier: MIT OR Apache-2.0
//! Vector construction and decomposition.

use crate::codegen::{EmitContext, EmitError};
use crate::evaluation::{EvalContext, EvalError};
use crate::operator::Operator;
use crate::port::{Input, Output, PortLayout, PortType, TypeMask};
use crate::value::Value;

const LANES: [&str; 4] = ["X", "Y", "Z", "W"];
const SWIZZLE: [&str; 4] = ["x", "y", "z", "w"];

fn vector_type(arity: usize) -> PortType {
    PortType::vector(arity).unwrap_or(PortType::Float4)
}

/// Builds a vector from scalar components
#[derive(Debug, Clone)]
pub struct MakeVector {
    arity: usize,
}

impl MakeVector {
    /// Vector of `arity` lanes, clamped to 2..=4
    pub fn new(arity: usize) -> Self {
        Self {
            arity: arity.clamp(2, 4),
        }
    }
}

impl Operator for MakeVector {
    fn type_tag(&self) -> &'static str {
        match self.arity {
            2 => "make_float2",
            3 => "make_float3",
            _ => "make_float4",
        }
    }

    fn ports(&self) -> PortLayout {
        LANES
            .iter()
            .take(self.arity)
            .fold(PortLayout::flow(), |layout, lane| {
                layout.input(Input::new(*lane, TypeMask::FLOAT))
            })
            .output(Output::new("Vector", vector_type(self.arity).mask()))
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let mut lanes = [0.0; 4];
        for (k, lane) in lanes.iter_mut().enumerate().take(self.arity) {
            *lane = ctx.require_float(k + 1)?;
        }
        let value = Value::from_lanes(lanes, self.arity).ok_or(EvalError::IncompatibleShapes)?;
        ctx.set_output(1, value);
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let components = (1..=self.arity)
            .map(|i| ctx.operand(i))
            .collect::<Result<Vec<_>, _>>()?;
        let ty = ctx.type_name(1)?;
        ctx.define(1, &format!("{ty}({})", components.join(", ")))
    }
}

/// Splits a vector into scalar components
#[derive(Debug, Clone)]
pub struct BreakVector {
    arity: usize,
}

impl BreakVector {
    /// Vector of `arity` lanes, clamped to 2..=4
    pub fn new(arity: usize) -> Self {
        Self {
            arity: arity.clamp(2, 4),
        }
    }
}

impl Operator for BreakVector {
    fn type_tag(&self) -> &'static str {
        match self.arity {
            2 => "break_float2",
            3 => "break_float3",
            _ => "break_float4",
        }
    }

    fn ports(&self) -> PortLayout {
        LANES.iter().take(self.arity).fold(
            PortLayout::flow().input(Input::new("Vector", vector_type(self.arity).mask())),
            |layout, lane| layout.output(Output::new(*lane, TypeMask::FLOAT)),
        )
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let value = ctx.require(1)?;
        let (lanes, arity) = value.lanes().ok_or(EvalError::InvalidOperand {
            index: 1,
            found: value.port_type(),
        })?;
        if arity != self.arity {
            return Err(EvalError::IncompatibleShapes);
        }
        for (k, lane) in lanes.iter().take(arity).enumerate() {
            ctx.set_output(k + 1, Value::Float(*lane));
        }
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let v = ctx.operand(1)?;
        let mut code = String::new();
        for (k, swizzle) in SWIZZLE.iter().take(self.arity).enumerate() {
            code.push_str(&ctx.define(k + 1, &format!("{v}.{swizzle}"))?);
        }
        Ok(code)
    }
}
