// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-operand math functions.

use crate::codegen::{EmitContext, EmitError};
use crate::evaluation::{EvalContext, EvalError};
use crate::operator::Operator;
use crate::port::{Input, Output, PortLayout, PortType, TypeMask};
use crate::types::TypeContext;
use crate::value::Value;

/// Function applied by [`Unary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryFunc {
    /// `-x`
    Negate,
    /// `abs(x)`
    Absolute,
    /// `sin(x)`
    Sine,
    /// `cos(x)`
    Cosine,
    /// `floor(x)`
    Floor,
    /// `ceil(x)`
    Ceil,
    /// `x - floor(x)`
    Fract,
    /// `sqrt(x)`
    Sqrt,
    /// Unit vector in the direction of x
    Normalize,
    /// Euclidean length, always a scalar
    Length,
}

impl UnaryFunc {
    fn tag(self) -> &'static str {
        match self {
            Self::Negate => "negate",
            Self::Absolute => "absolute",
            Self::Sine => "sine",
            Self::Cosine => "cosine",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Fract => "fract",
            Self::Sqrt => "sqrt",
            Self::Normalize => "normalize",
            Self::Length => "length",
        }
    }

    fn lane(self, x: f32) -> f32 {
        match self {
            Self::Negate => -x,
            Self::Absolute => x.abs(),
            Self::Sine => x.sin(),
            Self::Cosine => x.cos(),
            Self::Floor => x.floor(),
            Self::Ceil => x.ceil(),
            Self::Fract => x - x.floor(),
            Self::Sqrt => x.sqrt(),
            Self::Normalize | Self::Length => x,
        }
    }
}

/// Applies a [`UnaryFunc`] lane by lane
#[derive(Debug, Clone)]
pub struct Unary {
    func: UnaryFunc,
}

impl Unary {
    /// Operator computing `func`
    pub fn new(func: UnaryFunc) -> Self {
        Self { func }
    }
}

impl Operator for Unary {
    fn type_tag(&self) -> &'static str {
        self.func.tag()
    }

    fn ports(&self) -> PortLayout {
        let output = match self.func {
            UnaryFunc::Length => TypeMask::FLOAT,
            _ => TypeMask::SCALAR_VECTOR,
        };
        PortLayout::flow()
            .input(Input::new("Input", TypeMask::SCALAR_VECTOR))
            .output(Output::new("Result", output))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        if self.func == UnaryFunc::Length {
            ctx.set_output(1, PortType::Float);
        } else if let Some(ty) = ctx.input(1) {
            ctx.set_output(1, ty);
        }
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let input = ctx.require(1)?;
        let invalid = || EvalError::InvalidOperand {
            index: 1,
            found: input.port_type(),
        };
        let result = match self.func {
            UnaryFunc::Length => input.length().map(Value::Float),
            UnaryFunc::Normalize => {
                let length = input.length().ok_or_else(invalid)?;
                input.map(|x| if length > 0.0 { x / length } else { 0.0 })
            }
            func => input.map(|x| func.lane(x)),
        };
        ctx.set_output(1, result.ok_or_else(invalid)?);
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let x = ctx.operand(1)?;
        let expr = match self.func {
            UnaryFunc::Negate => format!("-({x})"),
            UnaryFunc::Absolute => format!("abs({x})"),
            UnaryFunc::Sine => format!("sin({x})"),
            UnaryFunc::Cosine => format!("cos({x})"),
            UnaryFunc::Floor => format!("floor({x})"),
            UnaryFunc::Ceil => format!("ceil({x})"),
            UnaryFunc::Fract => format!("fract({x})"),
            UnaryFunc::Sqrt => format!("sqrt({x})"),
            UnaryFunc::Normalize => format!("normalize({x})"),
            UnaryFunc::Length => format!("length({x})"),
        };
        ctx.define(1, &expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::node::NodeId;
    use crate::ops::constant::Constant;
    use crate::port::{InputRef, OutputRef};

    fn apply(func: UnaryFunc, input: Value) -> (Option<Value>, Option<PortType>) {
        let mut graph = Graph::new("test");
        let c = graph.add(Constant::new(input)).unwrap();
        let op: NodeId = graph.add(Unary::new(func)).unwrap();
        graph
            .connect(OutputRef::new(c, 0), InputRef::new(op, 1))
            .unwrap();
        graph.try_evaluate(c);
        graph.try_evaluate(op);
        (
            graph.node(op).unwrap().result(),
            graph.output_type(OutputRef::new(op, 1)),
        )
    }

    #[test]
    fn test_lanewise_functions() {
        assert_eq!(
            apply(UnaryFunc::Negate, Value::Float2([1.0, -2.0])).0,
            Some(Value::Float2([-1.0, 2.0]))
        );
        assert_eq!(
            apply(UnaryFunc::Fract, Value::Float(-0.25)).0,
            Some(Value::Float(0.75))
        );
        assert_eq!(
            apply(UnaryFunc::Floor, Value::Float(1.75)),
            (Some(Value::Float(1.0)), Some(PortType::Float))
        );
    }

    #[test]
    fn test_length_is_scalar() {
        assert_eq!(
            apply(UnaryFunc::Length, Value::Float3([2.0, 3.0, 6.0])),
            (Some(Value::Float(7.0)), Some(PortType::Float))
        );
    }

    #[test]
    fn test_normalize() {
        let (result, ty) = apply(UnaryFunc::Normalize, Value::Float2([3.0, 4.0]));
        assert_eq!(result, Some(Value::Float2([0.6, 0.8])));
        assert_eq!(ty, Some(PortType::Float2));
        let (zero, _) = apply(UnaryFunc::Normalize, Value::Float2([0.0, 0.0]));
        assert_eq!(zero, Some(Value::Float2([0.0, 0.0])));
    }
}
