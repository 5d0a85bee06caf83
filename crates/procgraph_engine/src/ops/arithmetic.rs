// SPDX-License-Identifier: MIT OR Apache-2.0
//! Arithmetic operators.

use crate::codegen::{EmitContext, EmitError};
use crate::evaluation::{EvalContext, EvalError};
use crate::operator::{Operator, Variadic};
use crate::port::{Input, Output, PortLayout, PortType, TypeMask};
use crate::types::{self, TypeContext};
use crate::value::{BinaryOp, Value};

/// Binary arithmetic. Add, multiply, min and max take any number of
/// operands and fold them left to right.
#[derive(Debug, Clone)]
pub struct Arithmetic {
    op: BinaryOp,
}

impl Arithmetic {
    /// Operator applying `op`
    pub fn new(op: BinaryOp) -> Self {
        Self { op }
    }

    fn is_variadic(&self) -> bool {
        matches!(
            self.op,
            BinaryOp::Add | BinaryOp::Multiply | BinaryOp::Min | BinaryOp::Max
        )
    }

    fn mask(&self) -> TypeMask {
        match self.op {
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => {
                TypeMask::NUMERIC
            }
            BinaryOp::Min | BinaryOp::Max | BinaryOp::Pow | BinaryOp::Modulo => {
                TypeMask::SCALAR_VECTOR
            }
        }
    }

    /// Operand expressions with their types. Variadic nodes need their first
    /// two operands; fixed ones need both.
    fn operands(&self, ctx: &EmitContext<'_>) -> Result<Vec<(String, Option<PortType>)>, EmitError> {
        ctx.operand(1)?;
        ctx.operand(2)?;
        let node = ctx.node();
        node.data_inputs()
            .filter(|(i, input)| *i >= 1 && input.is_connected())
            .map(|(i, _)| Ok((ctx.operand(i)?, ctx.input_type(i))))
            .collect()
    }
}

impl Operator for Arithmetic {
    fn type_tag(&self) -> &'static str {
        match self.op {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "subtract",
            BinaryOp::Multiply => "multiply",
            BinaryOp::Divide => "divide",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::Pow => "pow",
            BinaryOp::Modulo => "modulo",
        }
    }

    fn ports(&self) -> PortLayout {
        let mask = self.mask();
        let (a, b) = if self.is_variadic() {
            ("Input 0", "Input 1")
        } else {
            ("A", "B")
        };
        PortLayout::flow()
            .input(Input::new(a, mask))
            .input(Input::new(b, mask))
            .output(Output::new("Result", mask))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        if let Some(ty) = types::fold(self.op, &ctx.connected_from(1)) {
            ctx.set_output(1, ty);
        }
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let values = if self.is_variadic() {
            ctx.connected_values(1)?
        } else {
            vec![ctx.require(1)?, ctx.require(2)?]
        };
        let (first, rest) = values.split_first().ok_or(EvalError::MissingInput(1))?;
        let result = rest.iter().try_fold(*first, |acc, v| {
            acc.apply(self.op, v).ok_or(EvalError::IncompatibleShapes)
        })?;
        ctx.set_output(1, result);
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let operands = self.operands(ctx)?;
        let expr = match self.op {
            BinaryOp::Add => join(&operands, " + "),
            BinaryOp::Subtract => join(&operands, " - "),
            BinaryOp::Divide => join(&operands, " / "),
            BinaryOp::Multiply => product(operands),
            BinaryOp::Min => nest(&operands, "min"),
            BinaryOp::Max => nest(&operands, "max"),
            BinaryOp::Pow => nest(&operands, "pow"),
            BinaryOp::Modulo => nest(&operands, "mod"),
        };
        ctx.define(1, &expr)
    }

    fn variadic(&self) -> Option<Variadic> {
        self.is_variadic().then(|| Variadic {
            mask: self.mask(),
            min: 2,
        })
    }
}

fn join(operands: &[(String, Option<PortType>)], separator: &str) -> String {
    operands
        .iter()
        .map(|(expr, _)| expr.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

fn nest(operands: &[(String, Option<PortType>)], function: &str) -> String {
    let mut iter = operands.iter().map(|(expr, _)| expr.clone());
    let first = iter.next().unwrap_or_default();
    iter.fold(first, |acc, next| format!("{function}({acc}, {next})"))
}

/// Products fold pairwise so a 4x4 matrix can transform a 3D point or a 2D
/// position through homogeneous coordinates
fn product(operands: Vec<(String, Option<PortType>)>) -> String {
    let mut iter = operands.into_iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let (expr, _) = iter.fold(first, |(acc, acc_ty), (next, next_ty)| {
        let ty = match (acc_ty, next_ty) {
            (Some(a), Some(b)) => types::combine(BinaryOp::Multiply, a, b),
            _ => None,
        };
        let expr = match (acc_ty, next_ty) {
            (Some(PortType::Matrix4), Some(PortType::Float3)) => {
                format!("({acc} * vec4({next}, 1.0)).xyz")
            }
            (Some(PortType::Matrix4), Some(PortType::Float2)) => {
                format!("({acc} * vec4({next}, 0.0, 1.0)).xy")
            }
            (Some(PortType::Float3), Some(PortType::Matrix4)) => {
                format!("(vec4({acc}, 1.0) * {next}).xyz")
            }
            (Some(PortType::Float2), Some(PortType::Matrix4)) => {
                format!("(vec4({acc}, 0.0, 1.0) * {next}).xy")
            }
            _ => format!("{acc} * {next}"),
        };
        (expr, ty)
    });
    expr
}

/// Linear interpolation between A and B by T
#[derive(Debug, Clone, Copy, Default)]
pub struct Lerp;

impl Operator for Lerp {
    fn type_tag(&self) -> &'static str {
        "lerp"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::flow()
            .input(Input::new("A", TypeMask::SCALAR_VECTOR))
            .input(Input::new("B", TypeMask::SCALAR_VECTOR))
            .input(Input::new("T", TypeMask::SCALAR_VECTOR))
            .output(Output::new("Result", TypeMask::SCALAR_VECTOR))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        let (Some(a), Some(b)) = (ctx.input(1), ctx.input(2)) else {
            return;
        };
        let ty = match ctx.input(3) {
            Some(t) => types::broadcast(a, b).and_then(|ab| types::broadcast(ab, t)),
            None => types::broadcast(a, b),
        };
        if let Some(ty) = ty {
            ctx.set_output(1, ty);
        }
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let a = ctx.require(1)?;
        let b = ctx.require(2)?;
        let t = ctx.require(3)?;
        let result = a.lerp(&b, &t).ok_or(EvalError::IncompatibleShapes)?;
        ctx.set_output(1, result);
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let a = ctx.operand(1)?;
        let b = ctx.operand(2)?;
        let t = ctx.operand(3)?;
        ctx.define(1, &format!("mix({a}, {b}, {t})"))
    }
}

/// Scalar measures of two vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairFunc {
    /// Dot product
    Dot,
    /// Euclidean distance
    Distance,
}

/// Reduces two vectors of the same arity to a scalar
#[derive(Debug, Clone)]
pub struct VectorPair {
    func: PairFunc,
}

impl VectorPair {
    /// Operator computing `func`
    pub fn new(func: PairFunc) -> Self {
        Self { func }
    }
}

impl Operator for VectorPair {
    fn type_tag(&self) -> &'static str {
        match self.func {
            PairFunc::Dot => "dot",
            PairFunc::Distance => "distance",
        }
    }

    fn ports(&self) -> PortLayout {
        PortLayout::flow()
            .input(Input::new("A", TypeMask::SCALAR_VECTOR))
            .input(Input::new("B", TypeMask::SCALAR_VECTOR))
            .output(Output::new("Result", TypeMask::FLOAT))
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let a = ctx.require(1)?;
        let b = ctx.require(2)?;
        let result = match self.func {
            PairFunc::Dot => a.dot(&b),
            PairFunc::Distance => a.apply(BinaryOp::Subtract, &b).and_then(|d| d.length()),
        };
        let result = result.ok_or(EvalError::IncompatibleShapes)?;
        ctx.set_output(1, Value::Float(result));
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let a = ctx.operand(1)?;
        let b = ctx.operand(2)?;
        let function = match self.func {
            PairFunc::Dot => "dot",
            PairFunc::Distance => "distance",
        };
        ctx.define(1, &format!("{function}({a}, {b})"))
    }
}
