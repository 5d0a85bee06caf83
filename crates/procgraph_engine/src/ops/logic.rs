// SPDX-License-Identifier: MIT OR Apache-2.0
//! Boolean logic, comparisons and selection.

use crate::codegen::{EmitContext, EmitError};
use crate::evaluation::{EvalContext, EvalError};
use crate::operator::{Operator, Variadic};
use crate::port::{Input, Output, PortLayout, PortType, TypeMask};
use crate::types::{self, TypeContext};
use crate::value::Value;

/// Boolean connective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    /// All operands true
    And,
    /// Any operand true
    Or,
}

/// Variadic boolean connective
#[derive(Debug, Clone)]
pub struct BooleanOp {
    op: LogicOp,
}

impl BooleanOp {
    /// Operator applying `op`
    pub fn new(op: LogicOp) -> Self {
        Self { op }
    }
}

impl Operator for BooleanOp {
    fn type_tag(&self) -> &'static str {
        match self.op {
            LogicOp::And => "and",
            LogicOp::Or => "or",
        }
    }

    fn ports(&self) -> PortLayout {
        PortLayout::flow()
            .input(Input::new("Input 0", TypeMask::BOOL))
            .input(Input::new("Input 1", TypeMask::BOOL))
            .output(Output::new("Result", TypeMask::BOOL))
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let values = ctx.connected_values(1)?;
        let mut flags = values.iter().map(|v| v.as_bool().unwrap_or(false));
        let result = match self.op {
            LogicOp::And => flags.all(|b| b),
            LogicOp::Or => flags.any(|b| b),
        };
        ctx.set_output(1, Value::Bool(result));
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        ctx.operand(1)?;
        ctx.operand(2)?;
        let separator = match self.op {
            LogicOp::And => " && ",
            LogicOp::Or => " || ",
        };
        let expr = ctx.operands_from(1)?.join(separator);
        ctx.define(1, &expr)
    }

    fn variadic(&self) -> Option<Variadic> {
        Some(Variadic {
            mask: TypeMask::BOOL,
            min: 2,
        })
    }
}

/// Boolean negation
#[derive(Debug, Clone, Copy, Default)]
pub struct Not;

impl Operator for Not {
    fn type_tag(&self) -> &'static str {
        "not"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::flow()
            .input(Input::new("Input", TypeMask::BOOL))
            .output(Output::new("Result", TypeMask::BOOL))
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let value = ctx.require(1)?;
        let flag = value.as_bool().ok_or(EvalError::InvalidOperand {
            index: 1,
            found: value.port_type(),
        })?;
        ctx.set_output(1, Value::Bool(!flag));
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let x = ctx.operand(1)?;
        ctx.define(1, &format!("!({x})"))
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `a > b`
    GreaterThan,
    /// `a >= b`
    GreaterThanEqual,
    /// `a < b`
    LessThan,
    /// `a <= b`
    LessThanEqual,
    /// `a == b`
    Equal,
    /// `a != b`
    NotEqual,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        }
    }

    fn is_ordering(self) -> bool {
        !matches!(self, Self::Equal | Self::NotEqual)
    }
}

/// Compares two operands. Orderings take scalars; equality takes any two
/// values of the same type.
#[derive(Debug, Clone)]
pub struct Compare {
    op: CompareOp,
}

impl Compare {
    /// Operator applying `op`
    pub fn new(op: CompareOp) -> Self {
        Self { op }
    }
}

impl Operator for Compare {
    fn type_tag(&self) -> &'static str {
        match self.op {
            CompareOp::GreaterThan => "greater_than",
            CompareOp::GreaterThanEqual => "greater_than_equal",
            CompareOp::LessThan => "less_than",
            CompareOp::LessThanEqual => "less_than_equal",
            CompareOp::Equal => "equal",
            CompareOp::NotEqual => "not_equal",
        }
    }

    fn ports(&self) -> PortLayout {
        let mask = if self.op.is_ordering() {
            TypeMask::FLOAT | TypeMask::BOOL
        } else {
            TypeMask::DATA
        };
        PortLayout::flow()
            .input(Input::new("A", mask))
            .input(Input::new("B", mask))
            .output(Output::new("Result", TypeMask::BOOL))
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let a = ctx.require(1)?;
        let b = ctx.require(2)?;
        let result = if self.op.is_ordering() {
            let x = ctx.require_float(1)?;
            let y = ctx.require_float(2)?;
            match self.op {
                CompareOp::GreaterThan => x > y,
                CompareOp::GreaterThanEqual => x >= y,
                CompareOp::LessThan => x < y,
                _ => x <= y,
            }
        } else {
            if a.port_type() != b.port_type() {
                return Err(EvalError::IncompatibleShapes);
            }
            (a == b) == (self.op == CompareOp::Equal)
        };
        ctx.set_output(1, Value::Bool(result));
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let a = ctx.operand(1)?;
        let b = ctx.operand(2)?;
        ctx.define(1, &format!("{a} {} {b}", self.op.symbol()))
    }
}

/// Selects one of two values by a condition
#[derive(Debug, Clone, Copy, Default)]
pub struct IfElse;

impl Operator for IfElse {
    fn type_tag(&self) -> &'static str {
        "if_else"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::flow()
            .input(Input::new("Condition", TypeMask::BOOL | TypeMask::FLOAT))
            .input(Input::new("True", TypeMask::DATA))
            .input(Input::new("False", TypeMask::DATA))
            .output(Output::new("Result", TypeMask::DATA))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        let ty = match (ctx.input(2), ctx.input(3)) {
            (Some(a), Some(b)) if a == b => Some(a),
            (Some(a), Some(b)) => types::broadcast(a, b),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };
        if let Some(ty) = ty {
            ctx.set_output(1, ty);
        }
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let condition = ctx.require(1)?;
        let flag = condition.as_bool().ok_or(EvalError::InvalidOperand {
            index: 1,
            found: condition.port_type(),
        })?;
        let value = ctx.require(if flag { 2 } else { 3 })?;
        ctx.set_output(1, value);
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let condition = ctx.operand(1)?;
        let condition = match ctx.input_type(1) {
            Some(PortType::Float) => format!("{condition} > 0.0"),
            _ => condition,
        };
        let a = ctx.operand(2)?;
        let b = ctx.operand(3)?;
        ctx.define(1, &format!("({condition}) ? {a} : {b}"))
    }
}
