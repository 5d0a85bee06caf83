// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output type propagation.
//!
//! Operators resolve their output types from the concrete types of their
//! connected inputs. Combinations that do not resolve leave the previous
//! output type in place.

use crate::port::{Output, PortType, TypeMask};
use crate::value::BinaryOp;

/// View handed to [`Operator::resolve_output_type`](crate::Operator::resolve_output_type)
pub struct TypeContext<'a> {
    inputs: &'a [Option<PortType>],
    outputs: &'a mut [Output],
}

impl<'a> TypeContext<'a> {
    pub(crate) fn new(inputs: &'a [Option<PortType>], outputs: &'a mut [Output]) -> Self {
        Self { inputs, outputs }
    }

    /// Concrete type of the producer feeding `index`, if connected and resolved
    pub fn input(&self, index: usize) -> Option<PortType> {
        self.inputs.get(index).copied().flatten()
    }

    /// Resolved types of every connected input from `start` on, in order
    pub fn connected_from(&self, start: usize) -> Vec<PortType> {
        self.inputs.iter().skip(start).filter_map(|t| *t).collect()
    }

    /// Current type of one of the node's outputs
    pub fn output(&self, index: usize) -> Option<TypeMask> {
        self.outputs.get(index).map(Output::ty)
    }

    /// Set one of the node's outputs to a concrete type. Execute pins are left alone.
    pub fn set_output(&mut self, index: usize, ty: PortType) {
        if let Some(output) = self.outputs.get_mut(index) {
            if !output.is_execute() && ty != PortType::Execute {
                output.set_type(ty.mask());
            }
        }
    }
}

/// Result type of `a op b`, or `None` when the combination does not resolve
pub fn combine(op: BinaryOp, a: PortType, b: PortType) -> Option<PortType> {
    use PortType::Float;

    if a == PortType::Execute || b == PortType::Execute {
        return None;
    }
    if a == PortType::Bool || b == PortType::Bool {
        return None;
    }
    if op == BinaryOp::Multiply {
        match (a.dimension(), b.dimension()) {
            (Some(n), Some(m)) => return (n == m).then_some(a),
            (Some(n), None) => return matrix_operand(a, n, b),
            (None, Some(m)) => return matrix_operand(b, m, a),
            (None, None) => {}
        }
    } else if a.dimension().is_some() || b.dimension().is_some() {
        return match (a, b) {
            _ if a == b && matches!(op, BinaryOp::Add | BinaryOp::Subtract) => Some(a),
            (m, Float) | (Float, m)
                if m.dimension().is_some()
                    && matches!(op, BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Divide) =>
            {
                Some(m)
            }
            _ => None,
        };
    }
    broadcast(a, b)
}

/// Same type, or the vector when one side is a scalar
pub fn broadcast(a: PortType, b: PortType) -> Option<PortType> {
    match (a.arity()?, b.arity()?) {
        (x, y) if x == y => Some(a),
        (1, _) => Some(b),
        (_, 1) => Some(a),
        _ => None,
    }
}

fn matrix_operand(matrix: PortType, dimension: usize, other: PortType) -> Option<PortType> {
    match other.arity()? {
        1 => Some(matrix),
        n if n == dimension => Some(other),
        2 | 3 if dimension == 4 => Some(other),
        _ => None,
    }
}

/// Fold [`combine`] over operand types left to right
pub fn fold(op: BinaryOp, types: &[PortType]) -> Option<PortType> {
    let (first, rest) = types.split_first()?;
    rest.iter().try_fold(*first, |acc, t| combine(op, acc, *t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use PortType::*;

    #[test]
    fn test_same_type_and_broadcast() {
        assert_eq!(combine(BinaryOp::Add, Float, Float), Some(Float));
        assert_eq!(combine(BinaryOp::Add, Float, Float3), Some(Float3));
        assert_eq!(combine(BinaryOp::Subtract, Float2, Float), Some(Float2));
        assert_eq!(combine(BinaryOp::Add, Float2, Float3), None);
        assert_eq!(combine(BinaryOp::Add, Bool, Float), None);
    }

    #[test]
    fn test_matrix_rules() {
        assert_eq!(combine(BinaryOp::Multiply, Matrix3, Float3), Some(Float3));
        assert_eq!(combine(BinaryOp::Multiply, Float4, Matrix4), Some(Float4));
        assert_eq!(combine(BinaryOp::Multiply, Matrix4, Float3), Some(Float3));
        assert_eq!(combine(BinaryOp::Multiply, Matrix2, Float3), None);
        assert_eq!(combine(BinaryOp::Multiply, Matrix2, Matrix2), Some(Matrix2));
        assert_eq!(combine(BinaryOp::Multiply, Matrix2, Matrix3), None);
        assert_eq!(combine(BinaryOp::Multiply, Float, Matrix3), Some(Matrix3));
        assert_eq!(combine(BinaryOp::Add, Matrix3, Matrix3), Some(Matrix3));
        assert_eq!(combine(BinaryOp::Min, Matrix3, Matrix3), None);
        assert_eq!(combine(BinaryOp::Add, Matrix3, Float3), None);
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold(BinaryOp::Add, &[Float, Float2, Float]), Some(Float2));
        assert_eq!(fold(BinaryOp::Add, &[Float2, Float3]), None);
        assert_eq!(fold(BinaryOp::Add, &[]), None);
    }
}
