// SPDX-License-Identifier: MIT OR Apache-2.0
//! Values carried by output ports.
//!
//! [`Value`] is a closed tagged union over every data type a port can hold.
//! Arithmetic is componentwise with scalar broadcast; matrices are stored
//! column-major, the same layout the emitted shader code uses.

use crate::port::PortType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete value produced by an output port
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// Scalar
    Float(f32),
    /// 2D vector
    Float2([f32; 2]),
    /// 3D vector
    Float3([f32; 3]),
    /// 4D vector
    Float4([f32; 4]),
    /// 2x2 matrix, column-major
    Matrix2([f32; 4]),
    /// 3x3 matrix, column-major
    Matrix3([f32; 9]),
    /// 4x4 matrix, column-major
    Matrix4([f32; 16]),
}

/// Binary arithmetic operators understood by [`Value::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a - b`
    Subtract,
    /// `a * b`, including matrix products
    Multiply,
    /// `a / b`
    Divide,
    /// Componentwise minimum
    Min,
    /// Componentwise maximum
    Max,
    /// Componentwise power
    Pow,
    /// Componentwise floored modulo (shader `mod`)
    Modulo,
}

impl BinaryOp {
    fn scalar(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Add => a + b,
            Self::Subtract => a - b,
            Self::Multiply => a * b,
            Self::Divide => a / b,
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Pow => a.powf(b),
            Self::Modulo => a - b * (a / b).floor(),
        }
    }
}

impl Value {
    /// Identity matrix of the given dimension (2, 3 or 4)
    pub fn identity(dimension: usize) -> Option<Self> {
        match dimension {
            2 => Some(Self::Matrix2(identity::<4>(2))),
            3 => Some(Self::Matrix3(identity::<9>(3))),
            4 => Some(Self::Matrix4(identity::<16>(4))),
            _ => None,
        }
    }

    /// Zero value for a data type. `Execute` carries no value.
    pub fn zero(ty: PortType) -> Option<Self> {
        match ty {
            PortType::Execute => None,
            PortType::Bool => Some(Self::Bool(false)),
            PortType::Float => Some(Self::Float(0.0)),
            PortType::Float2 => Some(Self::Float2([0.0; 2])),
            PortType::Float3 => Some(Self::Float3([0.0; 3])),
            PortType::Float4 => Some(Self::Float4([0.0; 4])),
            PortType::Matrix2 => Some(Self::Matrix2([0.0; 4])),
            PortType::Matrix3 => Some(Self::Matrix3([0.0; 9])),
            PortType::Matrix4 => Some(Self::Matrix4([0.0; 16])),
        }
    }

    /// The port type of this value
    pub fn port_type(&self) -> PortType {
        match self {
            Self::Bool(_) => PortType::Bool,
            Self::Float(_) => PortType::Float,
            Self::Float2(_) => PortType::Float2,
            Self::Float3(_) => PortType::Float3,
            Self::Float4(_) => PortType::Float4,
            Self::Matrix2(_) => PortType::Matrix2,
            Self::Matrix3(_) => PortType::Matrix3,
            Self::Matrix4(_) => PortType::Matrix4,
        }
    }

    /// Read as a scalar. Booleans read as 1 or 0.
    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Self::Float(v) => Some(v),
            Self::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Read as a boolean. Scalars are true when positive.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(b) => Some(b),
            Self::Float(v) => Some(v > 0.0),
            _ => None,
        }
    }

    /// Lanes of a scalar or vector value, padded to four, with the arity
    pub fn lanes(&self) -> Option<([f32; 4], usize)> {
        match *self {
            Self::Float(v) => Some(([v, 0.0, 0.0, 0.0], 1)),
            Self::Float2([x, y]) => Some(([x, y, 0.0, 0.0], 2)),
            Self::Float3([x, y, z]) => Some(([x, y, z, 0.0], 3)),
            Self::Float4(v) => Some((v, 4)),
            _ => None,
        }
    }

    /// Build a scalar or vector from padded lanes
    pub fn from_lanes(lanes: [f32; 4], arity: usize) -> Option<Self> {
        match arity {
            1 => Some(Self::Float(lanes[0])),
            2 => Some(Self::Float2([lanes[0], lanes[1]])),
            3 => Some(Self::Float3([lanes[0], lanes[1], lanes[2]])),
            4 => Some(Self::Float4(lanes)),
            _ => None,
        }
    }

    /// Apply `f` to every lane of a scalar or vector
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Option<Self> {
        let (lanes, arity) = self.lanes()?;
        Self::from_lanes(lanes.map(f), arity)
    }

    /// Combine two scalars/vectors lane by lane, broadcasting a scalar operand
    pub fn zip_with(&self, other: &Self, f: impl Fn(f32, f32) -> f32) -> Option<Self> {
        let (a, an) = self.lanes()?;
        let (b, bn) = other.lanes()?;
        let arity = match (an, bn) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
        let lane = |v: &[f32; 4], n: usize, i: usize| if n == 1 { v[0] } else { v[i] };
        let mut out = [0.0; 4];
        for (i, slot) in out.iter_mut().enumerate().take(arity) {
            *slot = f(lane(&a, an, i), lane(&b, bn, i));
        }
        Self::from_lanes(out, arity)
    }

    /// Apply a binary operator. Returns `None` for incompatible shapes.
    pub fn apply(&self, op: BinaryOp, other: &Self) -> Option<Self> {
        if op == BinaryOp::Multiply {
            if let Some(product) = self.matrix_product(other) {
                return Some(product);
            }
        }
        if let (Some((m, n)), Some(s)) = (self.matrix(), other.as_scalar()) {
            if matches!(op, BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Divide) {
                return Self::from_matrix(m.iter().map(|v| op.scalar(*v, s)).collect(), n);
            }
        }
        if let (Some((a, n)), Some((b, k))) = (self.matrix(), other.matrix()) {
            if n == k && matches!(op, BinaryOp::Add | BinaryOp::Subtract) {
                let cells = a.iter().zip(b).map(|(x, y)| op.scalar(*x, *y)).collect();
                return Self::from_matrix(cells, n);
            }
            return None;
        }
        self.zip_with(other, |a, b| op.scalar(a, b))
    }

    /// Linear interpolation `a + (b - a) * t` with broadcast
    pub fn lerp(&self, other: &Self, t: &Self) -> Option<Self> {
        let delta = other.apply(BinaryOp::Subtract, self)?;
        let scaled = delta.zip_with(t, |d, t| d * t)?;
        self.zip_with(&scaled, |a, d| a + d)
    }

    /// Dot product of two vectors of the same arity
    pub fn dot(&self, other: &Self) -> Option<f32> {
        let (a, an) = self.lanes()?;
        let (b, bn) = other.lanes()?;
        (an == bn).then(|| a.iter().zip(b).take(an).map(|(x, y)| x * y).sum())
    }

    /// Euclidean length of a scalar or vector
    pub fn length(&self) -> Option<f32> {
        self.dot(self).map(f32::sqrt)
    }

    fn as_scalar(&self) -> Option<f32> {
        match *self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    fn matrix(&self) -> Option<(&[f32], usize)> {
        match self {
            Self::Matrix2(m) => Some((m.as_slice(), 2)),
            Self::Matrix3(m) => Some((m.as_slice(), 3)),
            Self::Matrix4(m) => Some((m.as_slice(), 4)),
            _ => None,
        }
    }

    fn from_matrix(cells: Vec<f32>, n: usize) -> Option<Self> {
        match n {
            2 => cells.try_into().ok().map(Self::Matrix2),
            3 => cells.try_into().ok().map(Self::Matrix3),
            4 => cells.try_into().ok().map(Self::Matrix4),
            _ => None,
        }
    }

    fn matrix_product(&self, other: &Self) -> Option<Self> {
        match (self.matrix(), other.matrix()) {
            (Some((a, n)), Some((b, k))) => {
                if n != k {
                    return None;
                }
                let mut out = vec![0.0; n * n];
                for c in 0..n {
                    for r in 0..n {
                        out[c * n + r] = (0..n).map(|i| a[i * n + r] * b[c * n + i]).sum();
                    }
                }
                Self::from_matrix(out, n)
            }
            (Some((m, n)), None) => {
                if let Some(s) = other.as_scalar() {
                    return Self::from_matrix(m.iter().map(|v| v * s).collect(), n);
                }
                let (v, arity) = homogeneous(other, n)?;
                let out: Vec<f32> = (0..n)
                    .map(|r| (0..n).map(|c| m[c * n + r] * v[c]).sum())
                    .collect();
                truncate(&out, arity)
            }
            (None, Some((m, n))) => {
                if let Some(s) = self.as_scalar() {
                    return Self::from_matrix(m.iter().map(|v| v * s).collect(), n);
                }
                let (v, arity) = homogeneous(self, n)?;
                let out: Vec<f32> = (0..n)
                    .map(|c| (0..n).map(|r| v[r] * m[c * n + r]).sum())
                    .collect();
                truncate(&out, arity)
            }
            (None, None) => None,
        }
    }

    /// Literal text for this value in shader source
    pub fn glsl_literal(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Float2(v) => format!("vec2({})", join(v)),
            Self::Float3(v) => format!("vec3({})", join(v)),
            Self::Float4(v) => format!("vec4({})", join(v)),
            Self::Matrix2(m) => format!("mat2({})", join(m)),
            Self::Matrix3(m) => format!("mat3({})", join(m)),
            Self::Matrix4(m) => format!("mat4({})", join(m)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Float2(v) => write!(f, "({})", join(v)),
            Self::Float3(v) => write!(f, "({})", join(v)),
            Self::Float4(v) => write!(f, "({})", join(v)),
            Self::Matrix2(m) => write!(f, "[{}]", join(m)),
            Self::Matrix3(m) => write!(f, "[{}]", join(m)),
            Self::Matrix4(m) => write!(f, "[{}]", join(m)),
        }
    }
}

fn join(values: &[f32]) -> String {
    values
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn identity<const N: usize>(dimension: usize) -> [f32; N] {
    let mut cells = [0.0; N];
    for i in 0..dimension {
        cells[i * dimension + i] = 1.0;
    }
    cells
}

/// Extend a vector to a matrix dimension. A 4x4 matrix accepts 2 and 3 lane
/// vectors, padded with `0` and a trailing `1`.
fn homogeneous(value: &Value, dimension: usize) -> Option<([f32; 4], usize)> {
    let (mut lanes, arity) = value.lanes()?;
    match (arity, dimension) {
        (a, d) if a == d => Some((lanes, arity)),
        (2, 4) => {
            lanes[2] = 0.0;
            lanes[3] = 1.0;
            Some((lanes, arity))
        }
        (3, 4) => {
            lanes[3] = 1.0;
            Some((lanes, arity))
        }
        _ => None,
    }
}

fn truncate(lanes: &[f32], arity: usize) -> Option<Value> {
    let mut out = [0.0; 4];
    for (slot, v) in out.iter_mut().zip(lanes) {
        *slot = *v;
    }
    Value::from_lanes(out, arity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_broadcast() {
        let v = Value::Float3([1.0, 2.0, 3.0]);
        let s = Value::Float(2.0);
        assert_eq!(v.apply(BinaryOp::Multiply, &s), Some(Value::Float3([2.0, 4.0, 6.0])));
        assert_eq!(s.apply(BinaryOp::Add, &v), Some(Value::Float3([3.0, 4.0, 5.0])));
    }

    #[test]
    fn test_mismatched_arity_fails() {
        let a = Value::Float2([1.0, 2.0]);
        let b = Value::Float3([1.0, 2.0, 3.0]);
        assert_eq!(a.apply(BinaryOp::Add, &b), None);
        assert_eq!(Value::Bool(true).apply(BinaryOp::Add, &a), None);
    }

    #[test]
    fn test_matrix_vector_product() {
        // Column-major translation by (5, 6, 7)
        let mut m = identity::<16>(4);
        m[12] = 5.0;
        m[13] = 6.0;
        m[14] = 7.0;
        let moved = Value::Matrix4(m).apply(BinaryOp::Multiply, &Value::Float3([1.0, 1.0, 1.0]));
        assert_eq!(moved, Some(Value::Float3([6.0, 7.0, 8.0])));

        let scale = Value::Matrix2([2.0, 0.0, 0.0, 3.0]);
        let v = Value::Float2([1.0, 1.0]);
        assert_eq!(scale.apply(BinaryOp::Multiply, &v), Some(Value::Float2([2.0, 3.0])));
        assert_eq!(v.apply(BinaryOp::Multiply, &scale), Some(Value::Float2([2.0, 3.0])));
    }

    #[test]
    fn test_matrix_matrix_product() {
        let a = Value::identity(3).unwrap();
        let b = Value::Matrix3([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(a.apply(BinaryOp::Multiply, &b), Some(b));
        assert_eq!(a.apply(BinaryOp::Multiply, &Value::identity(2).unwrap()), None);
    }

    #[test]
    fn test_modulo_is_floored() {
        let r = Value::Float(-1.0).apply(BinaryOp::Modulo, &Value::Float(3.0));
        assert_eq!(r, Some(Value::Float(2.0)));
    }

    #[test]
    fn test_lerp_and_length() {
        let a = Value::Float2([0.0, 0.0]);
        let b = Value::Float2([4.0, 8.0]);
        assert_eq!(a.lerp(&b, &Value::Float(0.25)), Some(Value::Float2([1.0, 2.0])));
        assert_eq!(Value::Float2([3.0, 4.0]).length(), Some(5.0));
    }

    #[test]
    fn test_glsl_literal() {
        assert_eq!(Value::Float(2.0).glsl_literal(), "2");
        assert_eq!(Value::Float(0.5).glsl_literal(), "0.5");
        assert_eq!(Value::Float2([1.0, 2.5]).glsl_literal(), "vec2(1, 2.5)");
    }
}
