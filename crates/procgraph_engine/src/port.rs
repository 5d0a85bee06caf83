// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.
//!
//! Inputs hold an allowed-type mask and at most one producer. Outputs hold a
//! (possibly still unresolved) type, the last value they produced and an
//! ordered fan-out list. Execute pins are ordinary ports whose mask is
//! exactly [`TypeMask::EXECUTE`].

use crate::node::NodeId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Data type that can flow through ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum PortType {
    /// Execution flow (control-flow overlay)
    Execute = 0,
    /// Boolean value
    Bool = 1,
    /// Floating point value
    Float = 2,
    /// 2D vector
    Float2 = 3,
    /// 3D vector
    Float3 = 4,
    /// 4D vector
    Float4 = 5,
    /// 2x2 matrix
    Matrix2 = 6,
    /// 3x3 matrix
    Matrix3 = 7,
    /// 4x4 matrix
    Matrix4 = 8,
}

impl PortType {
    /// Every port type, in bit order
    pub const ALL: [PortType; 9] = [
        Self::Execute,
        Self::Bool,
        Self::Float,
        Self::Float2,
        Self::Float3,
        Self::Float4,
        Self::Matrix2,
        Self::Matrix3,
        Self::Matrix4,
    ];

    /// Single-bit mask for this type
    pub const fn mask(self) -> TypeMask {
        TypeMask(1 << self as u16)
    }

    /// Type name in emitted shader code. `Execute` has none.
    pub fn glsl_name(self) -> Option<&'static str> {
        match self {
            Self::Execute => None,
            Self::Bool => Some("bool"),
            Self::Float => Some("float"),
            Self::Float2 => Some("vec2"),
            Self::Float3 => Some("vec3"),
            Self::Float4 => Some("vec4"),
            Self::Matrix2 => Some("mat2"),
            Self::Matrix3 => Some("mat3"),
            Self::Matrix4 => Some("mat4"),
        }
    }

    /// Lane count of a scalar or vector type
    pub fn arity(self) -> Option<usize> {
        match self {
            Self::Float => Some(1),
            Self::Float2 => Some(2),
            Self::Float3 => Some(3),
            Self::Float4 => Some(4),
            _ => None,
        }
    }

    /// Dimension of a matrix type
    pub fn dimension(self) -> Option<usize> {
        match self {
            Self::Matrix2 => Some(2),
            Self::Matrix3 => Some(3),
            Self::Matrix4 => Some(4),
            _ => None,
        }
    }

    /// Scalar or vector type with the given lane count
    pub fn vector(arity: usize) -> Option<Self> {
        match arity {
            1 => Some(Self::Float),
            2 => Some(Self::Float2),
            3 => Some(Self::Float3),
            4 => Some(Self::Float4),
            _ => None,
        }
    }
}

/// Set of port types an input accepts, or an output may still resolve to
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TypeMask(u16);

impl TypeMask {
    /// Accepts nothing
    pub const NONE: Self = Self(0);
    /// Execute pin
    pub const EXECUTE: Self = PortType::Execute.mask();
    /// Boolean
    pub const BOOL: Self = PortType::Bool.mask();
    /// Scalar
    pub const FLOAT: Self = PortType::Float.mask();
    /// 2D vector
    pub const FLOAT2: Self = PortType::Float2.mask();
    /// 3D vector
    pub const FLOAT3: Self = PortType::Float3.mask();
    /// 4D vector
    pub const FLOAT4: Self = PortType::Float4.mask();
    /// 2x2 matrix
    pub const MATRIX2: Self = PortType::Matrix2.mask();
    /// 3x3 matrix
    pub const MATRIX3: Self = PortType::Matrix3.mask();
    /// 4x4 matrix
    pub const MATRIX4: Self = PortType::Matrix4.mask();
    /// Scalar and vectors
    pub const SCALAR_VECTOR: Self = Self::FLOAT.union(Self::FLOAT2).union(Self::FLOAT3).union(Self::FLOAT4);
    /// Vectors only
    pub const VECTOR: Self = Self::FLOAT2.union(Self::FLOAT3).union(Self::FLOAT4);
    /// All matrices
    pub const MATRIX: Self = Self::MATRIX2.union(Self::MATRIX3).union(Self::MATRIX4);
    /// Scalar, vectors and matrices
    pub const NUMERIC: Self = Self::SCALAR_VECTOR.union(Self::MATRIX);
    /// Every data type
    pub const DATA: Self = Self::NUMERIC.union(Self::BOOL);

    /// Raw bits
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Union of two masks
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether the masks share at least one type
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether `ty` is in the mask
    pub const fn contains(self, ty: PortType) -> bool {
        self.intersects(ty.mask())
    }

    /// Whether nothing is in the mask
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether this is an execute pin
    pub fn is_execute(self) -> bool {
        self == Self::EXECUTE
    }

    /// The single concrete type, when exactly one bit is set
    pub fn single(self) -> Option<PortType> {
        if self.0.count_ones() != 1 {
            return None;
        }
        PortType::ALL.into_iter().find(|t| self.contains(*t))
    }

    /// Iterate the types in the mask
    pub fn iter(self) -> impl Iterator<Item = PortType> {
        PortType::ALL.into_iter().filter(move |t| self.contains(*t))
    }
}

impl From<PortType> for TypeMask {
    fn from(ty: PortType) -> Self {
        ty.mask()
    }
}

impl BitOr for TypeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitAnd for TypeMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for TypeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        let names: Vec<String> = self.iter().map(|t| format!("{t:?}")).collect();
        f.write_str(&names.join("|"))
    }
}

/// Address of an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputRef {
    /// Owning node
    pub node: NodeId,
    /// Index into the node's inputs
    pub index: usize,
}

impl InputRef {
    /// Create a new input address
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// Address of an output port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputRef {
    /// Owning node
    pub node: NodeId,
    /// Index into the node's outputs
    pub index: usize,
}

impl OutputRef {
    /// Create a new output address
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// An input port
#[derive(Debug, Clone)]
pub struct Input {
    /// Display name
    pub name: String,
    mask: TypeMask,
    producer: Option<OutputRef>,
}

impl Input {
    /// Create a new input accepting `mask`
    pub fn new(name: impl Into<String>, mask: TypeMask) -> Self {
        Self {
            name: name.into(),
            mask,
            producer: None,
        }
    }

    /// Create an execute input
    pub fn execute(name: impl Into<String>) -> Self {
        Self::new(name, TypeMask::EXECUTE)
    }

    /// Allowed types
    pub fn mask(&self) -> TypeMask {
        self.mask
    }

    /// Connected producer, if any
    pub fn producer(&self) -> Option<OutputRef> {
        self.producer
    }

    /// Whether a producer is connected
    pub fn is_connected(&self) -> bool {
        self.producer.is_some()
    }

    /// Whether this is an execute pin
    pub fn is_execute(&self) -> bool {
        self.mask.is_execute()
    }

    pub(crate) fn set_producer(&mut self, producer: Option<OutputRef>) {
        self.producer = producer;
    }
}

/// An output port
#[derive(Debug, Clone)]
pub struct Output {
    /// Display name
    pub name: String,
    ty: TypeMask,
    consumers: Vec<InputRef>,
    value: Option<Value>,
}

impl Output {
    /// Create a new output that may resolve to any type in `ty`
    pub fn new(name: impl Into<String>, ty: TypeMask) -> Self {
        Self {
            name: name.into(),
            ty,
            consumers: Vec::new(),
            value: None,
        }
    }

    /// Create an execute output
    pub fn execute(name: impl Into<String>) -> Self {
        Self::new(name, TypeMask::EXECUTE)
    }

    /// Current type tag (multi-bit while unresolved)
    pub fn ty(&self) -> TypeMask {
        self.ty
    }

    /// Resolved concrete type
    pub fn concrete(&self) -> Option<PortType> {
        self.ty.single()
    }

    /// Consumers in connection order
    pub fn consumers(&self) -> &[InputRef] {
        &self.consumers
    }

    /// Whether any consumer is connected
    pub fn is_connected(&self) -> bool {
        !self.consumers.is_empty()
    }

    /// Last produced value
    pub fn value(&self) -> Option<Value> {
        self.value
    }

    /// Whether this is an execute pin
    pub fn is_execute(&self) -> bool {
        self.ty.is_execute()
    }

    /// Whether this output can feed `input`
    pub fn can_feed(&self, input: &Input) -> bool {
        self.ty.intersects(input.mask)
    }

    pub(crate) fn set_type(&mut self, ty: TypeMask) {
        self.ty = ty;
    }

    pub(crate) fn set_value(&mut self, value: Option<Value>) {
        self.value = value;
    }

    pub(crate) fn insert_consumer(&mut self, index: usize, consumer: InputRef) {
        let index = index.min(self.consumers.len());
        self.consumers.insert(index, consumer);
    }

    /// Remove a consumer, returning the position it occupied
    pub(crate) fn remove_consumer(&mut self, consumer: InputRef) -> Option<usize> {
        let position = self.consumers.iter().position(|c| *c == consumer)?;
        self.consumers.remove(position);
        Some(position)
    }

    pub(crate) fn position_of(&self, consumer: InputRef) -> Option<usize> {
        self.consumers.iter().position(|c| *c == consumer)
    }
}

/// Initial ports of a node, as declared by its operator
#[derive(Debug, Clone, Default)]
pub struct PortLayout {
    /// Inputs in order
    pub inputs: Vec<Input>,
    /// Outputs in order
    pub outputs: Vec<Output>,
}

impl PortLayout {
    /// Empty layout
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout starting with an execute input and an execute output, the
    /// shape shared by every node that takes part in control flow
    pub fn flow() -> Self {
        Self::new()
            .input(Input::execute("Execute"))
            .output(Output::execute("Execute"))
    }

    /// Append an input
    pub fn input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    /// Append an output
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_single() {
        assert_eq!(TypeMask::FLOAT3.single(), Some(PortType::Float3));
        assert_eq!(TypeMask::SCALAR_VECTOR.single(), None);
        assert_eq!(TypeMask::NONE.single(), None);
    }

    #[test]
    fn test_mask_intersection() {
        assert!(TypeMask::NUMERIC.intersects(TypeMask::MATRIX4));
        assert!(!TypeMask::BOOL.intersects(TypeMask::SCALAR_VECTOR));
        assert!(!TypeMask::EXECUTE.intersects(TypeMask::DATA));
        assert_eq!(TypeMask::SCALAR_VECTOR & TypeMask::FLOAT2, TypeMask::FLOAT2);
    }

    #[test]
    fn test_can_feed() {
        let out = Output::new("Value", TypeMask::FLOAT);
        assert!(out.can_feed(&Input::new("A", TypeMask::SCALAR_VECTOR)));
        assert!(!out.can_feed(&Input::new("B", TypeMask::BOOL)));
        assert!(!out.can_feed(&Input::execute("Execute")));
    }

    #[test]
    fn test_consumer_order() {
        let node = NodeId::from_index(0);
        let mut out = Output::new("Value", TypeMask::FLOAT);
        out.insert_consumer(0, InputRef::new(node, 1));
        out.insert_consumer(5, InputRef::new(node, 2));
        out.insert_consumer(0, InputRef::new(node, 3));
        let indices: Vec<usize> = out.consumers().iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![3, 1, 2]);
        assert_eq!(out.remove_consumer(InputRef::new(node, 1)), Some(1));
        assert_eq!(out.remove_consumer(InputRef::new(node, 1)), None);
    }

    #[test]
    fn test_glsl_names() {
        assert_eq!(PortType::Float2.glsl_name(), Some("vec2"));
        assert_eq!(PortType::Matrix3.glsl_name(), Some("mat3"));
        assert_eq!(PortType::Execute.glsl_name(), None);
    }
}
