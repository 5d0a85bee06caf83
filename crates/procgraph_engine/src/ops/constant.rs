// SPDX-License-Identifier: MIT OR Apache-2.0
//! Constant values.

use crate::codegen::{EmitContext, EmitError};
use crate::evaluation::{EvalContext, EvalError};
use crate::operator::{NodeParams, Operator, ParamError, ParamValue};
use crate::port::{Output, PortLayout, PortType};
use crate::types::TypeContext;
use crate::value::Value;

const IDENTITY4: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// A fixed value. Emitted inline at every use instead of as a statement.
#[derive(Debug, Clone)]
pub struct Constant {
    value: Value,
}

impl Constant {
    /// Constant holding `value`
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// 4x4 identity matrix
    pub fn identity() -> Self {
        Self::new(Value::Matrix4(IDENTITY4))
    }

    /// Current value
    pub fn value(&self) -> Value {
        self.value
    }

    /// Whether `value` may replace the current one without changing the node type
    fn accepts(&self, value: &Value) -> bool {
        let current = self.value.port_type();
        let next = value.port_type();
        current == next || (current.dimension().is_some() && next.dimension().is_some())
    }
}

impl Operator for Constant {
    fn type_tag(&self) -> &'static str {
        match self.value.port_type() {
            PortType::Bool => "bool_constant",
            PortType::Float2 => "float2_constant",
            PortType::Float3 => "float3_constant",
            PortType::Float4 => "float4_constant",
            PortType::Matrix2 | PortType::Matrix3 | PortType::Matrix4 => "matrix_constant",
            PortType::Float | PortType::Execute => "float_constant",
        }
    }

    fn ports(&self) -> PortLayout {
        PortLayout::new().output(Output::new("Value", self.value.port_type().mask()))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        ctx.set_output(0, self.value.port_type());
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        ctx.set_output(0, self.value);
        Ok(())
    }

    fn emit(&self, _ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        Ok(String::new())
    }

    fn params(&self) -> NodeParams {
        let mut params = NodeParams::new();
        params.insert("Value".to_string(), ParamValue::Value(self.value));
        params
    }

    fn apply_params(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        for (name, param) in params {
            match name.as_str() {
                "Value" => {
                    let value = param
                        .as_value()
                        .filter(|v| self.accepts(v))
                        .ok_or_else(|| ParamError::WrongKind {
                            name: name.clone(),
                            expected: "a value of the constant's type",
                        })?;
                    self.value = value;
                }
                _ => return Err(ParamError::Unknown(name.clone())),
            }
        }
        Ok(())
    }

    fn literal(&self) -> Option<Value> {
        Some(self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn test_constant_output() {
        let mut graph = Graph::new("test");
        let id = graph.add(Constant::new(Value::Float2([1.0, 2.0]))).unwrap();
        graph.try_evaluate(id);
        let node = graph.node(id).unwrap();
        assert_eq!(node.result(), Some(Value::Float2([1.0, 2.0])));
        assert_eq!(node.output(0).unwrap().concrete(), Some(PortType::Float2));
        assert_eq!(node.type_tag(), "float2_constant");
    }

    #[test]
    fn test_value_param_keeps_type() {
        let mut constant = Constant::new(Value::Float(1.0));
        let mut params = NodeParams::new();
        params.insert("Value".to_string(), ParamValue::Value(Value::Float(4.0)));
        constant.apply_params(&params).unwrap();
        assert_eq!(constant.value(), Value::Float(4.0));

        params.insert("Value".to_string(), ParamValue::Value(Value::Bool(true)));
        assert!(matches!(
            constant.apply_params(&params),
            Err(ParamError::WrongKind { .. })
        ));
        assert_eq!(constant.value(), Value::Float(4.0));
    }

    #[test]
    fn test_matrix_constant_changes_dimension() {
        let mut graph = Graph::new("test");
        let id = graph.add(Constant::identity()).unwrap();
        graph
            .set_param(id, "Value", ParamValue::Value(Value::identity(3).unwrap()))
            .unwrap();
        assert_eq!(
            graph.node(id).unwrap().output(0).unwrap().concrete(),
            Some(PortType::Matrix3)
        );
        assert_eq!(graph.node(id).unwrap().type_tag(), "matrix_constant");
    }
}
