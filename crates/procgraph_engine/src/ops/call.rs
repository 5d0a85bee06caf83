// SPDX-License-Identifier: MIT OR Apache-2.0
//! Function arguments and calls.
//!
//! A function is a graph in its owner's library. `Arg` nodes inside it
//! declare its parameters; a `Call` node in the owner mirrors them as
//! inputs and is rebound whenever the function changes.

use crate::codegen::{self, EmitContext, EmitError};
use crate::evaluation::{EvalContext, EvalError};
use crate::graph::Graph;
use crate::node::Node;
use crate::operator::{NodeParams, Operator, ParamError, ParamValue};
use crate::port::{Output, PortLayout, PortType, TypeMask};
use crate::types::TypeContext;
use crate::value::Value;

/// Parameter declared by a function graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Parameter name, also the variable the value is written to
    pub name: String,
    /// Accepted types
    pub mask: TypeMask,
}

/// A function parameter. Reads the variable of the same name, which a call
/// writes before running the function.
#[derive(Debug, Clone)]
pub struct Arg {
    name: String,
    ty: PortType,
}

impl Arg {
    /// Parameter `name` of type `ty`
    pub fn new(name: impl Into<String>, ty: PortType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl Operator for Arg {
    fn type_tag(&self) -> &'static str {
        "arg"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::new().output(Output::new("Value", self.ty.mask()))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        ctx.set_output(0, self.ty);
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let (value, _) = ctx
            .variable(&self.name)
            .ok_or_else(|| EvalError::UnknownVariable(self.name.clone()))?;
        ctx.set_output(0, value);
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        ctx.define(0, &self.name)
    }

    fn params(&self) -> NodeParams {
        let mut params = NodeParams::new();
        params.insert("Name".to_string(), ParamValue::Text(self.name.clone()));
        params.insert("Type".to_string(), ParamValue::Type(self.ty));
        params
    }

    fn apply_params(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        for (name, param) in params {
            match (name.as_str(), param) {
                ("Name", ParamValue::Text(text)) => self.name = text.clone(),
                ("Type", ParamValue::Type(ty)) if *ty != PortType::Execute => self.ty = *ty,
                ("Name", _) => {
                    return Err(ParamError::WrongKind {
                        name: name.clone(),
                        expected: "text",
                    })
                }
                ("Type", _) => {
                    return Err(ParamError::WrongKind {
                        name: name.clone(),
                        expected: "a data type",
                    })
                }
                _ => return Err(ParamError::Unknown(name.clone())),
            }
        }
        Ok(())
    }

    fn is_external_input(&self) -> bool {
        true
    }

    fn argument(&self) -> Option<Argument> {
        Some(Argument {
            name: self.name.clone(),
            mask: self.ty.mask(),
        })
    }
}

/// Named argument values of a call-like node, read from its inputs
pub(crate) fn argument_values(
    ctx: &EvalContext<'_>,
    offset: usize,
) -> Result<Vec<(String, Value)>, EvalError> {
    let Some(node) = ctx.node() else {
        return Ok(Vec::new());
    };
    node.inputs()
        .iter()
        .enumerate()
        .skip(offset)
        .map(|(i, input)| Ok((input.name.clone(), ctx.require(i)?)))
        .collect()
}

/// Operand expressions of every argument input, all of which must be connected
pub(crate) fn argument_operands(
    ctx: &EmitContext<'_>,
    offset: usize,
) -> Result<Vec<String>, EmitError> {
    (offset..ctx.node().inputs().len())
        .map(|i| ctx.operand(i))
        .collect()
}

/// Calls a function from the owning graph's library
#[derive(Debug, Clone, Default)]
pub struct Call {
    function: Option<String>,
    result_type: Option<PortType>,
}

impl Call {
    /// A call with no function selected
    pub fn new() -> Self {
        Self::default()
    }

    /// A call to `function`
    pub fn to(function: impl Into<String>) -> Self {
        Self {
            function: Some(function.into()),
            result_type: None,
        }
    }
}

impl Operator for Call {
    fn type_tag(&self) -> &'static str {
        "call"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::flow().output(Output::new("Result", TypeMask::DATA))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        if let Some(ty) = self.result_type {
            ctx.set_output(1, ty);
        }
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let name = self
            .function
            .as_deref()
            .ok_or(EvalError::Unconfigured("function"))?;
        let arguments = argument_values(ctx, 1)?;
        let function = ctx
            .graph_mut()
            .function_mut(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        for (argument, value) in &arguments {
            function.write_variable(argument, *value);
        }
        let result = function.evaluate_now().ok_or(EvalError::NoResult)?;
        ctx.set_output(1, result);
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let name = self
            .function
            .as_deref()
            .ok_or_else(|| EmitError::UnknownFunction(String::new()))?;
        let arguments = argument_operands(ctx, 1)?;
        let call = format!("{}({})", codegen::function_name(name), arguments.join(", "));
        ctx.define(1, &call)
    }

    fn emit_prelude(&self, _node: &Node, graph: &Graph) -> Result<Option<String>, EmitError> {
        match self.function.as_deref() {
            Some(name) => codegen::function_source(graph, name).map(Some),
            None => Ok(None),
        }
    }

    fn params(&self) -> NodeParams {
        let mut params = NodeParams::new();
        if let Some(function) = &self.function {
            params.insert("Function".to_string(), ParamValue::Text(function.clone()));
        }
        params
    }

    fn apply_params(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        for (name, param) in params {
            match (name.as_str(), param) {
                ("Function", ParamValue::Text(text)) => {
                    self.function = (!text.is_empty()).then(|| text.clone());
                }
                ("Function", _) => {
                    return Err(ParamError::WrongKind {
                        name: name.clone(),
                        expected: "text",
                    })
                }
                _ => return Err(ParamError::Unknown(name.clone())),
            }
        }
        Ok(())
    }

    fn call_target(&self) -> Option<&str> {
        self.function.as_deref()
    }

    fn argument_offset(&self) -> usize {
        1
    }

    fn bind_result_type(&mut self, ty: Option<PortType>) {
        self.result_type = ty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::ShaderTarget;
    use crate::node::NodeId;
    use crate::ops::arithmetic::Arithmetic;
    use crate::ops::constant::Constant;
    use crate::ops::output::GraphOutput;
    use crate::port::{InputRef, OutputRef};
    use crate::value::BinaryOp;

    fn link(graph: &mut Graph, from: NodeId, out: usize, to: NodeId, input: usize) {
        graph
            .connect(OutputRef::new(from, out), InputRef::new(to, input))
            .unwrap();
    }

    /// `double(x) = x + x`
    fn double() -> Graph {
        let mut function = Graph::new_function("double");
        let x = function.add(Arg::new("x", PortType::Float)).unwrap();
        let add = function.add(Arithmetic::new(BinaryOp::Add)).unwrap();
        let out = function.add(GraphOutput).unwrap();
        link(&mut function, x, 0, add, 1);
        link(&mut function, x, 0, add, 2);
        link(&mut function, add, 1, out, 0);
        function.set_output_node(Some(out)).unwrap();
        function
    }

    #[test]
    fn test_call_mirrors_arguments() {
        let mut graph = Graph::new("main");
        graph.add_function(double());
        let call = graph.add(Call::to("double")).unwrap();
        let node = graph.node(call).unwrap();
        assert_eq!(node.inputs().len(), 2);
        assert_eq!(node.inputs()[1].name, "x");
        assert_eq!(graph.output_type(OutputRef::new(call, 1)), Some(PortType::Float));
    }

    #[test]
    fn test_call_evaluates_function() {
        let mut graph = Graph::new("main");
        graph.add_function(double());
        let c = graph.add(Constant::new(Value::Float(21.0))).unwrap();
        let call = graph.add(Call::to("double")).unwrap();
        link(&mut graph, c, 0, call, 1);
        graph.try_evaluate(c);
        graph.try_evaluate(call);
        assert_eq!(graph.node(call).unwrap().result(), Some(Value::Float(42.0)));
    }

    #[test]
    fn test_arguments_resync_on_edit() {
        let mut graph = Graph::new("main");
        graph.add_function(double());
        let c = graph.add(Constant::new(Value::Float(1.0))).unwrap();
        let call = graph.add(Call::to("double")).unwrap();
        link(&mut graph, c, 0, call, 1);

        graph.edit_function("double", |f| {
            f.add(Arg::new("scale", PortType::Float)).unwrap();
        });
        let node = graph.node(call).unwrap();
        assert_eq!(node.inputs().len(), 3);
        assert_eq!(graph.producer(InputRef::new(call, 1)), Some(OutputRef::new(c, 0)));
        assert_eq!(graph.producer(InputRef::new(call, 2)), None);

        graph.remove_function("double");
        assert_eq!(graph.node(call).unwrap().inputs().len(), 1);
        assert!(graph.consumers(OutputRef::new(c, 0)).is_empty());
    }

    #[test]
    fn test_call_emits_function_definition() {
        let mut graph = Graph::new("main");
        graph.add_function(double());
        let c = graph.add(Constant::new(Value::Float(2.0))).unwrap();
        let call = graph.add(Call::to("double")).unwrap();
        let out = graph.add(GraphOutput).unwrap();
        link(&mut graph, c, 0, call, 1);
        link(&mut graph, call, 1, out, 0);

        let code = graph.emit_shader(out, &ShaderTarget::default()).unwrap();
        assert!(code.contains("float double(float x) {"));
        assert!(code.contains("return "));
        let sid = graph.node(call).unwrap().shader_id().to_string();
        assert!(code.contains(&format!("float {sid}1 = double(2);")));
    }
}
