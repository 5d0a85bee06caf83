// SPDX-License-Identifier: MIT OR Apache-2.0
//! Variable access.
//!
//! Variables live in the owning graph's [`VariableTable`]. A write bumps the
//! variable's version; readers remember the version they last saw.

use crate::codegen::{EmitContext, EmitError};
use crate::evaluation::{EvalContext, EvalError};
use crate::operator::{ConnectionEvent, NodeParams, Operator, ParamError, ParamValue};
use crate::port::{Input, Output, PortLayout, PortType, TypeMask};
use crate::types::TypeContext;
use crate::variables::{VariableTable, Version};

fn text_param(name: &str, param: &ParamValue) -> Result<String, ParamError> {
    param
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| ParamError::WrongKind {
            name: name.to_string(),
            expected: "text",
        })
}

/// Writes its input to a named variable and passes the value through
#[derive(Debug, Clone)]
pub struct SetVar {
    name: String,
    written: Option<Version>,
}

impl SetVar {
    /// Writer of the variable `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            written: None,
        }
    }

    /// Variable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version produced by the last write
    pub fn written_version(&self) -> Option<Version> {
        self.written
    }
}

impl Operator for SetVar {
    fn type_tag(&self) -> &'static str {
        "set_var"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::flow()
            .input(Input::new("Value", TypeMask::DATA))
            .output(Output::new("Value", TypeMask::DATA))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        if let Some(ty) = ctx.input(1) {
            ctx.set_output(1, ty);
        }
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        if self.name.is_empty() {
            return Err(EvalError::Unconfigured("variable name"));
        }
        let value = ctx.require(1)?;
        self.written = Some(ctx.write_variable(&self.name, value));
        ctx.set_output(1, value);
        Ok(())
    }

    fn emit(&self, ctx: &mut EmitContext<'_>) -> Result<String, EmitError> {
        let x = ctx.operand(1)?;
        let ty = ctx.type_name(1)?;
        let mut code = ctx.assign(ty, &self.name, &x);
        code.push_str(&ctx.define(1, &self.name)?);
        Ok(code)
    }

    fn on_connection_changed(&mut self, event: ConnectionEvent, variables: &mut VariableTable) {
        if event == ConnectionEvent::InputDisconnected(1) {
            variables.clear(&self.name);
            self.written = None;
        }
    }

    fn on_removed(&mut self, variables: &mut VariableTable) {
        variables.remove(&self.name);
    }

    fn params(&self) -> NodeParams {
        let mut params = NodeParams::new();
        params.insert("Name".to_string(), ParamValue::Text(self.name.clone()));
        params
    }

    fn apply_params(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        for (name, param) in params {
            match name.as_str() {
                "Name" => self.name = text_param(name, param)?,
                _ => return Err(ParamError::Unknown(name.clone())),
            }
        }
        Ok(())
    }
}

/// Reads a named variable of a declared type
#[derive(Debug, Clone)]
pub struct GetVar {
    name: String,
    ty: PortType,
    observed: Option<Version>,
}

impl GetVar {
    /// Reader of the variable `name`
    pub fn new(name: impl Into<String>, ty: PortType) -> Self {
        Self {
            name: name.into(),
            ty,
            observed: None,
        }
    }

    /// Variable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version seen by the last read
    pub fn observed_version(&self) -> Option<Version> {
        self.observed
    }
}

impl Operator for GetVar {
    fn type_tag(&self) -> &'static str {
        "get_var"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::new().output(Output::new("Value", self.ty.mask()))
    }

    fn resolve_output_type(&self, ctx: &mut TypeContext<'_>) {
        ctx.set_output(0, self.ty);
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), EvalError> {
        let (value, version) = ctx
            .variable(&self.name)
            .ok_or_else(|| EvalError::UnknownVariable(self.name.clone()))?;
        if value.port_type() != self.ty {
            return Err(EvalError::InvalidOperand {
                index: 0,
                found: value.port_type(),
            });
        }
        self.observed = Some(version);
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
            match name.as_str() {
                "Name" => self.name = text_param(name, param)?,
                "Type" => {
                    self.ty = param
                        .as_type()
                        .filter(|t| *t != PortType::Execute)
                        .ok_or_else(|| ParamError::WrongKind {
                            name: name.clone(),
                            expected: "a data type",
                        })?;
                }
                _ => return Err(ParamError::Unknown(name.clone())),
            }
        }
        Ok(())
    }
}
