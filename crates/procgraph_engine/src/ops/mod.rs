// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in operators and their registry.

pub mod arithmetic;
pub mod call;
pub mod constant;
pub mod flow;
pub mod instance;
pub mod logic;
pub mod output;
pub mod unary;
pub mod variable;
pub mod vector;

use crate::graph::Graph;
use crate::node::{NodeCategory, NodeRegistry, NodeType};
use crate::operator::Operator;
use crate::port::PortType;
use crate::value::{BinaryOp, Value};
use arithmetic::{Arithmetic, Lerp, PairFunc, VectorPair};
use call::{Arg, Call};
use constant::Constant;
use flow::{Execute, ForLoop, Sequence};
use instance::Instance;
use logic::{BooleanOp, Compare, CompareOp, IfElse, LogicOp, Not};
use output::GraphOutput;
use std::sync::{Arc, OnceLock};
use unary::{Unary, UnaryFunc};
use variable::{GetVar, SetVar};
use vector::{BreakVector, MakeVector};

/// Shared registry of every built-in operator
pub fn builtin_registry() -> Arc<NodeRegistry> {
    static REGISTRY: OnceLock<Arc<NodeRegistry>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| Arc::new(create_builtin_registry()))
        .clone()
}

fn node_type(
    id: &str,
    name: &str,
    category: NodeCategory,
    description: &str,
    factory: fn() -> Box<dyn Operator>,
) -> NodeType {
    NodeType {
        id: id.to_string(),
        name: name.to_string(),
        category,
        description: description.to_string(),
        factory,
    }
}

/// Create a registry with all built-in node types
pub fn create_builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();

    // ========================================================================
    // Input Nodes - Constants
    // ========================================================================

    registry.register(node_type(
        "float_constant",
        "Float",
        NodeCategory::Input,
        "Constant scalar",
        || Box::new(Constant::new(Value::Float(0.0))),
    ));
    registry.register(node_type(
        "float2_constant",
        "Float2",
        NodeCategory::Input,
        "Constant 2D vector",
        || Box::new(Constant::new(Value::Float2([0.0; 2]))),
    ));
    registry.register(node_type(
        "float3_constant",
        "Float3",
        NodeCategory::Input,
        "Constant 3D vector",
        || Box::new(Constant::new(Value::Float3([0.0; 3]))),
    ));
    registry.register(node_type(
        "float4_constant",
        "Float4",
        NodeCategory::Input,
        "Constant 4D vector",
        || Box::new(Constant::new(Value::Float4([0.0; 4]))),
    ));
    registry.register(node_type(
        "bool_constant",
        "Bool",
        NodeCategory::Input,
        "Constant boolean",
        || Box::new(Constant::new(Value::Bool(false))),
    ));
    registry.register(node_type(
        "matrix_constant",
        "Matrix",
        NodeCategory::Input,
        "Constant matrix, identity by default",
        || Box::new(Constant::identity()),
    ));
    registry.register(node_type(
        "arg",
        "Arg",
        NodeCategory::Input,
        "Function argument",
        || Box::new(Arg::new("arg", PortType::Float)),
    ));

    // ========================================================================
    // Math Nodes
    // ========================================================================

    registry.register(node_type("add", "Add", NodeCategory::Math, "Sum of all inputs", || {
        Box::new(Arithmetic::new(BinaryOp::Add))
    }));
    registry.register(node_type(
        "subtract",
        "Subtract",
        NodeCategory::Math,
        "A minus B",
        || Box::new(Arithmetic::new(BinaryOp::Subtract)),
    ));
    registry.register(node_type(
        "multiply",
        "Multiply",
        NodeCategory::Math,
        "Product of all inputs, including matrix products",
        || Box::new(Arithmetic::new(BinaryOp::Multiply)),
    ));
    registry.register(node_type("divide", "Divide", NodeCategory::Math, "A divided by B", || {
        Box::new(Arithmetic::new(BinaryOp::Divide))
    }));
    registry.register(node_type("min", "Min", NodeCategory::Math, "Componentwise minimum", || {
        Box::new(Arithmetic::new(BinaryOp::Min))
    }));
    registry.register(node_type("max", "Max", NodeCategory::Math, "Componentwise maximum", || {
        Box::new(Arithmetic::new(BinaryOp::Max))
    }));
    registry.register(node_type("pow", "Pow", NodeCategory::Math, "A raised to B", || {
        Box::new(Arithmetic::new(BinaryOp::Pow))
    }));
    registry.register(node_type("modulo", "Modulo", NodeCategory::Math, "Floored modulo", || {
        Box::new(Arithmetic::new(BinaryOp::Modulo))
    }));
    registry.register(node_type("lerp", "Lerp", NodeCategory::Math, "Linear interpolation", || {
        Box::new(Lerp)
    }));
    registry.register(node_type("dot", "Dot", NodeCategory::Math, "Dot product", || {
        Box::new(VectorPair::new(PairFunc::Dot))
    }));
    registry.register(node_type(
        "distance",
        "Distance",
        NodeCategory::Math,
        "Distance between two points",
        || Box::new(VectorPair::new(PairFunc::Distance)),
    ));

    for (id, name, func) in UNARY_TYPES {
        registry.register(NodeType {
            id: id.to_string(),
            name: name.to_string(),
            category: NodeCategory::Math,
            description: format!("{name} of the input"),
            factory: unary_factory(func),
        });
    }

    // ========================================================================
    // Logic Nodes
    // ========================================================================

    registry.register(node_type("and", "And", NodeCategory::Logic, "True when all inputs are", || {
        Box::new(BooleanOp::new(LogicOp::And))
    }));
    registry.register(node_type("or", "Or", NodeCategory::Logic, "True when any input is", || {
        Box::new(BooleanOp::new(LogicOp::Or))
    }));
    registry.register(node_type("not", "Not", NodeCategory::Logic, "Negated boolean", || {
        Box::new(Not)
    }));
    registry.register(node_type(
        "greater_than",
        "Greater Than",
        NodeCategory::Logic,
        "A > B",
        || Box::new(Compare::new(CompareOp::GreaterThan)),
    ));
    registry.register(node_type(
        "greater_than_equal",
        "Greater Than Equal",
        NodeCategory::Logic,
        "A >= B",
        || Box::new(Compare::new(CompareOp::GreaterThanEqual)),
    ));
    registry.register(node_type("less_than", "Less Than", NodeCategory::Logic, "A < B", || {
        Box::new(Compare::new(CompareOp::LessThan))
    }));
    registry.register(node_type(
        "less_than_equal",
        "Less Than Equal",
        NodeCategory::Logic,
        "A <= B",
        || Box::new(Compare::new(CompareOp::LessThanEqual)),
    ));
    registry.register(node_type("equal", "Equal", NodeCategory::Logic, "A == B", || {
        Box::new(Compare::new(CompareOp::Equal))
    }));
    registry.register(node_type("not_equal", "Not Equal", NodeCategory::Logic, "A != B", || {
        Box::new(Compare::new(CompareOp::NotEqual))
    }));
    registry.register(node_type(
        "if_else",
        "If Else",
        NodeCategory::Logic,
        "Picks one of two values",
        || Box::new(IfElse),
    ));

    // ========================================================================
    // Vector Nodes
    // ========================================================================

    registry.register(node_type(
        "make_float2",
        "Make Float2",
        NodeCategory::Vector,
        "Vector from components",
        || Box::new(MakeVector::new(2)),
    ));
    registry.register(node_type(
        "make_float3",
        "Make Float3",
        NodeCategory::Vector,
        "Vector from components",
        || Box::new(MakeVector::new(3)),
    ));
    registry.register(node_type(
        "make_float4",
        "Make Float4",
        NodeCategory::Vector,
        "Vector from components",
        || Box::new(MakeVector::new(4)),
    ));
    registry.register(node_type(
        "break_float2",
        "Break Float2",
        NodeCategory::Vector,
        "Components of a vector",
        || Box::new(BreakVector::new(2)),
    ));
    registry.register(node_type(
        "break_float3",
        "Break Float3",
        NodeCategory::Vector,
        "Components of a vector",
        || Box::new(BreakVector::new(3)),
    ));
    registry.register(node_type(
        "break_float4",
        "Break Float4",
        NodeCategory::Vector,
        "Components of a vector",
        || Box::new(BreakVector::new(4)),
    ));

    // ========================================================================
    // Variable Nodes
    // ========================================================================

    registry.register(node_type(
        "get_var",
        "Get Var",
        NodeCategory::Variable,
        "Read a graph variable",
        || Box::new(GetVar::new("", PortType::Float)),
    ));
    registry.register(node_type(
        "set_var",
        "Set Var",
        NodeCategory::Variable,
        "Write a graph variable",
        || Box::new(SetVar::new("")),
    ));

    // ========================================================================
    // Flow Nodes
    // ========================================================================

    registry.register(node_type(
        "execute",
        "Execute",
        NodeCategory::Flow,
        "Entry point of a flow graph",
        || Box::new(Execute),
    ));
    registry.register(node_type(
        "sequence",
        "Sequence",
        NodeCategory::Flow,
        "Runs each output branch in order",
        || Box::new(Sequence::new(2)),
    ));
    registry.register(node_type(
        "for_loop",
        "For Loop",
        NodeCategory::Flow,
        "Runs its body once per counter value",
        || Box::new(ForLoop::new()),
    ));

    // ========================================================================
    // Function Nodes
    // ========================================================================

    registry.register(node_type(
        "call",
        "Call",
        NodeCategory::Function,
        "Calls a function of the graph",
        || Box::new(Call::new()),
    ));
    registry.register(node_type(
        "graph_instance",
        "Graph Instance",
        NodeCategory::Function,
        "Embeds another graph",
        || Box::new(Instance::new(Graph::new_function("Instance"))),
    ));

    // ========================================================================
    // Output Nodes
    // ========================================================================

    registry.register(node_type(
        "output",
        "Output",
        NodeCategory::Output,
        "Graph result",
        || Box::new(GraphOutput),
    ));

    registry
}

const UNARY_TYPES: [(&str, &str, UnaryFunc); 10] = [
    ("negate", "Negate", UnaryFunc::Negate),
    ("absolute", "Absolute", UnaryFunc::Absolute),
    ("sine", "Sine", UnaryFunc::Sine),
    ("cosine", "Cosine", UnaryFunc::Cosine),
    ("floor", "Floor", UnaryFunc::Floor),
    ("ceil", "Ceil", UnaryFunc::Ceil),
    ("fract", "Fract", UnaryFunc::Fract),
    ("sqrt", "Sqrt", UnaryFunc::Sqrt),
    ("normalize", "Normalize", UnaryFunc::Normalize),
    ("length", "Length", UnaryFunc::Length),
];

fn unary_factory(func: UnaryFunc) -> fn() -> Box<dyn Operator> {
    match func {
        UnaryFunc::Negate => || Box::new(Unary::new(UnaryFunc::Negate)),
        UnaryFunc::Absolute => || Box::new(Unary::new(UnaryFunc::Absolute)),
        UnaryFunc::Sine => || Box::new(Unary::new(UnaryFunc::Sine)),
        UnaryFunc::Cosine => || Box::new(Unary::new(UnaryFunc::Cosine)),
        UnaryFunc::Floor => || Box::new(Unary::new(UnaryFunc::Floor)),
        UnaryFunc::Ceil => || Box::new(Unary::new(UnaryFunc::Ceil)),
        UnaryFunc::Fract => || Box::new(Unary::new(UnaryFunc::Fract)),
        UnaryFunc::Sqrt => || Box::new(Unary::new(UnaryFunc::Sqrt)),
        UnaryFunc::Normalize => || Box::new(Unary::new(UnaryFunc::Normalize)),
        UnaryFunc::Length => || Box::new(Unary::new(UnaryFunc::Length)),
    }
}
