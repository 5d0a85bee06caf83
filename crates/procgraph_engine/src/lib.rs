// SPDX-License-Identifier: MIT OR Apache-2.0
//! Procedural node graph engine.
//!
//! This crate evaluates graphs of typed operator nodes and turns them into
//! GLSL fragment shaders:
//! - Typed ports with implicit broadcasting between scalars and vectors
//! - Incremental, budgeted evaluation on the host
//! - Execute-pin control flow with loops, sequences and function calls
//! - Differential snapshot and restore
//!
//! ## Architecture
//!
//! A [`Graph`] owns its nodes in an arena. Every node wraps an
//! [`Operator`] that declares its ports and knows how to evaluate and emit
//! itself. Edits propagate concrete types downstream; [`Graph::schedule`]
//! queues the nodes an update needs and [`Graph::poll`] drains that queue
//! one node at a time, so a host can spread work over frames.
//!
//! ```
//! use procgraph_engine::{Graph, InputRef, OutputRef, Value};
//! use procgraph_engine::ops::{arithmetic::Arithmetic, constant::Constant, output::GraphOutput};
//! use procgraph_engine::BinaryOp;
//!
//! let mut graph = Graph::new("example");
//! let a = graph.add(Constant::new(Value::Float(2.0))).unwrap();
//! let b = graph.add(Constant::new(Value::Float(3.0))).unwrap();
//! let add = graph.add(Arithmetic::new(BinaryOp::Add)).unwrap();
//! let out = graph.add(GraphOutput).unwrap();
//! graph.connect(OutputRef::new(a, 0), InputRef::new(add, 1)).unwrap();
//! graph.connect(OutputRef::new(b, 0), InputRef::new(add, 2)).unwrap();
//! graph.connect(OutputRef::new(add, 1), InputRef::new(out, 0)).unwrap();
//! graph.set_output_node(Some(out)).unwrap();
//!
//! graph.schedule();
//! graph.run_until_idle();
//! assert_eq!(graph.result(), Some(Value::Float(5.0)));
//! ```

pub mod codegen;
pub mod config;
pub mod connection;
pub mod evaluation;
pub mod graph;
pub mod node;
pub mod observer;
pub mod operator;
pub mod ops;
pub mod overlay;
pub mod persistence;
pub mod port;
pub mod resolver;
pub mod scheduler;
pub mod types;
pub mod value;
pub mod variables;

pub use codegen::{EmitError, ShaderTarget};
pub use config::{ConfigError, EngineConfig};
pub use connection::Connection;
pub use evaluation::{EvalError, EvalOutcome};
pub use graph::{ConnectionError, Graph, GraphError};
pub use node::{Node, NodeCategory, NodeId, NodeRegistry, NodeType};
pub use observer::{GraphObserver, ObserverId};
pub use operator::{NodeParams, Operator, ParamError, ParamValue};
pub use persistence::{GraphDescriptor, PersistError, RestoreReport};
pub use port::{Input, InputRef, Output, OutputRef, PortLayout, PortType, TypeMask};
pub use scheduler::PollStatus;
pub use value::{BinaryOp, Value};
pub use variables::{VariableTable, Version};
