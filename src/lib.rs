//! Structured operation graphs: build them, render them, load them back
//! and run them.
//!
//! This crate re-exports the workspace:
//!
//! - [`core`]: types, values, member metadata, nodes and errors
//! - [`registry`]: the type registry every phase resolves against
//! - [`builder`]: the fluent, type-checked [`FunctionBuilder`]
//! - [`render`]: graph-to-source rendering
//! - [`parser`]: the reader for rendered text
//! - [`vm`]: compilation to a callable [`CompiledFunction`]
//!
//! # Example
//!
//! ```
//! use opgraph::prelude::*;
//! use std::rc::Rc;
//!
//! let registry = Rc::new(TypeRegistry::with_builtins());
//! let mut b = FunctionBuilder::new(
//!     Rc::clone(&registry),
//!     vec![Param::named("n", DataType::Int32)],
//!     DataType::Int32,
//! );
//! b.ret_value(Expr::add(Expr::var("n", DataType::Int32), Expr::constant(1)))?;
//! let function = b.finish()?;
//!
//! let reloaded = opgraph::reload(&function, &registry)?;
//! let compiled = compile(&reloaded, registry)?;
//! assert_eq!(compiled.call(&[Value::Int32(41)])?, Value::Int32(42));
//! # Ok::<(), OpGraphError>(())
//! ```

pub use opgraph_builder as builder;
pub use opgraph_core as core;
pub use opgraph_parser as parser;
pub use opgraph_registry as registry;
pub use opgraph_render as render;
pub use opgraph_vm as vm;

pub use opgraph_builder::FunctionBuilder;
pub use opgraph_core::{Function, OpGraphError};
pub use opgraph_registry::TypeRegistry;
pub use opgraph_vm::CompiledFunction;

/// Result with the unified error of every phase.
pub type Result<T> = std::result::Result<T, OpGraphError>;

/// Render `function`, then load the text back against `registry`.
///
/// The loaded function renders to the same text.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn reload(function: &Function, registry: &TypeRegistry) -> Result<Function> {
    let source = opgraph_render::render(function)?;
    tracing::trace!("reloading {} byte(s) of rendered source", source.len());
    Ok(opgraph_parser::load(&source, registry)?)
}

pub mod prelude {
    pub use opgraph_builder::{FunctionBuilder, Lambda, LambdaParam, Param};
    pub use opgraph_core::{
        BinaryOp, BindingFlags, CallSite, DataType, Expr, Function, Node, OpGraphError, UnaryOp,
        Value, exceptions,
    };
    pub use opgraph_parser::load;
    pub use opgraph_registry::{TypeBuilder, TypeRegistry};
    pub use opgraph_render::{RenderOptions, render, render_with};
    pub use opgraph_vm::{CompiledFunction, compile};
}
