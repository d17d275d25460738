//! Compilation backend for opgraph functions.
//!
//! [`compile`] turns a finished [`Function`] into a [`CompiledFunction`]:
//!
//! 1. extension expressions are reduced to ordinary expressions
//! 2. the graph is validated (declared variables, reachable jump targets,
//!    rethrow placement, supported constructs)
//! 3. parameters and locals are assigned storage slots
//!
//! Calling the result runs the graph on a tree-walking interpreter.
//! Exceptions are ordinary values; one that escapes the body surfaces as
//! `RuntimeError::Unhandled`.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use opgraph_builder::{FunctionBuilder, Param};
//! use opgraph_core::{DataType, Expr, Value};
//! use opgraph_registry::TypeRegistry;
//!
//! let registry = Rc::new(TypeRegistry::with_builtins());
//! let mut b = FunctionBuilder::new(
//!     Rc::clone(&registry),
//!     vec![Param::named("n", DataType::Int32)],
//!     DataType::Int32,
//! );
//! b.ret_value(Expr::mul(Expr::var("n", DataType::Int32), Expr::constant(2)))?;
//! let double = opgraph_vm::compile(&b.finish()?, registry)?;
//! assert_eq!(double.call(&[Value::Int32(21)])?, Value::Int32(42));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod compiled;
mod dynamic;
mod interp;
mod lower;
mod ops;
mod validate;

use std::rc::Rc;

use opgraph_core::{BackendError, Function};
use opgraph_registry::TypeRegistry;

pub use compiled::CompiledFunction;

/// Compile `function` against `registry`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn compile(
    function: &Function,
    registry: Rc<TypeRegistry>,
) -> Result<CompiledFunction, BackendError> {
    let lowered = lower::reduce_extensions(function)?;
    validate::validate(&lowered, &registry)?;
    tracing::debug!(
        "compiled function with {} parameter(s), {} local(s), {} label(s)",
        lowered.parameters.len(),
        lowered.variables.len(),
        lowered.labels.len()
    );
    Ok(CompiledFunction::new(lowered, registry))
}
