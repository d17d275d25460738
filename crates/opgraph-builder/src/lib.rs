//! Fluent, type-checked construction of structured operation graphs.
//!
//! This crate provides:
//! - [`FunctionBuilder`]: blocks, if chains, loops, foreach, switch,
//!   try/catch/finally, using, labels and jumps
//! - [`ScopeContext`]: function-wide variable, label and loop tracking
//! - [`Lambda`] and [`rewrite`]: function literals bound to scope variables
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use opgraph_builder::{FunctionBuilder, Lambda, LambdaParam};
//! use opgraph_core::{DataType, Expr, Value};
//! use opgraph_registry::TypeRegistry;
//!
//! let registry = Rc::new(TypeRegistry::with_builtins());
//! let items = Value::sequence(DataType::Int32, (0..10).map(Value::Int32).collect());
//!
//! let mut b = FunctionBuilder::new(registry, vec![], DataType::Int32);
//! b.set("sum", Expr::constant(0))?
//!     .foreach("x", Expr::constant(items))?
//!     .set("sum", Lambda::build(
//!         vec![LambdaParam::new("sum", DataType::Int32), LambdaParam::new("x", DataType::Int32)],
//!         |p: &[Expr]| Expr::add(p[0].clone(), p[1].clone()),
//!     ))?
//!     .end()?
//!     .ret_value(Expr::var("sum", DataType::Int32))?;
//! let function = b.finish()?;
//! assert_eq!(function.return_type, DataType::Int32);
//! # Ok::<(), opgraph_core::BuildError>(())
//! ```

mod builder;
mod lambda;
mod rewrite;
mod scope;
mod typecheck;

pub use builder::{FunctionBuilder, FunctionOptions, Param};
pub use lambda::{Lambda, LambdaParam, MAX_ARITY, Producer};
pub use rewrite::rewrite;
pub use scope::{CatchGuard, LoopLabels, ScopeContext};
pub use typecheck::{check as check_expr, expect_assignable};
