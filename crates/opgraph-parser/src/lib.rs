//! Reader for the opgraph rendering dialect.
//!
//! [`load`] turns text produced by `opgraph_render::render` back into a
//! [`Function`]. Only the renderer's own dialect is understood:
//!
//! - [`lexer`]: tokens, with `//` and `/* */` comments skipped
//! - [`term`]: a bump-allocated term tree of `let` declarations and a body
//! - `loader`: binds declarations in order and rebuilds nodes
//!
//! Rendering a loaded function reproduces the text it was loaded from.
//!
//! # Example
//!
//! ```
//! use opgraph_registry::TypeRegistry;
//!
//! let source = r#"
//!     let t0 = type(int);
//!     let v0 = param(t0, "n");
//!     let l0 = label("return");
//!     lambda(t0, [v0], l0, false, block(
//!         return(l0, add(v0, constant(t0, 1)))
//!     ))
//! "#;
//! let function = opgraph_parser::load(source, &TypeRegistry::with_builtins())?;
//! assert_eq!(function.parameters[0].name.as_ref(), "n");
//! # Ok::<(), opgraph_core::LoadError>(())
//! ```

pub mod lexer;
mod loader;
pub mod term;

use bumpalo::Bump;

use opgraph_core::{Function, LoadError};
use opgraph_registry::TypeRegistry;

pub use term::{Declaration, Document, Term, TermKind, parse_document};

/// Load rendered text, resolving reflection lookups against `registry`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn load(source: &str, registry: &TypeRegistry) -> Result<Function, LoadError> {
    let arena = Bump::new();
    let document = parse_document(source, &arena)?;
    tracing::trace!(
        "parsed {} declaration(s), {} arena byte(s)",
        document.declarations.len(),
        arena.allocated_bytes()
    );
    loader::Loader::new(registry).load(&document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use opgraph_builder::{FunctionBuilder, Param};
    use opgraph_core::{BindingFlags, CallSite, DataType, Expr, LabelId, Node, Value};
    use opgraph_render::render;
    use pretty_assertions::assert_eq;

    fn registry() -> Rc<TypeRegistry> {
        Rc::new(TypeRegistry::with_builtins())
    }

    /// render → load → render must reproduce the first rendering.
    fn assert_fixed_point(function: &Function, registry: &TypeRegistry) -> Function {
        let first = render(function).unwrap();
        let loaded = load(&first, registry).unwrap();
        let second = render(&loaded).unwrap();
        assert_eq!(first, second);
        loaded
    }

    #[test]
    fn loads_parameters_and_labels() {
        let source = r#"
            // types
            let t0 = type(long);
            let t1 = type(bool);

            // variables
            let v0 = param(t0, "a");
            let v1 = var(t1, "flag");

            // labels
            let l0 = label("return");
            let l1 = label("done");

            lambda(t0, [v0], l0, true, block(
                assign(v1, lt(v0, constant(t0, 10))),
                goto(l1),
                mark(l1),
                return(l0, v0)
            ))
        "#;
        let function = load(source, &registry()).unwrap();
        assert_eq!(function.parameters.len(), 1);
        assert_eq!(function.variables.len(), 1);
        assert_eq!(&*function.variables[0].name, "flag");
        assert!(function.allow_outer_capture);
        assert_eq!(function.return_label, LabelId(0));
        assert_eq!(function.label_name(LabelId(1)), Some("done"));
        match &function.body[0] {
            Node::Assign { value, .. } => match value {
                Expr::Binary { right, .. } => assert_eq!(
                    **right,
                    Expr::typed_constant(Value::Int64(10), DataType::Int64)
                ),
                other => panic!("expected comparison, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn control_flow_round_trip() {
        let registry = registry();
        let items = Value::sequence(DataType::Int32, (1..4).map(Value::Int32).collect());
        let mut b = FunctionBuilder::new(
            Rc::clone(&registry),
            vec![Param::named("k", DataType::Int32)],
            DataType::String,
        );
        let k = Expr::var("k", DataType::Int32);
        b.set("total", Expr::constant(0)).unwrap();
        b.foreach("x", Expr::constant(items)).unwrap();
        b.if_(Expr::equal(Expr::var("x", DataType::Int32), Expr::constant(2)))
            .unwrap()
            .continue_()
            .unwrap()
            .end()
            .unwrap();
        b.set(
            "total",
            Expr::add(Expr::var("total", DataType::Int32), Expr::var("x", DataType::Int32)),
        )
        .unwrap();
        b.end().unwrap();
        b.switch(k).unwrap();
        b.case(Expr::constant(1)).unwrap().begin().unwrap();
        b.ret_value(Expr::constant("one")).unwrap().end().unwrap();
        b.default().unwrap().begin().unwrap().end().unwrap();
        b.end().unwrap();
        b.try_().unwrap();
        b.throw(Expr::typed_constant(Value::Null, DataType::named("System.Exception")))
            .unwrap();
        b.catch(Some(DataType::named("System.ArgumentException")), Some("e"))
            .unwrap()
            .rethrow()
            .unwrap();
        b.finally().unwrap().end().unwrap();
        b.ret_value(Expr::constant("tab\there")).unwrap();
        let function = b.finish().unwrap();

        let loaded = assert_fixed_point(&function, &registry);
        assert_eq!(loaded.parameters, function.parameters);
        assert_eq!(loaded.variables, function.variables);
    }

    #[test]
    fn members_and_call_sites_round_trip() {
        let registry = registry();
        let max = registry
            .find_method(
                &DataType::named("System.Math"),
                "Max",
                &[DataType::Float64, DataType::Float64],
                BindingFlags::lookup(true),
            )
            .unwrap();
        let ctor = registry
            .find_constructor(
                &DataType::named("System.InvalidOperationException"),
                &[DataType::String],
                BindingFlags::lookup(false),
            )
            .unwrap();
        let message = registry
            .find_field(
                &DataType::named("System.Exception"),
                "Message",
                BindingFlags::lookup(false),
            )
            .unwrap();
        let length = CallSite::get_member("Length", DataType::Int32);

        let body = vec![
            Node::Act(Expr::call_static(
                max,
                vec![Expr::constant(1.5), Expr::constant(f64::NAN)],
            )),
            Node::Act(Expr::field(
                message,
                Some(Expr::new_object(ctor, vec![Expr::constant("boom")])),
            )),
            Node::Act(Expr::dynamic(length, vec![Expr::constant("abc")])),
        ];
        let function = Function {
            parameters: vec![],
            return_type: DataType::Void,
            return_label: LabelId(0),
            allow_outer_capture: false,
            variables: vec![],
            labels: vec![opgraph_core::LabelDef {
                id: LabelId(0),
                name: "return".into(),
            }],
            body,
        };
        let loaded = assert_fixed_point(&function, &registry);
        assert!(matches!(&loaded.body[1], Node::Act(Expr::Field { .. })));
    }

    #[test]
    fn read_errors_surface_as_load_errors() {
        let err = load("let t0 = type(int)\nlambda()", &registry()).unwrap_err();
        assert!(matches!(err, LoadError::Read(_)));
    }
}
