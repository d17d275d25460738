//! Function-literal rewriter.
//!
//! Turns a [`Producer`] into an expression over the function's own
//! variables:
//! - a literal parameter binds to the scope variable of the same name
//! - a name that is not in scope binds to the parameter's captured value,
//!   only when the function allows outer capture
//! - free variables of a raw expression resolve against the scope
//!
//! Bindings are widening-only; a widening inserts an explicit `Convert`.
//! The rewritten tree is then type-checked.

use rustc_hash::FxHashSet;

use opgraph_core::{BuildError, DataType, Expr, Variable};
use opgraph_registry::TypeRegistry;

use crate::lambda::{Lambda, MAX_ARITY, Producer};
use crate::scope::ScopeContext;
use crate::typecheck;

/// Rewrite a producer into a checked expression.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn rewrite(
    producer: impl Into<Producer>,
    scope: &ScopeContext,
    registry: &TypeRegistry,
) -> Result<Expr, BuildError> {
    let expr = match producer.into() {
        Producer::Literal(lambda) => rewrite_lambda(&lambda, scope, registry)?,
        Producer::Node(expr) => {
            substitute(&expr, &mut |var: &Variable| bind_scope(var, &var.ty, scope, registry))?
        }
    };
    typecheck::check(&expr, registry)?;
    Ok(expr)
}

fn rewrite_lambda(
    lambda: &Lambda,
    scope: &ScopeContext,
    registry: &TypeRegistry,
) -> Result<Expr, BuildError> {
    if lambda.arity() > MAX_ARITY {
        return Err(BuildError::Arity {
            context: "function literal".to_string(),
            expected: MAX_ARITY,
            found: lambda.arity(),
        });
    }
    let mut seen = FxHashSet::default();
    for param in &lambda.params {
        if param.name.trim().is_empty() {
            return Err(BuildError::BlankName { what: "parameter" });
        }
        if !seen.insert(param.name.as_str()) {
            return Err(BuildError::InvalidArgument {
                message: format!("parameter '{}' is declared twice", param.name),
            });
        }
    }

    substitute(&lambda.body, &mut |var: &Variable| {
        let Some(param) = lambda.param(&var.name) else {
            return bind_scope(var, &var.ty, scope, registry);
        };
        if scope.is_declared(&param.name) {
            return bind_scope(var, &param.ty, scope, registry);
        }
        match (&param.captured, scope.allow_outer_capture()) {
            (Some(value), true) => {
                if !value.is_null() {
                    typecheck::expect_assignable(
                        registry,
                        &format!("captured '{}'", param.name),
                        &value.runtime_type(),
                        &param.ty,
                    )?;
                }
                Ok(Expr::typed_constant(value.clone(), param.ty.clone()))
            }
            _ => Err(BuildError::UnresolvedVariable {
                name: param.name.clone(),
            }),
        }
    })
}

/// Bind a reference to the scope variable of the same name, widening to
/// `expected` when the declared type is narrower.
fn bind_scope(
    var: &Variable,
    expected: &DataType,
    scope: &ScopeContext,
    registry: &TypeRegistry,
) -> Result<Expr, BuildError> {
    let declared = scope
        .variable(&var.name)
        .ok_or_else(|| BuildError::UnresolvedVariable {
            name: var.name.to_string(),
        })?;
    if declared.ty == *expected {
        return Ok(Expr::Variable(declared.clone()));
    }
    typecheck::expect_assignable(
        registry,
        &format!("reference to '{}'", var.name),
        &declared.ty,
        expected,
    )?;
    Ok(Expr::convert(Expr::Variable(declared.clone()), expected.clone()))
}

type Bind<'b> = dyn FnMut(&Variable) -> Result<Expr, BuildError> + 'b;

/// Rebuild `expr` with every variable reference replaced.
fn substitute(expr: &Expr, bind: &mut Bind<'_>) -> Result<Expr, BuildError> {
    Ok(match expr {
        Expr::Variable(var) => bind(var)?,
        Expr::Constant { .. } | Expr::Extension(_) => expr.clone(),
        Expr::Binary {
            op, left, right, ..
        } => Expr::binary(*op, substitute(left, bind)?, substitute(right, bind)?),
        Expr::Unary { op, operand, .. } => Expr::unary(*op, substitute(operand, bind)?),
        Expr::Convert { operand, ty } => Expr::convert(substitute(operand, bind)?, ty.clone()),
        Expr::Call {
            method,
            target,
            args,
        } => Expr::Call {
            method: method.clone(),
            target: target.as_deref().map(|t| boxed(t, bind)).transpose()?,
            args: substitute_all(args, bind)?,
        },
        Expr::New { constructor, args } => Expr::New {
            constructor: constructor.clone(),
            args: substitute_all(args, bind)?,
        },
        Expr::Field { field, target } => Expr::Field {
            field: field.clone(),
            target: target.as_deref().map(|t| boxed(t, bind)).transpose()?,
        },
        Expr::Property { property, target } => Expr::Property {
            property: property.clone(),
            target: target.as_deref().map(|t| boxed(t, bind)).transpose()?,
        },
        Expr::Subscribe {
            event,
            target,
            handler,
        } => Expr::Subscribe {
            event: event.clone(),
            target: target.as_deref().map(|t| boxed(t, bind)).transpose()?,
            handler: boxed(handler, bind)?,
        },
        Expr::Dynamic { site, args } => Expr::Dynamic {
            site: site.clone(),
            args: substitute_all(args, bind)?,
        },
        Expr::Iterator { op, operand } => Expr::Iterator {
            op: *op,
            operand: boxed(operand, bind)?,
        },
    })
}

fn boxed(expr: &Expr, bind: &mut Bind<'_>) -> Result<Box<Expr>, BuildError> {
    substitute(expr, bind).map(Box::new)
}

fn substitute_all(exprs: &[Expr], bind: &mut Bind<'_>) -> Result<Vec<Expr>, BuildError> {
    exprs.iter().map(|e| substitute(e, bind)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lambda::LambdaParam;
    use opgraph_core::Value;

    fn scope(capture: bool) -> ScopeContext {
        let mut scope = ScopeContext::new(DataType::Void, capture);
        scope.declare_variable("i", DataType::Int32).unwrap();
        scope
    }

    #[test]
    fn parameter_binds_to_scope_variable() {
        let registry = TypeRegistry::with_builtins();
        let lambda = Lambda::build(vec![LambdaParam::new("i", DataType::Int32)], |p: &[Expr]| {
            Expr::lt(p[0].clone(), Expr::constant(10))
        });
        let expr = rewrite(lambda, &scope(false), &registry).unwrap();
        assert_eq!(
            expr,
            Expr::lt(Expr::var("i", DataType::Int32), Expr::constant(10))
        );
    }

    #[test]
    fn widening_inserts_convert() {
        let registry = TypeRegistry::with_builtins();
        let lambda = Lambda::build(
            vec![LambdaParam::new("i", DataType::Float64)],
            |p: &[Expr]| p[0].clone(),
        );
        let expr = rewrite(lambda, &scope(false), &registry).unwrap();
        assert_eq!(
            expr,
            Expr::convert(Expr::var("i", DataType::Int32), DataType::Float64)
        );
    }

    #[test]
    fn narrowing_is_rejected() {
        let registry = TypeRegistry::with_builtins();
        let mut scope = scope(false);
        scope.declare_variable("d", DataType::Float64).unwrap();
        let lambda = Lambda::build(vec![LambdaParam::new("d", DataType::Int32)], |p: &[Expr]| {
            p[0].clone()
        });
        assert!(matches!(
            rewrite(lambda, &scope, &registry),
            Err(BuildError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn undeclared_reference_is_not_supported() {
        let registry = TypeRegistry::with_builtins();
        let lambda = Lambda::build(
            vec![LambdaParam::captured("limit", DataType::Int32, 5)],
            |p: &[Expr]| p[0].clone(),
        );
        let err = rewrite(lambda, &scope(false), &registry).unwrap_err();
        assert_eq!(err, BuildError::UnresolvedVariable { name: "limit".into() });
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn capture_embeds_constant_when_allowed() {
        let registry = TypeRegistry::with_builtins();
        let lambda = Lambda::build(
            vec![LambdaParam::captured("limit", DataType::Int32, 5)],
            |p: &[Expr]| p[0].clone(),
        );
        let expr = rewrite(lambda, &scope(true), &registry).unwrap();
        assert_eq!(expr, Expr::typed_constant(Value::Int32(5), DataType::Int32));
    }

    #[test]
    fn raw_expression_free_variables() {
        let registry = TypeRegistry::with_builtins();
        let ok = Expr::add(Expr::var("i", DataType::Int32), Expr::constant(1));
        assert!(rewrite(ok, &scope(false), &registry).is_ok());
        let missing = Expr::var("j", DataType::Int32);
        assert!(matches!(
            rewrite(missing, &scope(false), &registry),
            Err(BuildError::UnresolvedVariable { .. })
        ));
    }

    #[test]
    fn too_many_parameters() {
        let registry = TypeRegistry::with_builtins();
        let params = (0..=MAX_ARITY)
            .map(|n| LambdaParam::new(&format!("a{n}"), DataType::Int32))
            .collect();
        let lambda = Lambda::new(params, Expr::constant(0));
        assert!(matches!(
            rewrite(lambda, &scope(false), &registry),
            Err(BuildError::Arity { expected: 16, found: 17, .. })
        ));
    }
}
