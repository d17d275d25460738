//! Static checks of expression trees.
//!
//! Every producer passed to the builder is checked bottom-up before it is
//! appended. Assignability is widening-only, as answered by the registry.

use opgraph_core::{BinaryOp, BuildError, DataType, Expr, IteratorOp, UnaryOp};
use opgraph_registry::TypeRegistry;

/// Check an expression and all of its descendants.
pub fn check(expr: &Expr, registry: &TypeRegistry) -> Result<(), BuildError> {
    for child in expr.children() {
        check(child, registry)?;
    }
    check_node(expr, registry)
}

/// Require `found` to be assignable to `expected`.
pub fn expect_assignable(
    registry: &TypeRegistry,
    context: &str,
    found: &DataType,
    expected: &DataType,
) -> Result<(), BuildError> {
    if registry.is_assignable(found, expected) {
        Ok(())
    } else {
        Err(mismatch(context, expected, found))
    }
}

pub(crate) fn mismatch(context: &str, expected: &DataType, found: &DataType) -> BuildError {
    BuildError::TypeMismatch {
        context: context.to_string(),
        expected: expected.friendly_name(true),
        found: found.friendly_name(true),
    }
}

fn check_node(expr: &Expr, registry: &TypeRegistry) -> Result<(), BuildError> {
    match expr {
        Expr::Constant { value, ty } => {
            if value.is_null() {
                if !ty.is_nullable() {
                    return Err(mismatch("null constant", &DataType::Object, ty));
                }
                return Ok(());
            }
            expect_assignable(registry, "constant", &value.runtime_type(), ty)
        }
        Expr::Variable(_) | Expr::Extension(_) => Ok(()),
        Expr::Binary {
            op, left, right, ..
        } => check_binary(*op, &left.data_type(), &right.data_type(), registry),
        Expr::Unary { op, operand, .. } => {
            let ty = operand.data_type();
            match op {
                UnaryOp::Not if ty != DataType::Bool => Err(mismatch("not", &DataType::Bool, &ty)),
                UnaryOp::Neg if !ty.is_numeric() => Err(BuildError::InvalidArgument {
                    message: format!("neg requires a numeric operand, found '{ty}'"),
                }),
                _ => Ok(()),
            }
        }
        Expr::Convert { operand, ty } => {
            let from = operand.data_type();
            let widening = registry.is_assignable(&from, ty);
            let narrowing = from.is_numeric() && ty.is_numeric();
            let downcast = registry.is_assignable(ty, &from);
            if widening || narrowing || downcast {
                Ok(())
            } else {
                Err(BuildError::InvalidArgument {
                    message: format!("no conversion from '{from}' to '{ty}'"),
                })
            }
        }
        Expr::Call {
            method,
            target,
            args,
        } => {
            let context = format!("call to {}", method.name);
            match (method.is_static, target) {
                (true, Some(_)) => {
                    return Err(BuildError::InvalidArgument {
                        message: format!("static method '{}' takes no target", method.name),
                    });
                }
                (false, None) => {
                    return Err(BuildError::InvalidArgument {
                        message: format!("instance method '{}' requires a target", method.name),
                    });
                }
                (false, Some(target)) => {
                    expect_assignable(registry, &context, &target.data_type(), &method.owner)?;
                }
                (true, None) => {}
            }
            check_arguments(registry, &context, &method.params, args)
        }
        Expr::New { constructor, args } => check_arguments(
            registry,
            &format!("constructor of {}", constructor.owner),
            &constructor.params,
            args,
        ),
        Expr::Field { field, target } => {
            check_target(registry, &field.name, field.is_static, &field.owner, target.as_deref())
        }
        Expr::Property { property, target } => check_target(
            registry,
            &property.name,
            property.is_static,
            &property.owner,
            target.as_deref(),
        ),
        Expr::Subscribe {
            event,
            target,
            handler,
        } => {
            check_target(registry, &event.name, event.is_static, &event.owner, target.as_deref())?;
            expect_assignable(
                registry,
                &format!("handler of {}", event.name),
                &handler.data_type(),
                &event.handler_type,
            )
        }
        Expr::Dynamic { site, args } => {
            if site.accepts(args.len()) {
                Ok(())
            } else {
                Err(BuildError::Arity {
                    context: format!("call site {site}"),
                    expected: site.arg_count,
                    found: args.len(),
                })
            }
        }
        Expr::Iterator { op, operand } => {
            let ty = operand.data_type();
            let ok = match op {
                IteratorOp::Begin => matches!(ty, DataType::Sequence(_)),
                IteratorOp::MoveNext | IteratorOp::Current => matches!(ty, DataType::Iterator(_)),
            };
            if ok {
                Ok(())
            } else {
                Err(BuildError::InvalidArgument {
                    message: format!("{} is not applicable to '{ty}'", op.name()),
                })
            }
        }
    }
}

fn check_binary(
    op: BinaryOp,
    left: &DataType,
    right: &DataType,
    registry: &TypeRegistry,
) -> Result<(), BuildError> {
    let context = op.name();
    if op.is_logical() {
        if *left != DataType::Bool {
            return Err(mismatch(context, &DataType::Bool, left));
        }
        if *right != DataType::Bool {
            return Err(mismatch(context, &DataType::Bool, right));
        }
        return Ok(());
    }
    if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
        let comparable = DataType::promote(left, right).is_some()
            || registry.is_assignable(left, right)
            || registry.is_assignable(right, left);
        return if comparable {
            Ok(())
        } else {
            Err(mismatch(context, left, right))
        };
    }
    if op == BinaryOp::Add && *left == DataType::String && *right == DataType::String {
        return Ok(());
    }
    if op.is_comparison() && *left == DataType::String && *right == DataType::String {
        return Ok(());
    }
    if DataType::promote(left, right).is_some() {
        Ok(())
    } else {
        Err(BuildError::InvalidArgument {
            message: format!("operator {context} is not defined for '{left}' and '{right}'"),
        })
    }
}

fn check_arguments(
    registry: &TypeRegistry,
    context: &str,
    params: &[DataType],
    args: &[Expr],
) -> Result<(), BuildError> {
    if params.len() != args.len() {
        return Err(BuildError::Arity {
            context: context.to_string(),
            expected: params.len(),
            found: args.len(),
        });
    }
    for (param, arg) in params.iter().zip(args) {
        expect_assignable(registry, context, &arg.data_type(), param)?;
    }
    Ok(())
}

fn check_target(
    registry: &TypeRegistry,
    member: &str,
    is_static: bool,
    owner: &DataType,
    target: Option<&Expr>,
) -> Result<(), BuildError> {
    match (is_static, target) {
        (true, None) => Ok(()),
        (false, Some(target)) => {
            expect_assignable(registry, &format!("access to {member}"), &target.data_type(), owner)
        }
        (true, Some(_)) => Err(BuildError::InvalidArgument {
            message: format!("static member '{member}' takes no target"),
        }),
        (false, None) => Err(BuildError::InvalidArgument {
            message: format!("instance member '{member}' requires a target"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opgraph_core::{BindingFlags, CallSite, Value};

    fn registry() -> TypeRegistry {
        TypeRegistry::with_builtins()
    }

    #[test]
    fn arithmetic_on_numbers() {
        let e = Expr::add(Expr::constant(1), Expr::constant(2.0));
        assert!(check(&e, &registry()).is_ok());
    }

    #[test]
    fn arithmetic_on_bool_fails() {
        let e = Expr::add(Expr::constant(true), Expr::constant(1));
        assert!(matches!(
            check(&e, &registry()),
            Err(BuildError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn string_concatenation() {
        let e = Expr::add(Expr::constant("a"), Expr::constant("b"));
        assert!(check(&e, &registry()).is_ok());
    }

    #[test]
    fn logical_requires_bool() {
        let e = Expr::binary(BinaryOp::And, Expr::constant(true), Expr::constant(1));
        assert!(matches!(
            check(&e, &registry()),
            Err(BuildError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn static_call_arguments() {
        let registry = registry();
        let max = registry
            .find_method(
                &DataType::named("System.Math"),
                "Max",
                &[DataType::Int32, DataType::Int32],
                BindingFlags::lookup(true),
            )
            .unwrap();
        let ok = Expr::call_static(max.clone(), vec![Expr::constant(1), Expr::constant(2)]);
        assert!(check(&ok, &registry).is_ok());

        let short = Expr::call_static(max.clone(), vec![Expr::constant(1)]);
        assert!(matches!(
            check(&short, &registry),
            Err(BuildError::Arity { expected: 2, found: 1, .. })
        ));

        let narrowing = Expr::call_static(max, vec![Expr::constant(1), Expr::constant(2.0)]);
        assert!(matches!(
            check(&narrowing, &registry),
            Err(BuildError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn dynamic_arity() {
        let site = CallSite::get_member("Length", DataType::Int32);
        let ok = Expr::dynamic(site.clone(), vec![Expr::constant("abc")]);
        assert!(check(&ok, &registry()).is_ok());
        let bad = Expr::dynamic(site, vec![Expr::constant("a"), Expr::constant("b")]);
        assert!(matches!(check(&bad, &registry()), Err(BuildError::Arity { .. })));
    }

    #[test]
    fn iterator_requires_sequence() {
        let seq = Expr::constant(Value::sequence(DataType::Int32, vec![Value::Int32(1)]));
        assert!(check(&Expr::iter_begin(seq), &registry()).is_ok());
        assert!(check(&Expr::iter_begin(Expr::constant(1)), &registry()).is_err());
    }

    #[test]
    fn null_requires_nullable_type() {
        assert!(check(&Expr::null(DataType::String), &registry()).is_ok());
        assert!(check(&Expr::null(DataType::Int32), &registry()).is_err());
    }
}
