//! Late binding of dynamic call sites.
//!
//! Each binder is resolved against the runtime types of its arguments
//! when the site executes. Argument 0 is always the target or left
//! operand. Binding failures are raised as exceptions.

use opgraph_core::{Binder, CallSite, DataType, Value, exceptions};
use opgraph_registry::{LateMember, TypeRegistry};

use crate::ops::{self, fault, null_reference};

/// Execute `site` with evaluated `args`.
pub(crate) fn invoke(registry: &TypeRegistry, site: &CallSite, args: &[Value]) -> Result<Value, Value> {
    if !site.accepts(args.len()) {
        return Err(fault(
            exceptions::ARGUMENT,
            format!(
                "call site '{}' cannot take {} argument(s)",
                site.binder.kind_name(),
                args.len()
            ),
        ));
    }
    let Some(target) = args.first() else {
        return Err(fault(exceptions::ARGUMENT, "call site has no target"));
    };
    let result = match &site.binder {
        Binder::GetMember { name } => get_member(registry, target, name),
        Binder::SetMember { name } => set_member(registry, target, name, &args[1]),
        Binder::InvokeMember { name } => invoke_member(registry, name, args),
        Binder::GetIndex => get_index(target, &args[1..]),
        Binder::BinaryOperation(op) => ops::binary(*op, target, &args[1]),
        Binder::UnaryOperation(op) => ops::unary(*op, target),
        Binder::Convert(ty) => ops::convert(registry, target.clone(), ty),
        Binder::Invoke | Binder::SetIndex | Binder::Foreign(_) => Err(fault(
            exceptions::NOT_SUPPORTED,
            format!("call-site binder '{}'", site.binder.kind_name()),
        )),
    }?;

    if site.result_type.is_numeric() && result.as_f64().is_some() {
        ops::convert(registry, result, &site.result_type)
    } else {
        Ok(result)
    }
}

fn missing_member(target: &Value, name: &str) -> Value {
    fault(
        exceptions::INVALID_OPERATION,
        format!(
            "'{}' does not contain a definition for '{name}'",
            target.runtime_type().friendly_name(true)
        ),
    )
}

fn get_member(registry: &TypeRegistry, target: &Value, name: &str) -> Result<Value, Value> {
    match (target, name) {
        (Value::Null, _) => Err(null_reference(format_args!("member '{name}'"))),
        (Value::Str(text), "Length") => Ok(Value::Int32(count(text.chars().count()))),
        (Value::Sequence(seq), "Length" | "Count") => Ok(Value::Int32(count(seq.items.len()))),
        _ => match registry.late_member(&target.runtime_type(), name) {
            Some(LateMember::Field(field)) => match target {
                Value::Object(obj) => Ok(obj
                    .fields
                    .borrow()
                    .get(field.index)
                    .cloned()
                    .unwrap_or(Value::Null)),
                Value::Struct(s) => Ok(s.fields.get(field.index).cloned().unwrap_or(Value::Null)),
                _ => Err(missing_member(target, name)),
            },
            Some(LateMember::Property(property)) => (property.getter)(std::slice::from_ref(target)),
            None => Err(missing_member(target, name)),
        },
    }
}

fn set_member(registry: &TypeRegistry, target: &Value, name: &str, value: &Value) -> Result<Value, Value> {
    let Value::Object(obj) = target else {
        return Err(match target {
            Value::Null => null_reference(format_args!("member '{name}'")),
            _ => fault(
                exceptions::NOT_SUPPORTED,
                format!(
                    "members of '{}' cannot be assigned late-bound",
                    target.runtime_type().friendly_name(true)
                ),
            ),
        });
    };
    match registry.late_member(&target.runtime_type(), name) {
        Some(LateMember::Field(field)) => {
            let stored = ops::convert(registry, value.clone(), &field.ty)?;
            match obj.fields.borrow_mut().get_mut(field.index) {
                Some(slot) => *slot = stored.clone(),
                None => return Err(missing_member(target, name)),
            }
            Ok(stored)
        }
        Some(LateMember::Property(_)) => Err(fault(
            exceptions::NOT_SUPPORTED,
            format!("property '{name}' is read-only"),
        )),
        None => Err(missing_member(target, name)),
    }
}

fn invoke_member(registry: &TypeRegistry, name: &str, args: &[Value]) -> Result<Value, Value> {
    let target = &args[0];
    if target.is_null() {
        return Err(null_reference(format_args!("method '{name}'")));
    }
    let arg_types: Vec<DataType> = args[1..].iter().map(Value::runtime_type).collect();
    match registry.late_method(&target.runtime_type(), name, &arg_types) {
        Some(method) => (method.native)(args),
        None => Err(missing_member(target, name)),
    }
}

fn get_index(target: &Value, indices: &[Value]) -> Result<Value, Value> {
    let [index] = indices else {
        return Err(fault(exceptions::ARGUMENT, "expected a single index"));
    };
    let Some(index) = index.as_i64() else {
        return Err(fault(exceptions::ARGUMENT, "index must be an integer"));
    };
    let item = match target {
        Value::Null => return Err(null_reference("indexer")),
        Value::Sequence(seq) => usize::try_from(index)
            .ok()
            .and_then(|i| seq.items.get(i).cloned()),
        Value::Str(text) => usize::try_from(index)
            .ok()
            .and_then(|i| text.chars().nth(i))
            .map(|c| Value::string(c.to_string())),
        _ => {
            return Err(fault(
                exceptions::NOT_SUPPORTED,
                format!(
                    "'{}' cannot be indexed",
                    target.runtime_type().friendly_name(true)
                ),
            ));
        }
    };
    item.ok_or_else(|| fault(exceptions::ARGUMENT, format!("index {index} is out of range")))
}

fn count(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use opgraph_core::{BinaryOp, NativeFn};
    use opgraph_registry::TypeBuilder;
    use pretty_assertions::assert_eq;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        let greet: NativeFn = Rc::new(|args: &[Value]| {
            let name = args[1].as_str().unwrap_or("?");
            Ok(Value::string(format!("hello {name}")))
        });
        let size: NativeFn = Rc::new(|_: &[Value]| Ok(Value::Int32(3)));
        registry
            .register(
                TypeBuilder::reference("Demo.Box")
                    .field("Label", DataType::String)
                    .property("Size", DataType::Int32, size)
                    .method("Greet", vec![DataType::String], DataType::String, greet)
                    .build(),
            )
            .unwrap();
        registry
    }

    fn boxed() -> Value {
        Value::object("Demo.Box", vec![Value::string("crate")])
    }

    #[test]
    fn get_member_on_builtins_and_objects() {
        let registry = registry();
        let length = CallSite::get_member("Length", DataType::Int32);
        assert_eq!(invoke(&registry, &length, &[Value::string("héllo")]), Ok(Value::Int32(5)));

        let label = CallSite::get_member("Label", DataType::Object);
        assert_eq!(invoke(&registry, &label, &[boxed()]), Ok(Value::string("crate")));

        let size = CallSite::get_member("Size", DataType::Int64);
        assert_eq!(invoke(&registry, &size, &[boxed()]), Ok(Value::Int64(3)));
    }

    #[test]
    fn missing_member_raises() {
        let registry = registry();
        let site = CallSite::get_member("Nope", DataType::Object);
        let err = invoke(&registry, &site, &[boxed()]).unwrap_err();
        assert_eq!(
            err.exception_message().unwrap(),
            "'Demo.Box' does not contain a definition for 'Nope'"
        );
    }

    #[test]
    fn set_member_writes_through_the_reference() {
        let registry = registry();
        let target = boxed();
        let site = CallSite::new(
            Binder::SetMember {
                name: "Label".into(),
            },
            2,
            DataType::Object,
        );
        invoke(&registry, &site, &[target.clone(), Value::string("lid")]).unwrap();
        let label = CallSite::get_member("Label", DataType::Object);
        assert_eq!(invoke(&registry, &label, &[target]), Ok(Value::string("lid")));
    }

    #[test]
    fn invoke_member_binds_on_runtime_types() {
        let registry = registry();
        let site = CallSite::invoke_member("Greet", 2, DataType::String);
        assert_eq!(
            invoke(&registry, &site, &[boxed(), Value::string("bob")]),
            Ok(Value::string("hello bob"))
        );
        let err = invoke(&registry, &site, &[boxed(), Value::Int32(1)]).unwrap_err();
        assert_eq!(err.runtime_type(), DataType::named(exceptions::INVALID_OPERATION));
    }

    #[test]
    fn indexing_and_operators() {
        let registry = TypeRegistry::with_builtins();
        let items = Value::sequence(DataType::Int32, vec![Value::Int32(7), Value::Int32(8)]);
        let index = CallSite::new(Binder::GetIndex, 2, DataType::Object);
        assert_eq!(invoke(&registry, &index, &[items.clone(), Value::Int32(1)]), Ok(Value::Int32(8)));
        let err = invoke(&registry, &index, &[items, Value::Int32(2)]).unwrap_err();
        assert_eq!(err.runtime_type(), DataType::named(exceptions::ARGUMENT));

        let add = CallSite::new(Binder::BinaryOperation(BinaryOp::Add), 2, DataType::Object);
        assert_eq!(
            invoke(&registry, &add, &[Value::Int32(2), Value::float(0.5)]),
            Ok(Value::float(2.5))
        );
    }

    #[test]
    fn null_target_and_unsupported_binders() {
        let registry = TypeRegistry::with_builtins();
        let length = CallSite::get_member("Length", DataType::Int32);
        let err = invoke(&registry, &length, &[Value::Null]).unwrap_err();
        assert_eq!(err.runtime_type(), DataType::named(exceptions::NULL_REFERENCE));

        let call = CallSite::new(Binder::Invoke, 1, DataType::Object);
        let err = invoke(&registry, &call, &[Value::string("f")]).unwrap_err();
        assert_eq!(err.runtime_type(), DataType::named(exceptions::NOT_SUPPORTED));
    }
}
