//! Built-in types: the exception family and `System.Math`.

use std::rc::Rc;

use opgraph_core::{DataType, NativeFn, Value, exceptions};

use crate::{TypeBuilder, TypeRegistry};

/// Exception types deriving directly from `System.Exception`.
const DERIVED_EXCEPTIONS: [&str; 7] = [
    exceptions::INVALID_OPERATION,
    exceptions::ARGUMENT,
    exceptions::DIVIDE_BY_ZERO,
    exceptions::NULL_REFERENCE,
    exceptions::INVALID_CAST,
    exceptions::NOT_SUPPORTED,
    exceptions::OBJECT_DISPOSED,
];

pub(crate) fn register_builtins(registry: &mut TypeRegistry) {
    for (name, base) in std::iter::once((exceptions::EXCEPTION, None))
        .chain(DERIVED_EXCEPTIONS.iter().map(|n| (*n, Some(exceptions::EXCEPTION))))
    {
        let mut builder = TypeBuilder::reference(name);
        builder = match base {
            Some(base) => builder.base(base, 1),
            None => builder.field("Message", DataType::String),
        };
        let entry = builder
            .constructor(vec![], exception_ctor(name, false))
            .constructor(vec![DataType::String], exception_ctor(name, true))
            .build();
        // Names are distinct constants and bases precede derived types.
        let registered = registry.register(entry);
        debug_assert!(registered.is_ok(), "built-in exception {name}: {registered:?}");
    }

    let math = TypeBuilder::reference("System.Math")
        .static_method(
            "Max",
            vec![DataType::Int32, DataType::Int32],
            DataType::Int32,
            int_binary(i32::max),
        )
        .static_method(
            "Min",
            vec![DataType::Int32, DataType::Int32],
            DataType::Int32,
            int_binary(i32::min),
        )
        .static_method(
            "Max",
            vec![DataType::Float64, DataType::Float64],
            DataType::Float64,
            Rc::new(|args: &[Value]| {
                let (a, b) = (float_arg(args, 0)?, float_arg(args, 1)?);
                Ok(Value::float(a.max(b)))
            }),
        )
        .static_method(
            "Abs",
            vec![DataType::Int32],
            DataType::Int32,
            Rc::new(|args: &[Value]| {
                let value = int_arg(args, 0)?;
                value.checked_abs().map(Value::Int32).ok_or_else(|| {
                    Value::exception(exceptions::INVALID_OPERATION, "negating the minimum value overflows")
                })
            }),
        )
        .static_method(
            "Sqrt",
            vec![DataType::Float64],
            DataType::Float64,
            Rc::new(|args: &[Value]| Ok(Value::float(float_arg(args, 0)?.sqrt()))),
        )
        .build();
    let registered = registry.register(math);
    debug_assert!(registered.is_ok(), "System.Math: {registered:?}");
}

fn exception_ctor(name: &'static str, with_message: bool) -> NativeFn {
    Rc::new(move |args: &[Value]| {
        let message = if with_message {
            match args.first() {
                Some(Value::Str(text)) => text.to_string(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        } else {
            format!("Exception of type '{name}' was thrown.")
        };
        Ok(Value::exception(name, message))
    })
}

fn int_binary(op: fn(i32, i32) -> i32) -> NativeFn {
    Rc::new(move |args: &[Value]| Ok(Value::Int32(op(int_arg(args, 0)?, int_arg(args, 1)?))))
}

fn int_arg(args: &[Value], index: usize) -> Result<i32, Value> {
    args.get(index).and_then(Value::as_i32).ok_or_else(|| {
        Value::exception(exceptions::ARGUMENT, format!("argument {index} must be an int"))
    })
}

fn float_arg(args: &[Value], index: usize) -> Result<f64, Value> {
    args.get(index).and_then(Value::as_f64).ok_or_else(|| {
        Value::exception(exceptions::ARGUMENT, format!("argument {index} must be a number"))
    })
}
