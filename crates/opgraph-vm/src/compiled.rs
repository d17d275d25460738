//! Callable form of a compiled graph.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use opgraph_core::{DataType, Function, RuntimeError, Value};
use opgraph_registry::TypeRegistry;

use crate::interp::{Flow, Interpreter};
use crate::ops;

/// A validated function ready to be invoked.
///
/// Every call gets fresh variable storage, so a compiled function may be
/// called any number of times, including re-entrantly from native code.
pub struct CompiledFunction {
    function: Function,
    registry: Rc<TypeRegistry>,
    /// Storage slot of every parameter and local, parameters first.
    slots: FxHashMap<Rc<str>, usize>,
}

impl CompiledFunction {
    pub(crate) fn new(function: Function, registry: Rc<TypeRegistry>) -> Self {
        let slots = function
            .parameters
            .iter()
            .chain(&function.variables)
            .enumerate()
            .map(|(slot, variable)| (Rc::clone(&variable.name), slot))
            .collect();
        Self {
            function,
            registry,
            slots,
        }
    }

    /// The lowered graph being executed.
    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn parameter_types(&self) -> Vec<DataType> {
        self.function.parameter_types()
    }

    pub fn return_type(&self) -> &DataType {
        &self.function.return_type
    }

    /// Invoke with `args`, one per parameter.
    ///
    /// Each argument must be an instance of its parameter type; `null` is
    /// accepted for nullable reference parameters and numbers widen. An
    /// exception that escapes the body is reported as
    /// [`RuntimeError::Unhandled`].
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let parameters = &self.function.parameters;
        if args.len() != parameters.len() {
            return Err(RuntimeError::Arguments {
                expected: parameters.len(),
                found: args.len(),
            });
        }

        let mut values = Vec::with_capacity(self.slots.len());
        for (index, (arg, parameter)) in args.iter().zip(parameters).enumerate() {
            values.push(self.bind_argument(index, arg, &parameter.ty)?);
        }
        values.extend(
            self.function
                .variables
                .iter()
                .map(|variable| self.registry.default_value(&variable.ty)),
        );

        let mut interpreter = Interpreter::new(
            &self.registry,
            &self.function.return_type,
            &self.slots,
            values,
        );
        match interpreter.run(&self.function.body) {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(Flow::Normal | Flow::Jump(_)) => {
                Ok(self.registry.default_value(&self.function.return_type))
            }
            Err(exception) => {
                let type_name = exception.runtime_type().friendly_name(true);
                let message = exception
                    .exception_message()
                    .unwrap_or_else(|| exception.to_string());
                tracing::debug!("unhandled {type_name}: {message}");
                Err(RuntimeError::Unhandled { type_name, message })
            }
        }
    }

    fn bind_argument(&self, index: usize, arg: &Value, ty: &DataType) -> Result<Value, RuntimeError> {
        let accepted = if arg.is_null() {
            ty.is_nullable() && !self.registry.is_value_type(ty)
        } else {
            self.registry.is_instance(arg, ty)
        };
        if !accepted {
            return Err(RuntimeError::ArgumentType {
                index,
                expected: ty.friendly_name(true),
                found: if arg.is_null() {
                    "null".to_string()
                } else {
                    arg.runtime_type().friendly_name(true)
                },
            });
        }
        if ty.is_numeric() && arg.runtime_type() != *ty {
            ops::convert(&self.registry, arg.clone(), ty).map_err(|_| RuntimeError::ArgumentType {
                index,
                expected: ty.friendly_name(true),
                found: arg.runtime_type().friendly_name(true),
            })
        } else {
            Ok(arg.clone())
        }
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("parameters", &self.function.parameters)
            .field("return_type", &self.function.return_type)
            .field("slots", &self.slots.len())
            .finish()
    }
}
