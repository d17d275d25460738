//! Runtime values.
//!
//! Values are produced by constants, by native members and by the
//! interpreter. Reference objects and iterators have identity semantics
//! ([`Shared`]); value structs are copied on assignment.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

use ordered_float::OrderedFloat;

use crate::{DataType, QualifiedName};

/// Names of the built-in exception types raised by the runtime.
pub mod exceptions {
    /// Root of every exception type.
    pub const EXCEPTION: &str = "System.Exception";
    /// Operation not valid in the current state.
    pub const INVALID_OPERATION: &str = "System.InvalidOperationException";
    /// Invalid argument passed to a member.
    pub const ARGUMENT: &str = "System.ArgumentException";
    /// Integer division by zero.
    pub const DIVIDE_BY_ZERO: &str = "System.DivideByZeroException";
    /// Member access on `null`.
    pub const NULL_REFERENCE: &str = "System.NullReferenceException";
    /// Failed conversion.
    pub const INVALID_CAST: &str = "System.InvalidCastException";
    /// Operation not supported by the target.
    pub const NOT_SUPPORTED: &str = "System.NotSupportedException";
    /// Use of a disposed resource.
    pub const OBJECT_DISPOSED: &str = "System.ObjectDisposedException";
}

/// Reference wrapper with identity equality and hashing.
pub struct Shared<T>(pub Rc<T>);

impl<T> Shared<T> {
    /// Wrap a new value.
    pub fn new(value: T) -> Self {
        Self(Rc::new(value))
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for Shared<T> {}

impl<T> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An immutable sequence together with its element type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceValue {
    /// Static element type.
    pub element: DataType,
    /// The items, shared between copies.
    pub items: Rc<[Value]>,
}

/// A heap object with reference semantics.
#[derive(Debug)]
pub struct ObjectValue {
    /// Runtime type.
    pub type_name: QualifiedName,
    /// Instance fields, indexed by `FieldInfo::index`.
    pub fields: RefCell<Vec<Value>>,
}

/// A value-typed struct. Assignment copies it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructValue {
    /// Runtime type.
    pub type_name: QualifiedName,
    /// Instance fields, indexed by `FieldInfo::index`.
    pub fields: Vec<Value>,
}

/// Cursor state of an iterator over a sequence.
#[derive(Debug)]
pub struct IteratorState {
    /// The sequence being walked.
    pub source: SequenceValue,
    /// `None` before the first advance.
    pub position: Cell<Option<usize>>,
    /// Set once the iterator has been disposed.
    pub disposed: Cell<bool>,
}

impl IteratorState {
    /// Start a new cursor positioned before the first element.
    pub fn new(source: SequenceValue) -> Self {
        Self {
            source,
            position: Cell::new(None),
            disposed: Cell::new(false),
        }
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// The null reference.
    Null,
    /// `bool`
    Bool(bool),
    /// `int`
    Int32(i32),
    /// `long`
    Int64(i64),
    /// `double`
    Float64(OrderedFloat<f64>),
    /// `string`
    Str(Rc<str>),
    /// `seq<T>`
    Sequence(SequenceValue),
    /// `iter<T>`
    Iterator(Shared<IteratorState>),
    /// Reference-typed object.
    Object(Shared<ObjectValue>),
    /// Value-typed struct.
    Struct(StructValue),
}

impl Value {
    /// Create a float value.
    pub fn float(value: f64) -> Self {
        Value::Float64(OrderedFloat(value))
    }

    /// Create a string value.
    pub fn string(value: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(value.as_ref()))
    }

    /// Create a sequence value.
    pub fn sequence(element: DataType, items: Vec<Value>) -> Self {
        Value::Sequence(SequenceValue {
            element,
            items: Rc::from(items),
        })
    }

    /// Create a reference object.
    pub fn object(type_name: impl Into<QualifiedName>, fields: Vec<Value>) -> Self {
        Value::Object(Shared::new(ObjectValue {
            type_name: type_name.into(),
            fields: RefCell::new(fields),
        }))
    }

    /// Create a value struct.
    pub fn structure(type_name: impl Into<QualifiedName>, fields: Vec<Value>) -> Self {
        Value::Struct(StructValue {
            type_name: type_name.into(),
            fields,
        })
    }

    /// Create an exception object; the message is field 0.
    pub fn exception(type_name: &str, message: impl AsRef<str>) -> Self {
        Value::object(type_name, vec![Value::string(message)])
    }

    /// Default value of a primitive type; `Null` for everything else.
    pub fn default_for(ty: &DataType) -> Self {
        match ty {
            DataType::Bool => Value::Bool(false),
            DataType::Int32 => Value::Int32(0),
            DataType::Int64 => Value::Int64(0),
            DataType::Float64 => Value::float(0.0),
            _ => Value::Null,
        }
    }

    /// Runtime type of this value. `null` reports `object`.
    pub fn runtime_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Object,
            Value::Bool(_) => DataType::Bool,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::Str(_) => DataType::String,
            Value::Sequence(seq) => DataType::sequence(seq.element.clone()),
            Value::Iterator(it) => DataType::iterator(it.source.element.clone()),
            Value::Object(obj) => DataType::Named(obj.type_name.clone()),
            Value::Struct(s) => DataType::Named(s.type_name.clone()),
        }
    }

    /// Registered type name of objects and structs.
    pub fn type_name(&self) -> Option<&QualifiedName> {
        match self {
            Value::Object(obj) => Some(&obj.type_name),
            Value::Struct(s) => Some(&s.type_name),
            _ => None,
        }
    }

    /// Check for `null`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Extract a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an `int`.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract any integer, widened to 64 bits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract any number as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(v.0),
            _ => None,
        }
    }

    /// Borrow string contents.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Message of an exception object (field 0), if present.
    pub fn exception_message(&self) -> Option<String> {
        match self {
            Value::Object(obj) => match obj.fields.borrow().first() {
                Some(Value::Str(text)) => Some(text.to_string()),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{:?}", v.0),
            Value::Str(s) => f.write_str(s),
            Value::Sequence(seq) => {
                f.write_str("[")?;
                for (i, item) in seq.items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Iterator(it) => write!(f, "<iter<{}>>", it.source.element),
            Value::Object(obj) => write!(f, "<{}>", obj.type_name),
            Value::Struct(s) => write!(f, "{} {{ {} fields }}", s.type_name, s.fields.len()),
        }
    }
}
