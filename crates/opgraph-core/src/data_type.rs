//! DataType - the static type of a variable, expression or member.
//!
//! Primitive types have fixed keyword spellings (`int`, `string`, ...).
//! Sequences and iterators are generic over an element type. Everything
//! else is a [`QualifiedName`] resolved through the type registry.
//!
//! # Example
//!
//! ```
//! use opgraph_core::DataType;
//!
//! let list = DataType::sequence(DataType::Int32);
//! assert_eq!(list.to_string(), "seq<int>");
//!
//! let stream = DataType::named("System.IO.Stream");
//! assert_eq!(stream.friendly_name(false), "Stream");
//! assert_eq!(stream.friendly_name(true), "System.IO.Stream");
//! ```

use std::fmt::{self, Display, Formatter};

use crate::{QualifiedName, TypeHash};

/// A complete static type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// No value.
    Void,
    /// `bool`
    Bool,
    /// `int` - 32-bit signed integer.
    Int32,
    /// `long` - 64-bit signed integer.
    Int64,
    /// `double` - 64-bit float.
    Float64,
    /// `string` - immutable text, reference semantics, nullable.
    String,
    /// `object` - the top reference type every non-void type widens to.
    Object,
    /// `seq<T>` - an immutable, enumerable sequence.
    Sequence(Box<DataType>),
    /// `iter<T>` - a disposable cursor over a sequence.
    Iterator(Box<DataType>),
    /// A type registered by name.
    Named(QualifiedName),
}

impl DataType {
    /// Create a sequence type.
    pub fn sequence(element: DataType) -> Self {
        DataType::Sequence(Box::new(element))
    }

    /// Create an iterator type.
    pub fn iterator(element: DataType) -> Self {
        DataType::Iterator(Box::new(element))
    }

    /// Create a named type.
    pub fn named(name: impl AsRef<str>) -> Self {
        DataType::Named(QualifiedName::new(name))
    }

    /// Resolve a primitive keyword (`int`, `string`, ...).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "void" => DataType::Void,
            "bool" => DataType::Bool,
            "int" => DataType::Int32,
            "long" => DataType::Int64,
            "double" => DataType::Float64,
            "string" => DataType::String,
            "object" => DataType::Object,
            _ => return None,
        })
    }

    /// Check if this is `void`.
    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, DataType::Void)
    }

    /// Check if this is a numeric primitive.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    /// Widening rank of numeric primitives: `int < long < double`.
    pub fn numeric_rank(&self) -> Option<u8> {
        match self {
            DataType::Int32 => Some(0),
            DataType::Int64 => Some(1),
            DataType::Float64 => Some(2),
            _ => None,
        }
    }

    /// The wider of two numeric types, if both are numeric.
    pub fn promote(left: &DataType, right: &DataType) -> Option<DataType> {
        let l = left.numeric_rank()?;
        let r = right.numeric_rank()?;
        Some(if l >= r { left.clone() } else { right.clone() })
    }

    /// Element type of a sequence or iterator.
    pub fn element_type(&self) -> Option<&DataType> {
        match self {
            DataType::Sequence(elem) | DataType::Iterator(elem) => Some(elem),
            _ => None,
        }
    }

    /// The registered name, for named types.
    pub fn name(&self) -> Option<&QualifiedName> {
        match self {
            DataType::Named(name) => Some(name),
            _ => None,
        }
    }

    /// Whether `null` is a valid value of this type.
    ///
    /// Named types can be value types; the registry has the final word
    /// for those, so they report `true` here.
    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            DataType::String
                | DataType::Object
                | DataType::Sequence(_)
                | DataType::Iterator(_)
                | DataType::Named(_)
        )
    }

    /// Deterministic identity of this type.
    pub fn type_hash(&self) -> TypeHash {
        match self {
            DataType::Named(name) => name.type_hash(),
            other => TypeHash::from_name(&other.friendly_name(true)),
        }
    }

    /// Human-readable rendering, generics-aware.
    ///
    /// With `fully_qualify` named types keep their namespace, otherwise
    /// only the simple name is printed.
    pub fn friendly_name(&self, fully_qualify: bool) -> String {
        let mut out = String::new();
        self.write_name(&mut out, fully_qualify);
        out
    }

    fn write_name(&self, out: &mut String, fully_qualify: bool) {
        match self {
            DataType::Void => out.push_str("void"),
            DataType::Bool => out.push_str("bool"),
            DataType::Int32 => out.push_str("int"),
            DataType::Int64 => out.push_str("long"),
            DataType::Float64 => out.push_str("double"),
            DataType::String => out.push_str("string"),
            DataType::Object => out.push_str("object"),
            DataType::Sequence(elem) => {
                out.push_str("seq<");
                elem.write_name(out, fully_qualify);
                out.push('>');
            }
            DataType::Iterator(elem) => {
                out.push_str("iter<");
                elem.write_name(out, fully_qualify);
                out.push('>');
            }
            DataType::Named(name) if fully_qualify => out.push_str(name.as_str()),
            DataType::Named(name) => out.push_str(name.simple_name()),
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.friendly_name(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_round_trip() {
        for keyword in ["void", "bool", "int", "long", "double", "string", "object"] {
            let ty = DataType::from_keyword(keyword).unwrap();
            assert_eq!(ty.friendly_name(true), keyword);
        }
        assert_eq!(DataType::from_keyword("Widget"), None);
    }

    #[test]
    fn nested_generics_render() {
        let ty = DataType::sequence(DataType::iterator(DataType::named("Demo.Widget")));
        assert_eq!(ty.friendly_name(false), "seq<iter<Widget>>");
        assert_eq!(ty.friendly_name(true), "seq<iter<Demo.Widget>>");
    }

    #[test]
    fn promotion_picks_wider() {
        assert_eq!(
            DataType::promote(&DataType::Int32, &DataType::Float64),
            Some(DataType::Float64)
        );
        assert_eq!(
            DataType::promote(&DataType::Int64, &DataType::Int32),
            Some(DataType::Int64)
        );
        assert_eq!(DataType::promote(&DataType::Int32, &DataType::String), None);
    }

    #[test]
    fn element_type_of_iterator() {
        let ty = DataType::iterator(DataType::String);
        assert_eq!(ty.element_type(), Some(&DataType::String));
        assert_eq!(DataType::Int32.element_type(), None);
    }

    #[test]
    fn type_hash_distinguishes_generics() {
        assert_ne!(
            DataType::sequence(DataType::Int32).type_hash(),
            DataType::sequence(DataType::Int64).type_hash()
        );
    }
}
