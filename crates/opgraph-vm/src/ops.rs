//! Operators and conversions on runtime values.
//!
//! Numeric operands are widened to the wider of the two (`int < long <
//! double`) before the operation. Integer arithmetic wraps; integer
//! division by zero raises `System.DivideByZeroException`. Every fault is
//! returned as an exception value.

use opgraph_core::{BinaryOp, DataType, UnaryOp, Value, exceptions};
use opgraph_registry::TypeRegistry;

/// Build an exception value of a built-in type.
pub(crate) fn fault(type_name: &str, message: impl AsRef<str>) -> Value {
    Value::exception(type_name, message)
}

pub(crate) fn null_reference(what: impl std::fmt::Display) -> Value {
    fault(exceptions::NULL_REFERENCE, format!("{what} on a null reference"))
}

// ============================================================================
// Numbers
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i32),
    Long(i64),
    Double(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Int32(v) => Some(Num::Int(*v)),
            Value::Int64(v) => Some(Num::Long(*v)),
            Value::Float64(v) => Some(Num::Double(v.0)),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Num::Int(_) => 0,
            Num::Long(_) => 1,
            Num::Double(_) => 2,
        }
    }

    fn widen(self, rank: u8) -> Num {
        match (self, rank) {
            (Num::Int(v), 1) => Num::Long(i64::from(v)),
            (Num::Int(v), 2) => Num::Double(f64::from(v)),
            (Num::Long(v), 2) => Num::Double(v as f64),
            (num, _) => num,
        }
    }

    /// Both operands at the wider rank.
    fn pair(left: Num, right: Num) -> (Num, Num) {
        let rank = left.rank().max(right.rank());
        (left.widen(rank), right.widen(rank))
    }
}

macro_rules! integer_op {
    ($op:expr, $x:expr, $y:expr, $wrap:expr) => {
        match $op {
            BinaryOp::Add => Ok($wrap($x.wrapping_add($y))),
            BinaryOp::Sub => Ok($wrap($x.wrapping_sub($y))),
            BinaryOp::Mul => Ok($wrap($x.wrapping_mul($y))),
            BinaryOp::Div if $y == 0 => Err(divide_by_zero()),
            BinaryOp::Div => Ok($wrap($x.wrapping_div($y))),
            BinaryOp::Rem if $y == 0 => Err(divide_by_zero()),
            BinaryOp::Rem => Ok($wrap($x.wrapping_rem($y))),
            BinaryOp::Eq => Ok(Value::Bool($x == $y)),
            BinaryOp::Ne => Ok(Value::Bool($x != $y)),
            BinaryOp::Lt => Ok(Value::Bool($x < $y)),
            BinaryOp::Le => Ok(Value::Bool($x <= $y)),
            BinaryOp::Gt => Ok(Value::Bool($x > $y)),
            BinaryOp::Ge => Ok(Value::Bool($x >= $y)),
            BinaryOp::And | BinaryOp::Or => Err(invalid_operands($op, "numbers")),
        }
    };
}

fn numeric(op: BinaryOp, left: Num, right: Num) -> Result<Value, Value> {
    match Num::pair(left, right) {
        (Num::Int(x), Num::Int(y)) => integer_op!(op, x, y, Value::Int32),
        (Num::Long(x), Num::Long(y)) => integer_op!(op, x, y, Value::Int64),
        (Num::Double(x), Num::Double(y)) => match op {
            BinaryOp::Add => Ok(Value::float(x + y)),
            BinaryOp::Sub => Ok(Value::float(x - y)),
            BinaryOp::Mul => Ok(Value::float(x * y)),
            BinaryOp::Div => Ok(Value::float(x / y)),
            BinaryOp::Rem => Ok(Value::float(x % y)),
            BinaryOp::Eq => Ok(Value::Bool(x == y)),
            BinaryOp::Ne => Ok(Value::Bool(x != y)),
            BinaryOp::Lt => Ok(Value::Bool(x < y)),
            BinaryOp::Le => Ok(Value::Bool(x <= y)),
            BinaryOp::Gt => Ok(Value::Bool(x > y)),
            BinaryOp::Ge => Ok(Value::Bool(x >= y)),
            BinaryOp::And | BinaryOp::Or => Err(invalid_operands(op, "numbers")),
        },
        _ => Err(fault(exceptions::INVALID_OPERATION, "mismatched numeric operands")),
    }
}

fn divide_by_zero() -> Value {
    fault(exceptions::DIVIDE_BY_ZERO, "Attempted to divide by zero.")
}

fn invalid_operands(op: BinaryOp, what: &str) -> Value {
    fault(
        exceptions::INVALID_OPERATION,
        format!("operator '{}' is not defined for {what}", op.name()),
    )
}

// ============================================================================
// Operators
// ============================================================================

/// Equality with numeric widening; references compare by identity.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (Num::of(left), Num::of(right)) {
        (Some(l), Some(r)) => matches!(numeric(BinaryOp::Eq, l, r), Ok(Value::Bool(true))),
        _ => left == right,
    }
}

/// Apply a binary operator to evaluated operands. `and`/`or` here do not
/// short-circuit; the interpreter handles that before evaluating the right
/// operand.
pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Value> {
    if let (Some(l), Some(r)) = (Num::of(left), Num::of(right)) {
        return numeric(op, l, r);
    }
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => return Ok(Value::Bool(!values_equal(left, right))),
        _ => {}
    }
    match (left, right) {
        (Value::Bool(l), Value::Bool(r)) => match op {
            BinaryOp::And => Ok(Value::Bool(*l && *r)),
            BinaryOp::Or => Ok(Value::Bool(*l || *r)),
            _ => Err(invalid_operands(op, "booleans")),
        },
        (Value::Str(_), _) | (_, Value::Str(_)) if op == BinaryOp::Add => {
            Ok(Value::string(format!("{}{}", text_of(left), text_of(right))))
        }
        (Value::Str(l), Value::Str(r)) if op.is_comparison() => {
            let ordering = l.cmp(r);
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        (Value::Null, _) | (_, Value::Null) => {
            Err(null_reference(format_args!("operator '{}'", op.name())))
        }
        _ => Err(invalid_operands(op, "these operands")),
    }
}

/// Concatenation text; `null` is empty.
fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub(crate) fn unary(op: UnaryOp, operand: &Value) -> Result<Value, Value> {
    match (op, operand) {
        (UnaryOp::Neg, Value::Int32(v)) => Ok(Value::Int32(v.wrapping_neg())),
        (UnaryOp::Neg, Value::Int64(v)) => Ok(Value::Int64(v.wrapping_neg())),
        (UnaryOp::Neg, Value::Float64(v)) => Ok(Value::float(-v.0)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (_, Value::Null) => Err(null_reference(format_args!("operator '{}'", op.name()))),
        _ => Err(fault(
            exceptions::INVALID_OPERATION,
            format!(
                "operator '{}' is not defined for '{}'",
                op.name(),
                operand.runtime_type().friendly_name(true)
            ),
        )),
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Convert `value` to `ty`.
///
/// Numbers convert between each other (narrowing truncates); references
/// convert when the runtime type is assignable to `ty`; anything else
/// raises `System.InvalidCastException`.
pub(crate) fn convert(registry: &TypeRegistry, value: Value, ty: &DataType) -> Result<Value, Value> {
    if value.is_null() {
        return if ty.is_nullable() && !registry.is_value_type(ty) {
            Ok(Value::Null)
        } else {
            Err(invalid_cast(&value, ty))
        };
    }
    if let Some(num) = Num::of(&value) {
        let converted = match (ty, num) {
            (DataType::Int32, Num::Int(v)) => Some(Value::Int32(v)),
            (DataType::Int32, Num::Long(v)) => Some(Value::Int32(v as i32)),
            (DataType::Int32, Num::Double(v)) => Some(Value::Int32(v as i32)),
            (DataType::Int64, Num::Int(v)) => Some(Value::Int64(i64::from(v))),
            (DataType::Int64, Num::Long(v)) => Some(Value::Int64(v)),
            (DataType::Int64, Num::Double(v)) => Some(Value::Int64(v as i64)),
            (DataType::Float64, num) => match num.widen(2) {
                Num::Double(v) => Some(Value::float(v)),
                _ => None,
            },
            _ => None,
        };
        if let Some(converted) = converted {
            return Ok(converted);
        }
    }
    if matches!(ty, DataType::Object) || registry.is_instance(&value, ty) {
        Ok(value)
    } else {
        Err(invalid_cast(&value, ty))
    }
}

fn invalid_cast(value: &Value, ty: &DataType) -> Value {
    let from = if value.is_null() {
        "null".to_string()
    } else {
        value.runtime_type().friendly_name(true)
    };
    fault(
        exceptions::INVALID_CAST,
        format!("cannot convert '{from}' to '{}'", ty.friendly_name(true)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(exception: &Value) -> String {
        exception.exception_message().unwrap_or_default()
    }

    #[test]
    fn widening_arithmetic() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::Int32(2), &Value::Int64(3)),
            Ok(Value::Int64(5))
        );
        assert_eq!(
            binary(BinaryOp::Mul, &Value::Int32(2), &Value::float(1.5)),
            Ok(Value::float(3.0))
        );
    }

    #[test]
    fn integer_overflow_wraps() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::Int32(i32::MAX), &Value::Int32(1)),
            Ok(Value::Int32(i32::MIN))
        );
    }

    #[test]
    fn integer_division_by_zero_raises() {
        let err = binary(BinaryOp::Div, &Value::Int32(1), &Value::Int32(0)).unwrap_err();
        assert_eq!(
            err.runtime_type(),
            DataType::named(exceptions::DIVIDE_BY_ZERO)
        );
        let float = binary(BinaryOp::Div, &Value::float(1.0), &Value::float(0.0)).unwrap();
        assert_eq!(float, Value::float(f64::INFINITY));
    }

    #[test]
    fn string_concatenation_and_ordering() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::string("n="), &Value::Int32(4)),
            Ok(Value::string("n=4"))
        );
        assert_eq!(
            binary(BinaryOp::Lt, &Value::string("abc"), &Value::string("abd")),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn equality_widens_and_handles_null() {
        assert!(values_equal(&Value::Int32(3), &Value::float(3.0)));
        assert_eq!(
            binary(BinaryOp::Eq, &Value::Null, &Value::string("x")),
            Ok(Value::Bool(false))
        );
        let err = binary(BinaryOp::Lt, &Value::Null, &Value::Bool(true)).unwrap_err();
        assert!(message(&err).contains("null reference"));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(unary(UnaryOp::Neg, &Value::Int32(5)), Ok(Value::Int32(-5)));
        assert_eq!(unary(UnaryOp::Not, &Value::Bool(false)), Ok(Value::Bool(true)));
        assert!(unary(UnaryOp::Not, &Value::Int32(1)).is_err());
    }

    #[test]
    fn conversions() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(
            convert(&registry, Value::float(2.9), &DataType::Int32),
            Ok(Value::Int32(2))
        );
        assert_eq!(
            convert(&registry, Value::Int32(7), &DataType::Float64),
            Ok(Value::float(7.0))
        );
        let argument = Value::exception(exceptions::ARGUMENT, "x");
        let base = DataType::named(exceptions::EXCEPTION);
        assert_eq!(convert(&registry, argument.clone(), &base), Ok(argument.clone()));
        let err = convert(&registry, argument, &DataType::named(exceptions::INVALID_CAST)).unwrap_err();
        assert_eq!(err.runtime_type(), DataType::named(exceptions::INVALID_CAST));
        assert!(convert(&registry, Value::Null, &DataType::Int32).is_err());
        assert_eq!(convert(&registry, Value::Null, &DataType::String), Ok(Value::Null));
    }
}
