//! Literal forms of constant values.

use std::fmt::Write;

use opgraph_core::{RenderError, Value};

/// Write the literal form of `value`.
///
/// Objects, structs and iterators have no literal form.
pub(crate) fn write_literal(out: &mut String, value: &Value) -> Result<(), RenderError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => write!(out, "{b}")?,
        Value::Int32(n) => write!(out, "{n}")?,
        Value::Int64(n) => write!(out, "{n}")?,
        Value::Float64(f) => write_float(out, f.into_inner())?,
        Value::Str(s) => write_string(out, s)?,
        Value::Sequence(seq) => {
            out.push('[');
            for (i, item) in seq.items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_literal(out, item)?;
            }
            out.push(']');
        }
        other => {
            return Err(RenderError::Unsupported {
                construct: format!(
                    "a constant of type '{}'",
                    other.runtime_type().friendly_name(true)
                ),
            });
        }
    }
    Ok(())
}

fn write_float(out: &mut String, f: f64) -> Result<(), RenderError> {
    if f.is_nan() {
        out.push_str("nan");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "inf" } else { "-inf" });
    } else {
        write!(out, "{f:?}")?;
    }
    Ok(())
}

/// Write a double-quoted string with escapes.
pub(crate) fn write_string(out: &mut String, s: &str) -> Result<(), RenderError> {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                write!(out, "\\u{{{:x}}}", c as u32)?;
            }
            c => out.push(c),
        }
    }
    out.push('"');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opgraph_core::DataType;

    fn lit(value: &Value) -> String {
        let mut out = String::new();
        write_literal(&mut out, value).unwrap();
        out
    }

    #[test]
    fn primitives() {
        assert_eq!(lit(&Value::Int32(-7)), "-7");
        assert_eq!(lit(&Value::Bool(true)), "true");
        assert_eq!(lit(&Value::Null), "null");
    }

    #[test]
    fn floats_keep_a_fraction() {
        assert_eq!(lit(&Value::float(2.0)), "2.0");
        assert_eq!(lit(&Value::float(f64::NAN)), "nan");
        assert_eq!(lit(&Value::float(f64::NEG_INFINITY)), "-inf");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(lit(&Value::string("a\"b\\c\n")), r#""a\"b\\c\n""#);
        assert_eq!(lit(&Value::string("\u{1}")), r#""\u{1}""#);
    }

    #[test]
    fn control_characters_use_unicode_escapes() {
        let mut out = String::from("label(");
        write_string(&mut out, "tab\there\u{7f}").unwrap();
        assert_eq!(out, r#"label("tab\there\u{7f}""#);
    }

    #[test]
    fn sequences_nest() {
        let seq = Value::sequence(DataType::Int32, vec![Value::Int32(1), Value::Int32(2)]);
        assert_eq!(lit(&seq), "[1, 2]");
    }

    #[test]
    fn objects_have_no_literal() {
        let mut out = String::new();
        let err = write_literal(&mut out, &Value::exception("System.Exception", "x")).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }
}
