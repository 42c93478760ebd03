//! Scalar <-> text conversion driven by [`TypeInfo`].
//!
//! Used by the plain-text codec and when applying default literals.

use crate::reflect::{TypeInfo, TypeKind, Value, ValueError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Renders a scalar cell as text. Byte strings are base64 encoded.
pub fn marshal_text(value: &Value, ty: &TypeInfo) -> Result<String, ValueError> {
    if let TypeKind::Option(inner) = ty.kind {
        return match value {
            Value::Null => Ok(String::new()),
            other => marshal_text(other, &inner()),
        };
    }
    match (value, &ty.kind) {
        (Value::Null, _) => Ok(String::new()),
        (Value::Bool(b), _) => Ok(b.to_string()),
        (Value::Int(i), _) => Ok(i.to_string()),
        (Value::Uint(u), _) => Ok(u.to_string()),
        (Value::Float(f), TypeKind::Float { bits: 32 }) => Ok((*f as f32).to_string()),
        (Value::Float(f), _) => Ok(f.to_string()),
        (Value::String(s), _) => Ok(s.clone()),
        (Value::Bytes(b), _) => Ok(STANDARD.encode(b)),
        (Value::File(file), _) => Ok(file.filename.clone()),
        _ => Err(ValueError::Unsupported {
            ty: ty.kind_name(),
            operation: "text marshalling",
        }),
    }
}

/// Parses text into a scalar cell of the given type.
pub fn unmarshal_text(text: &str, ty: &TypeInfo) -> Result<Value, ValueError> {
    match &ty.kind {
        TypeKind::Option(inner) => {
            if text.is_empty() {
                Ok(Value::Null)
            } else {
                unmarshal_text(text, &inner())
            }
        }
        TypeKind::Bool => parse_bool(text).map(Value::Bool),
        TypeKind::Int { bits } => parse_int(text, *bits).map(Value::Int),
        TypeKind::Uint { bits } => parse_uint(text, *bits).map(Value::Uint),
        TypeKind::Float { bits } => {
            if text.is_empty() {
                return Ok(Value::Float(0.0));
            }
            let parsed = text
                .trim()
                .parse::<f64>()
                .map_err(|e| ValueError::parse(ty.kind_name(), text, e))?;
            if *bits == 32 && parsed.is_finite() && parsed.abs() > f32::MAX as f64 {
                return Err(ValueError::parse(ty.kind_name(), text, "value out of range"));
            }
            Ok(Value::Float(parsed))
        }
        TypeKind::String | TypeKind::Text => Ok(Value::String(text.to_string())),
        TypeKind::Bytes => STANDARD
            .decode(text)
            .map(Value::Bytes)
            .map_err(|e| ValueError::parse("bytes", text, e)),
        _ => Err(ValueError::Unsupported {
            ty: ty.kind_name(),
            operation: "text unmarshalling",
        }),
    }
}

/// Accepts `1`/`0`, `t`/`f` and `true`/`false` in the usual casings.
pub fn parse_bool(text: &str) -> Result<bool, ValueError> {
    match text {
        "" | "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        other => Err(ValueError::parse("bool", other, "invalid syntax")),
    }
}

pub fn parse_int(text: &str, bits: u8) -> Result<i64, ValueError> {
    if text.is_empty() {
        return Ok(0);
    }
    let parsed = text
        .trim()
        .parse::<i64>()
        .map_err(|e| ValueError::parse(format!("int{}", bits), text, e))?;
    let (min, max) = int_bounds(bits);
    if parsed < min || parsed > max {
        return Err(ValueError::parse(
            format!("int{}", bits),
            text,
            "value out of range",
        ));
    }
    Ok(parsed)
}

pub fn parse_uint(text: &str, bits: u8) -> Result<u64, ValueError> {
    if text.is_empty() {
        return Ok(0);
    }
    let parsed = text
        .trim()
        .parse::<u64>()
        .map_err(|e| ValueError::parse(format!("uint{}", bits), text, e))?;
    if parsed > uint_max(bits) {
        return Err(ValueError::parse(
            format!("uint{}", bits),
            text,
            "value out of range",
        ));
    }
    Ok(parsed)
}

pub fn int_bounds(bits: u8) -> (i64, i64) {
    if bits == 0 || bits >= 64 {
        (i64::MIN, i64::MAX)
    } else {
        let max = (1i64 << (bits - 1)) - 1;
        (-max - 1, max)
    }
}

pub fn uint_max(bits: u8) -> u64 {
    if bits == 0 || bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Model;

    #[test]
    fn test_bytes_render_as_base64() {
        let ty = <Vec<u8>>::type_info();
        let text = marshal_text(&Value::Bytes(b"bytes".to_vec()), &ty).unwrap();
        assert_eq!(text, "Ynl0ZXM=");
        assert_eq!(
            unmarshal_text(&text, &ty).unwrap(),
            Value::Bytes(b"bytes".to_vec())
        );
    }

    #[test]
    fn test_int_bit_size_is_enforced() {
        let ty = i8::type_info();
        assert_eq!(unmarshal_text("127", &ty).unwrap(), Value::Int(127));
        assert!(unmarshal_text("128", &ty).is_err());
        assert!(unmarshal_text("abc", &ty).is_err());
    }

    #[test]
    fn test_option_empty_text_is_null() {
        let ty = <Option<i32>>::type_info();
        assert_eq!(unmarshal_text("", &ty).unwrap(), Value::Null);
        assert_eq!(unmarshal_text("3", &ty).unwrap(), Value::Int(3));
        assert_eq!(marshal_text(&Value::Null, &ty).unwrap(), "");
    }

    #[test]
    fn test_bool_spellings() {
        assert!(parse_bool("TRUE").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("yes").is_err());
    }

    #[test]
    fn test_bounds() {
        assert_eq!(int_bounds(8), (-128, 127));
        assert_eq!(int_bounds(64), (i64::MIN, i64::MAX));
        assert_eq!(uint_max(16), 65535);
    }
}
