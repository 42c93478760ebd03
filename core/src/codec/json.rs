//! # JSON CODEC
//!
//! Documents are parsed with `serde_json` and then conformed to the target
//! [`TypeInfo`]. Conversion failures are collected per path
//! (`data.stringSlice[2]`) instead of stopping at the first one.
//!
//! Syntax errors carry the path of the container being read when the parser
//! gave up, recovered by rescanning the input up to the failing offset.

use super::{set_content_type, Codec, CodecError, ContentWriter};
use crate::params::{field_ref, field_value, params_of};
use crate::reflect::text::{int_bounds, marshal_text, uint_max, unmarshal_text};
use crate::reflect::{TypeInfo, TypeKind, Value, ValueError};
use crate::validation::{ErrorSet, Segment, ValidationError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::HeaderMap;
use serde_json::{Map, Number, Value as Json};
use std::io::Read;

pub const NAMES: &[&str] = &["json", "application/json"];

/// Struct fields are named by this tag.
pub const TAG_KEY: &str = "json";

#[derive(Debug, Clone)]
pub struct JsonCodec {
    ty: TypeInfo,
}

impl JsonCodec {
    pub fn new(ty: &TypeInfo) -> Self {
        Self { ty: ty.clone() }
    }
}

impl Codec for JsonCodec {
    fn names(&self) -> &'static [&'static str] {
        NAMES
    }

    fn named_by_tag(&self) -> &'static str {
        TAG_KEY
    }

    fn content_type(&self) -> &'static str {
        "application/json; charset=utf-8"
    }

    fn encode_to(&self, w: &mut dyn ContentWriter, value: &Value) -> Result<(), CodecError> {
        set_content_type(w, self.content_type());
        let json = to_json(value, &self.ty)?;
        let bytes = serde_json::to_vec(&json).map_err(|e| CodecError::Syntax {
            codec: "json",
            message: e.to_string(),
            path: Vec::new(),
        })?;
        w.write_all(&bytes)?;
        Ok(())
    }

    fn decode_from(
        &self,
        r: &mut dyn Read,
        value: &mut Value,
        _headers: Option<&HeaderMap>,
    ) -> Result<(), CodecError> {
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        let json: Json = serde_json::from_slice(&data).map_err(|e| syntax_error(&data, &e))?;
        decode_json(&json, &self.ty, value)
    }
}

/// Parses a JSON literal into a value of `ty`, starting from its zero value.
pub fn value_from_json_str(text: &str, ty: &TypeInfo) -> Result<Value, CodecError> {
    let json: Json =
        serde_json::from_str(text).map_err(|e| syntax_error(text.as_bytes(), &e))?;
    let mut value = ty.zero_value();
    decode_json(&json, ty, &mut value)?;
    Ok(value)
}

/// Conforms a parsed document into `target`, merging into existing struct cells.
pub fn decode_json(json: &Json, ty: &TypeInfo, target: &mut Value) -> Result<(), CodecError> {
    let mut errors = ErrorSet::new();
    conform(json, ty, &mut Vec::new(), &mut errors, target);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CodecError::Fields(errors))
    }
}

// ================================================================================================
// ENCODING
// ================================================================================================

pub fn to_json(value: &Value, ty: &TypeInfo) -> Result<Json, CodecError> {
    if let TypeKind::Option(inner) = ty.kind {
        return match value {
            Value::Null => Ok(Json::Null),
            other => to_json(other, &inner()),
        };
    }

    Ok(match (value, &ty.kind) {
        (
            Value::Null,
            TypeKind::Slice(_) | TypeKind::Map(_, _) | TypeKind::Bytes | TypeKind::File,
        ) => Json::Null,
        (Value::Null, _) => return to_json(&ty.zero_value(), ty),
        (Value::Bool(b), _) => Json::Bool(*b),
        (Value::Int(i), _) => Json::from(*i),
        (Value::Uint(u), _) => Json::from(*u),
        (Value::Float(f), kind) => {
            // float32 renders with its own shortest form: 12.3, not 12.300000190734863.
            let f = match kind {
                TypeKind::Float { bits: 32 } => (*f as f32).to_string().parse().unwrap_or(*f),
                _ => *f,
            };
            Json::Number(Number::from_f64(f).ok_or_else(|| ValueError::Unsupported {
                ty: ty.kind_name(),
                operation: "encoding non-finite numbers",
            })?)
        }
        (Value::String(s), _) => Json::String(s.clone()),
        (Value::Bytes(b), _) => Json::String(STANDARD.encode(b)),
        (Value::File(file), _) => Json::String(file.filename.clone()),
        (Value::List(items), TypeKind::Slice(elem) | TypeKind::Array(elem, _)) => {
            let elem = elem();
            Json::Array(
                items
                    .iter()
                    .map(|item| to_json(item, &elem))
                    .collect::<Result<_, _>>()?,
            )
        }
        (Value::Map(entries), TypeKind::Map(key, elem)) => {
            let (key, elem) = (key(), elem());
            let mut object = Map::new();
            for (k, v) in entries {
                object.insert(marshal_text(k, &key)?, to_json(v, &elem)?);
            }
            Json::Object(object)
        }
        (Value::Struct(_), TypeKind::Struct(_)) => {
            let mut object = Map::new();
            for param in params_of(ty, TAG_KEY).iter() {
                let Some(cell) = field_ref(value, &param.path) else {
                    continue;
                };
                if param.omitempty && cell.is_empty() {
                    continue;
                }
                object.insert(param.name.clone(), to_json(cell, &param.ty)?);
            }
            Json::Object(object)
        }
        (other, _) => return Err(ValueError::mismatch(ty.kind_name(), other).into()),
    })
}

// ================================================================================================
// DECODING
// ================================================================================================

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn mismatch(errors: &mut ErrorSet, path: &[Segment], json: &Json, ty: &TypeInfo) {
    errors.add_at(
        path,
        ValidationError::Decode(format!(
            "cannot unmarshal {} into {}",
            json_kind(json),
            ty.kind_name()
        )),
    );
}

fn overflow(errors: &mut ErrorSet, path: &[Segment], n: &Number, ty: &TypeInfo) {
    errors.add_at(
        path,
        ValidationError::Decode(format!("number {} overflows {}", n, ty.kind_name())),
    );
}

fn conform(
    json: &Json,
    ty: &TypeInfo,
    path: &mut Vec<Segment>,
    errors: &mut ErrorSet,
    target: &mut Value,
) {
    if json.is_null() {
        match ty.kind {
            TypeKind::Option(_) => *target = Value::Null,
            TypeKind::Slice(_) | TypeKind::Map(_, _) | TypeKind::Bytes => {
                *target = ty.zero_value()
            }
            _ => {}
        }
        return;
    }

    match (&ty.kind, json) {
        (TypeKind::Option(inner), _) => {
            let inner = inner();
            if target.is_null() {
                *target = inner.zero_value();
            }
            conform(json, &inner, path, errors, target);
        }
        (TypeKind::Bool, Json::Bool(b)) => *target = Value::Bool(*b),
        (TypeKind::Int { bits }, Json::Number(n)) => match n.as_i64() {
            Some(i) => {
                let (min, max) = int_bounds(*bits);
                if i < min || i > max {
                    overflow(errors, path, n, ty);
                } else {
                    *target = Value::Int(i);
                }
            }
            None if n.is_u64() => overflow(errors, path, n, ty),
            None => mismatch(errors, path, json, ty),
        },
        (TypeKind::Uint { bits }, Json::Number(n)) => match n.as_u64() {
            Some(u) if u > uint_max(*bits) => overflow(errors, path, n, ty),
            Some(u) => *target = Value::Uint(u),
            None => mismatch(errors, path, json, ty),
        },
        (TypeKind::Float { bits }, Json::Number(n)) => match n.as_f64() {
            Some(f) if *bits == 32 && f.abs() > f32::MAX as f64 => overflow(errors, path, n, ty),
            Some(f) => *target = Value::Float(f),
            None => mismatch(errors, path, json, ty),
        },
        (TypeKind::String, Json::String(s)) => *target = Value::String(s.clone()),
        (TypeKind::Text, Json::String(s)) => *target = Value::String(s.clone()),
        (TypeKind::Text, Json::Number(n)) => *target = Value::String(n.to_string()),
        (TypeKind::Bytes, Json::String(s)) => match STANDARD.decode(s) {
            Ok(bytes) => *target = Value::Bytes(bytes),
            Err(err) => errors.add_at(path, ValidationError::Decode(err.to_string())),
        },
        (TypeKind::Slice(elem), Json::Array(items)) => {
            let elem = elem();
            *target = Value::List(conform_items(items, &elem, path, errors));
        }
        (TypeKind::Array(elem, len), Json::Array(items)) => {
            let elem = elem();
            let take = items.len().min(*len);
            let mut list = conform_items(&items[..take], &elem, path, errors);
            list.resize(*len, elem.zero_value());
            *target = Value::List(list);
        }
        (TypeKind::Map(key, elem), Json::Object(object)) => {
            let (key, elem) = (key(), elem());
            let mut entries = Vec::with_capacity(object.len());
            for (k, v) in object {
                path.push(Segment::Key(k.clone()));
                match unmarshal_text(k, &key) {
                    Ok(key_value) => {
                        let mut cell = elem.zero_value();
                        conform(v, &elem, path, errors, &mut cell);
                        entries.push((key_value, cell));
                    }
                    Err(err) => errors.add_at(path, err.into()),
                }
                path.pop();
            }
            *target = Value::Map(entries);
        }
        (TypeKind::Struct(_), Json::Object(object)) => {
            if !matches!(target, Value::Struct(_)) {
                *target = ty.zero_value();
            }
            for param in params_of(ty, TAG_KEY).iter() {
                let Some(field_json) = lookup(object, &param.name) else {
                    continue;
                };
                path.push(Segment::Key(param.name.clone()));
                match field_value(target, ty, &param.path) {
                    Ok(cell) => conform(field_json, &param.ty, path, errors, cell),
                    Err(err) => errors.add_at(path, err.into()),
                }
                path.pop();
            }
        }
        _ => mismatch(errors, path, json, ty),
    }
}

fn conform_items(
    items: &[Json],
    elem: &TypeInfo,
    path: &mut Vec<Segment>,
    errors: &mut ErrorSet,
) -> Vec<Value> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            path.push(Segment::Index(i));
            let mut cell = elem.zero_value();
            conform(item, elem, path, errors, &mut cell);
            path.pop();
            cell
        })
        .collect()
}

/// Exact key first, then a case-insensitive match.
fn lookup<'j>(object: &'j Map<String, Json>, name: &str) -> Option<&'j Json> {
    object.get(name).or_else(|| {
        object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

// ================================================================================================
// SYNTAX ERROR LOCATION
// ================================================================================================

fn syntax_error(data: &[u8], err: &serde_json::Error) -> CodecError {
    let offset = byte_offset(data, err.line(), err.column());
    CodecError::Syntax {
        codec: "json",
        message: err.to_string(),
        path: path_at(data, offset),
    }
}

fn byte_offset(data: &[u8], line: usize, column: usize) -> usize {
    let mut current = 1;
    let mut start = 0;
    for (i, b) in data.iter().enumerate() {
        if current >= line {
            break;
        }
        if *b == b'\n' {
            current += 1;
            start = i + 1;
        }
    }
    (start + column.saturating_sub(1)).min(data.len())
}

enum Frame {
    Object { key: Option<String> },
    Array { index: usize },
}

/// Path of the innermost open container at `offset`.
fn path_at(data: &[u8], offset: usize) -> Vec<Segment> {
    let end = offset.min(data.len());
    let mut stack: Vec<Frame> = Vec::new();
    let mut expecting_key = false;
    let mut i = 0;

    while i < end {
        match data[i] {
            b'"' => {
                let (text, next) = scan_string(data, i + 1);
                if expecting_key {
                    if let Some(Frame::Object { key }) = stack.last_mut() {
                        *key = Some(text);
                    }
                    expecting_key = false;
                }
                i = next;
                continue;
            }
            b'{' => {
                stack.push(Frame::Object { key: None });
                expecting_key = true;
            }
            b'[' => {
                stack.push(Frame::Array { index: 0 });
                expecting_key = false;
            }
            b'}' | b']' => {
                stack.pop();
                expecting_key = false;
            }
            b',' => match stack.last_mut() {
                Some(Frame::Object { key }) => {
                    *key = None;
                    expecting_key = true;
                }
                Some(Frame::Array { index }) => *index += 1,
                None => {}
            },
            _ => {}
        }
        i += 1;
    }

    stack
        .into_iter()
        .filter_map(|frame| match frame {
            Frame::Object { key } => key.map(Segment::Key),
            Frame::Array { index } => Some(Segment::Index(index)),
        })
        .collect()
}

/// Reads a string body starting after its opening quote; returns the text and the index past the closing quote.
fn scan_string(data: &[u8], start: usize) -> (String, usize) {
    let mut j = start;
    let mut escaped = false;
    while j < data.len() {
        let b = data[j];
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b'"' {
            break;
        }
        j += 1;
    }
    let raw = &data[start..j.min(data.len())];
    let quoted = [b"\"".as_slice(), raw, b"\"".as_slice()].concat();
    let text = serde_json::from_slice::<String>(&quoted)
        .unwrap_or_else(|_| String::from_utf8_lossy(raw).into_owned());
    (text, j + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{FieldInfo, TagMap};
    use crate::Model;
    use std::collections::BTreeMap;

    struct Data;
    struct Envelope;

    fn data_info() -> TypeInfo {
        TypeInfo::structure::<Data>(
            "Data",
            vec![
                FieldInfo::new(
                    "string_slice",
                    0,
                    true,
                    false,
                    TagMap::from_pairs(&[("json", "stringSlice")]),
                    <Vec<String>>::type_info,
                ),
                FieldInfo::new(
                    "count",
                    1,
                    true,
                    false,
                    TagMap::from_pairs(&[("json", "count,omitempty")]),
                    i32::type_info,
                ),
                FieldInfo::new(
                    "secret",
                    2,
                    true,
                    false,
                    TagMap::from_pairs(&[("json", "-")]),
                    String::type_info,
                ),
            ],
        )
    }

    fn envelope_info() -> TypeInfo {
        TypeInfo::structure::<Envelope>(
            "Envelope",
            vec![FieldInfo::new(
                "data",
                0,
                true,
                false,
                TagMap::from_pairs(&[("json", "data")]),
                data_info,
            )],
        )
    }

    fn decode(text: &str, ty: &TypeInfo) -> Result<Value, CodecError> {
        let mut value = ty.zero_value();
        JsonCodec::new(ty).decode_from(&mut text.as_bytes(), &mut value, None)?;
        Ok(value)
    }

    #[test]
    fn test_encode_struct_with_tags() {
        let value = Value::Struct(vec![
            Value::List(vec![Value::String("a".into())]),
            Value::Int(0),
            Value::String("hidden".into()),
        ]);
        let mut out = Vec::new();
        JsonCodec::new(&data_info()).encode_to(&mut out, &value).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), r#"{"stringSlice":["a"]}"#);
    }

    #[test]
    fn test_decode_struct() {
        let value = decode(r#"{"data":{"stringSlice":["a","b"],"count":3}}"#, &envelope_info())
            .unwrap();
        assert_eq!(
            value,
            Value::Struct(vec![Value::Struct(vec![
                Value::List(vec![Value::String("a".into()), Value::String("b".into())]),
                Value::Int(3),
                Value::String(String::new()),
            ])])
        );
    }

    #[test]
    fn test_type_mismatch_reports_path() {
        let err = decode(r#"{"data":{"stringSlice":["a","b",3]}}"#, &envelope_info()).unwrap_err();
        let set = err.into_error_set();
        let flat = set.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].path(), "data.stringSlice[2]");
        assert_eq!(
            flat[0].error.to_string(),
            "cannot unmarshal number into string"
        );
    }

    #[test]
    fn test_syntax_error_reports_container_path() {
        let err = decode(r#"{"data":{"stringSlice":["a","b",}}"#, &envelope_info()).unwrap_err();
        let CodecError::Syntax { path, .. } = &err else {
            panic!("expected a syntax error, got {err}");
        };
        assert_eq!(crate::validation::join_path(path), "data.stringSlice[2]");
    }

    #[test]
    fn test_int_overflow() {
        let err = decode("300", &u8::type_info()).unwrap_err();
        assert!(err.to_string().contains("overflows uint8"));
        assert!(decode("1.5", &i32::type_info()).is_err());
    }

    #[test]
    fn test_map_and_array() {
        let value = decode(r#"{"b":2,"a":1}"#, &<BTreeMap<String, i32>>::type_info()).unwrap();
        assert_eq!(
            value,
            Value::Map(vec![
                (Value::String("b".into()), Value::Int(2)),
                (Value::String("a".into()), Value::Int(1)),
            ])
        );

        let value = decode("[1]", &<[i32; 2]>::type_info()).unwrap();
        assert_eq!(value, Value::List(vec![Value::Int(1), Value::Int(0)]));
    }

    #[test]
    fn test_bytes_are_base64() {
        let value = decode(r#""Ynl0ZXM=""#, &<Vec<u8>>::type_info()).unwrap();
        assert_eq!(value, Value::Bytes(b"bytes".to_vec()));
        assert_eq!(
            to_json(&value, &<Vec<u8>>::type_info()).unwrap(),
            Json::String("Ynl0ZXM=".into())
        );
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(decode("null", &<Option<i32>>::type_info()).unwrap(), Value::Null);
        assert_eq!(
            to_json(&Value::Null, &<Vec<i32>>::type_info()).unwrap(),
            Json::Null
        );
        assert_eq!(to_json(&Value::Null, &i32::type_info()).unwrap(), Json::from(0));
    }

    #[test]
    fn test_value_from_json_str() {
        assert_eq!(
            value_from_json_str("[1,2]", &<Vec<i64>>::type_info()).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert!(value_from_json_str("[1,", &<Vec<i64>>::type_info()).is_err());
    }

    #[test]
    fn test_float32_encoding() {
        assert_eq!(
            to_json(&Value::Float(12.3f32 as f64), &f32::type_info()).unwrap(),
            serde_json::json!(12.3)
        );
    }

    #[test]
    fn test_empty_body_leaves_value() {
        let value = decode("  ", &i32::type_info()).unwrap();
        assert_eq!(value, Value::Int(0));
    }
}
