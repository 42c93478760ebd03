use crate::reflect::FileHeader;
use std::fmt;
use thiserror::Error;

/// Dynamic cell tree mirroring a model instance.
///
/// Struct fields are positional, in declaration order, so a field-index
/// path resolves without name lookups.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Struct(Vec<Value>),
    File(FileHeader),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValueError {
    #[error("cannot convert {found} into {expected}")]
    Mismatch { expected: String, found: &'static str },

    #[error("cannot parse {input:?} as {expected}: {reason}")]
    Parse {
        expected: String,
        input: String,
        reason: String,
    },

    #[error("{ty} does not support {operation}")]
    Unsupported { ty: String, operation: &'static str },

    #[error("field {field}: {source}")]
    Field {
        field: &'static str,
        #[source]
        source: Box<ValueError>,
    },
}

impl ValueError {
    pub fn mismatch(expected: impl Into<String>, found: &Value) -> Self {
        Self::Mismatch {
            expected: expected.into(),
            found: found.kind_name(),
        }
    }

    pub fn parse(expected: impl Into<String>, input: &str, reason: impl fmt::Display) -> Self {
        Self::Parse {
            expected: expected.into(),
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
            Value::File(_) => "file",
        }
    }

    /// Zero, nil or zero-length. Structs and files are never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !*b,
            Value::Int(i) => *i == 0,
            Value::Uint(u) => *u == 0,
            Value::Float(f) => *f == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            Value::Struct(_) | Value::File(_) => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Length for strings, bytes and collections.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.len()),
            Value::Bytes(b) => Some(b.len()),
            Value::List(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            _ => None,
        }
    }

    /// Text used to order map keys and to name map entries in error paths.
    pub fn key_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Uint(u) => u.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            other => other.to_string(),
        }
    }

    /// Takes the positional fields of a struct value, padding absent ones with `Null`.
    pub fn into_fields(self, count: usize) -> Result<Vec<Value>, ValueError> {
        match self {
            Value::Struct(mut fields) => {
                fields.resize(count, Value::Null);
                Ok(fields)
            }
            Value::Null => Ok(vec![Value::Null; count]),
            other => Err(ValueError::mismatch("struct", &other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("<nil>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Uint(u) => write!(f, "{}", u),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("map[")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}:{}", k, v)?;
                }
                f.write_str("]")
            }
            Value::Struct(fields) => {
                f.write_str("{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", field)?;
                }
                f.write_str("}")
            }
            Value::File(file) => f.write_str(&file.filename),
        }
    }
}
