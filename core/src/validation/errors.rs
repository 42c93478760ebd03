//! # VALIDATION ERRORS
//!
//! Compile-time failures ([`CompileError`]), request-time value-domain
//! failures ([`ValidationError`]) and the path-annotated tree that collects
//! them ([`ErrorSet`]). [`BadRequest`] folds everything into the 400
//! wire body ([`StatusError`]).

use crate::reflect::ValueError;
use crate::rules::RuleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ================================================================================================
// COMPILE ERRORS
// ================================================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("unknown validator @{name}")]
    UnknownRule { name: String },

    #[error("@{rule} does not support type {ty}")]
    UnsupportedType { rule: String, ty: String },

    #[error("invalid range in {rule}: {reason}")]
    InvalidRange { rule: String, reason: String },

    #[error("invalid parameter in {rule}: {reason}")]
    InvalidParam { rule: String, reason: String },

    #[error("invalid value set in {rule}: {reason}")]
    InvalidValues { rule: String, reason: String },

    #[error("field {field}: {source}")]
    Field {
        field: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    pub(crate) fn unsupported(rule: &crate::rules::Rule, ty: &crate::reflect::TypeInfo) -> Self {
        Self::UnsupportedType {
            rule: rule.name.clone(),
            ty: ty.kind_name(),
        }
    }

    pub(crate) fn range(rule: &crate::rules::Rule, reason: impl fmt::Display) -> Self {
        Self::InvalidRange {
            rule: rule.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn param(rule: &crate::rules::Rule, reason: impl fmt::Display) -> Self {
        Self::InvalidParam {
            rule: rule.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn values(rule: &crate::rules::Rule, reason: impl fmt::Display) -> Self {
        Self::InvalidValues {
            rule: rule.to_string(),
            reason: reason.to_string(),
        }
    }
}

// ================================================================================================
// VALIDATION ERRORS
// ================================================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing required field")]
    MissingRequired,

    #[error("{}", range_message(.target, .minimum, .maximum, .exclusive_minimum, .exclusive_maximum, .current))]
    OutOfRange {
        target: String,
        current: String,
        minimum: Option<String>,
        maximum: Option<String>,
        exclusive_minimum: bool,
        exclusive_maximum: bool,
    },

    #[error("{target} should be one of {}, but got invalid value {current}", .enums.join(", "))]
    NotInEnum {
        target: String,
        current: String,
        enums: Vec<String>,
    },

    #[error("{target} should be multiple of {multiple_of}, but got invalid value {current}")]
    NotMultipleOf {
        target: String,
        current: String,
        multiple_of: String,
    },

    #[error("{target} {pattern} not match {current}")]
    NotMatch {
        target: String,
        pattern: String,
        current: String,
    },

    #[error("{current} is not a valid {format}")]
    InvalidFormat { format: String, current: String },

    #[error("{validator} cannot validate {found}")]
    UnsupportedValue {
        validator: &'static str,
        found: &'static str,
    },

    /// Replacement text from an `errMsg` tag.
    #[error("{0}")]
    Custom(String),

    /// Decode failure recorded alongside validation failures.
    #[error("{0}")]
    Decode(String),

    #[error("{0}")]
    Nested(ErrorSet),
}

impl ValidationError {
    pub fn out_of_range(
        target: impl Into<String>,
        current: impl fmt::Display,
        minimum: Option<String>,
        maximum: Option<String>,
        exclusive_minimum: bool,
        exclusive_maximum: bool,
    ) -> Self {
        Self::OutOfRange {
            target: target.into(),
            current: current.to_string(),
            minimum,
            maximum,
            exclusive_minimum,
            exclusive_maximum,
        }
    }
}

impl From<ValueError> for ValidationError {
    fn from(err: ValueError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<ErrorSet> for ValidationError {
    fn from(set: ErrorSet) -> Self {
        Self::Nested(set)
    }
}

fn range_message(
    target: &str,
    minimum: &Option<String>,
    maximum: &Option<String>,
    exclusive_minimum: &bool,
    exclusive_maximum: &bool,
    current: &str,
) -> String {
    let mut msg = format!("{} should be", target);
    if let Some(min) = minimum {
        msg.push_str(if *exclusive_minimum {
            " strictly larger than "
        } else {
            " larger than "
        });
        msg.push_str(min);
    }
    if let Some(max) = maximum {
        if minimum.is_some() {
            msg.push_str(" and");
        }
        msg.push_str(if *exclusive_maximum {
            " strictly less than "
        } else {
            " less than "
        });
        msg.push_str(max);
    }
    msg.push_str(", but got invalid value ");
    msg.push_str(current);
    msg
}

// ================================================================================================
// ERROR SET
// ================================================================================================

/// One step of an error path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_string())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// Joins segments as `a.b[2].c`; empty keys are skipped.
pub fn join_path(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Key(key) if key.is_empty() => {}
            Segment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Segment::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// A leaf of a flattened [`ErrorSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlatError {
    pub segments: Vec<Segment>,
    pub error: ValidationError,
}

impl FlatError {
    pub fn path(&self) -> String {
        join_path(&self.segments)
    }
}

/// Tree of path-annotated errors. Children are nested through
/// [`ValidationError::Nested`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorSet {
    entries: Vec<(Segment, ValidationError)>,
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, segment: impl Into<Segment>, error: ValidationError) {
        self.entries.push((segment.into(), error));
    }

    /// Records an error under a multi-segment path.
    pub fn add_at(&mut self, path: &[Segment], error: ValidationError) {
        match path.split_first() {
            None => self.entries.push((Segment::Key(String::new()), error)),
            Some((head, [])) => self.entries.push((head.clone(), error)),
            Some((head, rest)) => {
                let mut child = ErrorSet::new();
                child.add_at(rest, error);
                self.entries
                    .push((head.clone(), ValidationError::Nested(child)));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of leaf errors.
    pub fn len(&self) -> usize {
        self.flatten().len()
    }

    pub fn entries(&self) -> &[(Segment, ValidationError)] {
        &self.entries
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Nested(self))
        }
    }

    pub fn flatten(&self) -> Vec<FlatError> {
        let mut out = Vec::new();
        self.flatten_into(&mut Vec::new(), &mut out);
        out
    }

    fn flatten_into(&self, prefix: &mut Vec<Segment>, out: &mut Vec<FlatError>) {
        for (segment, error) in &self.entries {
            prefix.push(segment.clone());
            match error {
                ValidationError::Nested(child) => child.flatten_into(prefix, out),
                leaf => out.push(FlatError {
                    segments: prefix.clone(),
                    error: leaf.clone(),
                }),
            }
            prefix.pop();
        }
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.flatten().iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            let path = entry.path();
            if path.is_empty() {
                write!(f, "{}", entry.error)?;
            } else {
                write!(f, "{}: {}", path, entry.error)?;
            }
        }
        Ok(())
    }
}

// ================================================================================================
// BAD REQUEST / STATUS ERROR
// ================================================================================================

/// One offending parameter in the 400 body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorField {
    pub field: String,
    pub msg: String,
    #[serde(rename = "in")]
    pub location: String,
}

/// Error wire body: `{"code":400,"key":"BadRequest","msg":..,"errorFields":[..]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusError {
    pub code: u16,
    pub key: String,
    pub msg: String,
    #[serde(rename = "errorFields", default, skip_serializing_if = "Vec::is_empty")]
    pub error_fields: Vec<ErrorField>,
}

impl StatusError {
    pub fn new(code: u16, key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            code,
            key: key.into(),
            msg: msg.into(),
            error_fields: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Vec<u8> {
        // A struct of strings and integers always serialises.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.key, self.msg)?;
        for field in &self.error_fields {
            write!(f, " ({} in {}: {})", field.field, field.location, field.msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for StatusError {}

/// Accumulates decode and validation failures across every parameter of a request.
#[derive(Debug, Clone, Default)]
pub struct BadRequest {
    msg: Option<String>,
    fields: Vec<ErrorField>,
}

impl BadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_msg(&mut self, msg: impl Into<String>) {
        self.msg = Some(msg.into());
    }

    pub fn add(&mut self, location: &str, field: impl Into<String>, msg: impl Into<String>) {
        self.fields.push(ErrorField {
            field: field.into(),
            msg: msg.into(),
            location: location.to_string(),
        });
    }

    /// Records `error` for the parameter `name`; nested paths are appended to it.
    pub fn add_error(&mut self, location: &str, name: &str, error: &ValidationError) {
        match error {
            ValidationError::Nested(set) => {
                for entry in set.flatten() {
                    let mut segments = Vec::with_capacity(entry.segments.len() + 1);
                    segments.push(Segment::Key(name.to_string()));
                    segments.extend(entry.segments.iter().cloned());
                    self.add(location, join_path(&segments), entry.error.to_string());
                }
            }
            leaf => self.add(location, name, leaf.to_string()),
        }
    }

    /// Records every entry of `set` using only its inner paths.
    pub fn add_error_set(&mut self, location: &str, set: &ErrorSet) {
        for entry in set.flatten() {
            self.add(location, entry.path(), entry.error.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[ErrorField] {
        &self.fields
    }

    /// `None` when nothing was recorded, otherwise a 400 carrying every field error.
    pub fn err(self) -> Option<StatusError> {
        if self.fields.is_empty() {
            return None;
        }
        Some(StatusError {
            code: 400,
            key: "BadRequest".to_string(),
            msg: self
                .msg
                .unwrap_or_else(|| "invalid parameters".to_string()),
            error_fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_message_matches_wire_text() {
        let err = ValidationError::out_of_range(
            "string length",
            1,
            Some("6".into()),
            None,
            false,
            false,
        );
        assert_eq!(
            err.to_string(),
            "string length should be larger than 6, but got invalid value 1"
        );

        let err = ValidationError::out_of_range(
            "int value",
            100,
            Some("0".into()),
            Some("100".into()),
            false,
            true,
        );
        assert_eq!(
            err.to_string(),
            "int value should be larger than 0 and strictly less than 100, but got invalid value 100"
        );
    }

    #[test]
    fn test_flatten_joins_keys_and_indices() {
        let mut inner = ErrorSet::new();
        inner.add(2usize, ValidationError::MissingRequired);
        let mut set = ErrorSet::new();
        set.add("items", ValidationError::Nested(inner));
        set.add("name", ValidationError::Custom("bad".into()));

        let flat = set.flatten();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].path(), "items[2]");
        assert_eq!(flat[1].path(), "name");
    }

    #[test]
    fn test_add_at_builds_nested_entries() {
        let mut set = ErrorSet::new();
        set.add_at(
            &[
                Segment::Key("data".into()),
                Segment::Key("stringSlice".into()),
                Segment::Index(2),
            ],
            ValidationError::Decode("bad".into()),
        );
        let flat = set.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].path(), "data.stringSlice[2]");
    }

    #[test]
    fn test_bad_request_prefixes_nested_paths() {
        let mut nested = ErrorSet::new();
        nested.add("a", ValidationError::MissingRequired);
        let mut bad = BadRequest::new();
        bad.add_error("body", "NestedForFailed", &ValidationError::Nested(nested));
        bad.add_error("query", "id", &ValidationError::MissingRequired);

        let status = bad.err().unwrap();
        assert_eq!(status.code, 400);
        assert_eq!(status.error_fields[0].field, "NestedForFailed.a");
        assert_eq!(status.error_fields[1].location, "query");
    }

    #[test]
    fn test_empty_bad_request_is_ok() {
        assert!(BadRequest::new().err().is_none());
    }

    #[test]
    fn test_status_error_wire_format() {
        let mut bad = BadRequest::new();
        bad.add("path", "id", "missing required field");
        let json: serde_json::Value =
            serde_json::from_slice(&bad.err().unwrap().to_json()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "code": 400,
                "key": "BadRequest",
                "msg": "invalid parameters",
                "errorFields": [{"field": "id", "msg": "missing required field", "in": "path"}]
            })
        );
    }
}
