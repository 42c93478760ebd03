//! # VALIDATION MODULE
//!
//! **RULE-COMPILED VALIDATOR TREES**
//!
//! A rule such as `@slice<@string[1,]>[,10]` is compiled against a target
//! [`TypeInfo`] into a tree of [`Validator`]s. Every node is wrapped in a
//! [`Loader`] carrying optionality, a default literal and a custom error
//! message.
//!
//! ## PIPELINE
//!
//! 1. **PARSE** - rule text into a [`Rule`](crate::rules::Rule)
//! 2. **COMPILE** - creator lookup by rule name, kind checks against the type
//! 3. **VALIDATE** - loader normalisation, then the inner validator
//!
//! Struct validators live in an arena owned by [`CompiledValidator`] and
//! are referenced by index, so recursive record types compile to a finite tree.
//!
//! ## USAGE
//!
//! ```rust
//! use courier::validation::{compile, RuleModifier};
//! use courier::reflect::Value;
//! use courier::Model;
//!
//! let validator = compile("@int[1,10]", &i32::type_info(), &RuleModifier::default())
//!     .unwrap()
//!     .unwrap();
//! assert!(validator.validate(&mut Value::Int(11)).is_err());
//! ```

pub mod collection;
pub mod compiler;
pub mod errors;
pub mod number;
pub mod strfmt;
pub mod string;
pub mod structure;

pub use collection::{MapValidator, SliceValidator};
pub use compiler::{compile, Compiler, Creator, RuleModifier, ValidatorMgr, VALIDATOR_MGR};
pub use errors::{
    join_path, BadRequest, CompileError, ErrorField, ErrorSet, FlatError, Segment, StatusError,
    ValidationError,
};
pub use number::{FloatValidator, IntValidator, UintValidator};
pub use strfmt::{register_fn_format, register_regex_format, StrfmtValidator};
pub use string::{LenMode, StringValidator};
pub use structure::{StructRef, StructValidator};

use crate::reflect::text::unmarshal_text;
use crate::reflect::{TypeInfo, TypeKind, Value};
use std::fmt;
use std::sync::Arc;

/// **CORE VALIDATOR TRAIT**
///
/// Validators may rewrite the value in place (defaults are applied this way).
pub trait Validator: fmt::Debug + Send + Sync {
    fn validate(&self, value: &mut Value, cx: &ValidateContext<'_>)
        -> Result<(), ValidationError>;
}

/// Shared state for one validation pass.
#[derive(Debug, Clone, Copy)]
pub struct ValidateContext<'a> {
    structs: &'a [StructValidator],
}

impl<'a> ValidateContext<'a> {
    pub fn new(structs: &'a [StructValidator]) -> Self {
        Self { structs }
    }

    pub fn struct_validator(&self, index: usize) -> Option<&'a StructValidator> {
        self.structs.get(index)
    }
}

/// Validator wrapper carrying optionality, a default literal and a custom message.
#[derive(Debug, Clone)]
pub struct Loader {
    pub(crate) inner: Option<Arc<dyn Validator>>,
    pub(crate) optional: bool,
    pub(crate) default_value: Option<String>,
    pub(crate) err_msg: Option<String>,
    pub(crate) ty: TypeInfo,
    pub(crate) rule: String,
}

impl Loader {
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// Canonical form of the compiled rule.
    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn validate(
        &self,
        value: &mut Value,
        cx: &ValidateContext<'_>,
    ) -> Result<(), ValidationError> {
        if value.is_empty() {
            if !self.optional {
                return Err(self.replace_message(ValidationError::MissingRequired));
            }
            if let Some(default) = &self.default_value {
                *value = decode_default(default, &self.ty)
                    .map_err(|e| self.replace_message(e))?;
            }
            return Ok(());
        }

        match &self.inner {
            Some(inner) => inner
                .validate(value, cx)
                .map_err(|e| self.replace_message(e)),
            None => Ok(()),
        }
    }

    fn replace_message(&self, err: ValidationError) -> ValidationError {
        match &self.err_msg {
            Some(msg) => ValidationError::Custom(msg.clone()),
            None => err,
        }
    }
}

/// Re-runs the decode path on a default literal.
pub(crate) fn decode_default(literal: &str, ty: &TypeInfo) -> Result<Value, ValidationError> {
    let target = ty.deref();
    match target.kind {
        TypeKind::Struct(_)
        | TypeKind::Slice(_)
        | TypeKind::Array(_, _)
        | TypeKind::Map(_, _) => crate::codec::json::value_from_json_str(literal, &target)
            .map_err(|e| ValidationError::Decode(e.to_string())),
        _ => unmarshal_text(literal, &target).map_err(ValidationError::from),
    }
}

/// A compiled validator tree, shared across requests.
#[derive(Debug, Clone)]
pub struct CompiledValidator {
    structs: Arc<[StructValidator]>,
    root: Loader,
}

impl CompiledValidator {
    pub(crate) fn new(structs: Vec<StructValidator>, root: Loader) -> Self {
        Self {
            structs: structs.into(),
            root,
        }
    }

    pub fn loader(&self) -> &Loader {
        &self.root
    }

    pub fn rule(&self) -> &str {
        self.root.rule()
    }

    pub fn validate(&self, value: &mut Value) -> Result<(), ValidationError> {
        let cx = ValidateContext::new(&self.structs);
        self.root.validate(value, &cx)
    }
}

/// **VALIDATION ERROR CODES**
pub mod error_codes {
    pub const MISSING_REQUIRED: &str = "COURIER_VALIDATION_MISSING_REQUIRED";
    pub const OUT_OF_RANGE: &str = "COURIER_VALIDATION_OUT_OF_RANGE";
    pub const NOT_IN_ENUM: &str = "COURIER_VALIDATION_NOT_IN_ENUM";
    pub const NOT_MATCH: &str = "COURIER_VALIDATION_NOT_MATCH";
    pub const NOT_MULTIPLE_OF: &str = "COURIER_VALIDATION_NOT_MULTIPLE_OF";
}

impl ValidationError {
    /// Stable code for this failure class.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingRequired => error_codes::MISSING_REQUIRED,
            ValidationError::OutOfRange { .. } => error_codes::OUT_OF_RANGE,
            ValidationError::NotInEnum { .. } => error_codes::NOT_IN_ENUM,
            ValidationError::NotMatch { .. } | ValidationError::InvalidFormat { .. } => {
                error_codes::NOT_MATCH
            }
            ValidationError::NotMultipleOf { .. } => error_codes::NOT_MULTIPLE_OF,
            _ => "COURIER_VALIDATION_INVALID",
        }
    }
}
