//! Named string formats (`@email`, `@uuid`, ...), registered as validators.

use super::compiler::{Compiler, ValidatorMgr, VALIDATOR_MGR};
use super::errors::{CompileError, ValidationError};
use super::{ValidateContext, Validator};
use crate::reflect::{TypeInfo, TypeKind, Value};
use crate::rules::Rule;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

#[derive(Clone)]
enum FormatCheck {
    Regex(Regex),
    Func(fn(&str) -> bool),
}

impl fmt::Debug for FormatCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatCheck::Regex(re) => write!(f, "Regex({})", re.as_str()),
            FormatCheck::Func(_) => f.write_str("Func"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrfmtValidator {
    name: String,
    check: FormatCheck,
}

impl StrfmtValidator {
    pub fn regex(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            check: FormatCheck::Regex(Regex::new(pattern)?),
        })
    }

    pub fn func(name: impl Into<String>, check: fn(&str) -> bool) -> Self {
        Self {
            name: name.into(),
            check: FormatCheck::Func(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_valid(&self, s: &str) -> bool {
        match &self.check {
            FormatCheck::Regex(re) => re.is_match(s),
            FormatCheck::Func(check) => check(s),
        }
    }
}

impl Validator for StrfmtValidator {
    fn validate(&self, value: &mut Value, _cx: &ValidateContext<'_>) -> Result<(), ValidationError> {
        let Value::String(current) = &*value else {
            return Err(ValidationError::UnsupportedValue {
                validator: "strfmt",
                found: value.kind_name(),
            });
        };
        if self.is_valid(current) {
            return Ok(());
        }
        Err(match &self.check {
            FormatCheck::Regex(re) => ValidationError::NotMatch {
                target: self.name.clone(),
                pattern: re.as_str().to_string(),
                current: current.clone(),
            },
            FormatCheck::Func(_) => ValidationError::InvalidFormat {
                format: self.name.clone(),
                current: current.clone(),
            },
        })
    }
}

impl ValidatorMgr {
    /// Registers `validator` under its own name.
    pub fn register_format(&self, validator: StrfmtValidator) {
        let name = validator.name.clone();
        self.register(
            &[name.as_str()],
            move |rule: &Rule, ty: &TypeInfo, _c: &mut Compiler<'_>| {
                if !matches!(ty.kind, TypeKind::String | TypeKind::Text) {
                    return Err(CompileError::unsupported(rule, ty));
                }
                if !rule.params.is_empty() || rule.range.is_some() || !rule.values.is_empty() {
                    return Err(CompileError::param(rule, "formats take no arguments"));
                }
                Ok(Arc::new(validator.clone()) as Arc<dyn Validator>)
            },
        );
    }
}

/// Adds a regex-backed format to the process-wide registry.
pub fn register_regex_format(name: &str, pattern: &str) -> Result<(), CompileError> {
    let validator = StrfmtValidator::regex(name, pattern).map_err(|e| CompileError::InvalidParam {
        rule: format!("@{}", name),
        reason: e.to_string(),
    })?;
    VALIDATOR_MGR.register_format(validator);
    Ok(())
}

/// Adds a predicate-backed format to the process-wide registry.
pub fn register_fn_format(name: &str, check: fn(&str) -> bool) {
    VALIDATOR_MGR.register_format(StrfmtValidator::func(name, check));
}

const REGEX_FORMATS: &[(&str, &str)] = &[
    ("email", r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$"),
    ("url", r"^[A-Za-z][A-Za-z0-9+.\-]*://[^\s/?#]+[^\s]*$"),
    ("http-url", r"^https?://[^\s/?#]+[^\s]*$"),
    (
        "hostname",
        r"^[A-Za-z0-9]([A-Za-z0-9\-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9\-]{0,61}[A-Za-z0-9])?)*$",
    ),
    ("alpha", r"^[A-Za-z]+$"),
    ("alpha-num", r"^[A-Za-z0-9]+$"),
    ("number", r"^[0-9]+$"),
];

pub(crate) fn register_builtin_formats(mgr: &ValidatorMgr) {
    for (name, pattern) in REGEX_FORMATS {
        match StrfmtValidator::regex(*name, pattern) {
            Ok(validator) => mgr.register_format(validator),
            Err(err) => log::warn!("skipping format @{}: {}", name, err),
        }
    }
    mgr.register_format(StrfmtValidator::func("uuid", |s| {
        uuid::Uuid::parse_str(s).is_ok()
    }));
    mgr.register_format(StrfmtValidator::func("ipv4", |s| s.parse::<Ipv4Addr>().is_ok()));
    mgr.register_format(StrfmtValidator::func("ipv6", |s| s.parse::<Ipv6Addr>().is_ok()));
    mgr.register_format(StrfmtValidator::func("base64", |s| STANDARD.decode(s).is_ok()));
}
