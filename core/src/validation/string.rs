use super::compiler::Compiler;
use super::errors::{CompileError, ValidationError};
use super::{ValidateContext, Validator};
use crate::reflect::{TypeInfo, TypeKind, Value};
use crate::rules::Rule;
use regex::Regex;
use std::borrow::Cow;
use std::sync::Arc;

/// How `@string` measures length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LenMode {
    /// UTF-8 bytes.
    Length,
    /// Unicode scalar values.
    RuneCount,
}

impl LenMode {
    fn target(self) -> &'static str {
        match self {
            LenMode::Length => "string length",
            LenMode::RuneCount => "string rune count",
        }
    }

    fn measure(self, s: &str) -> u64 {
        match self {
            LenMode::Length => s.len() as u64,
            LenMode::RuneCount => s.chars().count() as u64,
        }
    }
}

/// `@string` / `@char`. Pattern wins over enums, enums win over the length range.
#[derive(Debug, Clone)]
pub struct StringValidator {
    pub pattern: Option<Regex>,
    pub enums: Vec<String>,
    pub len_mode: LenMode,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
}

impl StringValidator {
    pub fn from_rule(rule: &Rule, ty: &TypeInfo) -> Result<Self, CompileError> {
        if !matches!(ty.kind, TypeKind::String | TypeKind::Text | TypeKind::Bytes) {
            return Err(CompileError::unsupported(rule, ty));
        }

        let mut len_mode = if rule.name == "char" {
            LenMode::RuneCount
        } else {
            LenMode::Length
        };
        match rule.param_lit(0) {
            None => {}
            Some("length") => len_mode = LenMode::Length,
            Some("rune_count") => len_mode = LenMode::RuneCount,
            Some(other) => {
                return Err(CompileError::param(
                    rule,
                    format!("unknown length mode `{}`", other),
                ))
            }
        }

        let mut validator = Self {
            pattern: None,
            enums: rule.compute_values(),
            len_mode,
            min_length: None,
            max_length: None,
        };

        if let Some(pattern) = &rule.pattern {
            validator.pattern =
                Some(Regex::new(pattern).map_err(|e| CompileError::param(rule, e))?);
        }

        if let Some(range) = &rule.range {
            if range.exclusive_start || range.exclusive_end {
                return Err(CompileError::range(rule, "length range must be inclusive"));
            }
            let parse = |text: &str| {
                text.parse::<u64>()
                    .map_err(|e| CompileError::range(rule, e))
            };
            validator.min_length = range.start.as_deref().map(parse).transpose()?;
            validator.max_length = range.end.as_deref().map(parse).transpose()?;
            if let (Some(min), Some(max)) = (validator.min_length, validator.max_length) {
                if min > max {
                    return Err(CompileError::range(rule, "minimum exceeds maximum"));
                }
            }
        }

        Ok(validator)
    }
}

impl Validator for StringValidator {
    fn validate(&self, value: &mut Value, _cx: &ValidateContext<'_>) -> Result<(), ValidationError> {
        let current: Cow<'_, str> = match &*value {
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::Bytes(b) => String::from_utf8_lossy(b),
            other => {
                return Err(ValidationError::UnsupportedValue {
                    validator: "string",
                    found: other.kind_name(),
                })
            }
        };

        if let Some(pattern) = &self.pattern {
            if pattern.is_match(&current) {
                return Ok(());
            }
            return Err(ValidationError::NotMatch {
                target: "string value".to_string(),
                pattern: pattern.as_str().to_string(),
                current: current.into_owned(),
            });
        }

        if !self.enums.is_empty() {
            if self.enums.iter().any(|e| e.as_str() == current) {
                return Ok(());
            }
            return Err(ValidationError::NotInEnum {
                target: "string value".to_string(),
                current: current.into_owned(),
                enums: self.enums.clone(),
            });
        }

        let len = self.len_mode.measure(&current);
        let too_short = self.min_length.map_or(false, |min| len < min);
        let too_long = self.max_length.map_or(false, |max| len > max);
        if too_short || too_long {
            return Err(ValidationError::out_of_range(
                self.len_mode.target(),
                len,
                self.min_length.map(|m| m.to_string()),
                self.max_length.map(|m| m.to_string()),
                false,
                false,
            ));
        }
        Ok(())
    }
}

pub(crate) fn create_string(
    rule: &Rule,
    ty: &TypeInfo,
    _compiler: &mut Compiler<'_>,
) -> Result<Arc<dyn Validator>, CompileError> {
    Ok(Arc::new(StringValidator::from_rule(rule, ty)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{compile, RuleModifier};
    use crate::Model;

    fn check(rule: &str, value: &str) -> Result<(), ValidationError> {
        compile(rule, &String::type_info(), &RuleModifier::default())
            .unwrap()
            .unwrap()
            .validate(&mut Value::String(value.to_string()))
    }

    #[test]
    fn test_min_length_message() {
        assert_eq!(
            check("@string[6,]", "1").unwrap_err().to_string(),
            "string length should be larger than 6, but got invalid value 1"
        );
        assert!(check("@string[6,]", "123456").is_ok());
    }

    #[test]
    fn test_rune_count_mode() {
        assert!(check("@char[1,2]", "日本").is_ok());
        assert!(check("@string[1,2]", "日本").is_err());
        assert!(check("@string<rune_count>[1,2]", "日本").is_ok());
    }

    #[test]
    fn test_pattern_takes_precedence() {
        assert!(check(r"@string/^\d+$/[1,2]", "12345").is_ok());
        let err = check(r"@string/^\d+$/", "abc").unwrap_err();
        assert_eq!(err.to_string(), r"string value ^\d+$ not match abc");
    }

    #[test]
    fn test_enum() {
        assert!(check("@string{ONE,TWO}", "ONE").is_ok());
        assert!(matches!(
            check("@string{ONE,TWO}", "THREE"),
            Err(ValidationError::NotInEnum { .. })
        ));
    }

    #[test]
    fn test_exclusive_range_is_rejected() {
        assert!(compile("@string(1,5]", &String::type_info(), &RuleModifier::default()).is_err());
    }

    #[test]
    fn test_unknown_length_mode_is_rejected() {
        assert!(compile("@string<words>", &String::type_info(), &RuleModifier::default()).is_err());
    }
}
