//! # NUMERIC VALIDATORS
//!
//! `@int`, `@uint` (optionally sized: `@int32`, `@uint<53>`) and
//! `@float` / `@double` with digit limits `<maxDigits,decimalDigits>`.

use super::compiler::Compiler;
use super::errors::{CompileError, ValidationError};
use super::{ValidateContext, Validator};
use crate::reflect::text::{int_bounds, parse_int, parse_uint, uint_max};
use crate::reflect::{TypeInfo, TypeKind, Value, ValueError};
use crate::rules::Rule;
use std::fmt;
use std::sync::Arc;

// ================================================================================================
// INTEGERS
// ================================================================================================

/// Storage shared by the signed and unsigned validators.
pub trait Integer:
    Copy + PartialOrd + fmt::Display + fmt::Debug + Send + Sync + 'static
{
    /// Rule name prefix, e.g. `int`.
    const PREFIX: &'static str;
    /// Error target, e.g. `int value`.
    const TARGET: &'static str;

    fn bounds(bits: u8) -> (Self, Self);
    fn parse(text: &str, bits: u8) -> Result<Self, ValueError>;
    fn from_value(value: &Value) -> Option<Self>;
    fn target_bits(kind: &TypeKind) -> Option<u8>;
    fn is_zero(self) -> bool;
    fn is_multiple_of(self, k: Self) -> bool;
}

impl Integer for i64 {
    const PREFIX: &'static str = "int";
    const TARGET: &'static str = "int value";

    fn bounds(bits: u8) -> (Self, Self) {
        int_bounds(bits)
    }

    fn parse(text: &str, bits: u8) -> Result<Self, ValueError> {
        parse_int(text, bits)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            Value::Uint(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    fn target_bits(kind: &TypeKind) -> Option<u8> {
        match kind {
            TypeKind::Int { bits } => Some(*bits),
            _ => None,
        }
    }

    fn is_zero(self) -> bool {
        self == 0
    }

    fn is_multiple_of(self, k: Self) -> bool {
        // `MIN % -1` overflows; every value is a multiple of -1.
        self.checked_rem(k).map_or(true, |r| r == 0)
    }
}

impl Integer for u64 {
    const PREFIX: &'static str = "uint";
    const TARGET: &'static str = "uint value";

    fn bounds(bits: u8) -> (Self, Self) {
        (0, uint_max(bits))
    }

    fn parse(text: &str, bits: u8) -> Result<Self, ValueError> {
        parse_uint(text, bits)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uint(u) => Some(*u),
            Value::Int(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    fn target_bits(kind: &TypeKind) -> Option<u8> {
        match kind {
            TypeKind::Uint { bits } => Some(*bits),
            _ => None,
        }
    }

    fn is_zero(self) -> bool {
        self == 0
    }

    fn is_multiple_of(self, k: Self) -> bool {
        self.checked_rem(k).map_or(false, |r| r == 0)
    }
}

/// Integer validator. Unset bounds default to the full range of `bit_size`.
#[derive(Debug, Clone)]
pub struct IntegerValidator<N: Integer> {
    pub bit_size: u8,
    pub minimum: Option<N>,
    pub maximum: Option<N>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    pub multiple_of: Option<N>,
    pub enums: Vec<N>,
}

pub type IntValidator = IntegerValidator<i64>;
pub type UintValidator = IntegerValidator<u64>;

impl<N: Integer> IntegerValidator<N> {
    pub fn from_rule(rule: &Rule, ty: &TypeInfo) -> Result<Self, CompileError> {
        let target_bits =
            N::target_bits(&ty.kind).ok_or_else(|| CompileError::unsupported(rule, ty))?;

        let bit_size = match rule.name.strip_prefix(N::PREFIX) {
            Some("") => match rule.param_lit(0) {
                Some(lit) => lit
                    .parse::<u8>()
                    .map_err(|e| CompileError::param(rule, e))?,
                None => target_bits,
            },
            Some(suffix) => suffix
                .parse::<u8>()
                .map_err(|e| CompileError::param(rule, e))?,
            None => return Err(CompileError::unsupported(rule, ty)),
        };
        if bit_size == 0 || bit_size > 64 {
            return Err(CompileError::param(rule, "bit size must be within 1..=64"));
        }
        if bit_size > target_bits {
            return Err(CompileError::unsupported(rule, ty));
        }

        let mut validator = Self {
            bit_size,
            minimum: None,
            maximum: None,
            exclusive_minimum: false,
            exclusive_maximum: false,
            multiple_of: None,
            enums: Vec::new(),
        };

        if let Some(range) = &rule.range {
            if let Some(start) = &range.start {
                validator.minimum =
                    Some(N::parse(start, bit_size).map_err(|e| CompileError::range(rule, e))?);
            }
            if let Some(end) = &range.end {
                validator.maximum =
                    Some(N::parse(end, bit_size).map_err(|e| CompileError::range(rule, e))?);
            }
            validator.exclusive_minimum = range.exclusive_start;
            validator.exclusive_maximum = range.exclusive_end;
            if let (Some(min), Some(max)) = (validator.minimum, validator.maximum) {
                if min > max {
                    return Err(CompileError::range(rule, "minimum exceeds maximum"));
                }
            }
        }

        match rule.values.as_slice() {
            [] => {}
            [row] if row.len() == 1 && row[0].starts_with('%') => {
                let k = N::parse(&row[0][1..], bit_size).map_err(|e| CompileError::values(rule, e))?;
                if k.is_zero() {
                    return Err(CompileError::values(rule, "multiple of zero"));
                }
                validator.multiple_of = Some(k);
            }
            _ => {
                validator.enums = rule
                    .compute_values()
                    .iter()
                    .map(|v| N::parse(v, bit_size))
                    .collect::<Result<_, _>>()
                    .map_err(|e| CompileError::values(rule, e))?;
            }
        }

        Ok(validator)
    }

    fn effective_bounds(&self) -> (N, N) {
        let (lo, hi) = N::bounds(self.bit_size);
        (self.minimum.unwrap_or(lo), self.maximum.unwrap_or(hi))
    }
}

impl<N: Integer> Validator for IntegerValidator<N> {
    fn validate(&self, value: &mut Value, _cx: &ValidateContext<'_>) -> Result<(), ValidationError> {
        let current = N::from_value(value).ok_or(ValidationError::UnsupportedValue {
            validator: N::PREFIX,
            found: value.kind_name(),
        })?;

        if !self.enums.is_empty() {
            if self.enums.contains(&current) {
                return Ok(());
            }
            return Err(ValidationError::NotInEnum {
                target: N::TARGET.to_string(),
                current: current.to_string(),
                enums: self.enums.iter().map(ToString::to_string).collect(),
            });
        }

        let (min, max) = self.effective_bounds();
        let below = if self.exclusive_minimum {
            current <= min
        } else {
            current < min
        };
        let above = if self.exclusive_maximum {
            current >= max
        } else {
            current > max
        };
        if below || above {
            // Print declared bounds, plus the storage bound that was crossed.
            let show_min = self.minimum.is_some() || below;
            let show_max = self.maximum.is_some() || above;
            return Err(ValidationError::out_of_range(
                N::TARGET,
                current,
                show_min.then(|| min.to_string()),
                show_max.then(|| max.to_string()),
                self.exclusive_minimum,
                self.exclusive_maximum,
            ));
        }

        if let Some(k) = self.multiple_of {
            if !current.is_multiple_of(k) {
                return Err(ValidationError::NotMultipleOf {
                    target: N::TARGET.to_string(),
                    current: current.to_string(),
                    multiple_of: k.to_string(),
                });
            }
        }
        Ok(())
    }
}

pub(crate) fn create_int(
    rule: &Rule,
    ty: &TypeInfo,
    _compiler: &mut Compiler<'_>,
) -> Result<Arc<dyn Validator>, CompileError> {
    Ok(Arc::new(IntValidator::from_rule(rule, ty)?))
}

pub(crate) fn create_uint(
    rule: &Rule,
    ty: &TypeInfo,
    _compiler: &mut Compiler<'_>,
) -> Result<Arc<dyn Validator>, CompileError> {
    Ok(Arc::new(UintValidator::from_rule(rule, ty)?))
}

// ================================================================================================
// FLOATS
// ================================================================================================

#[derive(Debug, Clone)]
pub struct FloatValidator {
    pub bits: u8,
    pub max_digits: u32,
    pub decimal_digits: Option<u32>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    pub multiple_of: Option<f64>,
    pub enums: Vec<f64>,
}

impl FloatValidator {
    pub fn from_rule(rule: &Rule, ty: &TypeInfo) -> Result<Self, CompileError> {
        let bits = match ty.kind {
            TypeKind::Float { bits } => bits,
            _ => return Err(CompileError::unsupported(rule, ty)),
        };
        let (rule_bits, mut max_digits) = match rule.name.as_str() {
            "float" | "float32" => (32, 7),
            "double" | "float64" => (64, 15),
            _ => return Err(CompileError::unsupported(rule, ty)),
        };
        if rule_bits > bits {
            return Err(CompileError::unsupported(rule, ty));
        }

        let mut decimal_digits = None;
        if let Some(lit) = rule.param_lit(0) {
            max_digits = lit.parse().map_err(|e| CompileError::param(rule, e))?;
        }
        if let Some(lit) = rule.param_lit(1) {
            let decimals: u32 = lit.parse().map_err(|e| CompileError::param(rule, e))?;
            if decimals > max_digits {
                return Err(CompileError::param(
                    rule,
                    "decimal digits exceed total digits",
                ));
            }
            decimal_digits = Some(decimals);
        }

        let parse = |text: &str| -> Result<f64, CompileError> {
            text.parse::<f64>().map_err(|e| CompileError::range(rule, e))
        };

        let mut validator = Self {
            bits,
            max_digits,
            decimal_digits,
            minimum: None,
            maximum: None,
            exclusive_minimum: false,
            exclusive_maximum: false,
            multiple_of: None,
            enums: Vec::new(),
        };

        if let Some(range) = &rule.range {
            validator.minimum = range.start.as_deref().map(parse).transpose()?;
            validator.maximum = range.end.as_deref().map(parse).transpose()?;
            validator.exclusive_minimum = range.exclusive_start;
            validator.exclusive_maximum = range.exclusive_end;
            if let (Some(min), Some(max)) = (validator.minimum, validator.maximum) {
                if min > max {
                    return Err(CompileError::range(rule, "minimum exceeds maximum"));
                }
            }
        }

        match rule.values.as_slice() {
            [] => {}
            [row] if row.len() == 1 && row[0].starts_with('%') => {
                let k: f64 = row[0][1..]
                    .parse()
                    .map_err(|e| CompileError::values(rule, e))?;
                if k == 0.0 {
                    return Err(CompileError::values(rule, "multiple of zero"));
                }
                validator.multiple_of = Some(k);
            }
            _ => {
                validator.enums = rule
                    .compute_values()
                    .iter()
                    .map(|v| v.parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|e| CompileError::values(rule, e))?;
            }
        }

        Ok(validator)
    }

    fn format(&self, value: f64) -> String {
        if self.bits == 32 {
            (value as f32).to_string()
        } else {
            value.to_string()
        }
    }
}

/// Integer-part and decimal-part digit counts of a plain decimal rendering.
fn digit_counts(text: &str) -> (u32, u32) {
    let unsigned = text.trim_start_matches('-');
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int_digits = int_part.trim_start_matches('0').len() as u32;
    (int_digits, frac_part.len() as u32)
}

impl Validator for FloatValidator {
    fn validate(&self, value: &mut Value, _cx: &ValidateContext<'_>) -> Result<(), ValidationError> {
        let current = match value {
            Value::Float(f) => *f,
            Value::Int(i) => *i as f64,
            Value::Uint(u) => *u as f64,
            other => {
                return Err(ValidationError::UnsupportedValue {
                    validator: "float",
                    found: other.kind_name(),
                })
            }
        };
        let text = self.format(current);

        let (int_digits, decimals) = digit_counts(&text);
        if int_digits + decimals > self.max_digits {
            return Err(ValidationError::out_of_range(
                "total digits of float value",
                int_digits + decimals,
                None,
                Some(self.max_digits.to_string()),
                false,
                false,
            ));
        }
        if let Some(limit) = self.decimal_digits {
            if decimals > limit {
                return Err(ValidationError::out_of_range(
                    "decimal digits of float value",
                    decimals,
                    None,
                    Some(limit.to_string()),
                    false,
                    false,
                ));
            }
        }

        if !self.enums.is_empty() {
            if self.enums.iter().any(|e| self.format(*e) == text) {
                return Ok(());
            }
            return Err(ValidationError::NotInEnum {
                target: "float value".to_string(),
                current: text,
                enums: self.enums.iter().map(|e| self.format(*e)).collect(),
            });
        }

        let below = self.minimum.map_or(false, |min| {
            if self.exclusive_minimum {
                current <= min
            } else {
                current < min
            }
        });
        let above = self.maximum.map_or(false, |max| {
            if self.exclusive_maximum {
                current >= max
            } else {
                current > max
            }
        });
        if below || above {
            return Err(ValidationError::out_of_range(
                "float value",
                text,
                self.minimum.map(|m| self.format(m)),
                self.maximum.map(|m| self.format(m)),
                self.exclusive_minimum,
                self.exclusive_maximum,
            ));
        }

        if let Some(k) = self.multiple_of {
            let scale = 10f64.powi(self.decimal_digits.unwrap_or(self.max_digits) as i32);
            let quotient = ((current / k) * scale).round() / scale;
            if quotient != quotient.trunc() {
                return Err(ValidationError::NotMultipleOf {
                    target: "float value".to_string(),
                    current: text,
                    multiple_of: self.format(k),
                });
            }
        }
        Ok(())
    }
}

pub(crate) fn create_float(
    rule: &Rule,
    ty: &TypeInfo,
    _compiler: &mut Compiler<'_>,
) -> Result<Arc<dyn Validator>, CompileError> {
    Ok(Arc::new(FloatValidator::from_rule(rule, ty)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{compile, RuleModifier};
    use crate::Model;

    fn check(rule: &str, ty: TypeInfo, value: Value) -> Result<(), ValidationError> {
        let mut value = value;
        compile(rule, &ty, &RuleModifier::default())
            .unwrap()
            .unwrap()
            .validate(&mut value)
    }

    mod int_validator {
        use super::*;

        #[test]
        fn test_half_open_range() {
            assert!(check("@int<32>[0,100)", i32::type_info(), Value::Int(99)).is_ok());
            let err = check("@int<32>[0,100)", i32::type_info(), Value::Int(100)).unwrap_err();
            assert!(matches!(err, ValidationError::OutOfRange { .. }));
        }

        #[test]
        fn test_bit_size_from_name_and_param() {
            let rule = crate::rules::parse_rule("@int8").unwrap();
            let v = IntValidator::from_rule(&rule, &i32::type_info()).unwrap();
            assert_eq!(v.bit_size, 8);

            let rule = crate::rules::parse_rule("@int<53>").unwrap();
            let v = IntValidator::from_rule(&rule, &i64::type_info()).unwrap();
            assert_eq!(v.bit_size, 53);

            let err = check("@int8", i8::type_info(), Value::Int(1));
            assert!(err.is_ok());
        }

        #[test]
        fn test_storage_bound_is_enforced() {
            let err = check("@int8", i32::type_info(), Value::Int(200)).unwrap_err();
            assert_eq!(
                err.to_string(),
                "int value should be less than 127, but got invalid value 200"
            );
        }

        #[test]
        fn test_bit_size_wider_than_target_is_rejected() {
            let err = compile("@int64", &i32::type_info(), &RuleModifier::default()).unwrap_err();
            assert!(matches!(err, CompileError::UnsupportedType { .. }));
        }

        #[test]
        fn test_enums_and_multiple_of() {
            assert!(check("@int{1,2,3}", i32::type_info(), Value::Int(2)).is_ok());
            let err = check("@int{1,2,3}", i32::type_info(), Value::Int(4)).unwrap_err();
            assert_eq!(
                err.to_string(),
                "int value should be one of 1, 2, 3, but got invalid value 4"
            );

            assert!(check("@int{%3}", i32::type_info(), Value::Int(9)).is_ok());
            let err = check("@int{%3}", i32::type_info(), Value::Int(10)).unwrap_err();
            assert!(matches!(err, ValidationError::NotMultipleOf { .. }));
        }

        #[test]
        fn test_multiple_of_negative_one_at_min() {
            assert!(check("@int64{%-1}", i64::type_info(), Value::Int(i64::MIN)).is_ok());
            assert!(check("@int64{%-1}", i64::type_info(), Value::Int(7)).is_ok());
        }

        #[test]
        fn test_wrong_kind_is_rejected() {
            let err = compile("@int", &String::type_info(), &RuleModifier::default()).unwrap_err();
            assert!(matches!(err, CompileError::UnsupportedType { .. }));
        }

        #[test]
        fn test_inverted_range_is_rejected() {
            let err = compile("@int[10,1]", &i32::type_info(), &RuleModifier::default()).unwrap_err();
            assert!(matches!(err, CompileError::InvalidRange { .. }));
        }
    }

    mod uint_validator {
        use super::*;

        #[test]
        fn test_range() {
            assert!(check("@uint[1,10]", u16::type_info(), Value::Uint(10)).is_ok());
            let err = check("@uint(1,10)", u16::type_info(), Value::Uint(10)).unwrap_err();
            assert_eq!(
                err.to_string(),
                "uint value should be strictly larger than 1 and strictly less than 10, but got invalid value 10"
            );
        }

        #[test]
        fn test_negative_bound_is_rejected() {
            assert!(compile("@uint[-1,]", &u32::type_info(), &RuleModifier::default()).is_err());
        }
    }

    mod float_validator {
        use super::*;

        #[test]
        fn test_digit_limits() {
            assert!(check("@float<5,2>", f64::type_info(), Value::Float(123.45)).is_ok());
            let err = check("@float<5,2>", f64::type_info(), Value::Float(12345.6)).unwrap_err();
            assert!(err.to_string().starts_with("total digits of float value"));
            let err = check("@float<5,2>", f64::type_info(), Value::Float(1.234)).unwrap_err();
            assert!(err.to_string().starts_with("decimal digits of float value"));
        }

        #[test]
        fn test_range_and_enum() {
            assert!(check("@double[1.5,2.5]", f64::type_info(), Value::Float(2.0)).is_ok());
            assert!(check("@double[1.5,2.5]", f64::type_info(), Value::Float(2.6)).is_err());
            assert!(check("@float{1.5,2.5}", f32::type_info(), Value::Float(2.5)).is_ok());
            assert!(check("@float{1.5,2.5}", f32::type_info(), Value::Float(3.5)).is_err());
        }

        #[test]
        fn test_multiple_of_uses_declared_precision() {
            assert!(check("@double<10,2>{%0.25}", f64::type_info(), Value::Float(1.75)).is_ok());
            assert!(check("@double<10,2>{%0.25}", f64::type_info(), Value::Float(1.8)).is_err());
        }

        #[test]
        fn test_double_on_f32_is_rejected() {
            assert!(compile("@double", &f32::type_info(), &RuleModifier::default()).is_err());
        }

        #[test]
        fn test_digit_counts() {
            assert_eq!(digit_counts("0.25"), (0, 2));
            assert_eq!(digit_counts("-120.5"), (3, 1));
            assert_eq!(digit_counts("7"), (1, 0));
        }
    }
}
