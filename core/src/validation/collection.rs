use super::compiler::{Compiler, RuleModifier};
use super::errors::{CompileError, ErrorSet, ValidationError};
use super::{Loader, ValidateContext, Validator};
use crate::reflect::{TypeInfo, TypeKind, Value};
use crate::rules::{Rule, RuleParam, RuleRange};
use std::sync::Arc;

/// `@slice<elem>[min,max]` and `@array<elem>[len]`.
#[derive(Debug, Clone)]
pub struct SliceValidator {
    pub elem: Option<Loader>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    target: &'static str,
}

impl Validator for SliceValidator {
    fn validate(&self, value: &mut Value, cx: &ValidateContext<'_>) -> Result<(), ValidationError> {
        let len = match value.len() {
            Some(len) if !matches!(value, Value::Map(_) | Value::String(_)) => len as u64,
            _ => {
                return Err(ValidationError::UnsupportedValue {
                    validator: "slice",
                    found: value.kind_name(),
                })
            }
        };
        check_len(self.target, len, self.min_items, self.max_items)?;

        let (Some(elem), Value::List(items)) = (&self.elem, value) else {
            return Ok(());
        };
        let mut errors = ErrorSet::new();
        for (i, item) in items.iter_mut().enumerate() {
            if let Err(err) = elem.validate(item, cx) {
                errors.add(i, err);
            }
        }
        errors.into_result()
    }
}

pub(crate) fn create_slice(
    rule: &Rule,
    ty: &TypeInfo,
    compiler: &mut Compiler<'_>,
) -> Result<Arc<dyn Validator>, CompileError> {
    let (elem_ty, fixed_len) = match ty.kind {
        TypeKind::Slice(elem) => (Some(elem()), None),
        TypeKind::Array(elem, len) => (Some(elem()), Some(len as u64)),
        TypeKind::Bytes => (None, None),
        _ => return Err(CompileError::unsupported(rule, ty)),
    };

    let (mut min_items, mut max_items) = inclusive_bounds(rule, rule.range.as_ref())?;

    let target = if rule.name == "array" {
        let Some(len) = fixed_len else {
            return Err(CompileError::unsupported(rule, ty));
        };
        if rule.range.is_some() && (min_items != Some(len) || max_items != Some(len)) {
            return Err(CompileError::range(
                rule,
                format!("array length is fixed at {}", len),
            ));
        }
        min_items = Some(len);
        max_items = Some(len);
        "array length"
    } else {
        "slice length"
    };

    let elem = match elem_ty {
        Some(elem_ty) => {
            let elem_rule = param_rule(rule, 0)?;
            compiler.compile_loader(elem_rule, &elem_ty, &RuleModifier::default())?
        }
        None => None,
    };

    Ok(Arc::new(SliceValidator {
        elem,
        min_items,
        max_items,
        target,
    }))
}

/// `@map<keyRule,elemRule>[min,max]`.
#[derive(Debug, Clone)]
pub struct MapValidator {
    pub key: Option<Loader>,
    pub elem: Option<Loader>,
    pub min_props: Option<u64>,
    pub max_props: Option<u64>,
}

impl Validator for MapValidator {
    fn validate(&self, value: &mut Value, cx: &ValidateContext<'_>) -> Result<(), ValidationError> {
        let Value::Map(entries) = value else {
            return Err(ValidationError::UnsupportedValue {
                validator: "map",
                found: value.kind_name(),
            });
        };
        check_len(
            "map length",
            entries.len() as u64,
            self.min_props,
            self.max_props,
        )?;

        let mut errors = ErrorSet::new();
        for (key, elem) in entries.iter_mut() {
            let repr = key.key_text();
            if let Some(loader) = &self.key {
                if let Err(err) = loader.validate(key, cx) {
                    errors.add(format!("{}/key", repr), err);
                }
            }
            if let Some(loader) = &self.elem {
                if let Err(err) = loader.validate(elem, cx) {
                    errors.add(repr, err);
                }
            }
        }
        errors.into_result()
    }
}

pub(crate) fn create_map(
    rule: &Rule,
    ty: &TypeInfo,
    compiler: &mut Compiler<'_>,
) -> Result<Arc<dyn Validator>, CompileError> {
    let TypeKind::Map(key_ty, elem_ty) = ty.kind else {
        return Err(CompileError::unsupported(rule, ty));
    };
    let (min_props, max_props) = inclusive_bounds(rule, rule.range.as_ref())?;

    let key = compiler.compile_loader(param_rule(rule, 0)?, &key_ty(), &RuleModifier::default())?;
    let elem =
        compiler.compile_loader(param_rule(rule, 1)?, &elem_ty(), &RuleModifier::default())?;

    Ok(Arc::new(MapValidator {
        key,
        elem,
        min_props,
        max_props,
    }))
}

/// A parameter slot that must hold a nested rule, if anything.
fn param_rule(rule: &Rule, index: usize) -> Result<Option<Rule>, CompileError> {
    match rule.param(index) {
        None | Some(RuleParam::Empty) => Ok(None),
        Some(RuleParam::Rule(inner)) => Ok(Some(inner.clone())),
        Some(RuleParam::Lit(lit)) => Err(CompileError::param(
            rule,
            format!("expected a nested rule, got `{}`", lit),
        )),
    }
}

fn inclusive_bounds(
    rule: &Rule,
    range: Option<&RuleRange>,
) -> Result<(Option<u64>, Option<u64>), CompileError> {
    let Some(range) = range else {
        return Ok((None, None));
    };
    if range.exclusive_start || range.exclusive_end {
        return Err(CompileError::range(rule, "length range must be inclusive"));
    }
    let parse = |text: &str| text.parse::<u64>().map_err(|e| CompileError::range(rule, e));
    let min = range.start.as_deref().map(parse).transpose()?;
    let max = range.end.as_deref().map(parse).transpose()?;
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(CompileError::range(rule, "minimum exceeds maximum"));
        }
    }
    Ok((min, max))
}

fn check_len(
    target: &str,
    len: u64,
    min: Option<u64>,
    max: Option<u64>,
) -> Result<(), ValidationError> {
    if min.map_or(false, |m| len < m) || max.map_or(false, |m| len > m) {
        return Err(ValidationError::out_of_range(
            target,
            len,
            min.map(|m| m.to_string()),
            max.map(|m| m.to_string()),
            false,
            false,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::compile;
    use crate::Model;
    use std::collections::BTreeMap;

    fn strings(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::String(s.to_string())).collect())
    }

    mod slice_validator {
        use super::*;

        #[test]
        fn test_length_bounds() {
            let v = compile(
                "@slice<@string[1,]>[,2]",
                &<Vec<String>>::type_info(),
                &RuleModifier::default(),
            )
            .unwrap()
            .unwrap();
            assert!(v.validate(&mut strings(&["a", "b"])).is_ok());
            let err = v.validate(&mut strings(&["a", "b", "c"])).unwrap_err();
            assert_eq!(
                err.to_string(),
                "slice length should be less than 2, but got invalid value 3"
            );
        }

        #[test]
        fn test_element_errors_keep_index_and_message() {
            let v = compile(
                "@slice<@string[2,]>",
                &<Vec<String>>::type_info(),
                &RuleModifier::default(),
            )
            .unwrap()
            .unwrap();
            let err = v.validate(&mut strings(&["ok", "x", "fine", "y"])).unwrap_err();
            let ValidationError::Nested(set) = err else {
                panic!("expected nested errors");
            };
            let flat = set.flatten();
            assert_eq!(flat.len(), 2);
            assert_eq!(flat[0].path(), "[1]");
            assert_eq!(flat[1].path(), "[3]");
            assert_eq!(
                flat[0].error.to_string(),
                "string length should be larger than 2, but got invalid value 1"
            );
        }

        #[test]
        fn test_array_length_is_fixed() {
            assert!(compile(
                "@array<@int>[3]",
                &<[i32; 3]>::type_info(),
                &RuleModifier::default()
            )
            .is_ok());
            assert!(compile(
                "@array<@int>[2]",
                &<[i32; 3]>::type_info(),
                &RuleModifier::default()
            )
            .is_err());
            assert!(compile(
                "@array",
                &<Vec<i32>>::type_info(),
                &RuleModifier::default()
            )
            .is_err());
        }

        #[test]
        fn test_literal_element_param_is_rejected() {
            assert!(compile(
                "@slice<string>",
                &<Vec<String>>::type_info(),
                &RuleModifier::default()
            )
            .is_err());
        }
    }

    mod map_validator {
        use super::*;

        #[test]
        fn test_key_and_elem_paths() {
            let v = compile(
                "@map<@string[2,],@int[1,]>",
                &<BTreeMap<String, i32>>::type_info(),
                &RuleModifier::default(),
            )
            .unwrap()
            .unwrap();
            let mut value = Value::Map(vec![
                (Value::String("k".into()), Value::Int(1)),
                (Value::String("key".into()), Value::Int(-1)),
            ]);
            let ValidationError::Nested(set) = v.validate(&mut value).unwrap_err() else {
                panic!("expected nested errors");
            };
            let paths: Vec<String> = set.flatten().iter().map(|e| e.path()).collect();
            assert_eq!(paths, vec!["k/key", "key"]);
        }

        #[test]
        fn test_size_bounds() {
            let v = compile(
                "@map<,@int>[1,1]",
                &<BTreeMap<String, i32>>::type_info(),
                &RuleModifier::default(),
            )
            .unwrap()
            .unwrap();
            let mut value = Value::Map(vec![
                (Value::String("a".into()), Value::Int(1)),
                (Value::String("b".into()), Value::Int(2)),
            ]);
            assert!(matches!(
                v.validate(&mut value),
                Err(ValidationError::OutOfRange { .. })
            ));
        }
    }
}
