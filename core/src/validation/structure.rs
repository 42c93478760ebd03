//! # STRUCT VALIDATOR
//!
//! Walks exported fields, flattening embedded structs, and compiles each
//! field's `validate` / `default` / `errMsg` tags into a [`Loader`].
//! Fields without a rule whose type is a struct, slice or map get the
//! structural default, so nested records are validated automatically.
//!
//! Struct validators are stored in the compile arena and referenced through
//! [`StructRef`]; a type already being compiled resolves to its reserved slot.

use super::compiler::{Compiler, RuleModifier};
use super::errors::{CompileError, ErrorSet, ValidationError};
use super::{Loader, ValidateContext, Validator};
use crate::params::field_value;
use crate::reflect::{TypeInfo, Value};
use crate::rules::{parse_rule, Rule, RuleParam};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FieldValidator {
    /// Display name under the struct's naming tag.
    pub name: String,
    /// Field-index path from the struct root, through embedded structs.
    pub path: Vec<usize>,
    pub loader: Loader,
}

#[derive(Debug, Clone)]
pub struct StructValidator {
    pub named_tag_key: String,
    pub fields: Vec<FieldValidator>,
    ty: TypeInfo,
}

impl StructValidator {
    pub fn type_info(&self) -> &TypeInfo {
        &self.ty
    }
}

impl Validator for StructValidator {
    fn validate(&self, value: &mut Value, cx: &ValidateContext<'_>) -> Result<(), ValidationError> {
        if !matches!(value, Value::Struct(_)) {
            return Err(ValidationError::UnsupportedValue {
                validator: "struct",
                found: value.kind_name(),
            });
        }

        let mut errors = ErrorSet::new();
        for field in &self.fields {
            let cell = match field_value(value, &self.ty, &field.path) {
                Ok(cell) => cell,
                Err(err) => {
                    errors.add(field.name.as_str(), err.into());
                    continue;
                }
            };
            if let Err(err) = field.loader.validate(cell, cx) {
                errors.add(field.name.as_str(), err);
            }
        }
        errors.into_result()
    }
}

/// Index into the compile arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructRef(pub usize);

impl Validator for StructRef {
    fn validate(&self, value: &mut Value, cx: &ValidateContext<'_>) -> Result<(), ValidationError> {
        match cx.struct_validator(self.0) {
            Some(validator) => validator.validate(value, cx),
            None => Ok(()),
        }
    }
}

pub(crate) fn create_struct(
    rule: &Rule,
    ty: &TypeInfo,
    compiler: &mut Compiler<'_>,
) -> Result<Arc<dyn Validator>, CompileError> {
    if ty.as_struct().is_none() {
        return Err(CompileError::unsupported(rule, ty));
    }

    let key = match rule.param(0) {
        None | Some(RuleParam::Empty) => compiler.named_tag_key().to_string(),
        Some(RuleParam::Lit(key)) => key.clone(),
        Some(RuleParam::Rule(_)) => {
            return Err(CompileError::param(rule, "expected a tag key"));
        }
    };

    if let Some(index) = compiler.lookup_struct(ty.name, &key) {
        return Ok(Arc::new(StructRef(index)));
    }
    let index = compiler.begin_struct(ty.name, &key);

    let mut fields = Vec::new();
    compiler.with_tag_key(&key, |c| {
        collect_fields(c, ty, &key, &mut Vec::new(), &mut fields)
    })?;
    log::debug!(
        "compiled struct validator for {} ({} fields, tag `{}`)",
        ty,
        fields.len(),
        key
    );

    compiler.finish_struct(
        index,
        StructValidator {
            named_tag_key: key,
            fields,
            ty: ty.clone(),
        },
    );
    Ok(Arc::new(StructRef(index)))
}

fn collect_fields(
    compiler: &mut Compiler<'_>,
    ty: &TypeInfo,
    key: &str,
    prefix: &mut Vec<usize>,
    out: &mut Vec<FieldValidator>,
) -> Result<(), CompileError> {
    let Some(info) = ty.as_struct() else {
        return Ok(());
    };

    for field in info.fields.iter().filter(|f| f.exported) {
        let name = match field.tags.name_and_flags(key) {
            Some((name, _)) if !name.is_empty() => name,
            _ => field.ident,
        };
        if name == "-" {
            continue;
        }

        let field_ty = field.type_info();
        let rule_src = field.tags.get("validate").filter(|s| !s.trim().is_empty());
        prefix.push(field.index);

        let flatten = field.embedded && rule_src.is_none() && field_ty.deref().as_struct().is_some();
        if flatten {
            collect_fields(compiler, &field_ty.deref(), key, prefix, out)?;
        } else {
            let wrap = |source: CompileError| CompileError::Field {
                field: name.to_string(),
                source: Box::new(source),
            };
            let rule = rule_src
                .map(parse_rule)
                .transpose()
                .map_err(|e| wrap(e.into()))?;
            let modifier = RuleModifier::from_tags(&field.tags);
            if let Some(loader) = compiler
                .compile_loader(rule, &field_ty, &modifier)
                .map_err(wrap)?
            {
                out.push(FieldValidator {
                    name: name.to_string(),
                    path: prefix.clone(),
                    loader,
                });
            }
        }

        prefix.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{FieldInfo, TagMap};
    use crate::validation::compile;
    use crate::Model;

    // Hand-written metadata, the shape `#[derive(Model)]` generates.
    struct Inner;
    struct Outer;
    struct Node;

    fn inner_info() -> TypeInfo {
        TypeInfo::structure::<Inner>(
            "Inner",
            vec![FieldInfo::new(
                "a",
                0,
                true,
                false,
                TagMap::from_pairs(&[("name", "a"), ("validate", "@string[2,]")]),
                String::type_info,
            )],
        )
    }

    fn outer_info() -> TypeInfo {
        TypeInfo::structure::<Outer>(
            "Outer",
            vec![
                FieldInfo::new(
                    "id",
                    0,
                    true,
                    false,
                    TagMap::from_pairs(&[("name", "id"), ("validate", "@int[1,]")]),
                    i32::type_info,
                ),
                FieldInfo::new(
                    "nested_for_failed",
                    1,
                    true,
                    false,
                    TagMap::from_pairs(&[("name", "NestedForFailed")]),
                    inner_info,
                ),
                FieldInfo::new("embedded", 2, true, true, TagMap::new(), inner_info),
                FieldInfo::new(
                    "hidden",
                    3,
                    false,
                    false,
                    TagMap::from_pairs(&[("validate", "@int[1,]")]),
                    i32::type_info,
                ),
            ],
        )
    }

    fn node_info() -> TypeInfo {
        TypeInfo::structure::<Node>(
            "Node",
            vec![
                FieldInfo::new(
                    "value",
                    0,
                    true,
                    false,
                    TagMap::from_pairs(&[("validate", "@int[1,]")]),
                    i32::type_info,
                ),
                FieldInfo::new("next", 1, true, false, TagMap::new(), node_option_info),
            ],
        )
    }

    fn node_option_info() -> TypeInfo {
        TypeInfo::new::<Option<Node>>(crate::reflect::TypeKind::Option(node_info))
    }

    #[test]
    fn test_nested_and_embedded_paths() {
        let v = compile("", &outer_info(), &RuleModifier::default())
            .unwrap()
            .unwrap();
        let mut value = Value::Struct(vec![
            Value::Int(0),
            Value::Struct(vec![Value::String("x".into())]),
            Value::Struct(vec![Value::String("y".into())]),
            Value::Int(0),
        ]);
        let ValidationError::Nested(set) = v.validate(&mut value).unwrap_err() else {
            panic!("expected nested errors");
        };
        let paths: Vec<String> = set.flatten().iter().map(|e| e.path()).collect();
        assert_eq!(paths, vec!["id", "NestedForFailed.a", "a"]);
    }

    #[test]
    fn test_valid_struct_passes() {
        let v = compile("@struct", &outer_info(), &RuleModifier::default())
            .unwrap()
            .unwrap();
        let mut value = Value::Struct(vec![
            Value::Int(3),
            Value::Struct(vec![Value::String("xx".into())]),
            Value::Struct(vec![Value::String("yy".into())]),
            Value::Int(0),
        ]);
        assert!(v.validate(&mut value).is_ok());
    }

    #[test]
    fn test_recursive_struct_compiles_and_validates() {
        let v = compile("", &node_info(), &RuleModifier::default())
            .unwrap()
            .unwrap();
        let mut value = Value::Struct(vec![
            Value::Int(1),
            Value::Struct(vec![Value::Int(0), Value::Null]),
        ]);
        let ValidationError::Nested(set) = v.validate(&mut value).unwrap_err() else {
            panic!("expected nested errors");
        };
        assert_eq!(set.flatten()[0].path(), "next.value");
    }

    #[test]
    fn test_tag_key_parameter() {
        let v = compile("@struct<json>", &outer_info(), &RuleModifier::default())
            .unwrap()
            .unwrap();
        let mut value = Value::Struct(vec![
            Value::Int(0),
            Value::Struct(vec![Value::String("xx".into())]),
            Value::Struct(vec![Value::String("yy".into())]),
            Value::Int(0),
        ]);
        let ValidationError::Nested(set) = v.validate(&mut value).unwrap_err() else {
            panic!("expected nested errors");
        };
        // No `json` tags, so idents are used.
        assert_eq!(set.flatten()[0].path(), "id");
    }

    #[test]
    fn test_bad_field_rule_names_the_field() {
        struct Broken;
        fn broken_info() -> TypeInfo {
            TypeInfo::structure::<Broken>(
                "Broken",
                vec![FieldInfo::new(
                    "n",
                    0,
                    true,
                    false,
                    TagMap::from_pairs(&[("validate", "@string")]),
                    i32::type_info,
                )],
            )
        }
        let err = compile("", &broken_info(), &RuleModifier::default()).unwrap_err();
        assert!(matches!(err, CompileError::Field { ref field, .. } if field == "n"));
    }
}
