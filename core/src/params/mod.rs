//! # PARAMETER WALKER
//!
//! Enumerates the leaf parameters of a record type from its [`TypeInfo`],
//! caches the resulting plan per `(type, naming tag)` and resolves field
//! cells inside a [`Value`] tree by field-index path.

pub mod types;

pub use types::{Location, Parameter, UnknownLocation};

use crate::reflect::{TypeInfo, Value, ValueError};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

type PlanKey = (TypeId, String);

static PLANS: Lazy<RwLock<HashMap<PlanKey, Arc<[Parameter]>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Visits every parameter of `ty` in declaration order. Stops when `emit` returns false.
pub fn walk(ty: &TypeInfo, named_tag_key: &str, emit: &mut dyn FnMut(Parameter) -> bool) {
    walk_inner(ty, named_tag_key, &mut Vec::new(), emit);
}

fn walk_inner(
    ty: &TypeInfo,
    named_tag_key: &str,
    prefix: &mut Vec<usize>,
    emit: &mut dyn FnMut(Parameter) -> bool,
) -> bool {
    let target = ty.deref();
    let Some(info) = target.as_struct() else {
        return true;
    };

    for field in info.fields.iter().filter(|f| f.exported) {
        let named = field.tags.name_and_flags(named_tag_key);
        let (name, omitempty) = match &named {
            Some((name, flags)) => (
                if name.is_empty() { field.ident } else { *name },
                flags.contains(&"omitempty"),
            ),
            None => (field.ident, false),
        };
        if name == "-" {
            continue;
        }

        let field_ty = field.type_info();
        let location = field.tags.get("in");
        prefix.push(field.index);

        let descend = field.embedded
            && location.is_none()
            && named.is_none()
            && field_ty.deref().as_struct().is_some();
        let keep_going = if descend {
            walk_inner(&field_ty, named_tag_key, prefix, emit)
        } else {
            let location = match location.map(str::parse::<Location>) {
                Some(Ok(loc)) => Some(loc),
                Some(Err(err)) => {
                    log::warn!("{}.{}: {}", info.name, field.ident, err);
                    None
                }
                None => None,
            };
            emit(Parameter {
                name: name.to_string(),
                ident: field.ident,
                location,
                path: prefix.clone(),
                ty: field_ty,
                tags: field.tags.clone(),
                omitempty,
            })
        };

        prefix.pop();
        if !keep_going {
            return false;
        }
    }
    true
}

/// Cached parameter plan of `ty` under `named_tag_key`.
pub fn params_of(ty: &TypeInfo, named_tag_key: &str) -> Arc<[Parameter]> {
    let key = (ty.type_id, named_tag_key.to_string());
    if let Some(plan) = PLANS.read().get(&key) {
        return plan.clone();
    }

    let mut params = Vec::new();
    walk(ty, named_tag_key, &mut |p| {
        params.push(p);
        true
    });
    let plan: Arc<[Parameter]> = params.into();

    PLANS
        .write()
        .entry(key)
        .or_insert_with(|| {
            log::debug!(
                "built parameter plan for {} ({} parameters, tag `{}`)",
                ty,
                plan.len(),
                named_tag_key
            );
            plan
        })
        .clone()
}

/// Resolves the cell at `path`, allocating zero structs on `Null` links.
pub fn field_value<'v>(
    root: &'v mut Value,
    ty: &TypeInfo,
    path: &[usize],
) -> Result<&'v mut Value, ValueError> {
    let mut current = root;
    let mut current_ty = ty.deref();

    for &index in path {
        if current.is_null() {
            *current = current_ty.zero_value();
        }
        let field_ty = current_ty
            .as_struct()
            .and_then(|info| info.fields.iter().find(|f| f.index == index))
            .map(|f| f.type_info())
            .ok_or_else(|| ValueError::Unsupported {
                ty: current_ty.kind_name(),
                operation: "field access",
            })?;

        current = match current {
            Value::Struct(fields) => {
                if fields.len() <= index {
                    fields.resize(index + 1, Value::Null);
                }
                &mut fields[index]
            }
            other => return Err(ValueError::mismatch("struct", other)),
        };
        current_ty = field_ty.deref();
    }
    Ok(current)
}

/// Read-only lookup; `None` when a link on the path is `Null`.
pub fn field_ref<'v>(root: &'v Value, path: &[usize]) -> Option<&'v Value> {
    let mut current = root;
    for &index in path {
        match current {
            Value::Struct(fields) => current = fields.get(index)?,
            _ => return None,
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{FieldInfo, TagMap, TypeKind};
    use crate::Model;

    struct Embedded;
    struct Record;

    fn embedded_info() -> TypeInfo {
        TypeInfo::structure::<Embedded>(
            "Embedded",
            vec![FieldInfo::new(
                "page",
                0,
                true,
                false,
                TagMap::from_pairs(&[("in", "query"), ("name", "page,omitempty")]),
                i32::type_info,
            )],
        )
    }

    fn optional_embedded_info() -> TypeInfo {
        TypeInfo::new::<Option<Embedded>>(TypeKind::Option(embedded_info))
    }

    fn record_info() -> TypeInfo {
        TypeInfo::structure::<Record>(
            "Record",
            vec![
                FieldInfo::new(
                    "id",
                    0,
                    true,
                    false,
                    TagMap::from_pairs(&[("in", "path"), ("name", "id")]),
                    String::type_info,
                ),
                FieldInfo::new("secret", 1, false, false, TagMap::new(), String::type_info),
                FieldInfo::new(
                    "skipped",
                    2,
                    true,
                    false,
                    TagMap::from_pairs(&[("in", "query"), ("name", "-")]),
                    String::type_info,
                ),
                FieldInfo::new("paging", 3, true, true, TagMap::new(), optional_embedded_info),
                FieldInfo::new(
                    "token",
                    4,
                    true,
                    false,
                    TagMap::from_pairs(&[("in", "header")]),
                    String::type_info,
                ),
            ],
        )
    }

    #[test]
    fn test_walk_order_names_and_paths() {
        let plan = params_of(&record_info(), "name");
        let summary: Vec<(&str, Option<Location>, Vec<usize>, bool)> = plan
            .iter()
            .map(|p| (p.name.as_str(), p.location, p.path.clone(), p.omitempty))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("id", Some(Location::Path), vec![0], false),
                ("page", Some(Location::Query), vec![3, 0], true),
                ("token", Some(Location::Header), vec![4], false),
            ]
        );
    }

    #[test]
    fn test_plan_is_cached_and_deterministic() {
        let a = params_of(&record_info(), "name");
        let b = params_of(&record_info(), "name");
        assert!(Arc::ptr_eq(&a, &b));

        let mut fresh = Vec::new();
        walk(&record_info(), "name", &mut |p| {
            fresh.push(p.path);
            true
        });
        let cached: Vec<Vec<usize>> = a.iter().map(|p| p.path.clone()).collect();
        assert_eq!(fresh, cached);
    }

    #[test]
    fn test_walk_stops_when_emit_declines() {
        let mut seen = 0;
        walk(&record_info(), "name", &mut |_| {
            seen += 1;
            false
        });
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_field_value_allocates_null_links() {
        let mut value = Value::Struct(vec![
            Value::String("1".into()),
            Value::String(String::new()),
            Value::String(String::new()),
            Value::Null,
            Value::String(String::new()),
        ]);
        let cell = field_value(&mut value, &record_info(), &[3, 0]).unwrap();
        *cell = Value::Int(2);
        assert_eq!(field_ref(&value, &[3, 0]), Some(&Value::Int(2)));
    }

    #[test]
    fn test_field_ref_stops_at_null() {
        let value = Value::Struct(vec![Value::Null, Value::Null, Value::Null, Value::Null]);
        assert_eq!(field_ref(&value, &[3, 0]), None);
    }

    #[test]
    fn test_unknown_location_is_an_error() {
        assert!("nowhere".parse::<Location>().is_err());
        assert_eq!("cookie".parse::<Location>().unwrap(), Location::Cookie);
    }
}
