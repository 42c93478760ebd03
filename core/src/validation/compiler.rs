//! Validator registry and the per-compile struct arena.

use super::errors::CompileError;
use super::structure::StructValidator;
use super::{collection, number, strfmt, string, structure};
use super::{CompiledValidator, Loader, Validator};
use crate::reflect::{TagMap, TypeInfo, TypeKind};
use crate::rules::{parse_rule, Rule};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a validator for a parsed rule and a dereferenced target type.
pub type Creator = Arc<
    dyn Fn(&Rule, &TypeInfo, &mut Compiler<'_>) -> Result<Arc<dyn Validator>, CompileError>
        + Send
        + Sync,
>;

/// Process-wide registry, populated with the built-in validators and formats.
pub static VALIDATOR_MGR: Lazy<ValidatorMgr> = Lazy::new(ValidatorMgr::new);

/// Compiles `rule` against `ty` with the process-wide registry and the `name` tag key.
pub fn compile(
    rule: &str,
    ty: &TypeInfo,
    modifier: &RuleModifier,
) -> Result<Option<CompiledValidator>, CompileError> {
    VALIDATOR_MGR.compile(rule, ty, modifier)
}

/// Tag-driven adjustments applied on top of a parsed rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleModifier {
    pub optional: bool,
    pub default_value: Option<String>,
    pub err_msg: Option<String>,
}

impl RuleModifier {
    /// Reads the `default` and `errMsg` tags.
    pub fn from_tags(tags: &TagMap) -> Self {
        Self {
            optional: false,
            default_value: tags.get("default").map(str::to_string),
            err_msg: tags.get("errMsg").map(str::to_string),
        }
    }

    fn apply(&self, rule: &mut Rule) {
        if self.optional {
            rule.optional = true;
        }
        if let Some(default) = &self.default_value {
            rule.optional = true;
            rule.default_value = Some(default.clone());
        }
    }
}

pub struct ValidatorMgr {
    creators: RwLock<HashMap<String, Creator>>,
}

impl Default for ValidatorMgr {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorMgr {
    pub fn new() -> Self {
        let mgr = Self {
            creators: RwLock::new(HashMap::new()),
        };
        mgr.register(
            &["int", "int8", "int16", "int32", "int64"],
            number::create_int,
        );
        mgr.register(
            &["uint", "uint8", "uint16", "uint32", "uint64"],
            number::create_uint,
        );
        mgr.register(
            &["float", "float32", "double", "float64"],
            number::create_float,
        );
        mgr.register(&["string", "char"], string::create_string);
        mgr.register(&["slice", "array"], collection::create_slice);
        mgr.register(&["map"], collection::create_map);
        mgr.register(&["struct"], structure::create_struct);
        strfmt::register_builtin_formats(&mgr);
        mgr
    }

    pub fn register<F>(&self, names: &[&str], creator: F)
    where
        F: Fn(&Rule, &TypeInfo, &mut Compiler<'_>) -> Result<Arc<dyn Validator>, CompileError>
            + Send
            + Sync
            + 'static,
    {
        let creator: Creator = Arc::new(creator);
        let mut creators = self.creators.write();
        for name in names {
            creators.insert(name.to_string(), creator.clone());
        }
    }

    pub fn creator(&self, name: &str) -> Option<Creator> {
        self.creators.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.creators.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn compile(
        &self,
        rule: &str,
        ty: &TypeInfo,
        modifier: &RuleModifier,
    ) -> Result<Option<CompiledValidator>, CompileError> {
        self.compile_with_tag_key(rule, ty, modifier, "name")
    }

    /// `Ok(None)` when the rule is empty and the type needs no structural default.
    pub fn compile_with_tag_key(
        &self,
        rule: &str,
        ty: &TypeInfo,
        modifier: &RuleModifier,
        named_tag_key: &str,
    ) -> Result<Option<CompiledValidator>, CompileError> {
        let parsed = if rule.trim().is_empty() {
            None
        } else {
            Some(parse_rule(rule)?)
        };

        let mut compiler = Compiler::new(self, named_tag_key);
        match compiler.compile_loader(parsed, ty, modifier)? {
            Some(root) => {
                log::debug!("compiled validator `{}` for {}", root.rule(), ty);
                compiler.finish(root).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// State of one compile: the struct arena and the in-flight memo that breaks cycles.
pub struct Compiler<'a> {
    mgr: &'a ValidatorMgr,
    named_tag_key: String,
    structs: Vec<Option<StructValidator>>,
    memo: HashMap<(&'static str, String), usize>,
}

impl<'a> Compiler<'a> {
    pub fn new(mgr: &'a ValidatorMgr, named_tag_key: &str) -> Self {
        Self {
            mgr,
            named_tag_key: named_tag_key.to_string(),
            structs: Vec::new(),
            memo: HashMap::new(),
        }
    }

    pub fn named_tag_key(&self) -> &str {
        &self.named_tag_key
    }

    /// Compiles a loader for `ty`. A missing rule falls back to the structural default.
    pub fn compile_loader(
        &mut self,
        rule: Option<Rule>,
        ty: &TypeInfo,
        modifier: &RuleModifier,
    ) -> Result<Option<Loader>, CompileError> {
        let target = ty.deref();
        let mut rule = match rule {
            Some(rule) => rule,
            None => match default_rule(&target) {
                Some(name) => {
                    // Structural defaults never make a field required.
                    let mut rule = Rule::new(name);
                    rule.optional = true;
                    rule
                }
                None if modifier.default_value.is_some() => {
                    return Ok(Some(Loader {
                        inner: None,
                        optional: true,
                        default_value: modifier.default_value.clone(),
                        err_msg: modifier.err_msg.clone(),
                        ty: ty.clone(),
                        rule: String::new(),
                    }));
                }
                None => return Ok(None),
            },
        };
        modifier.apply(&mut rule);

        let creator = self
            .mgr
            .creator(&rule.name)
            .ok_or_else(|| CompileError::UnknownRule {
                name: rule.name.clone(),
            })?;
        let inner = creator(&rule, &target, self)?;

        Ok(Some(Loader {
            inner: Some(inner),
            optional: rule.optional,
            default_value: rule.default_value.clone(),
            err_msg: modifier.err_msg.clone(),
            ty: ty.clone(),
            rule: rule.to_string(),
        }))
    }

    pub(crate) fn lookup_struct(&self, type_name: &'static str, key: &str) -> Option<usize> {
        self.memo.get(&(type_name, key.to_string())).copied()
    }

    /// Reserves an arena slot before the fields are compiled.
    pub(crate) fn begin_struct(&mut self, type_name: &'static str, key: &str) -> usize {
        let index = self.structs.len();
        self.structs.push(None);
        self.memo.insert((type_name, key.to_string()), index);
        index
    }

    pub(crate) fn finish_struct(&mut self, index: usize, validator: StructValidator) {
        if let Some(slot) = self.structs.get_mut(index) {
            *slot = Some(validator);
        }
    }

    /// Runs `f` with a different inherited naming tag.
    pub(crate) fn with_tag_key<R>(&mut self, key: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = std::mem::replace(&mut self.named_tag_key, key.to_string());
        let out = f(self);
        self.named_tag_key = saved;
        out
    }

    fn finish(self, root: Loader) -> Result<CompiledValidator, CompileError> {
        let structs = self
            .structs
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CompileError::InvalidParam {
                rule: root.rule.clone(),
                reason: "struct validator left incomplete".to_string(),
            })?;
        Ok(CompiledValidator::new(structs, root))
    }
}

fn default_rule(ty: &TypeInfo) -> Option<&'static str> {
    match ty.kind {
        TypeKind::Struct(_) => Some("struct"),
        TypeKind::Slice(_) | TypeKind::Array(_, _) => Some("slice"),
        TypeKind::Map(_, _) => Some("map"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::Value;
    use crate::validation::ValidationError;
    use crate::Model;

    #[test]
    fn test_unknown_rule_fails() {
        let err = compile("@nope", &String::type_info(), &RuleModifier::default()).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownRule {
                name: "nope".into()
            }
        );
    }

    #[test]
    fn test_syntax_error_surfaces_at_compile() {
        let err = compile("@int[1,", &i32::type_info(), &RuleModifier::default()).unwrap_err();
        assert!(matches!(err, CompileError::Rule(_)));
    }

    #[test]
    fn test_empty_rule_on_scalar_has_no_validator() {
        assert!(compile("", &i32::type_info(), &RuleModifier::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_empty_rule_on_slice_uses_structural_default() {
        let v = compile("", &<Vec<String>>::type_info(), &RuleModifier::default())
            .unwrap()
            .unwrap();
        assert_eq!(v.rule(), "@slice?");
        assert!(v.validate(&mut Value::List(vec![])).is_ok());
    }

    #[test]
    fn test_default_tag_without_rule_still_applies() {
        let modifier = RuleModifier {
            default_value: Some("7".into()),
            ..Default::default()
        };
        let v = compile("", &i64::type_info(), &modifier).unwrap().unwrap();
        let mut value = Value::Int(0);
        v.validate(&mut value).unwrap();
        assert_eq!(value, Value::Int(7));
    }

    #[test]
    fn test_custom_creator_registration() {
        #[derive(Debug)]
        struct Never;
        impl Validator for Never {
            fn validate(
                &self,
                _value: &mut Value,
                _cx: &crate::validation::ValidateContext<'_>,
            ) -> Result<(), ValidationError> {
                Err(ValidationError::Custom("never".into()))
            }
        }

        let mgr = ValidatorMgr::new();
        mgr.register(&["never"], |_rule: &Rule, _ty: &TypeInfo, _c: &mut Compiler<'_>| {
            Ok(Arc::new(Never) as Arc<dyn Validator>)
        });
        assert!(mgr.names().contains(&"never".to_string()));
        let v = mgr
            .compile("@never", &String::type_info(), &RuleModifier::default())
            .unwrap()
            .unwrap();
        assert!(v.validate(&mut Value::String("x".into())).is_err());
    }
}
