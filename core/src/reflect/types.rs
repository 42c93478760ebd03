use crate::reflect::Value;
use std::any::TypeId;
use std::fmt;

/// Lazily produces the description of a child type, so recursive records stay describable.
pub type TypeFn = fn() -> TypeInfo;

/// Static description of a model type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// Canonical identifier (`std::any::type_name`), used as cycle key.
    pub name: &'static str,
    pub type_id: TypeId,
    pub kind: TypeKind,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Bool,
    Int { bits: u8 },
    Uint { bits: u8 },
    Float { bits: u8 },
    String,
    Bytes,
    /// A scalar rendered through `Display` / `FromStr`.
    Text,
    /// A multipart file header.
    File,
    Option(TypeFn),
    Slice(TypeFn),
    Array(TypeFn, usize),
    Map(TypeFn, TypeFn),
    Struct(StructInfo),
}

#[derive(Debug, Clone)]
pub struct StructInfo {
    /// Short type name, e.g. `User`.
    pub name: &'static str,
    pub fields: Vec<FieldInfo>,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub ident: &'static str,
    pub index: usize,
    /// `pub` fields only; others are never walked.
    pub exported: bool,
    /// Rust stand-in for an anonymous embedded field.
    pub embedded: bool,
    pub tags: TagMap,
    pub ty: TypeFn,
}

impl TypeInfo {
    pub fn new<T: 'static>(kind: TypeKind) -> Self {
        Self {
            name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            kind,
        }
    }

    pub fn structure<T: 'static>(name: &'static str, fields: Vec<FieldInfo>) -> Self {
        Self::new::<T>(TypeKind::Struct(StructInfo { name, fields }))
    }

    /// Strips `Option` layers, the equivalent of dereferencing pointers.
    pub fn deref(&self) -> TypeInfo {
        let mut current = self.clone();
        while let TypeKind::Option(inner) = current.kind {
            current = inner();
        }
        current
    }

    pub fn is_option(&self) -> bool {
        matches!(self.kind, TypeKind::Option(_))
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self.kind, TypeKind::Bytes)
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, TypeKind::Text)
    }

    pub fn as_struct(&self) -> Option<&StructInfo> {
        match &self.kind {
            TypeKind::Struct(info) => Some(info),
            _ => None,
        }
    }

    /// Element type of a slice or array.
    pub fn elem(&self) -> Option<TypeInfo> {
        match self.kind {
            TypeKind::Slice(elem) | TypeKind::Array(elem, _) => Some(elem()),
            TypeKind::Map(_, elem) => Some(elem()),
            TypeKind::Option(inner) => Some(inner()),
            _ => None,
        }
    }

    /// True for slices and arrays whose elements are not bytes.
    pub fn is_sequence(&self) -> bool {
        matches!(self.kind, TypeKind::Slice(_) | TypeKind::Array(_, _))
    }

    pub fn kind_name(&self) -> String {
        match &self.kind {
            TypeKind::Bool => "bool".into(),
            TypeKind::Int { bits } => format!("int{}", bits),
            TypeKind::Uint { bits } => format!("uint{}", bits),
            TypeKind::Float { bits } => format!("float{}", bits),
            TypeKind::String => "string".into(),
            TypeKind::Bytes => "bytes".into(),
            TypeKind::Text => "text".into(),
            TypeKind::File => "file".into(),
            TypeKind::Option(inner) => format!("*{}", inner().kind_name()),
            TypeKind::Slice(elem) => format!("[]{}", elem().kind_name()),
            TypeKind::Array(elem, len) => format!("[{}]{}", len, elem().kind_name()),
            TypeKind::Map(key, elem) => {
                format!("map[{}]{}", key().kind_name(), elem().kind_name())
            }
            TypeKind::Struct(info) => info.name.into(),
        }
    }

    /// Zero value used when a cell has to be allocated.
    pub fn zero_value(&self) -> Value {
        match &self.kind {
            TypeKind::Bool => Value::Bool(false),
            TypeKind::Int { .. } => Value::Int(0),
            TypeKind::Uint { .. } => Value::Uint(0),
            TypeKind::Float { .. } => Value::Float(0.0),
            TypeKind::String | TypeKind::Text => Value::String(String::new()),
            TypeKind::Bytes => Value::Bytes(Vec::new()),
            TypeKind::File | TypeKind::Option(_) => Value::Null,
            TypeKind::Slice(_) => Value::List(Vec::new()),
            TypeKind::Array(elem, len) => {
                let elem = elem();
                Value::List((0..*len).map(|_| elem.zero_value()).collect())
            }
            TypeKind::Map(_, _) => Value::Map(Vec::new()),
            TypeKind::Struct(info) => {
                Value::Struct(info.fields.iter().map(|f| (f.ty)().zero_value()).collect())
            }
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FieldInfo {
    pub fn new(
        ident: &'static str,
        index: usize,
        exported: bool,
        embedded: bool,
        tags: TagMap,
        ty: TypeFn,
    ) -> Self {
        Self {
            ident,
            index,
            exported,
            embedded,
            tags,
            ty,
        }
    }

    pub fn type_info(&self) -> TypeInfo {
        (self.ty)()
    }
}

/// Ordered key/value metadata attached to a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    entries: Vec<(String, String)>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut tags = Self::new();
        for (key, value) in pairs {
            tags.insert(*key, *value);
        }
        tags
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Splits a naming tag such as `name:"id,omitempty"` into the display name and its flags.
    pub fn name_and_flags(&self, key: &str) -> Option<(&str, Vec<&str>)> {
        let raw = self.get(key)?;
        let mut parts = raw.split(',');
        let name = parts.next().unwrap_or_default().trim();
        Some((name, parts.map(str::trim).filter(|s| !s.is_empty()).collect()))
    }
}
