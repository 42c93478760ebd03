use super::{Model, TypeInfo, TypeKind, Value, ValueError};
use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;

/// Decodes a text-marshalled scalar; empty text yields the default.
pub fn text_from_value<T>(value: Value) -> Result<T, ValueError>
where
    T: FromStr + Default,
    T::Err: Display,
{
    match value {
        Value::Null => Ok(T::default()),
        Value::String(s) if s.is_empty() => Ok(T::default()),
        Value::String(s) => s
            .parse::<T>()
            .map_err(|e| ValueError::parse(type_name::<T>(), &s, e)),
        other => Err(ValueError::mismatch(type_name::<T>(), &other)),
    }
}

impl Model for bool {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Bool)
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(b),
            other => Err(ValueError::mismatch("bool", &other)),
        }
    }
}

macro_rules! int_model {
    ($($ty:ty => $bits:expr),+ $(,)?) => {$(
        impl Model for $ty {
            fn type_info() -> TypeInfo {
                TypeInfo::new::<Self>(TypeKind::Int { bits: $bits })
            }

            fn to_value(&self) -> Value {
                Value::Int(*self as i64)
            }

            fn from_value(value: Value) -> Result<Self, ValueError> {
                match value {
                    Value::Null => Ok(0),
                    Value::Int(i) => <$ty>::try_from(i)
                        .map_err(|e| ValueError::parse(stringify!($ty), &i.to_string(), e)),
                    Value::Uint(u) => <$ty>::try_from(u)
                        .map_err(|e| ValueError::parse(stringify!($ty), &u.to_string(), e)),
                    other => Err(ValueError::mismatch(stringify!($ty), &other)),
                }
            }
        }
    )+};
}

macro_rules! uint_model {
    ($($ty:ty => $bits:expr),+ $(,)?) => {$(
        impl Model for $ty {
            fn type_info() -> TypeInfo {
                TypeInfo::new::<Self>(TypeKind::Uint { bits: $bits })
            }

            fn to_value(&self) -> Value {
                Value::Uint(*self as u64)
            }

            fn from_value(value: Value) -> Result<Self, ValueError> {
                match value {
                    Value::Null => Ok(0),
                    Value::Uint(u) => <$ty>::try_from(u)
                        .map_err(|e| ValueError::parse(stringify!($ty), &u.to_string(), e)),
                    Value::Int(i) => <$ty>::try_from(i)
                        .map_err(|e| ValueError::parse(stringify!($ty), &i.to_string(), e)),
                    other => Err(ValueError::mismatch(stringify!($ty), &other)),
                }
            }
        }
    )+};
}

int_model!(i8 => 8, i16 => 16, i32 => 32, i64 => 64, isize => 64);
uint_model!(u8 => 8, u16 => 16, u32 => 32, u64 => 64, usize => 64);

macro_rules! float_model {
    ($($ty:ty => $bits:expr),+ $(,)?) => {$(
        impl Model for $ty {
            fn type_info() -> TypeInfo {
                TypeInfo::new::<Self>(TypeKind::Float { bits: $bits })
            }

            fn to_value(&self) -> Value {
                Value::Float(*self as f64)
            }

            fn from_value(value: Value) -> Result<Self, ValueError> {
                match value {
                    Value::Null => Ok(0.0),
                    Value::Float(f) => Ok(f as $ty),
                    Value::Int(i) => Ok(i as $ty),
                    Value::Uint(u) => Ok(u as $ty),
                    other => Err(ValueError::mismatch(stringify!($ty), &other)),
                }
            }
        }
    )+};
}

float_model!(f32 => 32, f64 => 64);

impl Model for String {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::String)
    }

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s),
            other => Err(ValueError::mismatch("string", &other)),
        }
    }
}

crate::text_model!(char);

impl<T: Model> Model for Vec<T> {
    fn type_info() -> TypeInfo {
        // Vec<u8> is a byte string, not a list of numbers.
        if TypeId::of::<T>() == TypeId::of::<u8>() {
            TypeInfo::new::<Self>(TypeKind::Bytes)
        } else {
            TypeInfo::new::<Self>(TypeKind::Slice(T::type_info))
        }
    }

    fn to_value(&self) -> Value {
        if let Some(bytes) = (self as &dyn Any).downcast_ref::<Vec<u8>>() {
            return Value::Bytes(bytes.clone());
        }
        Value::List(self.iter().map(Model::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Bytes(bytes) => {
                let boxed: Box<dyn Any> = Box::new(bytes);
                boxed
                    .downcast::<Vec<T>>()
                    .map(|v| *v)
                    .map_err(|_| ValueError::Mismatch {
                        expected: type_name::<Self>().to_string(),
                        found: "bytes",
                    })
            }
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(ValueError::mismatch(type_name::<Self>(), &other)),
        }
    }
}

impl<T: Model, const N: usize> Model for [T; N] {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Array(T::type_info, N))
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(Model::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        let items = match value {
            Value::Null => Vec::new(),
            Value::List(items) => items,
            other => return Err(ValueError::mismatch(type_name::<Self>(), &other)),
        };
        let mut out = Vec::with_capacity(N);
        for item in items.into_iter().take(N) {
            out.push(T::from_value(item)?);
        }
        while out.len() < N {
            out.push(T::from_value(Value::Null)?);
        }
        out.try_into().map_err(|_| ValueError::Mismatch {
            expected: type_name::<Self>().to_string(),
            found: "list",
        })
    }
}

impl<T: Model> Model for Option<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Option(T::type_info))
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Model> Model for Box<T> {
    fn type_info() -> TypeInfo {
        T::type_info()
    }

    fn to_value(&self) -> Value {
        (**self).to_value()
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        T::from_value(value).map(Box::new)
    }
}

impl<K, V> Model for HashMap<K, V>
where
    K: Model + Eq + Hash,
    V: Model,
{
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Map(K::type_info, V::type_info))
    }

    fn to_value(&self) -> Value {
        let mut entries: Vec<(Value, Value)> =
            self.iter().map(|(k, v)| (k.to_value(), v.to_value())).collect();
        entries.sort_by_key(|(k, _)| k.key_text());
        Value::Map(entries)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(HashMap::new()),
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(ValueError::mismatch(type_name::<Self>(), &other)),
        }
    }
}

impl<K, V> Model for BTreeMap<K, V>
where
    K: Model + Ord,
    V: Model,
{
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Map(K::type_info, V::type_info))
    }

    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.to_value(), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(BTreeMap::new()),
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(ValueError::mismatch(type_name::<Self>(), &other)),
        }
    }
}
