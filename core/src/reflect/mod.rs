//! # TYPE METADATA
//!
//! **PURPOSE**: Build-time replacement for runtime reflection.
//!
//! Every record type implements [`Model`] (usually through
//! `#[derive(Model)]`), which exposes a static [`TypeInfo`] and converts
//! instances to and from the dynamic [`Value`] tree that the parameter
//! walker, codecs and validators operate on.

pub mod file;
mod impls;
pub mod text;
pub mod types;
pub mod value;

pub use file::FileHeader;
pub use impls::text_from_value;
pub use types::{FieldInfo, StructInfo, TagMap, TypeFn, TypeInfo, TypeKind};
pub use value::{Value, ValueError};

use crate::validation::BadRequest;

/// A type the marshalling engine can describe, encode and decode.
pub trait Model: Sized + Send + Sync + 'static {
    /// Static description of the type.
    fn type_info() -> TypeInfo;

    /// Snapshot of this instance as a dynamic value.
    fn to_value(&self) -> Value;

    /// Rebuilds an instance from a dynamic value. `Null` yields the zero value.
    fn from_value(value: Value) -> Result<Self, ValueError>;

    /// Record-level cross-field checks, run after every parameter is validated.
    fn post_validate(&self, _errors: &mut BadRequest) {}
}

/// Legacy hook for records that add cross-field errors after decoding.
///
/// Enabled on derived models with `#[courier(post_validate)]`.
pub trait PostValidate {
    fn post_validate(&self, errors: &mut BadRequest);
}

/// Implements [`Model`] for `Display + FromStr + Default` scalars, the text-marshalling protocol.
#[macro_export]
macro_rules! text_model {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::Model for $ty {
            fn type_info() -> $crate::reflect::TypeInfo {
                $crate::reflect::TypeInfo::new::<$ty>($crate::reflect::TypeKind::Text)
            }

            fn to_value(&self) -> $crate::reflect::Value {
                $crate::reflect::Value::String(::std::string::ToString::to_string(self))
            }

            fn from_value(
                value: $crate::reflect::Value,
            ) -> ::std::result::Result<Self, $crate::reflect::ValueError> {
                $crate::reflect::text_from_value::<$ty>(value)
            }
        }
    )+};
}
