pub use crate::codec::{Codec, CodecError, CodecMgr, ContentWriter, CODEC_MGR};
pub use crate::config::TransportConfig;
pub use crate::errors::{error_codes, TransportError};
pub use crate::params::{params_of, Location, Parameter};
pub use crate::reflect::{FileHeader, TypeInfo, TypeKind, Value};
pub use crate::request::{Metadata, RequestInfo, RequestTransformer, RequestTransformerMgr};
pub use crate::response::{Cookie, Redirect, Reply, ResponseWriter, SameSite};
pub use crate::routing::{parse_path_pattern, PathParams, PathPattern};
pub use crate::rules::{parse_rule, Rule};
pub use crate::{Model, PostValidate};
pub use crate::validation::{
    register_fn_format, register_regex_format, BadRequest, CompiledValidator, StatusError,
    ValidationError, VALIDATOR_MGR,
};
