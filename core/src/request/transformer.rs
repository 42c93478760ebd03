//! # REQUEST TRANSFORMER
//!
//! **PARAMETER PLAN -> HTTP REQUEST, AND BACK**
//!
//! A transformer is built once per record type: every parameter gets a
//! codec (from its `mime` tag or inferred) and a compiled validator. The
//! plan is immutable and shared through [`RequestTransformerMgr`].
//!
//! ## DECODE STATE MACHINE
//!
//! Per parameter: `pending -> decoded -> validated -> done`. A failure in
//! either step is recorded in the [`BadRequest`] accumulator and the next
//! parameter is processed, so a 400 lists every offending field.

use crate::codec::urlencoded::encode_pairs;
use crate::codec::{BodyWriter, CodecError, CodecMgr, ParamCodec, StringBuilders, StringReaders};
use crate::config::TransportConfig;
use crate::errors::{error_codes, TransportError};
use crate::params::{field_ref, field_value, params_of, Location, Parameter};
use crate::reflect::{Model, TypeInfo, Value};
use crate::request::parser::{parse_query_string, render_cookies};
use crate::request::types::{Metadata, RequestInfo};
use crate::routing::{parse_path_pattern, PathParams};
use crate::validation::{
    BadRequest, CompiledValidator, RuleModifier, ValidationError, VALIDATOR_MGR,
};
use hyper::body::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use http::Method;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// One planned parameter: where it lives, how it is encoded, how it is checked.
#[derive(Clone)]
pub struct TransformedParameter {
    pub param: Parameter,
    pub codec: ParamCodec,
    pub validator: Option<CompiledValidator>,
}

pub struct RequestTransformer {
    ty: TypeInfo,
    query_in_body: bool,
    /// Declaration order; decode walks this so 400 bodies list fields as declared.
    parameters: Vec<TransformedParameter>,
    /// Indices into `parameters`, grouped by location for encoding.
    in_parameters: BTreeMap<Location, Vec<usize>>,
}

impl RequestTransformer {
    pub fn new(
        ty: &TypeInfo,
        codecs: &CodecMgr,
        config: &TransportConfig,
    ) -> Result<Self, TransportError> {
        let mut parameters = Vec::new();
        let mut in_parameters: BTreeMap<Location, Vec<usize>> = BTreeMap::new();
        for param in params_of(ty, &config.named_tag_key).iter() {
            let Some(location) = param.location else {
                continue;
            };
            let codec = codecs.param_codec(param)?;
            let validator = VALIDATOR_MGR
                .compile_with_tag_key(
                    param.rule(),
                    &param.ty,
                    &RuleModifier::from_tags(&param.tags),
                    &config.named_tag_key,
                )
                .map_err(|e| crate::validation::CompileError::Field {
                    field: param.name.clone(),
                    source: Box::new(e),
                })?;
            in_parameters.entry(location).or_default().push(parameters.len());
            parameters.push(TransformedParameter {
                param: param.clone(),
                codec,
                validator,
            });
        }

        if in_parameters
            .get(&Location::Body)
            .map_or(false, |body| body.len() > 1)
        {
            return Err(TransportError::internal(
                error_codes::BUILD_FAILED,
                format!("{} declares more than one body parameter", ty),
            ));
        }

        log::debug!(
            "built request transformer for {} ({} parameters)",
            ty,
            parameters.len()
        );
        Ok(Self {
            ty: ty.clone(),
            query_in_body: config.query_in_body,
            parameters,
            in_parameters,
        })
    }

    pub fn type_info(&self) -> &TypeInfo {
        &self.ty
    }

    pub fn parameters(&self, location: Location) -> impl Iterator<Item = &TransformedParameter> {
        self.in_parameters
            .get(&location)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&i| &self.parameters[i])
    }

    fn check_type<T: Model>(&self) -> Result<(), TransportError> {
        if TypeId::of::<T>() == self.ty.type_id {
            Ok(())
        } else {
            Err(TransportError::UnmatchedTransformer {
                expected: self.ty.name,
                actual: std::any::type_name::<T>(),
            })
        }
    }

    // ============================================================================================
    // ENCODE
    // ============================================================================================

    fn encode_values(
        &self,
        location: Location,
        value: &Value,
    ) -> Result<Vec<(String, String)>, TransportError> {
        let mut pairs = Vec::new();
        for tp in self.parameters(location) {
            let cell = field_ref(value, &tp.param.path).unwrap_or(&Value::Null);
            let mut out = StringBuilders::new();
            tp.codec.encode(cell, &mut out)?;
            pairs.extend(
                out.into_strings()
                    .into_iter()
                    .map(|s| (tp.param.name.clone(), s)),
            );
        }
        Ok(pairs)
    }

    /// Builds an outbound request. `raw_url` may hold a path template (`/users/:id`).
    pub fn new_request(
        &self,
        method: Method,
        raw_url: &str,
        value: &Value,
    ) -> Result<http::Request<Bytes>, TransportError> {
        let (origin, rest) = split_origin(raw_url);
        let (template, base_query) = rest.split_once('?').unwrap_or((rest, ""));

        let path_params: PathParams = self
            .encode_values(Location::Path, value)?
            .into_iter()
            .collect();
        let pattern = parse_path_pattern(template)
            .map_err(|e| TransportError::http(error_codes::INVALID_URL, e.to_string()))?;
        let path = pattern.stringify(&path_params);

        let mut query = parse_query_string(base_query);
        query.extend(self.encode_values(Location::Query, value)?);
        query.sort_by(|a, b| a.0.cmp(&b.0));
        let query = encode_pairs(&query);

        let mut body = BodyWriter::new();
        for tp in self.parameters(Location::Body) {
            match field_ref(value, &tp.param.path) {
                None | Some(Value::Null) => {}
                Some(cell) => tp.codec.codec().encode_to(&mut body, cell)?,
            }
        }

        let move_query = self.query_in_body
            && method == Method::GET
            && body.body.is_empty()
            && !query.is_empty();
        let uri = match (move_query, query.is_empty()) {
            (false, false) => format!("{}{}?{}", origin, path, query),
            _ => format!("{}{}", origin, path),
        };
        if move_query {
            body.body = query.into_bytes();
            body.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        }

        let mut builder = http::Request::builder().method(method).uri(uri);
        let headers = builder.headers_mut().ok_or_else(|| {
            TransportError::http(error_codes::INVALID_URL, format!("invalid url {}", raw_url))
        })?;

        for (name, v) in self.encode_values(Location::Header, value)? {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::http(error_codes::INVALID_HEADER, e.to_string()))?;
            let v = HeaderValue::from_str(&v)
                .map_err(|e| TransportError::http(error_codes::INVALID_HEADER, e.to_string()))?;
            headers.append(name, v);
        }

        let mut cookies = self.encode_values(Location::Cookie, value)?;
        cookies.sort_by(|a, b| a.0.cmp(&b.0));
        if !cookies.is_empty() {
            let line = HeaderValue::from_str(&render_cookies(&cookies))
                .map_err(|e| TransportError::http(error_codes::INVALID_HEADER, e.to_string()))?;
            headers.insert(COOKIE, line);
        }

        if let Some(content_type) = body.headers.get(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, content_type.clone());
        }
        if !body.body.is_empty() {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.body.len()));
        }

        let mut req = builder
            .body(Bytes::from(body.body))
            .map_err(|e| TransportError::http(error_codes::INVALID_URL, e.to_string()))?;
        req.extensions_mut().insert(path_params);
        Ok(req)
    }

    /// Typed variant of [`new_request`](Self::new_request).
    pub fn new_request_for<T: Model>(
        &self,
        method: Method,
        raw_url: &str,
        value: &T,
    ) -> Result<http::Request<Bytes>, TransportError> {
        self.check_type::<T>()?;
        self.new_request(method, raw_url, &value.to_value())
    }

    // ============================================================================================
    // DECODE
    // ============================================================================================

    /// Decodes and validates every parameter into `target`, recording failures in `errors`.
    pub fn decode_with(
        &self,
        info: &RequestInfo,
        meta: Option<&Metadata>,
        target: &mut Value,
        errors: &mut BadRequest,
    ) -> Result<(), TransportError> {
        if target.is_null() {
            *target = self.ty.deref().zero_value();
        }

        for tp in &self.parameters {
            let Some(location) = tp.param.location else {
                continue;
            };
            let name = tp.param.name.as_str();
            let cell = field_value(target, &self.ty, &tp.param.path)?;

            let decoded = match location {
                Location::Body if info.body().is_empty() => Ok(()),
                Location::Body => tp.codec.codec().decode_from(
                    &mut info.body().as_ref(),
                    cell,
                    Some(info.headers()),
                ),
                Location::Meta => {
                    let values = meta.map(|m| m.get(name).to_vec()).unwrap_or_default();
                    tp.codec.decode(&mut StringReaders::new(values), cell)
                }
                _ => tp
                    .codec
                    .decode(&mut StringReaders::new(info.value(location, name)), cell),
            };
            if let Err(err) = decoded {
                record_codec_error(errors, location, name, err);
                continue;
            }
            log::trace!("decoded {} parameter `{}`", location, name);

            if let Some(validator) = &tp.validator {
                if let Err(err) = validator.validate(cell) {
                    record_validation_error(errors, location, name, &err);
                }
            }
        }
        Ok(())
    }

    /// Decodes into a dynamic value; any recorded failure becomes a 400.
    pub fn decode(
        &self,
        info: &RequestInfo,
        meta: Option<&Metadata>,
        target: &mut Value,
    ) -> Result<(), TransportError> {
        let mut errors = BadRequest::new();
        self.decode_with(info, meta, target, &mut errors)?;
        match errors.err() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Decodes a typed record and runs its [`Model::post_validate`] hook on the
    /// same accumulator, so field and cross-field failures share one 400.
    pub fn decode_into<T: Model>(
        &self,
        info: &RequestInfo,
        meta: Option<&Metadata>,
    ) -> Result<T, TransportError> {
        self.check_type::<T>()?;
        let mut errors = BadRequest::new();
        let mut value = Value::Null;
        self.decode_with(info, meta, &mut value, &mut errors)?;

        let record = match T::from_value(value) {
            Ok(record) => record,
            Err(err) => {
                return Err(match errors.err() {
                    Some(bad) => bad.into(),
                    None => err.into(),
                })
            }
        };
        record.post_validate(&mut errors);
        match errors.err() {
            Some(err) => Err(err.into()),
            None => Ok(record),
        }
    }
}

/// Body errors keep their inner path; everything else is filed under the parameter name.
fn record_codec_error(errors: &mut BadRequest, location: Location, name: &str, err: CodecError) {
    let set = err.into_error_set();
    if location == Location::Body {
        for entry in set.flatten() {
            let path = entry.path();
            let field = if path.is_empty() { name.to_string() } else { path };
            errors.add(location.as_str(), field, entry.error.to_string());
        }
    } else {
        errors.add_error(location.as_str(), name, &ValidationError::Nested(set));
    }
}

fn record_validation_error(
    errors: &mut BadRequest,
    location: Location,
    name: &str,
    err: &ValidationError,
) {
    match err {
        ValidationError::Nested(set) if location == Location::Body => {
            errors.add_error_set(location.as_str(), set)
        }
        other => errors.add_error(location.as_str(), name, other),
    }
}

/// Splits `scheme://authority` off an absolute URL.
fn split_origin(raw_url: &str) -> (&str, &str) {
    let Some(scheme_end) = raw_url.find("://") else {
        return ("", raw_url);
    };
    let after = scheme_end + 3;
    match raw_url[after..].find(|c: char| c == '/' || c == '?') {
        Some(i) => raw_url.split_at(after + i),
        None => (raw_url, ""),
    }
}

// ================================================================================================
// TRANSFORMER MANAGER
// ================================================================================================

/// Builds and caches one transformer per record type.
pub struct RequestTransformerMgr {
    config: TransportConfig,
    codecs: CodecMgr,
    cache: RwLock<HashMap<TypeId, Arc<RequestTransformer>>>,
}

pub static REQUEST_TRANSFORMER_MGR: Lazy<RequestTransformerMgr> =
    Lazy::new(|| RequestTransformerMgr::new(TransportConfig::default()));

impl RequestTransformerMgr {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            codecs: CodecMgr::new(&config),
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn codecs(&self) -> &CodecMgr {
        &self.codecs
    }

    pub fn transformer_for(&self, ty: &TypeInfo) -> Result<Arc<RequestTransformer>, TransportError> {
        if let Some(rt) = self.cache.read().get(&ty.type_id) {
            return Ok(rt.clone());
        }
        let rt = Arc::new(RequestTransformer::new(ty, &self.codecs, &self.config)?);
        Ok(self
            .cache
            .write()
            .entry(ty.type_id)
            .or_insert(rt)
            .clone())
    }

    pub fn transformer<T: Model>(&self) -> Result<Arc<RequestTransformer>, TransportError> {
        self.transformer_for(&T::type_info())
    }

    pub fn new_request<T: Model>(
        &self,
        method: Method,
        raw_url: &str,
        value: &T,
    ) -> Result<http::Request<Bytes>, TransportError> {
        self.transformer::<T>()?
            .new_request(method, raw_url, &value.to_value())
    }

    pub fn decode<T: Model>(
        &self,
        info: &RequestInfo,
        meta: Option<&Metadata>,
    ) -> Result<T, TransportError> {
        self.transformer::<T>()?.decode_into(info, meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_origin() {
        assert_eq!(
            split_origin("http://host:80/users/:id?x=1"),
            ("http://host:80", "/users/:id?x=1")
        );
        assert_eq!(split_origin("/users"), ("", "/users"));
        assert_eq!(split_origin("https://host"), ("https://host", ""));
    }
}
