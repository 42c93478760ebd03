//! `application/x-www-form-urlencoded` bodies.
//!
//! Each parameter of the struct (named by the `name` tag) is encoded by its
//! own [`ParamCodec`], so sequences repeat the key. Keys are emitted in
//! sorted order; repeated keys keep their element order.

use super::{set_content_type, Codec, CodecError, CodecMgr, ContentWriter, ParamCodec};
use super::{StringBuilders, StringReaders};
use crate::params::{field_ref, field_value, params_of, Parameter};
use crate::reflect::{TypeInfo, Value};
use crate::validation::{ErrorSet, Segment};
use http::HeaderMap;
use std::collections::HashMap;
use std::io::Read;

pub const NAMES: &[&str] = &["urlencoded", "form", "application/x-www-form-urlencoded"];

pub const TAG_KEY: &str = "name";

/// Percent-encodes `(key, value)` pairs into `k=v&k=v`.
pub fn encode_pairs<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k.as_ref()),
                urlencoding::encode(v.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn decode_component(raw: &str) -> Result<String, CodecError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|e| CodecError::Syntax {
            codec: "urlencoded",
            message: format!("invalid escape in {:?}: {}", raw, e),
            path: Vec::new(),
        })
}

/// Parses `k=v&k=v`; a key without `=` has an empty value.
pub fn parse_pairs(input: &str) -> Result<Vec<(String, String)>, CodecError> {
    input
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            Ok((decode_component(k)?, decode_component(v)?))
        })
        .collect()
}

/// Groups parsed pairs by key, preserving value order.
pub fn group_pairs(pairs: Vec<(String, String)>) -> HashMap<String, Vec<String>> {
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for (k, v) in pairs {
        grouped.entry(k).or_default().push(v);
    }
    grouped
}

#[derive(Clone)]
pub struct UrlEncodedCodec {
    ty: TypeInfo,
    fields: Vec<(Parameter, ParamCodec)>,
}

impl UrlEncodedCodec {
    pub fn new(ty: &TypeInfo, mgr: &CodecMgr) -> Result<Self, CodecError> {
        if ty.deref().as_struct().is_none() {
            return Err(CodecError::unsupported("urlencoded", ty));
        }
        let fields = params_of(ty, TAG_KEY)
            .iter()
            .map(|p| {
                let mut inner = p.clone();
                inner.location = None;
                let codec = mgr.param_codec(&inner)?;
                Ok((inner, codec))
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(Self {
            ty: ty.clone(),
            fields,
        })
    }

    pub(crate) fn encode_pairs_of(&self, value: &Value) -> Result<Vec<(String, String)>, CodecError> {
        let mut pairs = Vec::new();
        for (param, codec) in &self.fields {
            let cell = field_ref(value, &param.path).unwrap_or(&Value::Null);
            let mut out = StringBuilders::new();
            codec.encode(cell, &mut out)?;
            pairs.extend(out.into_strings().into_iter().map(|s| (param.name.clone(), s)));
        }
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }
}

impl Codec for UrlEncodedCodec {
    fn names(&self) -> &'static [&'static str] {
        NAMES
    }

    fn named_by_tag(&self) -> &'static str {
        TAG_KEY
    }

    fn content_type(&self) -> &'static str {
        "application/x-www-form-urlencoded; param=value"
    }

    fn encode_to(&self, w: &mut dyn ContentWriter, value: &Value) -> Result<(), CodecError> {
        set_content_type(w, self.content_type());
        let pairs = self.encode_pairs_of(value)?;
        w.write_all(encode_pairs(&pairs).as_bytes())?;
        Ok(())
    }

    fn decode_from(
        &self,
        r: &mut dyn Read,
        value: &mut Value,
        _headers: Option<&HeaderMap>,
    ) -> Result<(), CodecError> {
        let mut input = String::new();
        r.read_to_string(&mut input)?;
        let mut grouped = group_pairs(parse_pairs(input.trim())?);

        if value.is_null() {
            *value = self.ty.deref().zero_value();
        }
        let mut errors = ErrorSet::new();
        for (param, codec) in &self.fields {
            let Some(values) = grouped.remove(&param.name) else {
                continue;
            };
            let result = field_value(value, &self.ty, &param.path)
                .map_err(CodecError::from)
                .and_then(|cell| codec.decode(&mut StringReaders::new(values), cell));
            if let Err(err) = result {
                nest(&mut errors, &param.name, err);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Fields(errors))
        }
    }
}

/// Files a codec error under `name`, keeping any inner path.
pub(crate) fn nest(errors: &mut ErrorSet, name: &str, err: CodecError) {
    for flat in err.into_error_set().flatten() {
        let mut path = vec![Segment::Key(name.to_string())];
        path.extend(flat.segments);
        errors.add_at(&path, flat.error);
    }
}
