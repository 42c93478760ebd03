//! # CODEC REGISTRY
//!
//! **MEDIA-TYPE KEYED ENCODERS AND DECODERS**
//!
//! Every codec maps a [`Value`] of a known [`TypeInfo`] to a byte stream and
//! back. Codecs are created per `(type, canonical name)` by a registered
//! creator and cached in the [`CodecMgr`].
//!
//! | Canonical name | Aliases | Content-Type |
//! |---|---|---|
//! | `plain` | `text/plain` | `text/plain; charset=utf-8` |
//! | `html` | `text/html` | `text/html; charset=utf-8` |
//! | `json` | `application/json` | `application/json; charset=utf-8` |
//! | `xml` | `application/xml`, `text/xml` | `application/xml; charset=utf-8` |
//! | `urlencoded` | `form`, `application/x-www-form-urlencoded` | `application/x-www-form-urlencoded; param=value` |
//! | `multipart` | `multipart/form-data` | `multipart/form-data; boundary=...` |
//! | `octet-stream` | `stream`, `application/octet-stream` | `application/octet-stream` |

pub mod json;
pub mod multipart;
pub mod octet;
pub mod plain;
pub mod urlencoded;
pub mod wrapper;
pub mod xml;

pub use json::JsonCodec;
pub use multipart::MultipartCodec;
pub use octet::OctetStreamCodec;
pub use plain::{HtmlCodec, PlainTextCodec};
pub use urlencoded::UrlEncodedCodec;
pub use wrapper::{ParamCodec, StringBuilders, StringReaders};
pub use xml::XmlCodec;

use crate::config::TransportConfig;
use crate::params::{Location, Parameter};
use crate::reflect::{TypeInfo, TypeKind, Value, ValueError};
use crate::validation::{ErrorSet, Segment, ValidationError};
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO ERROR: {0}")]
    Io(#[from] io::Error),

    #[error("UNKNOWN CODEC: {0}")]
    UnknownCodec(String),

    #[error("{codec} codec does not support {ty}")]
    Unsupported { codec: &'static str, ty: String },

    #[error("{codec} syntax error: {message}")]
    Syntax {
        codec: &'static str,
        message: String,
        /// Location of the failure inside the document, when recoverable.
        path: Vec<Segment>,
    },

    /// Path-annotated conversion failures collected during decode.
    #[error("{0}")]
    Fields(ErrorSet),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("body exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("multipart error: {0}")]
    Multipart(String),
}

impl CodecError {
    pub(crate) fn unsupported(codec: &'static str, ty: &TypeInfo) -> Self {
        Self::Unsupported {
            codec,
            ty: ty.kind_name(),
        }
    }

    /// Flattens into path-annotated entries; errors without a location sit at the root.
    pub fn into_error_set(self) -> ErrorSet {
        match self {
            CodecError::Fields(set) => set,
            CodecError::Syntax {
                codec,
                message,
                path,
            } => {
                let mut set = ErrorSet::new();
                set.add_at(
                    &path,
                    ValidationError::Decode(format!("{} syntax error: {}", codec, message)),
                );
                set
            }
            other => {
                let mut set = ErrorSet::new();
                set.add_at(&[], ValidationError::Decode(other.to_string()));
                set
            }
        }
    }
}

/// A body sink. Writers that carry headers receive the codec's `Content-Type`.
pub trait ContentWriter: Write {
    fn header_mut(&mut self) -> Option<&mut HeaderMap> {
        None
    }
}

impl ContentWriter for Vec<u8> {}

/// Buffered body plus the headers a codec chose for it.
#[derive(Debug, Default)]
pub struct BodyWriter {
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl BodyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

impl Write for BodyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ContentWriter for BodyWriter {
    fn header_mut(&mut self) -> Option<&mut HeaderMap> {
        Some(&mut self.headers)
    }
}

/// Sets `Content-Type` on writers that expose headers.
pub(crate) fn set_content_type(w: &mut dyn ContentWriter, content_type: &str) {
    if let Some(headers) = w.header_mut() {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
    }
}

pub trait Codec: Send + Sync {
    /// Media types this codec answers to; the first is canonical.
    fn names(&self) -> &'static [&'static str];

    /// Tag key used when the codec flattens a struct; empty when it does not.
    fn named_by_tag(&self) -> &'static str {
        ""
    }

    /// `Content-Type` announced for encoded output.
    fn content_type(&self) -> &'static str;

    fn encode_to(&self, w: &mut dyn ContentWriter, value: &Value) -> Result<(), CodecError>;

    fn decode_from(
        &self,
        r: &mut dyn Read,
        value: &mut Value,
        headers: Option<&HeaderMap>,
    ) -> Result<(), CodecError>;
}

pub type CodecCreator =
    Arc<dyn Fn(&TypeInfo, &CodecMgr) -> Result<Arc<dyn Codec>, CodecError> + Send + Sync>;

/// Process-wide codec registry built from [`TransportConfig::default`].
pub static CODEC_MGR: Lazy<CodecMgr> = Lazy::new(|| CodecMgr::new(&TransportConfig::default()));

/// Codec used when a field carries no `mime` tag.
pub fn default_mime(ty: &TypeInfo) -> &'static str {
    match ty.deref().kind {
        TypeKind::Bytes => "plain",
        TypeKind::File => "octet-stream",
        TypeKind::Map(_, _) | TypeKind::Array(_, _) | TypeKind::Struct(_) | TypeKind::Slice(_) => {
            "json"
        }
        TypeKind::Text => "plain",
        _ => "plain",
    }
}

/// Lowercased media type without parameters: `Application/JSON; charset=x` -> `application/json`.
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub struct CodecMgr {
    multipart_max_memory: usize,
    creators: RwLock<HashMap<String, (String, CodecCreator)>>,
    cache: RwLock<HashMap<(TypeId, String), Arc<dyn Codec>>>,
}

impl CodecMgr {
    pub fn new(config: &TransportConfig) -> Self {
        let mgr = Self {
            multipart_max_memory: config.multipart_max_memory,
            creators: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
        };
        mgr.register(plain::PLAIN_NAMES, |ty, _| {
            Ok(Arc::new(PlainTextCodec::new(ty)?) as Arc<dyn Codec>)
        });
        mgr.register(plain::HTML_NAMES, |ty, _| {
            Ok(Arc::new(HtmlCodec::new(ty)?) as Arc<dyn Codec>)
        });
        mgr.register(json::NAMES, |ty, _| {
            Ok(Arc::new(JsonCodec::new(ty)) as Arc<dyn Codec>)
        });
        mgr.register(xml::NAMES, |ty, _| {
            Ok(Arc::new(XmlCodec::new(ty)?) as Arc<dyn Codec>)
        });
        mgr.register(urlencoded::NAMES, |ty, mgr| {
            Ok(Arc::new(UrlEncodedCodec::new(ty, mgr)?) as Arc<dyn Codec>)
        });
        mgr.register(multipart::NAMES, |ty, mgr| {
            Ok(Arc::new(MultipartCodec::new(ty, mgr)?) as Arc<dyn Codec>)
        });
        mgr.register(octet::NAMES, |ty, _| {
            Ok(Arc::new(OctetStreamCodec::new(ty)?) as Arc<dyn Codec>)
        });
        mgr
    }

    /// Registers a creator under every name; the first name is canonical.
    pub fn register<F>(&self, names: &[&str], creator: F)
    where
        F: Fn(&TypeInfo, &CodecMgr) -> Result<Arc<dyn Codec>, CodecError> + Send + Sync + 'static,
    {
        let Some(canonical) = names.first() else {
            return;
        };
        let creator: CodecCreator = Arc::new(creator);
        let mut creators = self.creators.write();
        for name in names {
            creators.insert(
                normalize_mime(name),
                (canonical.to_string(), creator.clone()),
            );
        }
    }

    pub fn multipart_max_memory(&self) -> usize {
        self.multipart_max_memory
    }

    /// Canonical name for a name or alias.
    pub fn canonical_name(&self, mime: &str) -> Option<String> {
        self.creators
            .read()
            .get(&normalize_mime(mime))
            .map(|(canonical, _)| canonical.clone())
    }

    /// Codec for `ty` selected by `mime`, or by [`default_mime`] when it is empty.
    pub fn new_codec(&self, ty: &TypeInfo, mime: &str) -> Result<Arc<dyn Codec>, CodecError> {
        let mime = if mime.trim().is_empty() {
            default_mime(ty)
        } else {
            mime
        };
        let (canonical, creator) = self
            .creators
            .read()
            .get(&normalize_mime(mime))
            .cloned()
            .ok_or_else(|| CodecError::UnknownCodec(mime.to_string()))?;

        let key = (ty.type_id, canonical);
        if let Some(codec) = self.cache.read().get(&key) {
            return Ok(codec.clone());
        }

        let codec = creator(ty, self)?;
        Ok(self
            .cache
            .write()
            .entry(key)
            .or_insert_with(|| {
                log::debug!("created {} codec for {}", codec.names()[0], ty);
                codec
            })
            .clone())
    }

    /// Wraps the codec chosen for one parameter with its omitempty / explode semantics.
    ///
    /// Non-byte sequences outside the body explode into repeated values unless the
    /// field asks for a structured codec.
    pub fn param_codec(&self, param: &Parameter) -> Result<ParamCodec, CodecError> {
        let ty = param.ty.deref();
        let mime = param.mime().unwrap_or_default();
        let structured = matches!(
            self.canonical_name(mime).as_deref(),
            Some("json") | Some("xml")
        );
        let explode =
            param.location != Some(Location::Body) && ty.is_sequence() && !structured;

        let codec_ty = if explode {
            ty.elem().unwrap_or_else(|| ty.clone())
        } else {
            param.ty.clone()
        };
        let codec = self.new_codec(&codec_ty, mime)?;
        Ok(ParamCodec::new(codec, param.ty.clone(), param.omitempty, explode))
    }
}

/// Reads at most `limit` bytes; more input is an error.
pub(crate) fn read_limited(r: &mut dyn Read, limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    let read = r.take(limit as u64 + 1).read_to_end(&mut buf)?;
    if read > limit {
        return Err(CodecError::TooLarge { limit });
    }
    Ok(buf)
}
