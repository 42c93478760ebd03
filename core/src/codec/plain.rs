//! Text codecs for scalar cells: `text/plain` and `text/html`.

use super::{set_content_type, Codec, CodecError, ContentWriter};
use crate::reflect::text::{marshal_text, unmarshal_text};
use crate::reflect::{TypeInfo, TypeKind, Value};
use http::HeaderMap;
use std::io::Read;

pub const PLAIN_NAMES: &[&str] = &["plain", "text/plain"];
pub const HTML_NAMES: &[&str] = &["html", "text/html"];

fn check_scalar(codec: &'static str, ty: &TypeInfo) -> Result<(), CodecError> {
    match ty.deref().kind {
        TypeKind::Bool
        | TypeKind::Int { .. }
        | TypeKind::Uint { .. }
        | TypeKind::Float { .. }
        | TypeKind::String
        | TypeKind::Bytes
        | TypeKind::Text => Ok(()),
        _ => Err(CodecError::unsupported(codec, ty)),
    }
}

fn encode_text(
    ty: &TypeInfo,
    content_type: &str,
    w: &mut dyn ContentWriter,
    value: &Value,
) -> Result<(), CodecError> {
    set_content_type(w, content_type);
    let text = marshal_text(value, ty)?;
    w.write_all(text.as_bytes())?;
    Ok(())
}

fn decode_text(ty: &TypeInfo, r: &mut dyn Read, value: &mut Value) -> Result<(), CodecError> {
    let mut text = String::new();
    r.read_to_string(&mut text)?;
    *value = unmarshal_text(&text, ty)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PlainTextCodec {
    ty: TypeInfo,
}

impl PlainTextCodec {
    pub fn new(ty: &TypeInfo) -> Result<Self, CodecError> {
        check_scalar("plain", ty)?;
        Ok(Self { ty: ty.clone() })
    }
}

impl Codec for PlainTextCodec {
    fn names(&self) -> &'static [&'static str] {
        PLAIN_NAMES
    }

    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn encode_to(&self, w: &mut dyn ContentWriter, value: &Value) -> Result<(), CodecError> {
        encode_text(&self.ty, self.content_type(), w, value)
    }

    fn decode_from(
        &self,
        r: &mut dyn Read,
        value: &mut Value,
        _headers: Option<&HeaderMap>,
    ) -> Result<(), CodecError> {
        decode_text(&self.ty, r, value)
    }
}

#[derive(Debug, Clone)]
pub struct HtmlCodec {
    ty: TypeInfo,
}

impl HtmlCodec {
    pub fn new(ty: &TypeInfo) -> Result<Self, CodecError> {
        check_scalar("html", ty)?;
        Ok(Self { ty: ty.clone() })
    }
}

impl Codec for HtmlCodec {
    fn names(&self) -> &'static [&'static str] {
        HTML_NAMES
    }

    fn content_type(&self) -> &'static str {
        "text/html; charset=utf-8"
    }

    fn encode_to(&self, w: &mut dyn ContentWriter, value: &Value) -> Result<(), CodecError> {
        encode_text(&self.ty, self.content_type(), w, value)
    }

    fn decode_from(
        &self,
        r: &mut dyn Read,
        value: &mut Value,
        _headers: Option<&HeaderMap>,
    ) -> Result<(), CodecError> {
        decode_text(&self.ty, r, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BodyWriter;
    use crate::Model;

    #[test]
    fn test_plain_scalars() {
        let codec = PlainTextCodec::new(&i32::type_info()).unwrap();
        let mut w = BodyWriter::new();
        codec.encode_to(&mut w, &Value::Int(42)).unwrap();
        assert_eq!(w.body, b"42");
        assert_eq!(w.content_type(), Some("text/plain; charset=utf-8"));

        let mut value = Value::Null;
        codec.decode_from(&mut &b"-7"[..], &mut value, None).unwrap();
        assert_eq!(value, Value::Int(-7));
    }

    #[test]
    fn test_plain_rejects_bad_text() {
        let codec = PlainTextCodec::new(&u8::type_info()).unwrap();
        let mut value = Value::Null;
        assert!(codec.decode_from(&mut &b"300"[..], &mut value, None).is_err());
    }

    #[test]
    fn test_plain_bytes_are_base64() {
        let codec = PlainTextCodec::new(&<Vec<u8>>::type_info()).unwrap();
        let mut out = Vec::new();
        codec
            .encode_to(&mut out, &Value::Bytes(b"bytes".to_vec()))
            .unwrap();
        assert_eq!(out, b"Ynl0ZXM=");
    }

    #[test]
    fn test_html_content_type() {
        let codec = HtmlCodec::new(&String::type_info()).unwrap();
        let mut w = BodyWriter::new();
        codec
            .encode_to(&mut w, &Value::String("<b>hi</b>".into()))
            .unwrap();
        assert_eq!(w.body, b"<b>hi</b>");
        assert_eq!(w.content_type(), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn test_structured_types_are_unsupported() {
        assert!(PlainTextCodec::new(&<Vec<String>>::type_info()).is_err());
    }
}
