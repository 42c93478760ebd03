//! Raw `application/octet-stream` bodies for byte strings, strings and files.

use super::{set_content_type, Codec, CodecError, ContentWriter};
use crate::reflect::{FileHeader, TypeInfo, TypeKind, Value};
use http::HeaderMap;
use std::io::Read;

pub const NAMES: &[&str] = &["octet-stream", "stream", "application/octet-stream"];

#[derive(Debug, Clone)]
pub struct OctetStreamCodec {
    ty: TypeInfo,
}

impl OctetStreamCodec {
    pub fn new(ty: &TypeInfo) -> Result<Self, CodecError> {
        match ty.deref().kind {
            TypeKind::Bytes | TypeKind::String | TypeKind::File => Ok(Self { ty: ty.clone() }),
            _ => Err(CodecError::unsupported("octet-stream", ty)),
        }
    }
}

impl Codec for OctetStreamCodec {
    fn names(&self) -> &'static [&'static str] {
        NAMES
    }

    fn content_type(&self) -> &'static str {
        "application/octet-stream"
    }

    fn encode_to(&self, w: &mut dyn ContentWriter, value: &Value) -> Result<(), CodecError> {
        set_content_type(w, self.content_type());
        match value {
            Value::Null => {}
            Value::Bytes(data) => w.write_all(data)?,
            Value::String(s) => w.write_all(s.as_bytes())?,
            Value::File(file) => w.write_all(&file.data)?,
            _ => return Err(CodecError::unsupported("octet-stream", &self.ty)),
        }
        Ok(())
    }

    fn decode_from(
        &self,
        r: &mut dyn Read,
        value: &mut Value,
        _headers: Option<&HeaderMap>,
    ) -> Result<(), CodecError> {
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        *value = match self.ty.deref().kind {
            TypeKind::Bytes => Value::Bytes(data),
            TypeKind::String => Value::String(String::from_utf8_lossy(&data).into_owned()),
            _ => Value::File(FileHeader::new("", data)),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Model;

    #[test]
    fn test_file_round_trip() {
        let codec = OctetStreamCodec::new(&FileHeader::type_info()).unwrap();
        let mut out = Vec::new();
        codec
            .encode_to(&mut out, &Value::File(FileHeader::new("a.txt", b"content".to_vec())))
            .unwrap();
        assert_eq!(out, b"content");

        let mut value = Value::Null;
        codec.decode_from(&mut &out[..], &mut value, None).unwrap();
        assert_eq!(value, Value::File(FileHeader::new("", b"content".to_vec())));
    }

    #[test]
    fn test_numbers_are_unsupported() {
        assert!(OctetStreamCodec::new(&i32::type_info()).is_err());
    }
}
