//! `multipart/form-data` bodies.
//!
//! File-typed fields (and sequences of them) travel as file parts; every
//! other field is encoded by its own [`ParamCodec`], one part per value,
//! with the sub-codec's content type. Decoding buffers at most
//! `multipart_max_memory` bytes.

use super::urlencoded::nest;
use super::{read_limited, set_content_type, Codec, CodecError, CodecMgr, ContentWriter};
use super::{ParamCodec, StringBuilders, StringReaders};
use crate::params::{field_ref, field_value, params_of, Parameter};
use crate::reflect::{FileHeader, TypeInfo, TypeKind, Value};
use crate::validation::ErrorSet;
use http::header::{HeaderMap, CONTENT_TYPE};
use std::collections::HashMap;
use std::io::{Read, Write};

pub const NAMES: &[&str] = &["multipart", "multipart/form-data"];

pub const TAG_KEY: &str = "name";

const CRLF: &[u8] = b"\r\n";

fn is_file_param(ty: &TypeInfo) -> bool {
    let ty = ty.deref();
    match ty.kind {
        TypeKind::File => true,
        TypeKind::Slice(_) | TypeKind::Array(_, _) => {
            ty.elem().map(|e| matches!(e.deref().kind, TypeKind::File)).unwrap_or(false)
        }
        _ => false,
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Clone)]
pub struct MultipartCodec {
    ty: TypeInfo,
    fields: Vec<(Parameter, Option<ParamCodec>)>,
    max_memory: usize,
}

impl MultipartCodec {
    pub fn new(ty: &TypeInfo, mgr: &CodecMgr) -> Result<Self, CodecError> {
        if ty.deref().as_struct().is_none() {
            return Err(CodecError::unsupported("multipart", ty));
        }
        let fields = params_of(ty, TAG_KEY)
            .iter()
            .map(|p| {
                let mut inner = p.clone();
                inner.location = None;
                let codec = if is_file_param(&inner.ty) {
                    None
                } else {
                    Some(mgr.param_codec(&inner)?)
                };
                Ok((inner, codec))
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(Self {
            ty: ty.clone(),
            fields,
            max_memory: mgr.multipart_max_memory(),
        })
    }

    pub fn max_memory(&self) -> usize {
        self.max_memory
    }
}

fn write_part(
    out: &mut Vec<u8>,
    boundary: &str,
    disposition: &str,
    content_type: &str,
    data: &[u8],
) -> std::io::Result<()> {
    write!(out, "--{}\r\n", boundary)?;
    write!(out, "Content-Disposition: {}\r\n", disposition)?;
    write!(out, "Content-Type: {}\r\n\r\n", content_type)?;
    out.write_all(data)?;
    out.write_all(CRLF)
}

impl Codec for MultipartCodec {
    fn names(&self) -> &'static [&'static str] {
        NAMES
    }

    fn named_by_tag(&self) -> &'static str {
        TAG_KEY
    }

    fn content_type(&self) -> &'static str {
        "multipart/form-data"
    }

    fn encode_to(&self, w: &mut dyn ContentWriter, value: &Value) -> Result<(), CodecError> {
        let boundary = uuid::Uuid::new_v4().simple().to_string();
        set_content_type(w, &format!("multipart/form-data; boundary={}", boundary));

        let mut out = Vec::new();
        for (param, codec) in &self.fields {
            let cell = field_ref(value, &param.path).unwrap_or(&Value::Null);
            let name = escape_quotes(&param.name);
            match codec {
                None => {
                    let files: Vec<&FileHeader> = match cell {
                        Value::File(file) => vec![file],
                        Value::List(items) => items
                            .iter()
                            .filter_map(|item| match item {
                                Value::File(file) => Some(file),
                                _ => None,
                            })
                            .collect(),
                        _ => Vec::new(),
                    };
                    for file in files {
                        let disposition = format!(
                            "form-data; name=\"{}\"; filename=\"{}\"",
                            name,
                            escape_quotes(&file.filename)
                        );
                        let content_type = file
                            .content_type
                            .as_deref()
                            .unwrap_or("application/octet-stream");
                        write_part(&mut out, &boundary, &disposition, content_type, &file.data)?;
                    }
                }
                Some(codec) => {
                    let mut values = StringBuilders::new();
                    codec.encode(cell, &mut values)?;
                    let disposition = format!("form-data; name=\"{}\"", name);
                    for text in values.into_strings() {
                        write_part(
                            &mut out,
                            &boundary,
                            &disposition,
                            codec.codec().content_type(),
                            text.as_bytes(),
                        )?;
                    }
                }
            }
        }
        write!(out, "--{}--\r\n", boundary)?;
        w.write_all(&out)?;
        Ok(())
    }

    fn decode_from(
        &self,
        r: &mut dyn Read,
        value: &mut Value,
        headers: Option<&HeaderMap>,
    ) -> Result<(), CodecError> {
        let boundary = headers
            .and_then(|h| h.get(CONTENT_TYPE))
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_of)
            .ok_or_else(|| CodecError::Multipart("missing boundary".into()))?;
        let body = read_limited(r, self.max_memory)?;
        let parts = parse_parts(&body, &boundary)?;

        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        let mut files: HashMap<String, Vec<FileHeader>> = HashMap::new();
        for part in parts {
            match part.filename {
                Some(filename) => {
                    let mut file = FileHeader::new(filename, part.data);
                    file.content_type = part.content_type;
                    files.entry(part.name).or_default().push(file);
                }
                None => values
                    .entry(part.name)
                    .or_default()
                    .push(String::from_utf8_lossy(&part.data).into_owned()),
            }
        }

        if value.is_null() {
            *value = self.ty.deref().zero_value();
        }
        let mut errors = ErrorSet::new();
        for (param, codec) in &self.fields {
            let cell = match field_value(value, &self.ty, &param.path) {
                Ok(cell) => cell,
                Err(err) => {
                    nest(&mut errors, &param.name, err.into());
                    continue;
                }
            };
            match codec {
                None => {
                    let Some(mut received) = files.remove(&param.name) else {
                        continue;
                    };
                    *cell = if param.ty.deref().is_sequence() {
                        Value::List(received.into_iter().map(Value::File).collect())
                    } else {
                        Value::File(received.swap_remove(0))
                    };
                }
                Some(codec) => {
                    let Some(received) = values.remove(&param.name) else {
                        continue;
                    };
                    if let Err(err) = codec.decode(&mut StringReaders::new(received), cell) {
                        nest(&mut errors, &param.name, err);
                    }
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Fields(errors))
        }
    }
}

/// `boundary` parameter of a `multipart/form-data` content type.
pub fn boundary_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (k, v) = param.split_once('=')?;
        if k.trim().eq_ignore_ascii_case("boundary") {
            Some(v.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

#[derive(Debug, Default, PartialEq)]
struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn parse_parts(body: &[u8], boundary: &str) -> Result<Vec<Part>, CodecError> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let next_delimiter = [CRLF, delimiter.as_slice()].concat();
    let malformed = |what: &str| CodecError::Multipart(what.to_string());

    let mut pos = find(body, &delimiter, 0).ok_or_else(|| malformed("no opening boundary"))?
        + delimiter.len();
    let mut parts = Vec::new();
    loop {
        if body[pos..].starts_with(b"--") {
            return Ok(parts);
        }
        if !body[pos..].starts_with(CRLF) {
            return Err(malformed("boundary not followed by CRLF"));
        }
        pos += CRLF.len();
        let end = find(body, &next_delimiter, pos).ok_or_else(|| malformed("unterminated part"))?;
        parts.push(parse_part(&body[pos..end])?);
        pos = end + next_delimiter.len();
    }
}

fn parse_part(raw: &[u8]) -> Result<Part, CodecError> {
    let split = find(raw, b"\r\n\r\n", 0);
    let (head, data) = match split {
        Some(i) => (&raw[..i], &raw[i + 4..]),
        None if raw.starts_with(CRLF) => (&raw[..0], &raw[2..]),
        None => return Err(CodecError::Multipart("part without header block".into())),
    };

    let mut part = Part {
        data: data.to_vec(),
        ..Default::default()
    };
    for line in String::from_utf8_lossy(head).split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if key.trim().eq_ignore_ascii_case("content-disposition") {
            for param in value.split(';').skip(1) {
                let Some((k, v)) = param.split_once('=') else {
                    continue;
                };
                let v = unquote(v.trim());
                match k.trim() {
                    "name" => part.name = v,
                    "filename" => part.filename = Some(v),
                    _ => {}
                }
            }
        } else if key.trim().eq_ignore_ascii_case("content-type") {
            part.content_type = Some(value.to_string());
        }
    }
    Ok(part)
}

fn unquote(v: &str) -> String {
    let inner = v
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(v);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BodyWriter, CODEC_MGR};
    use crate::reflect::{FieldInfo, TagMap, TypeFn};
    use crate::Model;

    struct Upload;

    fn upload_info() -> TypeInfo {
        let field = |ident: &'static str, index: usize, name: &str, ty: TypeFn| {
            FieldInfo::new(ident, index, true, false, TagMap::from_pairs(&[("name", name)]), ty)
        };
        TypeInfo::structure::<Upload>(
            "Upload",
            vec![
                field("title", 0, "title", String::type_info),
                field("tags", 1, "tags", <Vec<String>>::type_info),
                field("file", 2, "file", FileHeader::type_info),
                field("attachments", 3, "attachments", <Vec<FileHeader>>::type_info),
            ],
        )
    }

    fn sample() -> Value {
        Value::Struct(vec![
            Value::String("report".into()),
            Value::List(vec![Value::String("a".into()), Value::String("b".into())]),
            Value::File(FileHeader::new("a.txt", b"hello".to_vec()).with_content_type("text/plain")),
            Value::List(vec![
                Value::File(FileHeader::new("b.bin", b"\x00\x01".to_vec())),
                Value::File(FileHeader::new("c.bin", b"\x02".to_vec())),
            ]),
        ])
    }

    #[test]
    fn test_round_trip() {
        let codec = CODEC_MGR.new_codec(&upload_info(), "multipart").unwrap();
        let mut w = BodyWriter::new();
        codec.encode_to(&mut w, &sample()).unwrap();
        let content_type = w.content_type().unwrap().to_string();
        assert!(content_type.starts_with("multipart/form-data; boundary="));

        let mut value = Value::Null;
        codec
            .decode_from(&mut &w.body[..], &mut value, Some(&w.headers))
            .unwrap();

        let mut expected = sample();
        if let Value::Struct(fields) = &mut expected {
            fields[3] = Value::List(vec![
                Value::File(
                    FileHeader::new("b.bin", b"\x00\x01".to_vec())
                        .with_content_type("application/octet-stream"),
                ),
                Value::File(
                    FileHeader::new("c.bin", b"\x02".to_vec())
                        .with_content_type("application/octet-stream"),
                ),
            ]);
        }
        assert_eq!(value, expected);
    }

    #[test]
    fn test_missing_boundary() {
        let codec = CODEC_MGR.new_codec(&upload_info(), "multipart").unwrap();
        let mut value = Value::Null;
        assert!(matches!(
            codec.decode_from(&mut &b""[..], &mut value, None),
            Err(CodecError::Multipart(_))
        ));
    }

    #[test]
    fn test_memory_cap() {
        let codec = MultipartCodec {
            max_memory: 8,
            ..MultipartCodec::new(&upload_info(), &CODEC_MGR).unwrap()
        };
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "multipart/form-data; boundary=x".parse().unwrap());
        let mut value = Value::Null;
        assert!(matches!(
            codec.decode_from(&mut &b"--x\r\n\r\n0123456789\r\n--x--"[..], &mut value, Some(&headers)),
            Err(CodecError::TooLarge { limit: 8 })
        ));
    }

    #[test]
    fn test_boundary_of() {
        assert_eq!(
            boundary_of("multipart/form-data; boundary=\"abc\"").as_deref(),
            Some("abc")
        );
        assert_eq!(boundary_of("multipart/form-data"), None);
    }

    #[test]
    fn test_parse_handwritten_body() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhi\r\n--b\r\nContent-Disposition: form-data; name=\"file\"; filename=\"x.txt\"\r\nContent-Type: text/plain\r\n\r\ndata\r\n--b--\r\n";
        let parts = parse_parts(body, "b").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "title");
        assert_eq!(parts[0].data, b"hi");
        assert_eq!(parts[1].filename.as_deref(), Some("x.txt"));
        assert_eq!(parts[1].content_type.as_deref(), Some("text/plain"));
    }
}
