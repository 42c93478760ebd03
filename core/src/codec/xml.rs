//! XML codec over `quick-xml`.
//!
//! Struct fields are named by the `xml` tag. The flags `attr` and `chardata`
//! map a field onto an attribute or the element text; sequences repeat the
//! field element. Maps are not representable.
//!
//! Decode failures are reported at the body root; no field path is recovered.

use super::{set_content_type, Codec, CodecError, ContentWriter};
use crate::params::{field_ref, field_value, params_of, Parameter};
use crate::reflect::text::{marshal_text, unmarshal_text};
use crate::reflect::{TypeInfo, TypeKind, Value};
use crate::validation::{ErrorSet, ValidationError};
use http::HeaderMap;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fmt;
use std::io::Read;

pub const NAMES: &[&str] = &["xml", "application/xml", "text/xml"];

pub const TAG_KEY: &str = "xml";

#[derive(Debug, Clone)]
pub struct XmlCodec {
    ty: TypeInfo,
    root: String,
}

impl XmlCodec {
    pub fn new(ty: &TypeInfo) -> Result<Self, CodecError> {
        let target = ty.deref();
        if matches!(target.kind, TypeKind::Map(_, _) | TypeKind::File) {
            return Err(CodecError::unsupported("xml", ty));
        }
        let root = target
            .as_struct()
            .map(|info| info.name.to_string())
            .unwrap_or_else(|| "value".to_string());
        Ok(Self {
            ty: ty.clone(),
            root,
        })
    }
}

impl Codec for XmlCodec {
    fn names(&self) -> &'static [&'static str] {
        NAMES
    }

    fn named_by_tag(&self) -> &'static str {
        TAG_KEY
    }

    fn content_type(&self) -> &'static str {
        "application/xml; charset=utf-8"
    }

    fn encode_to(&self, w: &mut dyn ContentWriter, value: &Value) -> Result<(), CodecError> {
        set_content_type(w, self.content_type());
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, &self.root, value, &self.ty)?;
        w.write_all(&writer.into_inner())?;
        Ok(())
    }

    fn decode_from(
        &self,
        r: &mut dyn Read,
        value: &mut Value,
        _headers: Option<&HeaderMap>,
    ) -> Result<(), CodecError> {
        let mut text = String::new();
        r.read_to_string(&mut text)?;
        if text.trim().is_empty() {
            return Ok(());
        }
        let root = parse_document(&text)?;
        let mut errors = ErrorSet::new();
        conform(&root, &self.ty, value, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Fields(errors))
        }
    }
}

fn xml_error<E: fmt::Display>(err: E) -> CodecError {
    CodecError::Syntax {
        codec: "xml",
        message: err.to_string(),
        path: Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Element,
    Attr,
    CharData,
}

fn placement(param: &Parameter) -> Placement {
    let flags = param
        .tags
        .name_and_flags(TAG_KEY)
        .map(|(_, flags)| flags)
        .unwrap_or_default();
    if flags.contains(&"attr") {
        Placement::Attr
    } else if flags.contains(&"chardata") {
        Placement::CharData
    } else {
        Placement::Element
    }
}

// ================================================================================================
// ENCODING
// ================================================================================================

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
    ty: &TypeInfo,
) -> Result<(), CodecError> {
    if let TypeKind::Option(inner) = ty.kind {
        return match value {
            Value::Null => Ok(()),
            other => write_element(writer, name, other, &inner()),
        };
    }

    match (&ty.kind, value) {
        (TypeKind::Struct(_), Value::Struct(_)) => {
            let params = params_of(ty, TAG_KEY);
            let mut start = BytesStart::new(name);
            for param in params.iter().filter(|p| placement(p) == Placement::Attr) {
                if let Some(cell) = field_ref(value, &param.path) {
                    if param.omitempty && cell.is_empty() {
                        continue;
                    }
                    let text = marshal_text(cell, &param.ty)?;
                    start.push_attribute((param.name.as_str(), text.as_str()));
                }
            }
            writer.write_event(Event::Start(start)).map_err(xml_error)?;

            for param in params.iter() {
                let Some(cell) = field_ref(value, &param.path) else {
                    continue;
                };
                if param.omitempty && cell.is_empty() {
                    continue;
                }
                match placement(param) {
                    Placement::Attr => {}
                    Placement::CharData => {
                        let text = marshal_text(cell, &param.ty)?;
                        writer
                            .write_event(Event::Text(BytesText::new(&text)))
                            .map_err(xml_error)?;
                    }
                    Placement::Element => write_element(writer, &param.name, cell, &param.ty)?,
                }
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_error)?;
        }
        (TypeKind::Slice(elem) | TypeKind::Array(elem, _), Value::List(items)) => {
            let elem = elem();
            for item in items {
                write_element(writer, name, item, &elem)?;
            }
        }
        (TypeKind::Slice(_), Value::Null) => {}
        (TypeKind::Map(_, _) | TypeKind::File, _) => {
            return Err(CodecError::unsupported("xml", ty));
        }
        _ => {
            let text = marshal_text(value, ty)?;
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(xml_error)?;
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(xml_error)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_error)?;
        }
    }
    Ok(())
}

// ================================================================================================
// DECODING
// ================================================================================================

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, CodecError> {
    let mut element = Element {
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        ..Default::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

fn parse_document(text: &str) -> Result<Element, CodecError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut stack: Vec<Element> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let element = element_from(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| xml_error("unexpected closing tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => return Err(xml_error("unexpected end of document")),
            _ => {}
        }
    }
}

fn text_into(text: &str, ty: &TypeInfo, target: &mut Value, errors: &mut ErrorSet) {
    match unmarshal_text(text.trim(), ty) {
        Ok(value) => *target = value,
        Err(err) => errors.add_at(&[], err.into()),
    }
}

fn conform(element: &Element, ty: &TypeInfo, target: &mut Value, errors: &mut ErrorSet) {
    match &ty.kind {
        TypeKind::Option(inner) => {
            let inner = inner();
            if target.is_null() {
                *target = inner.zero_value();
            }
            conform(element, &inner, target, errors);
        }
        TypeKind::Struct(_) => {
            if !matches!(target, Value::Struct(_)) {
                *target = ty.zero_value();
            }
            for param in params_of(ty, TAG_KEY).iter() {
                let cell = match field_value(target, ty, &param.path) {
                    Ok(cell) => cell,
                    Err(err) => {
                        errors.add_at(&[], err.into());
                        continue;
                    }
                };
                match placement(param) {
                    Placement::Attr => {
                        if let Some(text) = element.attr(&param.name) {
                            text_into(text, &param.ty, cell, errors);
                        }
                    }
                    Placement::CharData => text_into(&element.text, &param.ty, cell, errors),
                    Placement::Element => {
                        let mut matching = element
                            .children
                            .iter()
                            .filter(|child| child.name == param.name)
                            .peekable();
                        if matching.peek().is_none() {
                            continue;
                        }
                        let field_ty = param.ty.deref();
                        if field_ty.is_sequence() {
                            let items: Vec<&Element> = matching.collect();
                            conform_items(&items, &field_ty, cell, errors);
                        } else if let Some(child) = matching.next() {
                            conform(child, &param.ty, cell, errors);
                        }
                    }
                }
            }
        }
        TypeKind::Slice(_) | TypeKind::Array(_, _) => {
            let items: Vec<&Element> = element.children.iter().collect();
            conform_items(&items, ty, target, errors);
        }
        TypeKind::Map(_, _) | TypeKind::File => errors.add_at(
            &[],
            ValidationError::Decode(format!("xml cannot decode into {}", ty.kind_name())),
        ),
        _ => text_into(&element.text, ty, target, errors),
    }
}

fn conform_items(items: &[&Element], ty: &TypeInfo, target: &mut Value, errors: &mut ErrorSet) {
    let Some(elem) = ty.elem() else {
        return;
    };
    let mut list: Vec<Value> = items
        .iter()
        .map(|item| {
            let mut cell = elem.zero_value();
            conform(item, &elem, &mut cell, errors);
            cell
        })
        .collect();
    if let TypeKind::Array(_, len) = ty.kind {
        list.resize(len, elem.zero_value());
    }
    *target = Value::List(list);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{FieldInfo, TagMap};
    use crate::Model;

    struct Item;

    fn item_info() -> TypeInfo {
        TypeInfo::structure::<Item>(
            "Item",
            vec![
                FieldInfo::new(
                    "id",
                    0,
                    true,
                    false,
                    TagMap::from_pairs(&[("xml", "id,attr")]),
                    i32::type_info,
                ),
                FieldInfo::new(
                    "name",
                    1,
                    true,
                    false,
                    TagMap::from_pairs(&[("xml", "name")]),
                    String::type_info,
                ),
                FieldInfo::new(
                    "tags",
                    2,
                    true,
                    false,
                    TagMap::from_pairs(&[("xml", "tag")]),
                    <Vec<String>>::type_info,
                ),
            ],
        )
    }

    fn sample() -> Value {
        Value::Struct(vec![
            Value::Int(7),
            Value::String("a & b".into()),
            Value::List(vec![Value::String("x".into()), Value::String("y".into())]),
        ])
    }

    #[test]
    fn test_encode_struct() {
        let mut out = Vec::new();
        XmlCodec::new(&item_info())
            .unwrap()
            .encode_to(&mut out, &sample())
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<Item id="7"><name>a &amp; b</name><tag>x</tag><tag>y</tag></Item>"#
        );
    }

    #[test]
    fn test_decode_struct() {
        let codec = XmlCodec::new(&item_info()).unwrap();
        let mut value = item_info().zero_value();
        let input = r#"<Item id="7"><name>a &amp; b</name><tag>x</tag><tag>y</tag></Item>"#;
        codec
            .decode_from(&mut input.as_bytes(), &mut value, None)
            .unwrap();
        assert_eq!(value, sample());
    }

    #[test]
    fn test_bad_scalar_is_reported_at_root() {
        let codec = XmlCodec::new(&item_info()).unwrap();
        let mut value = item_info().zero_value();
        let err = codec
            .decode_from(&mut &br#"<Item id="x"></Item>"#[..], &mut value, None)
            .unwrap_err();
        assert_eq!(err.into_error_set().flatten()[0].path(), "");
    }

    #[test]
    fn test_truncated_document() {
        let codec = XmlCodec::new(&item_info()).unwrap();
        let mut value = item_info().zero_value();
        assert!(matches!(
            codec.decode_from(&mut &b"<Item><name>a"[..], &mut value, None),
            Err(CodecError::Syntax { .. })
        ));
    }

    #[test]
    fn test_maps_are_unsupported() {
        assert!(XmlCodec::new(&<std::collections::HashMap<String, i32>>::type_info()).is_err());
    }
}
