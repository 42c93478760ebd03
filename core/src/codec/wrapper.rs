//! Per-parameter codec wrapper.
//!
//! Non-body parameters travel as lists of strings (repeated query keys,
//! header values, form fields). [`ParamCodec`] maps a cell onto such a list,
//! either as one value or, when exploded, one value per element.

use super::{Codec, CodecError};
use crate::reflect::{TypeInfo, TypeKind, Value};
use crate::validation::{ErrorSet, Segment};
use std::io::Cursor;
use std::sync::Arc;

/// Collects encoded values, one buffer per value.
#[derive(Debug, Default)]
pub struct StringBuilders {
    items: Vec<Vec<u8>>,
}

impl StringBuilders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_writer(&mut self) -> &mut Vec<u8> {
        self.items.push(Vec::new());
        let last = self.items.len() - 1;
        &mut self.items[last]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_strings(self) -> Vec<String> {
        self.items
            .into_iter()
            .map(|b| {
                String::from_utf8(b)
                    .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
            })
            .collect()
    }
}

/// Hands out readers over received values in order.
#[derive(Debug)]
pub struct StringReaders {
    items: std::vec::IntoIter<String>,
}

impl StringReaders {
    pub fn new(values: Vec<String>) -> Self {
        Self {
            items: values.into_iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_reader(&mut self) -> Option<Cursor<Vec<u8>>> {
        self.items.next().map(|s| Cursor::new(s.into_bytes()))
    }
}

#[derive(Clone)]
pub struct ParamCodec {
    codec: Arc<dyn Codec>,
    ty: TypeInfo,
    omitempty: bool,
    explode: bool,
}

impl ParamCodec {
    pub fn new(codec: Arc<dyn Codec>, ty: TypeInfo, omitempty: bool, explode: bool) -> Self {
        Self {
            codec,
            ty,
            omitempty,
            explode,
        }
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    pub fn is_explode(&self) -> bool {
        self.explode
    }

    pub fn encode(&self, value: &Value, out: &mut StringBuilders) -> Result<(), CodecError> {
        if self.omitempty && value.is_empty() {
            return Ok(());
        }
        if !self.explode {
            return self.codec.encode_to(out.next_writer(), value);
        }
        match value {
            Value::Null => Ok(()),
            Value::List(items) => {
                for item in items {
                    self.codec.encode_to(out.next_writer(), item)?;
                }
                Ok(())
            }
            other => self.codec.encode_to(out.next_writer(), other),
        }
    }

    /// Decodes into `value`. Without any received value the cell is left untouched.
    pub fn decode(&self, readers: &mut StringReaders, value: &mut Value) -> Result<(), CodecError> {
        if !self.explode {
            if let Some(mut r) = readers.next_reader() {
                self.codec.decode_from(&mut r, value, None)?;
            }
            return Ok(());
        }
        if readers.is_empty() {
            return Ok(());
        }

        let ty = self.ty.deref();
        let Some(elem) = ty.elem() else {
            return Err(CodecError::unsupported("explode", &self.ty));
        };
        let mut items = Vec::with_capacity(readers.len());
        let mut errors = ErrorSet::new();
        let mut index = 0;
        while let Some(mut r) = readers.next_reader() {
            let mut item = elem.zero_value();
            if let Err(err) = self.codec.decode_from(&mut r, &mut item, None) {
                errors.add(
                    Segment::Index(index),
                    crate::validation::ValidationError::Decode(err.to_string()),
                );
            }
            items.push(item);
            index += 1;
        }
        if !errors.is_empty() {
            return Err(CodecError::Fields(errors));
        }

        if let TypeKind::Array(_, len) = ty.kind {
            if items.len() > len {
                log::debug!(
                    "dropping {} exploded values beyond {}",
                    items.len() - len,
                    self.ty
                );
            }
            items.resize(len, elem.zero_value());
        }
        *value = Value::List(items);
        Ok(())
    }
}
