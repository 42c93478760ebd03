use crate::reflect::{Model, TypeInfo, TypeKind, Value, ValueError};
use std::io::Cursor;

/// An uploaded file, the multipart counterpart of a form field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FileHeader {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn open(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.data)
    }
}

impl Model for FileHeader {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::File)
    }

    fn to_value(&self) -> Value {
        Value::File(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::File(file) => Ok(file),
            Value::Bytes(data) => Ok(FileHeader {
                data,
                ..Default::default()
            }),
            Value::Null => Ok(FileHeader::default()),
            other => Err(ValueError::mismatch("file", &other)),
        }
    }
}
