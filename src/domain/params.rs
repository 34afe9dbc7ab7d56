use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

/// How a parameter bag is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Multipart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A file argument.
///
/// `Path` and `Memory` are uploaded as multipart file parts; `Remote` refers to a
/// file the service already knows (a `file_id` or an HTTP URL) and travels as text.
pub enum InputFile {
    Path(PathBuf),
    Memory { file_name: String, bytes: Vec<u8> },
    Remote(String),
}

impl InputFile {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn memory(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Memory {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn remote(id_or_url: impl Into<String>) -> Self {
        Self::Remote(id_or_url.into())
    }

    /// Whether this value has to be sent as a file part.
    pub fn is_upload(&self) -> bool {
        !matches!(self, Self::Remote(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    File(InputFile),
}

impl ParamValue {
    pub fn is_upload(&self) -> bool {
        matches!(self, Self::File(file) if file.is_upload())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Json(value.into())
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Json(value.into())
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Json(value.into())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Json(value.into())
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<InputFile> for ParamValue {
    fn from(value: InputFile) -> Self {
        Self::File(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Parameter bag handed to [`Bot::call`](crate::Bot::call).
///
/// Keys are the wire field names of the Bot API. Optional fields that are absent
/// are simply not inserted; there is no way to store a null.
pub struct Params {
    fields: BTreeMap<String, ParamValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any earlier value.
    ///
    /// A JSON `null` counts as absent: it removes `key` instead of being stored.
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        let key = key.into();
        match value.into() {
            ParamValue::Json(serde_json::Value::Null) => {
                self.fields.remove(&key);
            }
            value => {
                self.fields.insert(key, value);
            }
        }
        self
    }

    /// Insert `value` only when it is present.
    pub fn insert_opt<V: Into<ParamValue>>(
        self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> Self {
        match value {
            Some(value) => self.insert(key, value),
            None => self,
        }
    }

    /// Serialize a structured value (keyboards, entity lists, ...) into a JSON field.
    pub fn insert_json<T: Serialize + ?Sized>(
        self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.insert(key, ParamValue::Json(value)))
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.fields.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_uploads(&self) -> bool {
        self.fields.values().any(ParamValue::is_upload)
    }

    /// `Multipart` as soon as one value needs a file part, `Json` otherwise.
    pub fn encoding(&self) -> Encoding {
        if self.has_uploads() {
            Encoding::Multipart
        } else {
            Encoding::Json
        }
    }
}
