use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::domain::{InputFile, ParamValue, Params};

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("field `{field}` uploads a file and cannot be sent as JSON")]
    UploadInJsonBody { field: String },

    #[error("cannot serialize request body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read upload {path:?} for field `{field}`: {source}")]
    File {
        field: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
/// One multipart field, resolved before the first attempt so it can be
/// replayed on every retry.
pub enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        source: FileSource,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// Streamed from disk at send time.
    Path { path: PathBuf, len: u64 },
    Memory(Bytes),
}

fn text_value(value: &ParamValue) -> Option<String> {
    match value {
        ParamValue::Text(text) => Some(text.clone()),
        ParamValue::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ParamValue::Json(serde_json::Value::String(text)) => Some(text.clone()),
        ParamValue::Json(value) => Some(value.to_string()),
        ParamValue::File(InputFile::Remote(id)) => Some(id.clone()),
        ParamValue::File(_) => None,
    }
}

/// Serialize the bag as one JSON object.
pub fn encode_json_body(params: &Params) -> Result<Vec<u8>, EncodeError> {
    let mut object = serde_json::Map::with_capacity(params.len());
    for (key, value) in params.iter() {
        let json = match value {
            ParamValue::Json(json) => json.clone(),
            ParamValue::File(file) if file.is_upload() => {
                return Err(EncodeError::UploadInJsonBody {
                    field: key.to_owned(),
                });
            }
            other => text_value(other)
                .map(serde_json::Value::String)
                .unwrap_or_default(),
        };
        object.insert(key.to_owned(), json);
    }
    Ok(serde_json::to_vec(&object)?)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_owned())
}

/// Resolve the bag into multipart fields.
///
/// Local files are only inspected here (existence and length); their content is
/// streamed when the form is built.
pub async fn plan_multipart(params: &Params) -> Result<Vec<FormField>, EncodeError> {
    let mut fields = Vec::with_capacity(params.len());
    for (key, value) in params.iter() {
        let field = match value {
            ParamValue::File(InputFile::Path(path)) => {
                let metadata = tokio::fs::metadata(path)
                    .await
                    .map_err(|source| EncodeError::File {
                        field: key.to_owned(),
                        path: path.clone(),
                        source,
                    })?;
                if !metadata.is_file() {
                    return Err(EncodeError::File {
                        field: key.to_owned(),
                        path: path.clone(),
                        source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
                    });
                }
                FormField::File {
                    name: key.to_owned(),
                    file_name: file_name_of(path),
                    source: FileSource::Path {
                        path: path.clone(),
                        len: metadata.len(),
                    },
                }
            }
            ParamValue::File(InputFile::Memory { file_name, bytes }) => FormField::File {
                name: key.to_owned(),
                file_name: file_name.clone(),
                source: FileSource::Memory(Bytes::from(bytes.clone())),
            },
            other => FormField::Text {
                name: key.to_owned(),
                value: text_value(other).unwrap_or_default(),
            },
        };
        fields.push(field);
    }
    Ok(fields)
}

/// Build a `reqwest` form from planned fields. Files are opened here and
/// streamed, never read into memory.
pub async fn build_form(fields: &[FormField]) -> io::Result<reqwest::multipart::Form> {
    use reqwest::multipart::{Form, Part};

    let mut form = Form::new();
    for field in fields {
        form = match field {
            FormField::Text { name, value } => form.text(name.clone(), value.clone()),
            FormField::File {
                name,
                file_name,
                source,
            } => {
                let part = match source {
                    FileSource::Path { path, len } => {
                        let file = tokio::fs::File::open(path).await?;
                        let stream = tokio_util::io::ReaderStream::new(file);
                        Part::stream_with_length(reqwest::Body::wrap_stream(stream), *len)
                    }
                    FileSource::Memory(bytes) => Part::stream_with_length(
                        reqwest::Body::from(bytes.clone()),
                        bytes.len() as u64,
                    ),
                };
                form.part(name.clone(), part.file_name(file_name.clone()))
            }
        };
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, content: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tgbot-body-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn json_body_keeps_structured_values() {
        let params = Params::new()
            .insert("chat_id", 42_i64)
            .insert("text", "hello")
            .insert("disable_notification", true)
            .insert("photo", InputFile::remote("AgAD"))
            .insert_json("entities", &[serde_json::json!({"type": "bold"})])
            .unwrap();

        let body = encode_json_body(&params).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "chat_id": 42,
                "text": "hello",
                "disable_notification": true,
                "photo": "AgAD",
                "entities": [{ "type": "bold" }],
            })
        );
    }

    #[test]
    fn json_body_refuses_uploads() {
        let params = Params::new().insert("document", InputFile::memory("a.txt", b"a".to_vec()));
        assert!(matches!(
            encode_json_body(&params),
            Err(EncodeError::UploadInJsonBody { field }) if field == "document"
        ));
    }

    #[tokio::test]
    async fn multipart_plan_classifies_fields() {
        let path = temp_file("photo.jpg", b"jpeg bytes");
        let params = Params::new()
            .insert("chat_id", 42_i64)
            .insert("caption", "look")
            .insert("raw", b"bytes".to_vec())
            .insert_json("reply_markup", &serde_json::json!({"inline_keyboard": []}))
            .unwrap()
            .insert("photo", InputFile::path(&path))
            .insert("thumbnail", InputFile::memory("t.jpg", b"thumb".to_vec()));

        let fields = plan_multipart(&params).await.unwrap();
        let find = |name: &str| {
            fields
                .iter()
                .find(|field| match field {
                    FormField::Text { name: n, .. } | FormField::File { name: n, .. } => n == name,
                })
                .cloned()
                .unwrap()
        };

        assert_eq!(
            find("chat_id"),
            FormField::Text {
                name: "chat_id".to_owned(),
                value: "42".to_owned()
            }
        );
        assert_eq!(
            find("caption"),
            FormField::Text {
                name: "caption".to_owned(),
                value: "look".to_owned()
            }
        );
        assert_eq!(
            find("raw"),
            FormField::Text {
                name: "raw".to_owned(),
                value: "bytes".to_owned()
            }
        );
        assert_eq!(
            find("reply_markup"),
            FormField::Text {
                name: "reply_markup".to_owned(),
                value: r#"{"inline_keyboard":[]}"#.to_owned()
            }
        );
        assert_eq!(
            find("photo"),
            FormField::File {
                name: "photo".to_owned(),
                file_name: "photo.jpg".to_owned(),
                source: FileSource::Path {
                    path: path.clone(),
                    len: 10
                },
            }
        );
        assert!(matches!(
            find("thumbnail"),
            FormField::File { file_name, source: FileSource::Memory(_), .. } if file_name == "t.jpg"
        ));

        assert!(build_form(&fields).await.is_ok());
    }

    #[tokio::test]
    async fn absent_markup_is_left_off_the_wire() {
        let params = Params::new()
            .insert("chat_id", 42_i64)
            .insert_json("reply_markup", &None::<serde_json::Value>)
            .unwrap()
            .insert("document", InputFile::memory("a.txt", b"a".to_vec()));

        let fields = plan_multipart(&params).await.unwrap();
        assert_eq!(fields.len(), 2);
        assert!(!fields.iter().any(|field| matches!(
            field,
            FormField::Text { name, .. } if name == "reply_markup"
        )));

        let params = Params::new()
            .insert("chat_id", 42_i64)
            .insert_json("reply_markup", &None::<serde_json::Value>)
            .unwrap();
        let body = encode_json_body(&params).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({ "chat_id": 42 }));
    }

    #[tokio::test]
    async fn multipart_plan_fails_on_missing_file() {
        let params = Params::new().insert(
            "document",
            InputFile::path("/definitely/not/here/report.pdf"),
        );
        assert!(matches!(
            plan_multipart(&params).await,
            Err(EncodeError::File { field, .. }) if field == "document"
        ));
    }
}
