//! Request payloads and file arguments

use std::path::PathBuf;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::utils::errors::{TelegramError, TelegramResult};

/// A file argument of an upload method
#[derive(Debug, Clone, PartialEq)]
pub enum InputFile {
    /// A file already stored on the Telegram servers
    FileId(String),
    /// An HTTP URL Telegram downloads the file from
    Url(String),
    /// In-memory content, uploaded as multipart
    Memory { bytes: Bytes, filename: String },
    /// A local file, read and uploaded as multipart
    Path(PathBuf),
}

impl InputFile {
    pub fn file_id(id: impl Into<String>) -> Self {
        InputFile::FileId(id.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        InputFile::Url(url.into())
    }

    pub fn memory(bytes: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        InputFile::Memory {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        InputFile::Path(path.into())
    }

    /// Whether the file content has to be sent with the request
    pub fn is_upload(&self) -> bool {
        matches!(self, InputFile::Memory { .. } | InputFile::Path(_))
    }
}

/// Parameters of a single Bot API call
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    params: Map<String, Value>,
    files: Vec<(String, InputFile)>,
}

impl RequestData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter. `None` values are skipped.
    pub fn insert<T: Serialize>(&mut self, key: &str, value: T) -> TelegramResult<&mut Self> {
        let value = serde_json::to_value(value).map_err(|e| {
            TelegramError::Generic(format!("Failed to serialize parameter {}: {}", key, e))
        })?;
        if !value.is_null() {
            self.params.insert(key.to_string(), value);
        }
        Ok(self)
    }

    /// Adds a file argument, either inline or as an upload part
    pub fn insert_file(&mut self, key: &str, file: InputFile) -> &mut Self {
        match file {
            InputFile::FileId(id) | InputFile::Url(id) => {
                self.params.insert(key.to_string(), Value::String(id));
            }
            upload => self.files.push((key.to_string(), upload)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Any upload switches the request to `multipart/form-data`
    pub fn is_multipart(&self) -> bool {
        !self.files.is_empty()
    }

    pub fn json_payload(&self) -> Value {
        Value::Object(self.params.clone())
    }

    /// Multipart form: strings verbatim, everything else JSON-encoded
    pub async fn to_multipart(&self) -> TelegramResult<Form> {
        let mut form = Form::new();
        for (key, value) in &self.params {
            let text = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            form = form.text(key.clone(), text);
        }

        for (key, file) in &self.files {
            let part = match file {
                InputFile::Memory { bytes, filename } => {
                    Part::bytes(bytes.to_vec()).file_name(filename.clone())
                }
                InputFile::Path(path) => {
                    let content = tokio::fs::read(path).await.map_err(|e| {
                        TelegramError::Generic(format!(
                            "Failed to read {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                    let filename = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| key.clone());
                    Part::bytes(content).file_name(filename)
                }
                InputFile::FileId(id) | InputFile::Url(id) => Part::text(id.clone()),
            };
            form = form.part(key.clone(), part);
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_none_parameters_are_skipped() {
        let mut data = RequestData::new();
        data.insert("chat_id", 42).unwrap();
        data.insert("parse_mode", Option::<String>::None).unwrap();
        assert_eq!(data.json_payload(), json!({"chat_id": 42}));
    }

    #[test]
    fn test_file_id_stays_inline() {
        let mut data = RequestData::new();
        data.insert_file("audio", InputFile::file_id("CQAC"));
        assert!(!data.is_multipart());
        assert_eq!(data.get("audio"), Some(&json!("CQAC")));

        data.insert_file("thumbnail", InputFile::memory(vec![1u8, 2, 3], "cover.jpg"));
        assert!(data.is_multipart());
        assert!(data.get("thumbnail").is_none());
    }

    #[tokio::test]
    async fn test_multipart_reads_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode.mp3");
        std::fs::write(&path, b"ID3").unwrap();

        let mut data = RequestData::new();
        data.insert("chat_id", 1).unwrap();
        data.insert_file("audio", InputFile::path(&path));
        assert!(data.to_multipart().await.is_ok());

        let mut missing = RequestData::new();
        missing.insert_file("audio", InputFile::path(dir.path().join("nope.mp3")));
        assert!(missing.to_multipart().await.is_err());
    }
}
