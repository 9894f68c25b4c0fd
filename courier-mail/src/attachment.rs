//! Email attachments.
//!
//! Attachments travel inside the task payload: the bytes are copied at
//! enqueue time, so the queue never depends on a file the producer may
//! later delete.

use crate::{MailError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fallback content type when detection finds nothing.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Email attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// File content, base64 in serialized form.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Attachment {
    /// Create a new attachment from bytes.
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Create an attachment from a file path, reading its bytes now.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MailError::AttachmentWrite(format!("invalid file name: {}", path.display())))?
            .to_string();

        let data = std::fs::read(path)?;
        Ok(Self::new(filename, guess_content_type(path), data))
    }

    /// Create an attachment from bytes with automatic MIME type detection.
    pub fn from_bytes(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let filename = filename.into();
        let content_type = guess_content_type(Path::new(&filename));
        Self::new(filename, content_type, data)
    }

    /// Get the size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Content type by file extension.
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

mod base64_bytes {
    use super::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Encode bytes as base64 wrapped at 76 columns with CRLF line breaks.
pub(crate) fn encode_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 76 * 2 + 2);
    for line in encoded.as_bytes().chunks(76) {
        // base64 output is ASCII
        out.push_str(std::str::from_utf8(line).unwrap_or_default());
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(Attachment::from_bytes("report.pdf", vec![1]).content_type, "application/pdf");
        assert_eq!(Attachment::from_bytes("photo.png", vec![1]).content_type, "image/png");
        assert_eq!(
            Attachment::from_bytes("blob.unknownext", vec![1]).content_type,
            DEFAULT_CONTENT_TYPE
        );
        assert_eq!(Attachment::from_bytes("noext", vec![1]).content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_from_file_copies_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello")
            .unwrap();

        let attachment = Attachment::from_file(&path).unwrap();
        drop(dir);

        assert_eq!(attachment.filename, "notes.txt");
        assert_eq!(attachment.content_type, "text/plain");
        assert_eq!(attachment.data, b"hello");
    }

    #[test]
    fn test_serialized_as_base64() {
        let attachment = Attachment::new("a.bin", DEFAULT_CONTENT_TYPE, vec![0u8, 255, 7]);
        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["data"], "AP8H");

        let back: Attachment = serde_json::from_value(json).unwrap();
        assert_eq!(back, attachment);
    }

    #[test]
    fn test_encode_wrapped_line_length() {
        let data = vec![42u8; 200];
        let encoded = encode_wrapped(&data);
        for line in encoded.split("\r\n").filter(|l| !l.is_empty()) {
            assert!(line.len() <= 76);
        }
        let joined: String = encoded.split("\r\n").collect();
        assert_eq!(STANDARD.decode(joined).unwrap(), data);
    }
}
