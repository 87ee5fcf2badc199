//! Input documents submitted for extraction.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::error::StorageError;

/// One uploaded document: an image or a PDF held in memory.
///
/// The bytes are shared, so cloning an `InputFile` (for job snapshots,
/// batch results and history saves) never copies the document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFile {
    /// Display name including extension, e.g. `invoice.pdf`.
    pub name: String,
    /// MIME type, detected from the name when not supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size of the document in bytes.
    pub size: usize,
    #[serde(skip)]
    bytes: Arc<Vec<u8>>,
}

impl InputFile {
    /// Creates a file from raw bytes, detecting the MIME type from the name.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = detect_mime_type(&name);
        Self::with_mime_type(name, mime_type, bytes)
    }

    /// Creates a file with an explicit MIME type.
    pub fn with_mime_type(name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type,
            size: bytes.len(),
            bytes: Arc::new(bytes),
        }
    }

    /// Reads a file from disk.
    pub fn from_path(path: &Path) -> Result<Self, StorageError> {
        let bytes = std::fs::read(path).map_err(|e| StorageError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns true when both files share the same underlying buffer.
    pub fn shares_bytes_with(&self, other: &InputFile) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type.as_deref() == Some("application/pdf")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with("image/"))
    }

    /// Splits the name into base and extension (extension includes the dot).
    pub fn split_name(&self) -> (&str, &str) {
        match self.name.rfind('.') {
            Some(pos) if pos > 0 => (&self.name[..pos], &self.name[pos..]),
            _ => (&self.name, ""),
        }
    }
}

fn detect_mime_type(name: &str) -> Option<String> {
    mime_guess::from_path(name).first().map(|m| m.to_string())
}
