//! In-memory documents and the admission policy applied before any upload

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Size ceiling of the observed deployment: 4.5 MiB, derived from the upstream
/// request payload limit
pub const DEFAULT_MAX_FILE_BYTES: u64 = 4_718_592;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// A document submitted by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DocumentFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a document from disk, inferring its mime type from the extension
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_from_extension(&name).to_string();
        Ok(Self::new(name, mime_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Guess a mime type from a file name's extension
pub fn mime_from_extension(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => MIME_PDF,
        "doc" => MIME_DOC,
        "docx" => MIME_DOCX,
        _ => MIME_OCTET_STREAM,
    }
}

/// A document refused by the admission policy
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AdmissionError {
    #[error(
        "File \"{name}\" is too large. Please upload files less than or equal to {}.",
        size_limit(.limit)
    )]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error("File \"{name}\" has an unsupported type ({mime}). Please upload PDF or Word documents.")]
    UnsupportedType { name: String, mime: String },
}

impl AdmissionError {
    /// Name of the rejected file
    pub fn file_name(&self) -> &str {
        match self {
            AdmissionError::TooLarge { name, .. } | AdmissionError::UnsupportedType { name, .. } => {
                name
            }
        }
    }
}

/// Pre-upload validation of size and type
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionPolicy {
    max_file_bytes: u64,
    accepted_mime_types: Vec<String>,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_FILE_BYTES,
            vec![
                MIME_PDF.to_string(),
                MIME_DOC.to_string(),
                MIME_DOCX.to_string(),
            ],
        )
    }
}

impl AdmissionPolicy {
    pub fn new(max_file_bytes: u64, accepted_mime_types: Vec<String>) -> Self {
        Self {
            max_file_bytes,
            accepted_mime_types,
        }
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    pub fn accepts_mime(&self, mime: &str) -> bool {
        self.accepted_mime_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(mime))
    }

    /// Check a single document. Files exactly at the ceiling are accepted.
    ///
    /// A missing or generic mime type is resolved from the file extension.
    pub fn check(&self, file: &DocumentFile) -> Result<(), AdmissionError> {
        if file.size() > self.max_file_bytes {
            return Err(AdmissionError::TooLarge {
                name: file.name.clone(),
                size: file.size(),
                limit: self.max_file_bytes,
            });
        }

        let declared = file.mime_type.trim();
        let effective = if declared.is_empty() || declared == MIME_OCTET_STREAM {
            mime_from_extension(&file.name)
        } else {
            declared
        };

        if !self.accepts_mime(effective) {
            return Err(AdmissionError::UnsupportedType {
                name: file.name.clone(),
                mime: effective.to_string(),
            });
        }

        Ok(())
    }

    /// Split a batch into admitted files and per-file rejections
    pub fn partition(&self, files: Vec<DocumentFile>) -> (Vec<DocumentFile>, Vec<AdmissionError>) {
        let mut accepted = Vec::with_capacity(files.len());
        let mut rejected = Vec::new();

        for file in files {
            match self.check(&file) {
                Ok(()) => accepted.push(file),
                Err(e) => rejected.push(e),
            }
        }

        (accepted, rejected)
    }
}

fn size_limit(limit: &u64) -> String {
    format_file_size(*limit)
}

/// Human-readable file size: `0 Bytes`, `512 Bytes`, `1.5 KB`, `4.5 MB`
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}
