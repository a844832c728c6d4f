//! Test helpers and utilities for integration tests

use cvflow::config::{EndpointsSection, PipelineConfig, ServiceSection};
use cvflow::document::{DocumentFile, MIME_DOCX, MIME_PDF};

/// Configuration pointing at a test server
#[allow(dead_code)]
pub fn test_config(base_url: &str) -> PipelineConfig {
    PipelineConfig {
        service: ServiceSection {
            base_url: base_url.to_string(),
            base_url_env: None,
            timeout_secs: Some(5),
        },
        endpoints: EndpointsSection::default(),
        ..Default::default()
    }
}

/// A PDF of exactly `size` bytes
#[allow(dead_code)]
pub fn pdf_of_size(name: &str, size: usize) -> DocumentFile {
    DocumentFile::new(name, MIME_PDF, vec![b'%'; size])
}

#[allow(dead_code)]
pub fn docx(name: &str) -> DocumentFile {
    DocumentFile::new(name, MIME_DOCX, b"PK\x03\x04 docx".to_vec())
}
