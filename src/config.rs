//! Configuration system for the cvflow pipeline
//!
//! Configuration is read from a TOML file. Every section is optional and falls back
//! to the defaults of the observed deployment, so an empty file is a valid config.

use crate::document::{AdmissionPolicy, DEFAULT_MAX_FILE_BYTES, MIME_DOC, MIME_DOCX, MIME_PDF};
use crate::workflow::RedoPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main pipeline configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub endpoints: EndpointsSection,
    #[serde(default)]
    pub admission: AdmissionSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub export: ExportSection,
}

/// Upstream extraction service location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSection {
    /// Base URL of the extraction/matching service
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable that overrides `base_url` when set
    #[serde(default = "default_base_url_env")]
    pub base_url_env: Option<String>,
    /// Optional request timeout in seconds; requests wait indefinitely when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_base_url_env() -> Option<String> {
    Some("CVFLOW_API_URL".to_string())
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            base_url_env: default_base_url_env(),
            timeout_secs: None,
        }
    }
}

/// Endpoint paths, relative to the service base URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointsSection {
    pub upload_multiple_files: String,
    pub parse_structured: String,
    pub workflow_step1: String,
    pub workflow_step2: String,
    pub workflow_step3: String,
    pub workflow_step4: String,
    pub upload_single_document: String,
}

impl Default for EndpointsSection {
    fn default() -> Self {
        Self {
            upload_multiple_files: "/upload-multiple-cvs".to_string(),
            parse_structured: "/europass-parse".to_string(),
            workflow_step1: "/profile-expert/step1".to_string(),
            workflow_step2: "/profile-expert/step2".to_string(),
            workflow_step3: "/profile-expert/step3".to_string(),
            workflow_step4: "/profile-expert/step4".to_string(),
            upload_single_document: "/upload-tender".to_string(),
        }
    }
}

impl EndpointsSection {
    fn all(&self) -> [(&'static str, &str); 7] {
        [
            ("upload_multiple_files", &self.upload_multiple_files),
            ("parse_structured", &self.parse_structured),
            ("workflow_step1", &self.workflow_step1),
            ("workflow_step2", &self.workflow_step2),
            ("workflow_step3", &self.workflow_step3),
            ("workflow_step4", &self.workflow_step4),
            ("upload_single_document", &self.upload_single_document),
        ]
    }
}

/// File admission policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdmissionSection {
    /// Size ceiling in bytes (default: 4.5 MiB)
    pub max_file_bytes: u64,
    /// Accepted mime types (default: PDF and Word documents)
    pub accepted_mime_types: Vec<String>,
}

impl Default for AdmissionSection {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            accepted_mime_types: vec![
                MIME_PDF.to_string(),
                MIME_DOC.to_string(),
                MIME_DOCX.to_string(),
            ],
        }
    }
}

/// Sequential workflow behavior
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSection {
    #[serde(default)]
    pub redo_policy: RedoPolicy,
}

/// Artifact export settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportSection {
    /// Token substituted for absent optional template fields
    pub placeholder: String,
    /// Directory artifacts are written to
    pub output_dir: PathBuf,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            placeholder: "N/A".to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url(&self.service.base_url)?;

        for (name, path) in self.endpoints.all() {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidConfig(format!(
                    "Endpoint '{name}' must start with '/': {path}"
                )));
            }
        }

        if self.admission.max_file_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "admission.max_file_bytes must be greater than zero".to_string(),
            ));
        }

        if self.admission.accepted_mime_types.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "admission.accepted_mime_types must not be empty".to_string(),
            ));
        }

        if self.service.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "service.timeout_secs must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Base URL after applying the environment override, if any
    pub fn resolve_base_url(&self) -> Result<String, ConfigError> {
        let from_env = self
            .service
            .base_url_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|value| !value.trim().is_empty());

        match from_env {
            Some(url) => {
                validate_base_url(&url)?;
                Ok(url)
            }
            None => Ok(self.service.base_url.clone()),
        }
    }

    /// Request timeout, if configured
    pub fn timeout(&self) -> Option<Duration> {
        self.service.timeout_secs.map(Duration::from_secs)
    }

    /// Admission policy built from the `[admission]` section
    pub fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy::new(
            self.admission.max_file_bytes,
            self.admission.accepted_mime_types.clone(),
        )
    }
}

fn validate_base_url(base_url: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(base_url).map_err(|e| {
        ConfigError::InvalidConfig(format!("Invalid service base URL '{base_url}': {e}"))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidConfig(format!(
            "Service base URL must use http or https, got '{scheme}'"
        ))),
    }
}
