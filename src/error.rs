//! Error types for the cvflow pipeline
//!
//! Each component owns its own error enum (admission, upstream service, workflow,
//! export, configuration). `PipelineError` aggregates them for callers that drive
//! several components, and every diagnostic that is stored into tracked state goes
//! through [`sanitize_error_message`] first.

use crate::client::ServiceError;
use crate::document::AdmissionError;
use crate::export::ExportError;
use crate::workflow::WorkflowError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a diagnostic stored in tracked state
pub const MAX_DIAGNOSTIC_LEN: usize = 500;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("static regex is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("static regex is valid")
});

/// Top-level error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Coarse classification of a failure, following the pipeline's error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Admission,
    Transport,
    Upstream,
    MalformedResponse,
    Precondition,
    Internal,
}

impl PipelineError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Admission(_) => ErrorKind::Admission,
            PipelineError::Service(e) => e.kind(),
            PipelineError::Workflow(e) => e.kind(),
            PipelineError::InvalidInput { .. } => ErrorKind::Precondition,
            PipelineError::Export(_)
            | PipelineError::ConfigError(_)
            | PipelineError::Io(_)
            | PipelineError::InternalError { .. } => ErrorKind::Internal,
        }
    }

    /// Sanitized, user-facing message for this error
    pub fn diagnostic(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

/// Sanitize error messages before they are stored or displayed
///
/// Redacts credential-looking `key=value` pairs and sensitive file paths, and caps
/// the message at [`MAX_DIAGNOSTIC_LEN`] bytes.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_DIAGNOSTIC_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_DIAGNOSTIC_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
