//! External extraction/matching service abstraction
//!
//! The service itself is a black box reached over HTTP. [`ExtractionService`] is the
//! seam the tracker, workflow engine and matcher depend on; [`HttpExtractionService`]
//! is the production implementation and `testing::mocks` provides a scripted one.

pub mod http;
pub mod wire;

pub use http::HttpExtractionService;
pub use wire::{
    error_detail, AgentOutput, Assignment, CuratedCandidateWire, FileFailure, Narrative,
    ParseResponse, ProcessedRecord, RecordOutcome, Stage1Output, Stage2Output, Stage3Output,
    Stage4Output, TenderPayload, TenderResponse, TenderStatus,
};

use crate::document::DocumentFile;
use crate::error::ErrorKind;
use async_trait::async_trait;
use thiserror::Error;

/// Failures talking to the upstream service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The request never produced an HTTP response
    #[error("Network error: {0}")]
    Transport(String),

    /// Non-2xx response; `message` carries the upstream detail or a fallback
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// 2xx response whose body does not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Transport(_) => ErrorKind::Transport,
            ServiceError::Upstream { .. } => ErrorKind::Upstream,
            ServiceError::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }
}

/// Operations offered by the extraction/matching service
///
/// Batch parse and tender submission never fail: transport and non-2xx failures are
/// folded into the uniform response shapes. Workflow steps return a typed error.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Parse CVs into candidate records
    async fn upload_multiple_files(&self, files: &[DocumentFile]) -> ParseResponse;

    /// Parse CVs into structured (Europass) records
    async fn parse_structured(&self, files: &[DocumentFile]) -> ParseResponse;

    /// Extract assignments from a CV and a tender
    async fn workflow_step1(
        &self,
        cv: &DocumentFile,
        tender: &DocumentFile,
    ) -> Result<Stage1Output, ServiceError>;

    /// Select and rank CV assignments against the tender
    async fn workflow_step2(
        &self,
        cv_assignments: &[Assignment],
        tender_assignments: &[Assignment],
    ) -> Result<Stage2Output, ServiceError>;

    /// Generate a write-up from the selected assignments
    async fn workflow_step3(
        &self,
        selected_assignments: &[Assignment],
        cv_text: &str,
    ) -> Result<Stage3Output, ServiceError>;

    /// Assemble the final expert profile
    async fn workflow_step4(
        &self,
        write_up: &Narrative,
        cv_text: &str,
        tender_assignments: &[Assignment],
    ) -> Result<Stage4Output, ServiceError>;

    /// Submit a tender for candidate matching
    async fn upload_single_document(&self, file: &DocumentFile) -> TenderResponse;
}
