//! Per-file upload tracking
//!
//! [`FileUploadTracker`] admits a batch of documents, creates one [`TrackedFile`] per
//! accepted document and drives every file through
//! `uploading -> processing -> completed | error` with its own request. All requests
//! run concurrently on the calling task; each resolution is merged into the entry
//! carrying the generated id it was dispatched for.

use crate::client::{ExtractionService, RecordOutcome};
use crate::document::{AdmissionError, AdmissionPolicy, DocumentFile};
use crate::error::sanitize_error_message;
use crate::events::{EventSink, NoOpEvents, PipelineEvent};
use crate::schema::{normalize, CanonicalCandidate, EuropassRecord};
use crate::upload_span;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

pub type FileId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Uploading,
    Processing,
    Completed,
    Error,
}

impl FileStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Error)
    }

    /// Progress percentage reported for this status
    pub fn progress(self) -> u8 {
        match self {
            FileStatus::Uploading => 0,
            FileStatus::Processing => 50,
            FileStatus::Completed | FileStatus::Error => 100,
        }
    }
}

/// A submitted file and its processing outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedFile<R> {
    pub id: FileId,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub status: FileStatus,
    pub progress: u8,
    pub result: Option<R>,
    pub error: Option<String>,
}

impl<R> TrackedFile<R> {
    pub fn new(file: &DocumentFile) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: file.name.clone(),
            size: file.size(),
            mime_type: file.mime_type.clone(),
            status: FileStatus::Uploading,
            progress: FileStatus::Uploading.progress(),
            result: None,
            error: None,
        }
    }

    fn set_status(&mut self, status: FileStatus) {
        self.status = status;
        self.progress = status.progress();
    }

    /// `uploading -> processing`; refused from any other state
    pub fn mark_processing(&mut self) -> bool {
        if self.status != FileStatus::Uploading {
            return false;
        }
        self.set_status(FileStatus::Processing);
        true
    }

    /// Move to `completed`; refused once terminal
    pub fn complete(&mut self, result: R) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.set_status(FileStatus::Completed);
        self.result = Some(result);
        self.error = None;
        true
    }

    /// Move to `error`; refused once terminal
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.set_status(FileStatus::Error);
        self.result = None;
        self.error = Some(error.into());
        true
    }
}

/// Which parse endpoint the tracker uses, and how it interprets the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseTarget {
    /// CV parsing; payloads are normalized into [`CanonicalCandidate`]
    Candidate,
    /// Structured parsing; payloads are validated into [`EuropassRecord`]
    Structured,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum ParsedDocument {
    Candidate(CanonicalCandidate),
    Structured(EuropassRecord),
}

impl ParsedDocument {
    pub fn as_candidate(&self) -> Option<&CanonicalCandidate> {
        match self {
            ParsedDocument::Candidate(candidate) => Some(candidate),
            ParsedDocument::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&EuropassRecord> {
        match self {
            ParsedDocument::Structured(record) => Some(record),
            ParsedDocument::Candidate(_) => None,
        }
    }
}

pub type ParsedFile = TrackedFile<ParsedDocument>;

/// Outcome of one `submit` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionReport {
    /// Ids of the entries created for admitted files, in submission order
    pub accepted: Vec<FileId>,
    pub rejected: Vec<AdmissionError>,
}

/// Counts of tracked files per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSummary {
    pub uploading: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
}

impl TrackerSummary {
    pub fn total(&self) -> usize {
        self.uploading + self.processing + self.completed + self.error
    }
}

pub struct FileUploadTracker {
    service: Arc<dyn ExtractionService>,
    events: Arc<dyn EventSink>,
    admission: AdmissionPolicy,
    target: ParseTarget,
    files: RwLock<Vec<ParsedFile>>,
}

impl FileUploadTracker {
    pub fn new(service: Arc<dyn ExtractionService>, target: ParseTarget) -> Self {
        Self {
            service,
            events: Arc::new(NoOpEvents),
            admission: AdmissionPolicy::default(),
            target,
            files: RwLock::new(Vec::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_admission_policy(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    pub fn target(&self) -> ParseTarget {
        self.target
    }

    /// Admit a batch and process every accepted file to a terminal state
    ///
    /// Rejected files never get an entry. Failures of individual files are recorded
    /// on their entries; this call itself does not fail.
    pub async fn submit(&self, files: Vec<DocumentFile>) -> SubmissionReport {
        let (accepted, rejected) = self.admission.partition(files);

        for rejection in &rejected {
            warn!(file = %rejection.file_name(), "File rejected: {}", rejection);
            self.events
                .emit(PipelineEvent::FileRejected {
                    name: rejection.file_name().to_string(),
                    reason: rejection.to_string(),
                })
                .await;
        }

        let dispatched: Vec<(FileId, DocumentFile)> = {
            let mut tracked = self.files.write().await;
            accepted
                .into_iter()
                .map(|file| {
                    let entry = ParsedFile::new(&file);
                    let id = entry.id;
                    tracked.push(entry);
                    (id, file)
                })
                .collect()
        };

        let ids: Vec<FileId> = dispatched.iter().map(|(id, _)| *id).collect();
        let outcomes = join_all(dispatched.iter().map(|(id, file)| {
            self.track_file(*id, file)
                .instrument(upload_span!(file_id = %id, file = %file.name))
        }))
        .await;

        if !ids.is_empty() {
            let completed = outcomes
                .iter()
                .filter(|status| **status == Some(FileStatus::Completed))
                .count();
            let failed = outcomes
                .iter()
                .filter(|status| **status == Some(FileStatus::Error))
                .count();
            info!(completed, failed, "Batch finished");
            self.events
                .emit(PipelineEvent::BatchFinished { completed, failed })
                .await;
        }

        SubmissionReport {
            accepted: ids,
            rejected,
        }
    }

    /// Drive one entry to a terminal state. Returns `None` if the entry was removed.
    async fn track_file(&self, id: FileId, file: &DocumentFile) -> Option<FileStatus> {
        let dispatched = self
            .update(id, |entry| entry.mark_processing())
            .await
            .unwrap_or(false);
        if !dispatched {
            debug!("Entry removed or no longer uploading, skipping dispatch");
            return None;
        }
        self.events
            .emit(PipelineEvent::FileDispatched {
                id,
                name: file.name.clone(),
            })
            .await;

        let batch = std::slice::from_ref(file);
        let response = match self.target {
            ParseTarget::Candidate => self.service.upload_multiple_files(batch).await,
            ParseTarget::Structured => self.service.parse_structured(batch).await,
        };

        let resolution = match response.outcome_for(&file.name) {
            Some(RecordOutcome::Parsed(payload)) => self.interpret(payload),
            Some(RecordOutcome::Failed(error)) => Err(error),
            None => Err(format!("No result returned for {}", file.name)),
        };

        let (status, event) = match resolution {
            Ok(document) => {
                let applied = self.update(id, |entry| entry.complete(document)).await;
                (
                    applied.filter(|ok| *ok).map(|_| FileStatus::Completed),
                    PipelineEvent::FileCompleted {
                        id,
                        name: file.name.clone(),
                    },
                )
            }
            Err(error) => {
                let diagnostic = sanitize_error_message(&error);
                warn!("File processing failed: {}", diagnostic);
                let applied = self
                    .update(id, |entry| entry.fail(diagnostic.clone()))
                    .await;
                (
                    applied.filter(|ok| *ok).map(|_| FileStatus::Error),
                    PipelineEvent::FileFailed {
                        id,
                        name: file.name.clone(),
                        error: diagnostic,
                    },
                )
            }
        };

        match status {
            Some(status) => {
                debug!(status = ?status, "File resolved");
                self.events.emit(event).await;
            }
            None => debug!("Entry removed or already terminal, dropping result"),
        }
        status
    }

    /// Validate a payload for the configured target
    fn interpret(&self, payload: Value) -> Result<ParsedDocument, String> {
        if !payload.is_object() {
            return Err("Malformed record: expected a JSON object".to_string());
        }

        match self.target {
            ParseTarget::Candidate => Ok(ParsedDocument::Candidate(normalize(&payload))),
            ParseTarget::Structured => serde_json::from_value::<EuropassRecord>(payload)
                .map(ParsedDocument::Structured)
                .map_err(|e| format!("Malformed record: {e}")),
        }
    }

    /// Apply `f` to the entry with `id`, if it still exists
    async fn update<T>(&self, id: FileId, f: impl FnOnce(&mut ParsedFile) -> T) -> Option<T> {
        let mut files = self.files.write().await;
        files.iter_mut().find(|entry| entry.id == id).map(f)
    }

    /// Snapshot of every tracked file, in submission order
    pub async fn files(&self) -> Vec<ParsedFile> {
        self.files.read().await.clone()
    }

    pub async fn get(&self, id: FileId) -> Option<ParsedFile> {
        self.files
            .read()
            .await
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
    }

    /// Completed entries only
    pub async fn completed(&self) -> Vec<ParsedFile> {
        self.files
            .read()
            .await
            .iter()
            .filter(|entry| entry.status == FileStatus::Completed)
            .cloned()
            .collect()
    }

    /// Remove an entry in any state. Removing an unknown id is a no-op.
    pub async fn remove(&self, id: FileId) -> bool {
        let mut files = self.files.write().await;
        let before = files.len();
        files.retain(|entry| entry.id != id);
        files.len() != before
    }

    pub async fn summary(&self) -> TrackerSummary {
        self.files
            .read()
            .await
            .iter()
            .fold(TrackerSummary::default(), |mut summary, entry| {
                match entry.status {
                    FileStatus::Uploading => summary.uploading += 1,
                    FileStatus::Processing => summary.processing += 1,
                    FileStatus::Completed => summary.completed += 1,
                    FileStatus::Error => summary.error += 1,
                }
                summary
            })
    }
}
