//! Wire shapes exchanged with the extraction service
//!
//! Upstream payloads are loosely typed. These types validate them at the boundary:
//! anything that does not fit is rejected here instead of leaking into tracked state.

use crate::document::DocumentFile;
use crate::schema::null_as_default;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response of the batch parse endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub processed: Vec<ProcessedRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<FileFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ProcessedRecord {
    /// `parsed` if present, else `result`, else an empty object
    pub fn payload(&self) -> Value {
        self.parsed
            .iter()
            .chain(self.result.iter())
            .find(|value| !value.is_null())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub error: String,
}

/// What the response says about one file
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Parsed(Value),
    Failed(String),
}

impl ParseResponse {
    /// Uniform failure shape: every file in the request fails with `message`
    pub fn failed(files: &[DocumentFile], message: &str) -> Self {
        Self {
            processed: Vec::new(),
            errors: files
                .iter()
                .map(|file| FileFailure {
                    filename: Some(file.name.clone()),
                    error: message.to_string(),
                })
                .collect(),
        }
    }

    /// Locate the outcome for `name`
    ///
    /// Records are matched by filename first. A response carrying exactly one record
    /// and nothing else is attributed to the file regardless of its filename.
    pub fn outcome_for(&self, name: &str) -> Option<RecordOutcome> {
        if let Some(record) = self
            .processed
            .iter()
            .find(|record| record.filename.as_deref() == Some(name))
        {
            return Some(RecordOutcome::Parsed(record.payload()));
        }

        if let Some(failure) = self
            .errors
            .iter()
            .find(|failure| failure.filename.as_deref() == Some(name))
        {
            return Some(RecordOutcome::Failed(failure.error.clone()));
        }

        match (self.processed.as_slice(), self.errors.as_slice()) {
            ([record], []) => Some(RecordOutcome::Parsed(record.payload())),
            ([], [failure]) => Some(RecordOutcome::Failed(failure.error.clone())),
            _ => None,
        }
    }
}

/// An assignment extracted from a CV or tender. Only JSON objects are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment(pub Map<String, Value>);

impl Assignment {
    /// Best-effort display title
    pub fn title(&self) -> Option<&str> {
        ["title", "assignment_title", "name", "project"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_str))
    }
}

/// Free text or a structured document produced by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Narrative {
    Text(String),
    Structured(Map<String, Value>),
}

impl Narrative {
    pub fn is_empty(&self) -> bool {
        match self {
            Narrative::Text(text) => text.trim().is_empty(),
            Narrative::Structured(map) => map.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage1Output {
    pub cv_assignments: Vec<Assignment>,
    pub tender_assignments: Vec<Assignment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cv_text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tender_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage2Output {
    pub selected_assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage3Output {
    pub write_up: Narrative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage4Output {
    pub expert_profile: Narrative,
}

/// Response of the tender submission endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTenderResponse")]
pub struct TenderResponse {
    pub status: TenderStatus,
    pub result: Option<TenderPayload>,
    /// Upstream explanation, taken from `detail`, `error` or `message`
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct RawTenderResponse {
    #[serde(default)]
    status: TenderStatus,
    #[serde(default)]
    result: Option<TenderPayload>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl From<RawTenderResponse> for TenderResponse {
    fn from(raw: RawTenderResponse) -> Self {
        Self {
            status: raw.status,
            result: raw.result,
            message: error_detail(&raw.rest),
        }
    }
}

/// Human-readable detail from an upstream body: the first non-empty of `detail`,
/// `error` and `message`
pub fn error_detail(body: &Map<String, Value>) -> Option<String> {
    ["detail", "error", "message"]
        .iter()
        .find_map(|key| match body.get(*key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Null | Value::String(_) => None,
            other => Some(other.to_string()),
        })
}

impl TenderResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: TenderStatus::Error,
            result: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenderStatus {
    Processed,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenderPayload {
    #[serde(default)]
    pub matches: Option<Vec<Value>>,
    #[serde(default)]
    pub agent_output: Option<AgentOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    #[serde(default)]
    pub selected_candidates: Option<Vec<CuratedCandidateWire>>,
}

/// A curated pick as sent by the matching agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedCandidateWire {
    #[serde(default)]
    pub id: Value,
    #[serde(default, alias = "Name", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: f64,
    #[serde(default, alias = "Reason", deserialize_with = "null_as_default")]
    pub reason: String,
}
