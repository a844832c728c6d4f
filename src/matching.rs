//! Tender matching: one tender in, a scored candidate list and a curated subset out

use crate::client::{CuratedCandidateWire, ExtractionService, TenderResponse, TenderStatus};
use crate::document::{AdmissionError, AdmissionPolicy, DocumentFile};
use crate::error::sanitize_error_message;
use crate::events::{EventSink, NoOpEvents, PipelineEvent};
use crate::match_span;
use crate::schema::{normalize, CanonicalCandidate};
use crate::tracker::TrackedFile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

/// Match score as a percentage in `[0, 100]`, rounded to one decimal
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(f64);

impl Score {
    pub const MAX: f64 = 100.0;

    pub fn from_percent(percent: f64) -> Self {
        if !percent.is_finite() {
            return Score(0.0);
        }
        let clamped = percent.clamp(0.0, Self::MAX);
        Score((clamped * 10.0).round() / 10.0)
    }

    /// Full-match scores arrive on a 0-10 scale
    pub fn from_match_scale(raw: f64) -> Self {
        Self::from_percent(raw * 10.0)
    }

    /// Curated scores already arrive as percentages
    pub fn from_curated_scale(raw: f64) -> Self {
        Self::from_percent(raw)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

/// Identifier of a candidate in the matching service's store
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateRef(pub String);

impl CandidateRef {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => CandidateRef(s.trim().to_string()),
            Some(Value::Number(n)) => CandidateRef(n.to_string()),
            _ => CandidateRef::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CandidateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub id: CandidateRef,
    pub candidate: CanonicalCandidate,
    pub score: Score,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedCandidate {
    pub candidate_ref: CandidateRef,
    pub name: String,
    pub score: Score,
    pub rationale: String,
}

impl From<CuratedCandidateWire> for CuratedCandidate {
    fn from(wire: CuratedCandidateWire) -> Self {
        Self {
            candidate_ref: CandidateRef::from_value(Some(&wire.id)),
            name: wire.name.trim().to_string(),
            score: Score::from_curated_scale(wire.score),
            rationale: wire.reason,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Every match, highest score first
    pub matches: Vec<ScoredCandidate>,
    pub curated: Vec<CuratedCandidate>,
    /// Match records dropped because they were not JSON objects
    pub quarantined: usize,
}

impl MatchResult {
    /// Build from the service payload, normalizing every match record
    pub fn from_wire(matches: Vec<Value>, curated: Vec<CuratedCandidateWire>) -> Self {
        let mut quarantined = 0;
        let mut scored: Vec<ScoredCandidate> = matches
            .into_iter()
            .filter_map(|record| {
                if !record.is_object() {
                    quarantined += 1;
                    return None;
                }
                let raw_score = record.get("score").and_then(Value::as_f64).unwrap_or(0.0);
                Some(ScoredCandidate {
                    id: CandidateRef::from_value(record.get("id")),
                    candidate: normalize(&record),
                    score: Score::from_match_scale(raw_score),
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        if quarantined > 0 {
            warn!(quarantined, "Dropped malformed match records");
        }

        Self {
            matches: scored,
            curated: curated.into_iter().map(CuratedCandidate::from).collect(),
            quarantined,
        }
    }

    /// Full match entry for a curated pick
    pub fn candidate_for(&self, curated: &CuratedCandidate) -> Option<&ScoredCandidate> {
        if curated.candidate_ref.is_empty() {
            return None;
        }
        self.matches
            .iter()
            .find(|m| m.id == curated.candidate_ref)
    }
}

pub type TenderSubmission = TrackedFile<MatchResult>;

/// Submits one tender per call and tracks it like an uploaded file
pub struct BatchTenderMatcher {
    service: Arc<dyn ExtractionService>,
    events: Arc<dyn EventSink>,
    admission: AdmissionPolicy,
}

impl BatchTenderMatcher {
    pub fn new(service: Arc<dyn ExtractionService>) -> Self {
        Self {
            service,
            events: Arc::new(NoOpEvents),
            admission: AdmissionPolicy::default(),
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

    /// Submit a tender and wait for the match result
    ///
    /// Only an admission failure is returned as an error; service failures end up on
    /// the returned submission's `error`.
    pub async fn submit(&self, tender: DocumentFile) -> Result<TenderSubmission, AdmissionError> {
        if let Err(e) = self.admission.check(&tender) {
            warn!(file = %tender.name, "Tender rejected: {}", e);
            self.events
                .emit(PipelineEvent::FileRejected {
                    name: tender.name.clone(),
                    reason: e.to_string(),
                })
                .await;
            return Err(e);
        }

        let mut submission = TenderSubmission::new(&tender);
        submission.mark_processing();

        let response = self
            .service
            .upload_single_document(&tender)
            .instrument(match_span!(submission_id = %submission.id, file = %tender.name))
            .await;

        match resolve(response) {
            Ok(result) => {
                let (matches, curated) = (result.matches.len(), result.curated.len());
                info!(matches, curated, "Tender matched");
                submission.complete(result);
                self.events
                    .emit(PipelineEvent::TenderMatched {
                        id: submission.id,
                        name: submission.name.clone(),
                        matches,
                        curated,
                    })
                    .await;
            }
            Err(error) => {
                let diagnostic = sanitize_error_message(&error);
                warn!("Tender processing failed: {}", diagnostic);
                submission.fail(diagnostic.clone());
                self.events
                    .emit(PipelineEvent::TenderFailed {
                        id: submission.id,
                        name: submission.name.clone(),
                        error: diagnostic,
                    })
                    .await;
            }
        }

        Ok(submission)
    }
}

/// Success requires `processed` plus both the match list and the curated subset
fn resolve(response: TenderResponse) -> Result<MatchResult, String> {
    if response.status != TenderStatus::Processed {
        return Err(response
            .message
            .unwrap_or_else(|| "Tender processing failed".to_string()));
    }

    let payload = response
        .result
        .ok_or_else(|| "Malformed response: missing result".to_string())?;
    let matches = payload
        .matches
        .ok_or_else(|| "Malformed response: missing match list".to_string())?;
    let curated = payload
        .agent_output
        .and_then(|output| output.selected_candidates)
        .ok_or_else(|| "Malformed response: missing curated candidates".to_string())?;

    Ok(MatchResult::from_wire(matches, curated))
}
