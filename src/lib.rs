//! cvflow - CV processing pipeline core
//!
//! Orchestration layer for a CV parsing and tender matching service. The heavy
//! lifting (text extraction, LLM calls, candidate search) happens upstream; this
//! crate drives it and keeps the client-side state consistent.
//!
//! # Overview
//!
//! - Batch CV upload with per-file status tracking ([`tracker`])
//! - Normalization of loosely shaped candidate records ([`schema`])
//! - A four-stage expert profiling workflow with strict gating ([`workflow`])
//! - Tender matching with scored and curated candidates ([`matching`])
//! - JSON and template-based artifact export ([`export`])
//!
//! # Quick Start
//!
//! ```rust
//! use cvflow::schema::{normalize, LanguageLevel};
//! use serde_json::json;
//!
//! let candidate = normalize(&json!({
//!     "Name": "Jean Dupont",
//!     "Languages": ["French (Native)", "English (Good)"],
//!     "Nationalities": ["French"]
//! }));
//!
//! assert_eq!(candidate.first_name, "Jean");
//! assert_eq!(candidate.family_name, "Dupont");
//! assert_eq!(candidate.language_skills[0].level, LanguageLevel::Native);
//! ```

pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod export;
pub mod matching;
pub mod observability;
pub mod schema;
pub mod testing;
pub mod tracker;
pub mod workflow;

pub use client::{ExtractionService, HttpExtractionService, ServiceError};
pub use config::*;
pub use document::{AdmissionError, AdmissionPolicy, DocumentFile};
pub use error::{PipelineError, PipelineResult};
pub use events::{EventSink, PipelineEvent};
pub use export::{Artifact, ExportError, ResultExporter};
pub use matching::{BatchTenderMatcher, MatchResult, Score};
pub use schema::{normalize, CanonicalCandidate, EuropassRecord};
pub use tracker::{FileStatus, FileUploadTracker, ParseTarget, ParsedDocument};
pub use workflow::{RedoPolicy, SequentialWorkflowEngine, Stage, WorkflowError};
