//! Mock implementations for testing
//!
//! Provides a scripted [`ExtractionService`] and an event sink that records every
//! event, so pipeline components can be exercised without a running service.

use crate::client::{
    Assignment, ExtractionService, FileFailure, Narrative, ParseResponse, ProcessedRecord,
    ServiceError, Stage1Output, Stage2Output, Stage3Output, Stage4Output, TenderResponse,
};
use crate::document::{DocumentFile, MIME_PDF};
use crate::events::{EventSink, PipelineEvent};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// A call received by [`MockExtractionService`]
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    UploadMultipleFiles(Vec<String>),
    ParseStructured(Vec<String>),
    WorkflowStep1 {
        cv: String,
        tender: String,
    },
    WorkflowStep2 {
        cv_assignments: Vec<Assignment>,
        tender_assignments: Vec<Assignment>,
    },
    WorkflowStep3 {
        selected_assignments: Vec<Assignment>,
        cv_text: String,
    },
    WorkflowStep4 {
        write_up: Narrative,
        cv_text: String,
        tender_assignments: Vec<Assignment>,
    },
    UploadSingleDocument(String),
}

impl MockCall {
    /// Workflow step number, if this call is a workflow step
    pub fn workflow_step(&self) -> Option<u8> {
        match self {
            MockCall::WorkflowStep1 { .. } => Some(1),
            MockCall::WorkflowStep2 { .. } => Some(2),
            MockCall::WorkflowStep3 { .. } => Some(3),
            MockCall::WorkflowStep4 { .. } => Some(4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum FileScript {
    Parsed(Value),
    Failed(String),
    Raw(ParseResponse),
}

/// Scripted extraction service
///
/// Parse responses are scripted per file name; unscripted files fail. Workflow
/// steps and the tender endpoint return the last scripted response on every call.
#[derive(Debug, Default)]
pub struct MockExtractionService {
    files: Mutex<HashMap<String, FileScript>>,
    delays: Mutex<HashMap<String, Duration>>,
    step1: Mutex<Option<Result<Stage1Output, ServiceError>>>,
    step2: Mutex<Option<Result<Stage2Output, ServiceError>>>,
    step3: Mutex<Option<Result<Stage3Output, ServiceError>>>,
    step4: Mutex<Option<Result<Stage4Output, ServiceError>>>,
    echo_profile: Mutex<bool>,
    tender: Mutex<Option<TenderResponse>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockExtractionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `name` with a processed record carrying `payload`
    pub async fn set_parsed(&self, name: &str, payload: Value) {
        self.files
            .lock()
            .await
            .insert(name.to_string(), FileScript::Parsed(payload));
    }

    /// Respond to `name` with a per-file error
    pub async fn set_file_error(&self, name: &str, error: &str) {
        self.files
            .lock()
            .await
            .insert(name.to_string(), FileScript::Failed(error.to_string()));
    }

    /// Respond to a request containing `name` with exactly `response`
    pub async fn set_raw_response(&self, name: &str, response: ParseResponse) {
        self.files
            .lock()
            .await
            .insert(name.to_string(), FileScript::Raw(response));
    }

    /// Delay the response to a request containing `name`
    pub async fn set_delay(&self, name: &str, delay: Duration) {
        self.delays.lock().await.insert(name.to_string(), delay);
    }

    pub async fn set_step1(&self, result: Result<Stage1Output, ServiceError>) {
        *self.step1.lock().await = Some(result);
    }

    pub async fn set_step2(&self, result: Result<Stage2Output, ServiceError>) {
        *self.step2.lock().await = Some(result);
    }

    pub async fn set_step3(&self, result: Result<Stage3Output, ServiceError>) {
        *self.step3.lock().await = Some(result);
    }

    pub async fn set_step4(&self, result: Result<Stage4Output, ServiceError>) {
        *self.step4.lock().await = Some(result);
    }

    /// Answer step 4 with a profile that embeds its write-up and tender assignments
    pub async fn echo_profile_inputs(&self) {
        *self.echo_profile.lock().await = true;
    }

    /// Script every workflow step with the sample outputs
    pub async fn script_full_workflow(&self) {
        self.set_step1(Ok(sample_stage1())).await;
        self.set_step2(Ok(sample_stage2())).await;
        self.set_step3(Ok(sample_stage3())).await;
        self.set_step4(Ok(sample_stage4())).await;
    }

    pub async fn set_tender_response(&self, response: TenderResponse) {
        *self.tender.lock().await = Some(response);
    }

    pub async fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    async fn record(&self, call: MockCall) {
        self.calls.lock().await.push(call);
    }

    async fn respond_to_batch(&self, files: &[DocumentFile]) -> ParseResponse {
        let delay = {
            let delays = self.delays.lock().await;
            files
                .iter()
                .filter_map(|file| delays.get(&file.name).copied())
                .max()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripts = self.files.lock().await;
        let mut response = ParseResponse::default();
        for file in files {
            match scripts.get(&file.name) {
                Some(FileScript::Parsed(payload)) => response.processed.push(ProcessedRecord {
                    filename: Some(file.name.clone()),
                    parsed: Some(payload.clone()),
                    result: None,
                }),
                Some(FileScript::Failed(error)) => response.errors.push(FileFailure {
                    filename: Some(file.name.clone()),
                    error: error.clone(),
                }),
                Some(FileScript::Raw(raw)) => return raw.clone(),
                None => response.errors.push(FileFailure {
                    filename: Some(file.name.clone()),
                    error: format!("No response scripted for {}", file.name),
                }),
            }
        }
        response
    }

    async fn step<T: Clone>(
        &self,
        call: MockCall,
        slot: &Mutex<Option<Result<T, ServiceError>>>,
    ) -> Result<T, ServiceError> {
        let step = call.workflow_step().unwrap_or_default();
        self.record(call).await;
        slot.lock().await.clone().unwrap_or_else(|| {
            Err(ServiceError::Upstream {
                status: 500,
                message: format!("Failed to process step {step}"),
            })
        })
    }
}

#[async_trait]
impl ExtractionService for MockExtractionService {
    async fn upload_multiple_files(&self, files: &[DocumentFile]) -> ParseResponse {
        self.record(MockCall::UploadMultipleFiles(names(files)))
            .await;
        self.respond_to_batch(files).await
    }

    async fn parse_structured(&self, files: &[DocumentFile]) -> ParseResponse {
        self.record(MockCall::ParseStructured(names(files))).await;
        self.respond_to_batch(files).await
    }

    async fn workflow_step1(
        &self,
        cv: &DocumentFile,
        tender: &DocumentFile,
    ) -> Result<Stage1Output, ServiceError> {
        let call = MockCall::WorkflowStep1 {
            cv: cv.name.clone(),
            tender: tender.name.clone(),
        };
        self.step(call, &self.step1).await
    }

    async fn workflow_step2(
        &self,
        cv_assignments: &[Assignment],
        tender_assignments: &[Assignment],
    ) -> Result<Stage2Output, ServiceError> {
        let call = MockCall::WorkflowStep2 {
            cv_assignments: cv_assignments.to_vec(),
            tender_assignments: tender_assignments.to_vec(),
        };
        self.step(call, &self.step2).await
    }

    async fn workflow_step3(
        &self,
        selected_assignments: &[Assignment],
        cv_text: &str,
    ) -> Result<Stage3Output, ServiceError> {
        let call = MockCall::WorkflowStep3 {
            selected_assignments: selected_assignments.to_vec(),
            cv_text: cv_text.to_string(),
        };
        self.step(call, &self.step3).await
    }

    async fn workflow_step4(
        &self,
        write_up: &Narrative,
        cv_text: &str,
        tender_assignments: &[Assignment],
    ) -> Result<Stage4Output, ServiceError> {
        let call = MockCall::WorkflowStep4 {
            write_up: write_up.clone(),
            cv_text: cv_text.to_string(),
            tender_assignments: tender_assignments.to_vec(),
        };
        if *self.echo_profile.lock().await {
            self.record(call).await;
            return Ok(echoed_profile(write_up, tender_assignments));
        }
        self.step(call, &self.step4).await
    }

    async fn upload_single_document(&self, file: &DocumentFile) -> TenderResponse {
        self.record(MockCall::UploadSingleDocument(file.name.clone()))
            .await;
        self.tender
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| TenderResponse::failed("No response scripted"))
    }
}

/// Profile that carries the step 4 inputs through verbatim
fn echoed_profile(write_up: &Narrative, tender_assignments: &[Assignment]) -> Stage4Output {
    let mut profile = Map::new();
    profile.insert(
        "write_up".to_string(),
        serde_json::to_value(write_up).unwrap_or_default(),
    );
    profile.insert(
        "relevant_assignments".to_string(),
        serde_json::to_value(tender_assignments).unwrap_or_default(),
    );
    Stage4Output {
        expert_profile: Narrative::Structured(profile),
    }
}

fn names(files: &[DocumentFile]) -> Vec<String> {
    files.iter().map(|file| file.name.clone()).collect()
}

/// Event sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().await.clone()
    }

    pub async fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .map(PipelineEvent::message)
            .collect()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        self.events.lock().await.push(event);
    }
}

/// A small PDF-typed document
pub fn sample_pdf(name: &str) -> DocumentFile {
    DocumentFile::new(name, MIME_PDF, b"%PDF-1.4 sample".to_vec())
}

pub fn assignment(title: &str) -> Assignment {
    let mut map = Map::new();
    map.insert("title".to_string(), Value::String(title.to_string()));
    Assignment(map)
}

pub fn sample_stage1() -> Stage1Output {
    Stage1Output {
        cv_assignments: vec![
            assignment("Health systems evaluation, Kenya"),
            assignment("Road sector audit, Uganda"),
        ],
        tender_assignments: vec![assignment("Mid-term evaluation of a health programme")],
        cv_text: "Amina Otieno, evaluator with 14 years of experience".to_string(),
        tender_text: "Terms of reference for a mid-term evaluation".to_string(),
    }
}

pub fn sample_stage2() -> Stage2Output {
    Stage2Output {
        selected_assignments: vec![assignment("Health systems evaluation, Kenya")],
    }
}

pub fn sample_stage3() -> Stage3Output {
    Stage3Output {
        write_up: Narrative::Text(
            "Led the evaluation of county health systems across six counties.".to_string(),
        ),
    }
}

pub fn sample_stage4() -> Stage4Output {
    let profile = json!({
        "summary": "Senior evaluator with a health systems focus",
        "relevant_assignments": ["Health systems evaluation, Kenya"]
    });
    Stage4Output {
        expert_profile: match profile {
            Value::Object(map) => Narrative::Structured(map),
            _ => Narrative::Text(String::new()),
        },
    }
}
