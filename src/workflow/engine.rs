use super::{ProcessingState, RedoPolicy, Stage, WorkflowError, WorkflowSession};
use crate::client::{
    Assignment, ExtractionService, Narrative, ServiceError, Stage1Output, Stage2Output,
    Stage3Output, Stage4Output,
};
use crate::document::{AdmissionError, AdmissionPolicy, DocumentFile};
use crate::error::sanitize_error_message;
use crate::events::{EventSink, NoOpEvents, PipelineEvent};
use crate::stage_span;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Inputs of one stage, captured before the call is made
enum StageInput {
    Extract {
        cv: DocumentFile,
        tender: DocumentFile,
    },
    Select {
        cv_assignments: Vec<Assignment>,
        tender_assignments: Vec<Assignment>,
    },
    WriteUp {
        selected_assignments: Vec<Assignment>,
        cv_text: String,
    },
    Assemble {
        write_up: Narrative,
        cv_text: String,
        tender_assignments: Vec<Assignment>,
    },
}

enum StageOutput {
    Extract(Stage1Output),
    Select(Stage2Output),
    WriteUp(Stage3Output),
    Assemble(Stage4Output),
}

/// Clears `is_processing` when the call finishes or its future is dropped
struct ProcessingGuard<'a> {
    state: &'a mut ProcessingState,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.state.is_processing = false;
    }
}

/// Drives the four dependent stages, one network call per execution
///
/// Execution takes `&mut self`, so two stages can never be in flight at once.
pub struct SequentialWorkflowEngine {
    service: Arc<dyn ExtractionService>,
    events: Arc<dyn EventSink>,
    admission: AdmissionPolicy,
    redo_policy: RedoPolicy,
    cv: Option<DocumentFile>,
    tender: Option<DocumentFile>,
    session: WorkflowSession,
    state: ProcessingState,
}

impl SequentialWorkflowEngine {
    pub fn new(service: Arc<dyn ExtractionService>) -> Self {
        Self {
            service,
            events: Arc::new(NoOpEvents),
            admission: AdmissionPolicy::default(),
            redo_policy: RedoPolicy::default(),
            cv: None,
            tender: None,
            session: WorkflowSession::default(),
            state: ProcessingState::default(),
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

    pub fn with_redo_policy(mut self, redo_policy: RedoPolicy) -> Self {
        self.redo_policy = redo_policy;
        self
    }

    pub fn session(&self) -> &WorkflowSession {
        &self.session
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    pub fn cv(&self) -> Option<&DocumentFile> {
        self.cv.as_ref()
    }

    pub fn tender(&self) -> Option<&DocumentFile> {
        self.tender.as_ref()
    }

    pub fn redo_policy(&self) -> RedoPolicy {
        self.redo_policy
    }

    /// Set the CV input, subject to the admission policy
    pub async fn set_cv(&mut self, file: DocumentFile) -> Result<(), AdmissionError> {
        let file = self.admit(file).await?;
        self.cv = Some(file);
        Ok(())
    }

    /// Set the tender input, subject to the admission policy
    pub async fn set_tender(&mut self, file: DocumentFile) -> Result<(), AdmissionError> {
        let file = self.admit(file).await?;
        self.tender = Some(file);
        Ok(())
    }

    async fn admit(&self, file: DocumentFile) -> Result<DocumentFile, AdmissionError> {
        if let Err(e) = self.admission.check(&file) {
            self.events
                .emit(PipelineEvent::FileRejected {
                    name: file.name.clone(),
                    reason: e.to_string(),
                })
                .await;
            return Err(e);
        }
        Ok(file)
    }

    /// Whether `stage` would pass its precondition right now
    pub fn can_execute(&self, stage: Stage) -> bool {
        !self.state.is_processing && self.prepare(stage).is_ok()
    }

    /// Check the precondition of `stage` and capture its inputs
    fn prepare(&self, stage: Stage) -> Result<StageInput, WorkflowError> {
        let gate = |required: Stage| WorkflowError::PreconditionFailed { stage, required };

        match stage {
            Stage::ExtractAssignments => match (&self.cv, &self.tender) {
                (Some(cv), Some(tender)) => Ok(StageInput::Extract {
                    cv: cv.clone(),
                    tender: tender.clone(),
                }),
                _ => Err(WorkflowError::MissingDocuments),
            },
            Stage::SelectAndRank => match &self.session.stage1 {
                Some(step1) if self.state.is_completed(Stage::ExtractAssignments) => {
                    Ok(StageInput::Select {
                        cv_assignments: step1.cv_assignments.clone(),
                        tender_assignments: step1.tender_assignments.clone(),
                    })
                }
                _ => Err(gate(Stage::ExtractAssignments)),
            },
            Stage::GenerateWriteUp => match (&self.session.stage1, &self.session.stage2) {
                (Some(step1), Some(step2)) if self.state.is_completed(Stage::SelectAndRank) => {
                    Ok(StageInput::WriteUp {
                        selected_assignments: step2.selected_assignments.clone(),
                        cv_text: step1.cv_text.clone(),
                    })
                }
                _ => Err(gate(Stage::SelectAndRank)),
            },
            Stage::AssembleProfile => match (&self.session.stage1, &self.session.stage3) {
                (Some(step1), Some(step3)) if self.state.is_completed(Stage::GenerateWriteUp) => {
                    Ok(StageInput::Assemble {
                        write_up: step3.write_up.clone(),
                        cv_text: step1.cv_text.clone(),
                        tender_assignments: step1.tender_assignments.clone(),
                    })
                }
                _ => Err(gate(Stage::GenerateWriteUp)),
            },
        }
    }

    /// Execute one stage
    ///
    /// A failed precondition returns immediately without a network call and leaves
    /// the state untouched. A failed call records a sanitized `last_error` and leaves
    /// every completion flag as it was.
    pub async fn execute(&mut self, stage: Stage) -> Result<(), WorkflowError> {
        let input = match self.prepare(stage) {
            Ok(input) => input,
            Err(e) => {
                debug!(stage = stage.number(), "Stage precondition not met: {}", e);
                self.events
                    .emit(PipelineEvent::StageRejected {
                        stage,
                        reason: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
        };

        self.events.emit(PipelineEvent::StageStarted { stage }).await;
        info!(stage = stage.number(), "Executing {}", stage);

        self.state.current_stage = Some(stage);
        self.state.last_error = None;
        self.state.is_processing = true;

        let outcome = {
            let _guard = ProcessingGuard {
                state: &mut self.state,
            };
            dispatch(self.service.as_ref(), &input)
                .instrument(stage_span!(stage = stage.number()))
                .await
        };

        match outcome {
            Ok(output) => {
                self.store(stage, output);
                info!(stage = stage.number(), "Stage completed");
                self.events
                    .emit(PipelineEvent::StageCompleted { stage })
                    .await;
                Ok(())
            }
            Err(source) => {
                let diagnostic = sanitize_error_message(&source.to_string());
                warn!(stage = stage.number(), "Stage failed: {}", diagnostic);
                self.state.last_error = Some(diagnostic.clone());
                self.events
                    .emit(PipelineEvent::StageFailed {
                        stage,
                        error: diagnostic,
                    })
                    .await;
                Err(WorkflowError::Service { stage, source })
            }
        }
    }

    /// Execute every stage in order, stopping at the first failure
    pub async fn run_all(&mut self) -> Result<(), WorkflowError> {
        for stage in Stage::ALL {
            self.execute(stage).await?;
        }
        Ok(())
    }

    /// Clear inputs, outputs, flags and errors
    pub async fn reset(&mut self) {
        self.cv = None;
        self.tender = None;
        self.session = WorkflowSession::default();
        self.state = ProcessingState::default();
        debug!("Workflow reset");
        self.events.emit(PipelineEvent::WorkflowReset).await;
    }

    fn store(&mut self, stage: Stage, output: StageOutput) {
        match output {
            StageOutput::Extract(output) => self.session.stage1 = Some(output),
            StageOutput::Select(output) => self.session.stage2 = Some(output),
            StageOutput::WriteUp(output) => self.session.stage3 = Some(output),
            StageOutput::Assemble(output) => self.session.stage4 = Some(output),
        }
        self.state.completed[stage.index()] = true;

        if self.redo_policy == RedoPolicy::InvalidateDownstream {
            for later in Stage::ALL.iter().copied().filter(|s| *s > stage) {
                if self.state.is_completed(later) || self.session.has_output(later) {
                    debug!(stage = later.number(), "Invalidating downstream stage");
                }
                self.session.clear(later);
                self.state.completed[later.index()] = false;
            }
        }
    }
}

async fn dispatch(
    service: &dyn ExtractionService,
    input: &StageInput,
) -> Result<StageOutput, ServiceError> {
    match input {
        StageInput::Extract { cv, tender } => service
            .workflow_step1(cv, tender)
            .await
            .map(StageOutput::Extract),
        StageInput::Select {
            cv_assignments,
            tender_assignments,
        } => service
            .workflow_step2(cv_assignments, tender_assignments)
            .await
            .map(StageOutput::Select),
        StageInput::WriteUp {
            selected_assignments,
            cv_text,
        } => service
            .workflow_step3(selected_assignments, cv_text)
            .await
            .map(StageOutput::WriteUp),
        StageInput::Assemble {
            write_up,
            cv_text,
            tender_assignments,
        } => service
            .workflow_step4(write_up, cv_text, tender_assignments)
            .await
            .map(StageOutput::Assemble),
    }
}
