//! Pipeline notifications
//!
//! Components report user-visible outcomes (a file finished parsing, a stage was
//! refused, an artifact was written) through an [`EventSink`]. Callers choose how to
//! surface them: forward over a channel, log them, or drop them.

use crate::workflow::Stage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    FileRejected {
        name: String,
        reason: String,
    },
    FileDispatched {
        id: Uuid,
        name: String,
    },
    FileCompleted {
        id: Uuid,
        name: String,
    },
    FileFailed {
        id: Uuid,
        name: String,
        error: String,
    },
    BatchFinished {
        completed: usize,
        failed: usize,
    },
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
    },
    StageFailed {
        stage: Stage,
        error: String,
    },
    StageRejected {
        stage: Stage,
        reason: String,
    },
    WorkflowReset,
    TenderMatched {
        id: Uuid,
        name: String,
        matches: usize,
        curated: usize,
    },
    TenderFailed {
        id: Uuid,
        name: String,
        error: String,
    },
    ArtifactExported {
        filename: String,
        bytes: usize,
    },
}

impl PipelineEvent {
    /// One-line user-facing message
    pub fn message(&self) -> String {
        match self {
            PipelineEvent::FileRejected { reason, .. } => reason.clone(),
            PipelineEvent::FileDispatched { name, .. } => format!("Processing {name}"),
            PipelineEvent::FileCompleted { name, .. } => format!("{name} processed successfully"),
            PipelineEvent::FileFailed { name, error, .. } => format!("{name} failed: {error}"),
            PipelineEvent::BatchFinished { completed, failed } => {
                let plural = if *completed == 1 { "" } else { "s" };
                format!("{completed} file{plural} processed, {failed} failed")
            }
            PipelineEvent::StageStarted { stage } => {
                format!("Step {}: {} started", stage.number(), stage.label())
            }
            PipelineEvent::StageCompleted { stage } => {
                format!("Step {} completed successfully!", stage.number())
            }
            PipelineEvent::StageFailed { stage, error } => {
                format!("Step {} failed: {error}", stage.number())
            }
            PipelineEvent::StageRejected { reason, .. } => reason.clone(),
            PipelineEvent::WorkflowReset => "Workflow reset".to_string(),
            PipelineEvent::TenderMatched { matches, .. } => {
                format!("Tender processed successfully! Found {matches} matching candidates.")
            }
            PipelineEvent::TenderFailed { .. } => "Tender processing failed.".to_string(),
            PipelineEvent::ArtifactExported { filename, .. } => {
                format!("{filename} downloaded successfully!")
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PipelineEvent::FileRejected { .. }
                | PipelineEvent::FileFailed { .. }
                | PipelineEvent::StageFailed { .. }
                | PipelineEvent::StageRejected { .. }
                | PipelineEvent::TenderFailed { .. }
        )
    }
}

/// A timestamped event as delivered to channel subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub event: PipelineEvent,
}

impl EventRecord {
    pub fn new(event: PipelineEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }

    pub fn message(&self) -> String {
        self.event.message()
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: PipelineEvent);
}

/// Discards every event
pub struct NoOpEvents;

#[async_trait]
impl EventSink for NoOpEvents {
    async fn emit(&self, _event: PipelineEvent) {}
}

/// Forwards events over an unbounded channel
#[derive(Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<EventRecord>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: PipelineEvent) {
        if self.sender.send(EventRecord::new(event)).is_err() {
            debug!("Event receiver dropped, discarding event");
        }
    }
}

/// Writes events to the log
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        let kind = serde_json::to_value(&event)
            .ok()
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
            .unwrap_or_default();

        if event.is_failure() {
            warn!(event = %kind, "{}", event.message());
        } else {
            info!(event = %kind, "{}", event.message());
        }
    }
}
