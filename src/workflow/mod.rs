//! Four-stage expert profiling workflow
//!
//! Each stage consumes the output of the stage before it:
//!
//! 1. Extract assignments from a CV and a tender document
//! 2. Select and rank the CV assignments relevant to the tender
//! 3. Generate a write-up from the selection
//! 4. Assemble the final expert profile
//!
//! The engine in [`engine`] gates each stage on its predecessor and keeps the
//! per-stage outputs in a [`WorkflowSession`].

pub mod engine;

pub use engine::SequentialWorkflowEngine;

use crate::client::{ServiceError, Stage1Output, Stage2Output, Stage3Output, Stage4Output};
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExtractAssignments,
    SelectAndRank,
    GenerateWriteUp,
    AssembleProfile,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::ExtractAssignments,
        Stage::SelectAndRank,
        Stage::GenerateWriteUp,
        Stage::AssembleProfile,
    ];

    /// 1-based stage number
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn index(self) -> usize {
        match self {
            Stage::ExtractAssignments => 0,
            Stage::SelectAndRank => 1,
            Stage::GenerateWriteUp => 2,
            Stage::AssembleProfile => 3,
        }
    }

    pub fn from_number(number: u8) -> Option<Stage> {
        Stage::ALL.get(usize::from(number).checked_sub(1)?).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::ExtractAssignments => "Extract Assignments",
            Stage::SelectAndRank => "Select & Rank",
            Stage::GenerateWriteUp => "Generate Write-up",
            Stage::AssembleProfile => "Assemble Profile",
        }
    }

    /// File-name friendly identifier
    pub fn slug(self) -> &'static str {
        match self {
            Stage::ExtractAssignments => "assignments",
            Stage::SelectAndRank => "selection",
            Stage::GenerateWriteUp => "write_up",
            Stage::AssembleProfile => "expert_profile",
        }
    }

    pub fn previous(self) -> Option<Stage> {
        Stage::ALL.get(self.index().checked_sub(1)?).copied()
    }

    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}: {}", self.number(), self.label())
    }
}

/// What a successful re-execution of a stage does to later stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedoPolicy {
    /// Clear outputs and completion flags of every later stage
    #[default]
    InvalidateDownstream,
    /// Leave later stages untouched, even though they were built from older inputs
    KeepDownstream,
}

/// Outputs accumulated by the workflow, one slot per stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSession {
    pub stage1: Option<Stage1Output>,
    pub stage2: Option<Stage2Output>,
    pub stage3: Option<Stage3Output>,
    pub stage4: Option<Stage4Output>,
}

impl WorkflowSession {
    pub fn has_output(&self, stage: Stage) -> bool {
        match stage {
            Stage::ExtractAssignments => self.stage1.is_some(),
            Stage::SelectAndRank => self.stage2.is_some(),
            Stage::GenerateWriteUp => self.stage3.is_some(),
            Stage::AssembleProfile => self.stage4.is_some(),
        }
    }

    /// Output of `stage` as JSON, for export
    pub fn output_json(&self, stage: Stage) -> Option<serde_json::Value> {
        let value = match stage {
            Stage::ExtractAssignments => self.stage1.as_ref().map(serde_json::to_value),
            Stage::SelectAndRank => self.stage2.as_ref().map(serde_json::to_value),
            Stage::GenerateWriteUp => self.stage3.as_ref().map(serde_json::to_value),
            Stage::AssembleProfile => self.stage4.as_ref().map(serde_json::to_value),
        };
        value.and_then(Result::ok)
    }

    pub(crate) fn clear(&mut self, stage: Stage) {
        match stage {
            Stage::ExtractAssignments => self.stage1 = None,
            Stage::SelectAndRank => self.stage2 = None,
            Stage::GenerateWriteUp => self.stage3 = None,
            Stage::AssembleProfile => self.stage4 = None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingState {
    /// Stage most recently started
    pub current_stage: Option<Stage>,
    pub is_processing: bool,
    pub last_error: Option<String>,
    pub completed: [bool; 4],
}

impl ProcessingState {
    pub fn is_completed(&self, stage: Stage) -> bool {
        self.completed[stage.index()]
    }

    pub fn all_completed(&self) -> bool {
        self.completed.iter().all(|done| *done)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Please upload both CV and tender files")]
    MissingDocuments,

    #[error("Please complete step {} first", .required.number())]
    PreconditionFailed { stage: Stage, required: Stage },

    #[error("{source}")]
    Service {
        stage: Stage,
        #[source]
        source: ServiceError,
    },
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::MissingDocuments | WorkflowError::PreconditionFailed { .. } => {
                ErrorKind::Precondition
            }
            WorkflowError::Service { source, .. } => source.kind(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            WorkflowError::MissingDocuments => Stage::ExtractAssignments,
            WorkflowError::PreconditionFailed { stage, .. } | WorkflowError::Service { stage, .. } => {
                *stage
            }
        }
    }
}
