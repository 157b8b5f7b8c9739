//! Shared types passed between the workflow and its consumers.
//!
//! Progress events are the only channel from the state machine to a front
//! end. They serialize as `{"kind": "<snake_case>", ...}` so the web UI can
//! switch on `kind` directly.

use serde::{Deserialize, Serialize};

use crate::core::language::Language;

/// Why a workflow run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// The release manager emitted the termination sentinel.
    Approved,
    /// Cancellation was observed at an iteration boundary.
    Aborted,
    /// The iteration bound was reached without approval.
    Exhausted,
}

/// One step of progress reported by a running workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        message: String,
    },
    SpecReady {
        message: String,
        /// Technical spec section of the specification response.
        spec: String,
    },
    IterationStarted {
        iteration: u32,
        max_iterations: u32,
        message: String,
    },
    DevDone {
        iteration: u32,
        message: String,
    },
    Analysis {
        iteration: u32,
        persona: String,
        approved: bool,
        /// The verifier call itself failed; `message` carries the error text.
        invocation_failed: bool,
        message: String,
    },
    VerifiersDone {
        iteration: u32,
        approvals: usize,
        verifiers: usize,
        message: String,
    },
    Feedback {
        iteration: u32,
        message: String,
    },
    Finished {
        success: bool,
        reason: FinishReason,
        artifact: String,
        language: Language,
        message: Option<String>,
    },
}

impl ProgressEvent {
    /// Stable discriminator, identical to the serialized `kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Started { .. } => "started",
            ProgressEvent::SpecReady { .. } => "spec_ready",
            ProgressEvent::IterationStarted { .. } => "iteration_started",
            ProgressEvent::DevDone { .. } => "dev_done",
            ProgressEvent::Analysis { .. } => "analysis",
            ProgressEvent::VerifiersDone { .. } => "verifiers_done",
            ProgressEvent::Feedback { .. } => "feedback",
            ProgressEvent::Finished { .. } => "finished",
        }
    }

    pub fn iteration(&self) -> Option<u32> {
        match self {
            ProgressEvent::IterationStarted { iteration, .. }
            | ProgressEvent::DevDone { iteration, .. }
            | ProgressEvent::Analysis { iteration, .. }
            | ProgressEvent::VerifiersDone { iteration, .. }
            | ProgressEvent::Feedback { iteration, .. } => Some(*iteration),
            _ => None,
        }
    }
}

/// A single verifier's verdict on the current artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierReport {
    pub persona: String,
    pub approved: bool,
    pub report: String,
}

/// Everything observed during one develop/verify/decide cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub artifact: String,
    pub reports: Vec<VerifierReport>,
    pub decision: String,
}

impl IterationRecord {
    pub fn approvals(&self) -> usize {
        self.reports.iter().filter(|report| report.approved).count()
    }
}

/// Final result of a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub success: bool,
    pub reason: FinishReason,
    /// Last artifact produced by the developer, or the seed text if none.
    pub artifact: String,
    pub language: Language,
    pub iterations_run: u32,
    pub history: Vec<IterationRecord>,
}
