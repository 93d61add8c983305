use std::time::Duration;

use crate::{PipelineStep, Stage, StepBoard, SubProgress};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Shut down every transport and pending timer.
    StopTransports,
    Notify(Notification),
}

/// Events delivered to the presenter sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Progress(ProgressUpdate),
    Completed(CompletionDetails),
    Failed(FailureReport),
    /// No update has arrived for `silent_for`; not a state change.
    StalenessWarning { silent_for: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub stage: Stage,
    pub overall_progress: f64,
    pub sub_progress: SubProgress,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionDetails {
    pub questions_extracted: Option<u32>,
    pub overall_progress: f64,
    pub sub_progress: SubProgress,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub failed_stage: Option<PipelineStep>,
    pub steps: StepBoard,
    pub message: String,
}
