//! Tracker core: pure reconciliation state machine for document-processing status.
mod effect;
mod msg;
mod snapshot;
mod stage;
mod state;
mod update;
mod view_model;

/// Opaque identifier of the tracked job (the document id on the wire).
pub type JobId = String;

pub use effect::{CompletionDetails, Effect, FailureReport, Notification, ProgressUpdate};
pub use msg::{Channel, Msg, PushHealth};
pub use snapshot::{StatusSnapshot, SubProgress};
pub use stage::{classify_failure, step_board, PipelineStep, Stage, StepBoard, StepState};
pub use state::{
    DiscardReason, ReconcilerState, DEFAULT_STALENESS_THRESHOLD, FALLBACK_FAILURE_MESSAGE,
};
pub use update::update;
pub use view_model::{format_elapsed, StatusView};
