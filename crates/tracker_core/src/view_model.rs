use std::time::Duration;

use crate::{JobId, PushHealth, Stage, StepBoard, SubProgress};

/// Read-only projection of the reconciler for presenters and logs.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub job_id: JobId,
    pub stage: Option<Stage>,
    pub overall_progress: f64,
    pub sub_progress: SubProgress,
    pub status_line: String,
    pub steps: StepBoard,
    pub push_health: PushHealth,
    pub terminal: bool,
}

/// Formats an elapsed duration as `mm:ss`; minutes keep counting past an hour.
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
