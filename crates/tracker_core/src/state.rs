use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::view_model::StatusView;
use crate::{
    classify_failure, step_board, CompletionDetails, FailureReport, JobId, PipelineStep,
    ProgressUpdate, PushHealth, Stage, StatusSnapshot, SubProgress,
};

pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_secs(30);

/// Shown when the server declares failure without a message.
pub const FALLBACK_FAILURE_MESSAGE: &str = "An error occurred during the extraction process.";

/// Why the last snapshot did not change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    ForeignJob,
    Terminal,
    SuppressedByPush,
    SyntheticAfterProgress,
    Duplicate,
    OutOfOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    /// The snapshot's stage became the current stage.
    Adopted,
    /// Only counters or progress moved; the stage did not change.
    Refined,
}

/// Canonical client-side view of one tracked job.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerState {
    job_id: JobId,
    stage: Option<Stage>,
    overall_progress: f64,
    sub_progress: SubProgress,
    message: Option<String>,
    failed_stage: Option<PipelineStep>,
    last_observed_at: Option<DateTime<Utc>>,
    last_heard: Instant,
    staleness_threshold: Duration,
    stale_warned: bool,
    push_health: PushHealth,
    last_discard: Option<DiscardReason>,
}

impl ReconcilerState {
    /// Starts tracking `job_id`; the staleness clock runs from `started_at`.
    pub fn new(job_id: impl Into<JobId>, started_at: Instant) -> Self {
        Self {
            job_id: job_id.into(),
            stage: None,
            overall_progress: 0.0,
            sub_progress: SubProgress::default(),
            message: None,
            failed_stage: None,
            last_observed_at: None,
            last_heard: started_at,
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            stale_warned: false,
            push_health: PushHealth::Unknown,
            last_discard: None,
        }
    }

    pub fn with_staleness_threshold(mut self, threshold: Duration) -> Self {
        self.staleness_threshold = threshold;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// `None` until the first snapshot is accepted.
    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_some_and(Stage::is_terminal)
    }

    pub fn overall_progress(&self) -> f64 {
        self.overall_progress
    }

    pub fn sub_progress(&self) -> SubProgress {
        self.sub_progress
    }

    pub fn push_health(&self) -> PushHealth {
        self.push_health
    }

    pub fn last_heard(&self) -> Instant {
        self.last_heard
    }

    pub fn last_discard(&self) -> Option<DiscardReason> {
        self.last_discard
    }

    pub fn is_stale(&self) -> bool {
        self.stale_warned
    }

    pub fn view(&self) -> StatusView {
        let steps = match (self.stage, self.failed_stage) {
            (Some(Stage::Failed), Some(step)) => classify_failure(step),
            (Some(stage), _) => step_board(stage),
            (None, _) => step_board(Stage::Pending),
        };
        StatusView {
            job_id: self.job_id.clone(),
            stage: self.stage,
            overall_progress: self.overall_progress,
            sub_progress: self.sub_progress,
            status_line: self.status_line(),
            steps,
            push_health: self.push_health,
            terminal: self.is_terminal(),
        }
    }

    fn status_line(&self) -> String {
        let stage = self.stage.unwrap_or(Stage::Pending);
        match (stage, self.message.as_deref()) {
            (Stage::Failed, _) => format!("{} {}", stage.status_line(), self.failure_message()),
            (_, Some(message)) => message.to_string(),
            (_, None) => stage.status_line().to_string(),
        }
    }

    fn failure_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| FALLBACK_FAILURE_MESSAGE.to_string())
    }

    pub(crate) fn set_push_health(&mut self, health: PushHealth) {
        self.push_health = health;
    }

    pub(crate) fn record_discard(&mut self, reason: DiscardReason) {
        self.last_discard = Some(reason);
    }

    pub(crate) fn clear_discard(&mut self) {
        self.last_discard = None;
    }

    /// Resets the staleness clock.
    pub(crate) fn heard(&mut self, at: Instant) {
        self.last_heard = at;
        self.stale_warned = false;
    }

    /// Returns the silent period once per stale stretch.
    pub(crate) fn check_staleness(&mut self, now: Instant) -> Option<Duration> {
        if self.is_terminal() || self.stale_warned {
            return None;
        }
        let silent_for = now.saturating_duration_since(self.last_heard);
        if silent_for > self.staleness_threshold {
            self.stale_warned = true;
            Some(silent_for)
        } else {
            None
        }
    }

    pub(crate) fn apply_snapshot(
        &mut self,
        snapshot: StatusSnapshot,
    ) -> Result<Applied, DiscardReason> {
        let older = self
            .last_observed_at
            .is_some_and(|last| snapshot.observed_at < last);
        let progress = snapshot.clamped_progress();

        match self.stage {
            Some(current) if snapshot.stage.rank() < current.rank() => {
                if self.sub_progress.fill_missing_from(&snapshot.sub_progress) {
                    Ok(Applied::Refined)
                } else {
                    Err(DiscardReason::OutOfOrder)
                }
            }
            Some(current) if snapshot.stage == current => {
                if older {
                    if self.sub_progress.fill_missing_from(&snapshot.sub_progress) {
                        return Ok(Applied::Refined);
                    }
                    return Err(DiscardReason::OutOfOrder);
                }
                self.observed(snapshot.observed_at);
                let counters = self.sub_progress.merge_from(&snapshot.sub_progress);
                let raised = self.raise_progress(progress);
                if !counters && !raised {
                    return Err(DiscardReason::Duplicate);
                }
                if snapshot.message.is_some() {
                    self.message = snapshot.message;
                }
                Ok(Applied::Refined)
            }
            _ => {
                self.stage = Some(snapshot.stage);
                self.sub_progress.merge_from(&snapshot.sub_progress);
                self.raise_progress(progress);
                self.message = snapshot.message;
                self.failed_stage = if snapshot.stage == Stage::Failed {
                    snapshot.failed_stage
                } else {
                    None
                };
                self.observed(snapshot.observed_at);
                Ok(Applied::Adopted)
            }
        }
    }

    fn raise_progress(&mut self, progress: Option<f64>) -> bool {
        match progress {
            Some(value) if value > self.overall_progress => {
                self.overall_progress = value;
                true
            }
            _ => false,
        }
    }

    fn observed(&mut self, at: DateTime<Utc>) {
        if self.last_observed_at.map_or(true, |last| at > last) {
            self.last_observed_at = Some(at);
        }
    }

    pub(crate) fn progress_update(&self) -> ProgressUpdate {
        ProgressUpdate {
            stage: self.stage.unwrap_or(Stage::Pending),
            overall_progress: self.overall_progress,
            sub_progress: self.sub_progress,
            message: self.message.clone(),
        }
    }

    pub(crate) fn completion_details(&self) -> CompletionDetails {
        CompletionDetails {
            questions_extracted: self.sub_progress.questions_extracted,
            overall_progress: self.overall_progress,
            sub_progress: self.sub_progress,
            message: self.message.clone(),
        }
    }

    pub(crate) fn failure_report(&self) -> FailureReport {
        FailureReport {
            failed_stage: self.failed_stage,
            steps: match self.failed_stage {
                Some(step) => classify_failure(step),
                None => step_board(Stage::Failed),
            },
            message: self.failure_message(),
        }
    }
}
