use chrono::{DateTime, Utc};

use crate::{JobId, PipelineStep, Stage};

/// Stage-specific counters. Every field is independently optional; a missing
/// field means "unknown in this observation", never "reset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubProgress {
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub questions_extracted: Option<u32>,
}

impl SubProgress {
    pub fn is_empty(&self) -> bool {
        self.current_page.is_none()
            && self.total_pages.is_none()
            && self.questions_extracted.is_none()
    }

    /// Overwrites fields that are present in `other`. Returns true if any value changed.
    pub fn merge_from(&mut self, other: &SubProgress) -> bool {
        let mut changed = false;
        changed |= overwrite(&mut self.current_page, other.current_page);
        changed |= overwrite(&mut self.total_pages, other.total_pages);
        changed |= overwrite(&mut self.questions_extracted, other.questions_extracted);
        changed
    }

    /// Fills only fields that are still unknown. Returns true if any value changed.
    pub fn fill_missing_from(&mut self, other: &SubProgress) -> bool {
        let mut changed = false;
        changed |= fill(&mut self.current_page, other.current_page);
        changed |= fill(&mut self.total_pages, other.total_pages);
        changed |= fill(&mut self.questions_extracted, other.questions_extracted);
        changed
    }

    /// Page analysis percentage, if any page counter is known.
    pub fn page_percent(&self) -> Option<u8> {
        if self.current_page.is_none() && self.total_pages.is_none() {
            return None;
        }
        let current = f64::from(self.current_page.unwrap_or(0));
        let total = f64::from(self.total_pages.unwrap_or(1).max(1));
        Some((current / total * 100.0).round().clamp(0.0, 100.0) as u8)
    }
}

fn overwrite(slot: &mut Option<u32>, incoming: Option<u32>) -> bool {
    match incoming {
        Some(value) if *slot != Some(value) => {
            *slot = Some(value);
            true
        }
        _ => false,
    }
}

fn fill(slot: &mut Option<u32>, incoming: Option<u32>) -> bool {
    if slot.is_none() && incoming.is_some() {
        *slot = incoming;
        true
    } else {
        false
    }
}

/// One observation of job status, as produced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub job_id: JobId,
    pub stage: Stage,
    pub overall_progress: Option<f64>,
    pub sub_progress: SubProgress,
    pub message: Option<String>,
    /// Only meaningful when `stage` is `Failed`.
    pub failed_stage: Option<PipelineStep>,
    pub observed_at: DateTime<Utc>,
    /// Set on the Failed snapshot a poller fabricates after giving up.
    pub synthetic: bool,
}

impl StatusSnapshot {
    pub fn new(job_id: impl Into<JobId>, stage: Stage, observed_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            stage,
            overall_progress: None,
            sub_progress: SubProgress::default(),
            message: None,
            failed_stage: None,
            observed_at,
            synthetic: false,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.overall_progress = Some(progress);
        self
    }

    pub fn with_pages(mut self, current: Option<u32>, total: Option<u32>) -> Self {
        self.sub_progress.current_page = current;
        self.sub_progress.total_pages = total;
        self
    }

    pub fn with_questions(mut self, extracted: u32) -> Self {
        self.sub_progress.questions_extracted = Some(extracted);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_failed_stage(mut self, step: PipelineStep) -> Self {
        self.failed_stage = Some(step);
        self
    }

    /// Failed snapshot a poller emits when it never got a status back.
    pub fn synthetic_failure(
        job_id: impl Into<JobId>,
        message: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let mut snapshot = Self::new(job_id, Stage::Failed, observed_at).with_message(message);
        snapshot.synthetic = true;
        snapshot
    }

    /// Progress clamped into the displayable 0..=100 range.
    pub fn clamped_progress(&self) -> Option<f64> {
        self.overall_progress
            .filter(|value| !value.is_nan())
            .map(|value| value.clamp(0.0, 100.0))
    }
}
