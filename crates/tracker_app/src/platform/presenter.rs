use std::io::Write;
use std::time::{Duration, Instant};

use chrono::Local;
use tracker_core::{
    format_elapsed, step_board, CompletionDetails, FailureReport, ProgressUpdate, Stage,
    StepBoard, StepState, SubProgress,
};
use tracker_engine::StatusPresenter;
use tracker_logging::tracker_warn;

/// Prints reconciled status as plain text lines.
pub struct TerminalPresenter<W: Write + Send> {
    out: W,
    started: Instant,
    last_stage: Option<Stage>,
    results_url: Option<String>,
}

impl<W: Write + Send> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            started: Instant::now(),
            last_stage: None,
            results_url: None,
        }
    }

    /// Where the extracted questions can be reviewed once the job completes.
    pub fn with_results_url(mut self, url: impl Into<String>) -> Self {
        self.results_url = Some(url.into());
        self
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        let stamp = format_elapsed(self.started.elapsed());
        if let Err(err) = writeln!(self.out, "[{stamp}] {text}") {
            tracker_warn!("Could not write status line: {}", err);
        }
    }

    fn board(&mut self, steps: &StepBoard) {
        for (step, state) in steps {
            let text = format!("    {:<14} {}", step.label(), step_state_label(*state));
            self.line(&text);
        }
    }
}

impl<W: Write + Send> StatusPresenter for TerminalPresenter<W> {
    fn on_progress(&mut self, update: &ProgressUpdate) {
        let status = update
            .message
            .clone()
            .unwrap_or_else(|| update.stage.status_line().to_string());
        let summary = format!(
            "{:<10} {:>3.0}%  {}{}",
            update.stage.label(),
            update.overall_progress,
            status,
            counters(&update.sub_progress)
        );
        self.line(&summary);

        if self.last_stage != Some(update.stage) {
            self.last_stage = Some(update.stage);
            if !update.stage.is_terminal() {
                self.board(&step_board(update.stage));
            }
        }
    }

    fn on_terminal_completed(&mut self, details: &CompletionDetails) {
        let questions = details
            .questions_extracted
            .map(|count| format!(" {count} questions extracted."))
            .unwrap_or_default();
        self.line(&format!("{}{}", Stage::Completed.status_line(), questions));
        if let Some(url) = self.results_url.clone() {
            self.line(&format!("View questions: {url}"));
        }
        self.line(&format!("Finished at {}", Local::now().format("%H:%M:%S")));
    }

    fn on_terminal_failed(&mut self, failure: &FailureReport) {
        self.line(&format!("{} {}", Stage::Failed.status_line(), failure.message));
        if failure.failed_stage.is_some() {
            self.board(&failure.steps);
        }
        self.line("Run the tracker again to start a fresh observation.");
    }

    fn on_staleness_warning(&mut self, silent_for: Duration) {
        self.line(&format!(
            "Updates delayed: nothing heard for {}s",
            silent_for.as_secs()
        ));
    }
}

fn step_state_label(state: StepState) -> &'static str {
    match state {
        StepState::Pending => "waiting",
        StepState::InProgress => "in progress",
        StepState::Completed => "done",
        StepState::Failed => "FAILED",
        StepState::Skipped => "skipped",
    }
}

fn counters(progress: &SubProgress) -> String {
    let mut parts = Vec::new();
    if let Some(percent) = progress.page_percent() {
        let current = progress.current_page.unwrap_or(0);
        match progress.total_pages {
            Some(total) if total > 0 => {
                parts.push(format!("pages {current}/{total} ({percent}%)"))
            }
            _ => parts.push(format!("pages {current}")),
        }
    }
    if let Some(questions) = progress.questions_extracted {
        parts.push(format!("questions {questions}"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("  [{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_core::{classify_failure, PipelineStep};

    fn printed(presenter: TerminalPresenter<Vec<u8>>) -> String {
        String::from_utf8(presenter.into_inner()).unwrap()
    }

    #[test]
    fn progress_line_shows_counters_and_board_once_per_stage() {
        let mut presenter = TerminalPresenter::new(Vec::new());
        let update = ProgressUpdate {
            stage: Stage::Processing,
            overall_progress: 20.0,
            sub_progress: SubProgress {
                current_page: Some(2),
                total_pages: Some(8),
                questions_extracted: None,
            },
            message: None,
        };
        presenter.on_progress(&update);
        presenter.on_progress(&update);

        let text = printed(presenter);
        assert!(text.contains("Analyzing document structure..."));
        assert!(text.contains("pages 2/8 (25%)"));
        assert_eq!(text.matches("Page analysis").count(), 1);
        assert!(text.contains("in progress"));
    }

    #[test]
    fn failure_prints_server_message_and_classification() {
        let mut presenter = TerminalPresenter::new(Vec::new());
        presenter.on_terminal_failed(&FailureReport {
            failed_stage: Some(PipelineStep::Saving),
            steps: classify_failure(PipelineStep::Saving),
            message: "database locked".to_string(),
        });

        let text = printed(presenter);
        assert!(text.contains("Extraction failed. database locked"));
        assert!(text.contains("FAILED"));
        assert!(text.contains("Run the tracker again"));
    }

    #[test]
    fn completion_reports_question_count_and_results_link() {
        let mut presenter = TerminalPresenter::new(Vec::new())
            .with_results_url("http://localhost:5000/questions/12");
        presenter.on_terminal_completed(&CompletionDetails {
            questions_extracted: Some(12),
            overall_progress: 100.0,
            sub_progress: SubProgress::default(),
            message: None,
        });

        let text = printed(presenter);
        assert!(text.contains("12 questions extracted."));
        assert!(text.contains("View questions: http://localhost:5000/questions/12"));
    }
}
