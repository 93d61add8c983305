use std::fmt;

/// Discrete phase of document processing as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Pending,
    Processing,
    Extracting,
    Saving,
    Completed,
    Failed,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Pending,
        Stage::Processing,
        Stage::Extracting,
        Stage::Saving,
        Stage::Completed,
        Stage::Failed,
    ];

    /// Position along the pipeline. `Failed` sits past every other stage so that
    /// it is reachable from anywhere.
    pub fn rank(self) -> u8 {
        match self {
            Stage::Pending => 0,
            Stage::Processing => 1,
            Stage::Extracting => 2,
            Stage::Saving => 3,
            Stage::Completed => 4,
            Stage::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Processing => "processing",
            Stage::Extracting => "extracting",
            Stage::Saving => "saving",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }

    /// Case-sensitive lookup of a wire status name.
    pub fn from_wire(name: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.wire_name() == name)
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Pending => "Pending",
            Stage::Processing => "Processing",
            Stage::Extracting => "Extracting",
            Stage::Saving => "Saving",
            Stage::Completed => "Completed",
            Stage::Failed => "Failed",
        }
    }

    /// Default status line shown when the server sends no message.
    pub fn status_line(self) -> &'static str {
        match self {
            Stage::Pending => "Preparing to process document...",
            Stage::Processing => "Analyzing document structure...",
            Stage::Extracting => "Extracting questions from document...",
            Stage::Saving => "Saving extracted questions...",
            Stage::Completed => "Extraction completed successfully!",
            Stage::Failed => "Extraction failed.",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The four user-visible steps of the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineStep {
    Upload,
    PageAnalysis,
    Extraction,
    Saving,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 4] = [
        PipelineStep::Upload,
        PipelineStep::PageAnalysis,
        PipelineStep::Extraction,
        PipelineStep::Saving,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            PipelineStep::Upload => "upload",
            PipelineStep::PageAnalysis => "page_analysis",
            PipelineStep::Extraction => "extraction",
            PipelineStep::Saving => "saving",
        }
    }

    pub fn from_wire(name: &str) -> Option<PipelineStep> {
        PipelineStep::ALL
            .into_iter()
            .find(|step| step.wire_name() == name)
    }

    pub fn label(self) -> &'static str {
        match self {
            PipelineStep::Upload => "Upload",
            PipelineStep::PageAnalysis => "Page analysis",
            PipelineStep::Extraction => "Extraction",
            PipelineStep::Saving => "Saving",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// State of every pipeline step, in pipeline order.
pub type StepBoard = [(PipelineStep, StepState); 4];

/// Step board for a non-failed stage.
///
/// `Failed` without a known failed step yields an all-pending board; use
/// [`classify_failure`] when the failed step is known.
pub fn step_board(stage: Stage) -> StepBoard {
    let active = match stage {
        Stage::Pending => Some(0),
        Stage::Processing => Some(1),
        Stage::Extracting => Some(2),
        Stage::Saving => Some(3),
        Stage::Completed => None,
        Stage::Failed => {
            return PipelineStep::ALL.map(|step| (step, StepState::Pending));
        }
    };

    let mut board = PipelineStep::ALL.map(|step| (step, StepState::Completed));
    if let Some(active) = active {
        for (index, entry) in board.iter_mut().enumerate() {
            entry.1 = match index.cmp(&active) {
                std::cmp::Ordering::Less => StepState::Completed,
                std::cmp::Ordering::Equal => StepState::InProgress,
                std::cmp::Ordering::Greater => StepState::Pending,
            };
        }
    }
    board
}

/// Classifies every step relative to the step that failed. Derived from
/// `failed` alone so repeated calls always agree.
pub fn classify_failure(failed: PipelineStep) -> StepBoard {
    PipelineStep::ALL.map(|step| {
        let state = match step.cmp(&failed) {
            std::cmp::Ordering::Less => StepState::Completed,
            std::cmp::Ordering::Equal => StepState::Failed,
            std::cmp::Ordering::Greater => StepState::Skipped,
        };
        (step, state)
    })
}
