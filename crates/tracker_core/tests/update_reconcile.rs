use std::sync::Once;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use tracker_core::{
    update, Channel, DiscardReason, Effect, Msg, Notification, PipelineStep, PushHealth,
    ReconcilerState, Stage, StatusSnapshot, StepState, FALLBACK_FAILURE_MESSAGE,
};

const JOB: &str = "17";

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(tracker_logging::initialize_for_tests);
}

fn at_second(second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap()
}

fn snap(stage: Stage, second: u32) -> StatusSnapshot {
    StatusSnapshot::new(JOB, stage, at_second(second))
}

fn deliver(
    state: ReconcilerState,
    channel: Channel,
    snapshot: StatusSnapshot,
) -> (ReconcilerState, Vec<Effect>) {
    update(
        state,
        Msg::SnapshotReceived {
            channel,
            snapshot,
            at: Instant::now(),
        },
    )
}

fn push(state: ReconcilerState, snapshot: StatusSnapshot) -> (ReconcilerState, Vec<Effect>) {
    deliver(state, Channel::Push, snapshot)
}

fn progress_stages(effects: &[Effect]) -> Vec<Stage> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Notify(Notification::Progress(update)) => Some(update.stage),
            _ => None,
        })
        .collect()
}

#[test]
fn full_pipeline_emits_five_progress_then_completion() {
    init_logging();
    let mut state = ReconcilerState::new(JOB, Instant::now());
    let mut all = Vec::new();
    for snapshot in [
        snap(Stage::Pending, 0).with_progress(0.0),
        snap(Stage::Processing, 1).with_progress(10.0),
        snap(Stage::Extracting, 2)
            .with_progress(40.0)
            .with_questions(5),
        snap(Stage::Saving, 3).with_progress(90.0),
        snap(Stage::Completed, 4).with_progress(100.0),
    ] {
        let (next, effects) = push(state, snapshot);
        state = next;
        all.extend(effects);
    }

    let notifications: Vec<_> = all
        .iter()
        .filter_map(|effect| match effect {
            Effect::Notify(notification) => Some(notification.clone()),
            Effect::StopTransports => None,
        })
        .collect();
    assert_eq!(notifications.len(), 6);
    assert!(notifications[..5]
        .iter()
        .all(|n| matches!(n, Notification::Progress(_))));
    match &notifications[5] {
        Notification::Completed(details) => {
            assert_eq!(details.questions_extracted, Some(5));
            assert_eq!(details.overall_progress, 100.0);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(
        progress_stages(&all),
        vec![
            Stage::Pending,
            Stage::Processing,
            Stage::Extracting,
            Stage::Saving,
            Stage::Completed,
        ]
    );
    assert_eq!(state.stage(), Some(Stage::Completed));
    assert!(state.is_terminal());
}

#[test]
fn terminal_adoption_stops_transports_before_notifying() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    let (state, _) = push(state, snap(Stage::Processing, 0));
    let (_state, effects) = push(state, snap(Stage::Completed, 1));

    assert_eq!(effects.first(), Some(&Effect::StopTransports));
    assert_eq!(effects.len(), 3);
}

#[test]
fn final_stage_matches_last_snapshot_for_forward_sequences() {
    init_logging();
    let sequences: [&[Stage]; 4] = [
        &[Stage::Pending, Stage::Pending, Stage::Processing],
        &[Stage::Processing, Stage::Saving],
        &[Stage::Extracting, Stage::Extracting, Stage::Saving, Stage::Saving],
        &[Stage::Pending, Stage::Failed],
    ];
    for sequence in sequences {
        let mut state = ReconcilerState::new(JOB, Instant::now());
        for (second, stage) in sequence.iter().enumerate() {
            let (next, _) = push(state, snap(*stage, second as u32));
            state = next;
        }
        assert_eq!(state.stage(), sequence.last().copied());
    }
}

#[test]
fn stage_never_moves_backward() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    let (state, _) = push(state, snap(Stage::Extracting, 5).with_questions(3));
    let (state, effects) = deliver(state, Channel::Poll, snap(Stage::Processing, 6));

    assert!(effects.is_empty());
    assert_eq!(state.stage(), Some(Stage::Extracting));
    assert_eq!(state.last_discard(), Some(DiscardReason::OutOfOrder));
}

#[test]
fn earlier_stage_may_only_fill_unknown_counters() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    let (state, _) = push(
        state,
        snap(Stage::Extracting, 5)
            .with_pages(Some(10), None)
            .with_questions(3),
    );
    let (state, effects) = push(
        state,
        snap(Stage::Processing, 2).with_pages(Some(4), Some(10)),
    );

    assert_eq!(progress_stages(&effects), vec![Stage::Extracting]);
    assert_eq!(state.stage(), Some(Stage::Extracting));
    let counters = state.sub_progress();
    assert_eq!(counters.current_page, Some(10));
    assert_eq!(counters.total_pages, Some(10));
    assert_eq!(counters.questions_extracted, Some(3));
}

#[test]
fn duplicate_snapshot_notifies_once_but_refreshes_clock() {
    init_logging();
    let start = Instant::now();
    let state = ReconcilerState::new(JOB, start);
    let snapshot = snap(Stage::Processing, 1)
        .with_progress(10.0)
        .with_pages(Some(2), Some(8));

    let (state, first) = push(state, snapshot.clone());
    assert_eq!(first.len(), 1);

    let later = start + Duration::from_secs(20);
    let (state, second) = update(
        state,
        Msg::SnapshotReceived {
            channel: Channel::Push,
            snapshot,
            at: later,
        },
    );
    assert!(second.is_empty());
    assert_eq!(state.last_discard(), Some(DiscardReason::Duplicate));
    assert_eq!(state.last_heard(), later);
}

#[test]
fn partial_payloads_keep_last_known_values() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    let (state, _) = push(
        state,
        snap(Stage::Processing, 1).with_pages(Some(3), Some(12)),
    );
    let (state, effects) = push(state, snap(Stage::Extracting, 2).with_questions(7));

    let Some(Effect::Notify(Notification::Progress(progress))) = effects.first() else {
        panic!("expected progress notification");
    };
    assert_eq!(progress.sub_progress.current_page, Some(3));
    assert_eq!(progress.sub_progress.total_pages, Some(12));
    assert_eq!(progress.sub_progress.questions_extracted, Some(7));
    assert_eq!(state.sub_progress(), progress.sub_progress);
}

#[test]
fn overall_progress_never_regresses() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    let (state, _) = push(state, snap(Stage::Processing, 1).with_progress(35.0));
    let (state, effects) = push(state, snap(Stage::Extracting, 2).with_progress(20.0));

    let Some(Effect::Notify(Notification::Progress(progress))) = effects.first() else {
        panic!("expected progress notification");
    };
    assert_eq!(progress.overall_progress, 35.0);
    assert_eq!(state.overall_progress(), 35.0);

    let (state, effects) = push(state, snap(Stage::Extracting, 3).with_progress(55.0));
    assert_eq!(effects.len(), 1);
    assert_eq!(state.overall_progress(), 55.0);
}

#[test]
fn older_observation_of_same_stage_is_dropped() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    let (state, _) = push(
        state,
        snap(Stage::Processing, 30)
            .with_progress(20.0)
            .with_pages(Some(6), Some(10)),
    );
    let (state, effects) = deliver(
        state,
        Channel::Poll,
        snap(Stage::Processing, 10)
            .with_progress(25.0)
            .with_pages(Some(4), Some(10)),
    );

    assert!(effects.is_empty());
    assert_eq!(state.last_discard(), Some(DiscardReason::OutOfOrder));
    assert_eq!(state.sub_progress().current_page, Some(6));
    assert_eq!(state.overall_progress(), 20.0);
}

#[test]
fn duplicate_still_advances_last_observation() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    let counters = |second| snap(Stage::Processing, second).with_pages(Some(5), Some(10));
    let (state, _) = push(state, counters(0));
    let (state, effects) = push(state, counters(20));
    assert!(effects.is_empty());
    assert_eq!(state.last_discard(), Some(DiscardReason::Duplicate));

    let (state, _) = update(state, Msg::PushHealthChanged(PushHealth::Disconnected));
    let (state, effects) = deliver(
        state,
        Channel::Poll,
        snap(Stage::Processing, 10).with_pages(Some(3), Some(10)),
    );

    assert!(effects.is_empty());
    assert_eq!(state.last_discard(), Some(DiscardReason::OutOfOrder));
    assert_eq!(state.sub_progress().current_page, Some(5));
}

#[test]
fn snapshots_for_other_jobs_are_ignored() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    let other = StatusSnapshot::new("99", Stage::Completed, at_second(1));
    let (state, effects) = push(state, other);

    assert!(effects.is_empty());
    assert_eq!(state.stage(), None);
    assert_eq!(state.last_discard(), Some(DiscardReason::ForeignJob));
}

#[test]
fn nothing_is_accepted_after_completion() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    let (state, _) = push(state, snap(Stage::Completed, 1));
    let (state, effects) = push(state, snap(Stage::Failed, 2).with_message("late"));

    assert!(effects.is_empty());
    assert_eq!(state.stage(), Some(Stage::Completed));
    assert_eq!(state.last_discard(), Some(DiscardReason::Terminal));
}

#[test]
fn extraction_failure_is_classified_in_pipeline_order() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    let (state, _) = push(state, snap(Stage::Extracting, 1));
    let (state, effects) = push(
        state,
        snap(Stage::Failed, 2)
            .with_failed_stage(PipelineStep::Extraction)
            .with_message("OCR engine crashed"),
    );

    let report = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::Notify(Notification::Failed(report)) => Some(report.clone()),
            _ => None,
        })
        .expect("failure notification");
    assert_eq!(report.failed_stage, Some(PipelineStep::Extraction));
    assert_eq!(report.message, "OCR engine crashed");
    assert_eq!(
        report.steps,
        [
            (PipelineStep::Upload, StepState::Completed),
            (PipelineStep::PageAnalysis, StepState::Completed),
            (PipelineStep::Extraction, StepState::Failed),
            (PipelineStep::Saving, StepState::Skipped),
        ]
    );
    assert_eq!(state.view().steps, report.steps);
}

#[test]
fn failure_without_message_uses_fallback() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    let (_state, effects) = push(state, snap(Stage::Failed, 1));

    let report = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::Notify(Notification::Failed(report)) => Some(report.clone()),
            _ => None,
        })
        .expect("failure notification");
    assert_eq!(report.failed_stage, None);
    assert_eq!(report.message, FALLBACK_FAILURE_MESSAGE);
}

#[test]
fn failed_is_reachable_from_any_non_terminal_stage() {
    init_logging();
    for stage in [
        Stage::Pending,
        Stage::Processing,
        Stage::Extracting,
        Stage::Saving,
    ] {
        let state = ReconcilerState::new(JOB, Instant::now());
        let (state, _) = push(state, snap(stage, 1));
        let (state, effects) = push(state, snap(Stage::Failed, 2));
        assert_eq!(state.stage(), Some(Stage::Failed));
        assert_eq!(effects.first(), Some(&Effect::StopTransports));
    }
}

#[test]
fn view_reflects_current_status_line() {
    init_logging();
    let state = ReconcilerState::new(JOB, Instant::now());
    assert_eq!(state.view().status_line, Stage::Pending.status_line());

    let (state, _) = push(state, snap(Stage::Saving, 1));
    assert_eq!(state.view().status_line, "Saving extracted questions...");

    let (state, _) = push(state, snap(Stage::Failed, 2).with_message("disk full"));
    let view = state.view();
    assert_eq!(view.status_line, "Extraction failed. disk full");
    assert!(view.terminal);
}
