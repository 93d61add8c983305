use crate::state::Applied;
use crate::{
    Channel, DiscardReason, Effect, Msg, Notification, ReconcilerState, Stage, StatusSnapshot,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: ReconcilerState, msg: Msg) -> (ReconcilerState, Vec<Effect>) {
    state.clear_discard();
    let effects = match msg {
        Msg::SnapshotReceived {
            channel,
            snapshot,
            at,
        } => {
            if let Some(reason) = admission(&state, channel, &snapshot) {
                state.record_discard(reason);
                return (state, Vec::new());
            }
            // Anything admitted proves the server is alive, even a duplicate.
            state.heard(at);
            match state.apply_snapshot(snapshot) {
                Ok(Applied::Adopted) if state.is_terminal() => terminal_effects(&state),
                Ok(_) => vec![Effect::Notify(Notification::Progress(
                    state.progress_update(),
                ))],
                Err(reason) => {
                    state.record_discard(reason);
                    Vec::new()
                }
            }
        }
        Msg::PushHealthChanged(health) => {
            state.set_push_health(health);
            Vec::new()
        }
        Msg::StalenessCheck { now } => match state.check_staleness(now) {
            Some(silent_for) => vec![Effect::Notify(Notification::StalenessWarning {
                silent_for,
            })],
            None => Vec::new(),
        },
    };

    (state, effects)
}

/// Checks that run before a snapshot may touch state at all.
fn admission(
    state: &ReconcilerState,
    channel: Channel,
    snapshot: &StatusSnapshot,
) -> Option<DiscardReason> {
    if snapshot.job_id != state.job_id() {
        return Some(DiscardReason::ForeignJob);
    }
    if state.is_terminal() {
        return Some(DiscardReason::Terminal);
    }
    if channel == Channel::Poll && state.push_health().is_connected() {
        return Some(DiscardReason::SuppressedByPush);
    }
    if snapshot.synthetic && state.stage().is_some() {
        return Some(DiscardReason::SyntheticAfterProgress);
    }
    None
}

fn terminal_effects(state: &ReconcilerState) -> Vec<Effect> {
    let terminal = match state.stage() {
        Some(Stage::Failed) => Notification::Failed(state.failure_report()),
        _ => Notification::Completed(state.completion_details()),
    };
    vec![
        Effect::StopTransports,
        Effect::Notify(Notification::Progress(state.progress_update())),
        Effect::Notify(terminal),
    ]
}
