use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracker_core::{
    update, CompletionDetails, Effect, FailureReport, JobId, Msg, Notification, ProgressUpdate,
    ReconcilerState, StatusView, DEFAULT_STALENESS_THRESHOLD,
};
use tracker_logging::{tracker_debug, tracker_info, tracker_warn};

use crate::transport::{ChannelTransportSink, Transport, TransportSink};
use crate::TransportEvent;

/// Receiver of reconciled status. Implemented by whatever renders the job.
pub trait StatusPresenter: Send {
    fn on_progress(&mut self, update: &ProgressUpdate);
    fn on_terminal_completed(&mut self, details: &CompletionDetails);
    fn on_terminal_failed(&mut self, failure: &FailureReport);
    fn on_staleness_warning(&mut self, silent_for: Duration);
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub staleness_threshold: Duration,
    pub staleness_check_interval: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            staleness_check_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerOutcome {
    Completed {
        details: CompletionDetails,
        view: StatusView,
    },
    Failed {
        failure: FailureReport,
        view: StatusView,
    },
}

/// Observes one job until it reaches a terminal stage.
///
/// A tracker is consumed by [`Tracker::run`]; retrying means building a new one
/// and observing from scratch.
pub struct Tracker<P: StatusPresenter> {
    job_id: JobId,
    presenter: P,
    settings: TrackerSettings,
    transports: Vec<Box<dyn Transport>>,
}

impl<P: StatusPresenter> Tracker<P> {
    pub fn new(job_id: impl Into<JobId>, presenter: P, settings: TrackerSettings) -> Self {
        Self {
            job_id: job_id.into(),
            presenter,
            settings,
            transports: Vec::new(),
        }
    }

    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    pub async fn run(mut self) -> (TrackerOutcome, P) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn TransportSink> = Arc::new(ChannelTransportSink::new(tx));

        let started = Instant::now();
        let mut state = ReconcilerState::new(self.job_id.clone(), started.into_std())
            .with_staleness_threshold(self.settings.staleness_threshold);

        for transport in &mut self.transports {
            tracker_debug!(
                "Starting {:?} transport for job {}",
                transport.channel(),
                self.job_id
            );
            transport.start(self.job_id.clone(), sink.clone());
        }

        let mut staleness = tokio::time::interval_at(
            started + self.settings.staleness_check_interval,
            self.settings.staleness_check_interval,
        );
        staleness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            let msg = tokio::select! {
                // `sink` holds a sender for the whole run, so the channel stays open.
                Some(event) = rx.recv() => event_to_msg(event),
                _ = staleness.tick() => Msg::StalenessCheck { now: Instant::now().into_std() },
            };

            let (next, effects) = update(state, msg);
            state = next;
            if let Some(reason) = state.last_discard() {
                tracker_debug!("Discarded snapshot for job {}: {:?}", self.job_id, reason);
            }

            let mut terminal = None;
            for effect in effects {
                match effect {
                    Effect::StopTransports => self.stop_transports(),
                    Effect::Notify(notification) => {
                        if let Some(done) = self.notify(notification, &state) {
                            terminal = Some(done);
                        }
                    }
                }
            }
            if let Some(outcome) = terminal {
                break outcome;
            }
        };

        self.stop_transports();
        (outcome, self.presenter)
    }

    fn stop_transports(&mut self) {
        for transport in &mut self.transports {
            transport.stop();
        }
    }

    fn notify(
        &mut self,
        notification: Notification,
        state: &ReconcilerState,
    ) -> Option<TrackerOutcome> {
        match notification {
            Notification::Progress(progress) => {
                tracker_debug!(
                    "Job {} at {} ({:.0}%)",
                    self.job_id,
                    progress.stage,
                    progress.overall_progress
                );
                self.presenter.on_progress(&progress);
                None
            }
            Notification::StalenessWarning { silent_for } => {
                tracker_warn!(
                    "No status for job {} in {:?}; updates delayed",
                    self.job_id,
                    silent_for
                );
                self.presenter.on_staleness_warning(silent_for);
                None
            }
            Notification::Completed(details) => {
                tracker_info!("Job {} completed", self.job_id);
                self.presenter.on_terminal_completed(&details);
                Some(TrackerOutcome::Completed {
                    details,
                    view: state.view(),
                })
            }
            Notification::Failed(failure) => {
                tracker_info!("Job {} failed: {}", self.job_id, failure.message);
                self.presenter.on_terminal_failed(&failure);
                Some(TrackerOutcome::Failed {
                    failure,
                    view: state.view(),
                })
            }
        }
    }
}

fn event_to_msg(event: TransportEvent) -> Msg {
    match event {
        TransportEvent::Snapshot { channel, snapshot } => Msg::SnapshotReceived {
            channel,
            snapshot,
            at: Instant::now().into_std(),
        },
        TransportEvent::Health(health) => Msg::PushHealthChanged(health),
    }
}
