use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tracker_core::{Channel, JobId};

use crate::TransportEvent;

pub trait TransportSink: Send + Sync {
    fn emit(&self, event: TransportEvent);
}

/// Forwards transport events into the tracker loop.
pub struct ChannelTransportSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl ChannelTransportSink {
    pub fn new(tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { tx }
    }
}

impl TransportSink for ChannelTransportSink {
    fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(event);
    }
}

/// A source of status snapshots for one job.
///
/// `start` must be called from within a tokio runtime. `stop` is idempotent,
/// and once it returns nothing from the stopped run reaches the sink.
pub trait Transport: Send {
    fn channel(&self) -> Channel;
    fn start(&mut self, job_id: JobId, sink: Arc<dyn TransportSink>);
    fn stop(&mut self);
}

/// Generation counter plus cancellation token shared by transport implementations.
#[derive(Default)]
pub(crate) struct Lifecycle {
    generation: Arc<RwLock<u64>>,
    cancel: Option<CancellationToken>,
}

impl Lifecycle {
    /// Starts a new run, ending any previous one first.
    pub(crate) fn begin(&mut self, sink: Arc<dyn TransportSink>) -> (GuardedSink, CancellationToken) {
        self.end();
        let current = match self.generation.read() {
            Ok(generation) => *generation,
            Err(poisoned) => *poisoned.into_inner(),
        };
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        let guarded = GuardedSink {
            inner: sink,
            generation: self.generation.clone(),
            issued: current,
        };
        (guarded, token)
    }

    /// Cancels the current run. Waits for an in-flight emit to finish.
    pub(crate) fn end(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
            let mut generation = match self.generation.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *generation += 1;
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.cancel.is_some()
    }
}

/// Sink wrapper that drops events once its run has been stopped.
#[derive(Clone)]
pub(crate) struct GuardedSink {
    inner: Arc<dyn TransportSink>,
    generation: Arc<RwLock<u64>>,
    issued: u64,
}

impl GuardedSink {
    pub(crate) fn emit(&self, event: TransportEvent) -> bool {
        let generation = match self.generation.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *generation != self.issued {
            return false;
        }
        self.inner.emit(event);
        true
    }
}
