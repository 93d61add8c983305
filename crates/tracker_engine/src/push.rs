use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracker_core::{Channel, JobId, PushHealth};
use tracker_logging::{tracker_debug, tracker_info, tracker_warn};

use crate::decode::{decode_push_frame, subscribe_frame};
use crate::transport::{GuardedSink, Lifecycle, Transport, TransportSink};
use crate::{FailureKind, TransportError, TransportEvent};

#[derive(Debug, Clone)]
pub struct PushSettings {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Reconnects allowed after a failure before push is declared exhausted.
    pub max_attempts: u32,
    pub connect_timeout: Duration,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// Text frames from an open, already subscribed connection.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

#[async_trait::async_trait]
pub trait PushConnector: Send + Sync {
    /// Opens a connection and subscribes to updates for `job_id`.
    async fn connect(&self, job_id: &str) -> Result<FrameStream, TransportError>;
}

/// WebSocket connector speaking JSON `{event, data}` frames.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, settings: &PushSettings) -> Self {
        Self {
            url: url.into(),
            connect_timeout: settings.connect_timeout,
        }
    }
}

#[async_trait::async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, job_id: &str) -> Result<FrameStream, TransportError> {
        let (mut socket, _) =
            match tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
            {
                Ok(Ok(connected)) => connected,
                Ok(Err(err)) => {
                    return Err(TransportError::new(FailureKind::Connect, err.to_string()))
                }
                Err(_) => {
                    return Err(TransportError::new(
                        FailureKind::Timeout,
                        format!("no connection within {:?}", self.connect_timeout),
                    ))
                }
            };

        socket
            .send(Message::Text(subscribe_frame(job_id).into()))
            .await
            .map_err(|err| TransportError::new(FailureKind::Connect, err.to_string()))?;

        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(_) => None,
                Err(err) => Some(Err(TransportError::new(
                    FailureKind::Closed,
                    err.to_string(),
                ))),
            }
        });
        Ok(frames.boxed())
    }
}

/// Delay before reconnect number `attempt` (zero based): base doubled per attempt, capped.
pub fn reconnect_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}

/// Persistent-connection channel with exponential reconnect backoff.
pub struct PushTransport {
    connector: Arc<dyn PushConnector>,
    settings: PushSettings,
    lifecycle: Lifecycle,
}

impl PushTransport {
    pub fn new(connector: Arc<dyn PushConnector>, settings: PushSettings) -> Self {
        Self {
            connector,
            settings,
            lifecycle: Lifecycle::default(),
        }
    }
}

impl Transport for PushTransport {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    fn start(&mut self, job_id: JobId, sink: Arc<dyn TransportSink>) {
        let (sink, cancel) = self.lifecycle.begin(sink);
        tokio::spawn(push_loop(
            self.connector.clone(),
            job_id,
            self.settings.clone(),
            sink,
            cancel,
        ));
    }

    fn stop(&mut self) {
        if self.lifecycle.is_running() {
            tracker_debug!("Stopping push transport");
        }
        self.lifecycle.end();
    }
}

impl Drop for PushTransport {
    fn drop(&mut self) {
        self.lifecycle.end();
    }
}

async fn push_loop(
    connector: Arc<dyn PushConnector>,
    job_id: JobId,
    settings: PushSettings,
    sink: GuardedSink,
    cancel: CancellationToken,
) {
    let mut attempts: u32 = 0;

    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            connected = connector.connect(&job_id) => connected,
        };

        match connected {
            Ok(mut frames) => {
                tracker_info!("Push channel connected for job {}", job_id);
                attempts = 0;
                if !sink.emit(TransportEvent::Health(PushHealth::Connected)) {
                    return;
                }
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => return,
                        next = frames.next() => next,
                    };
                    match next {
                        Some(Ok(text)) => match decode_push_frame(&job_id, &text, Utc::now()) {
                            Ok(Some(snapshot)) => {
                                if !sink.emit(TransportEvent::Snapshot {
                                    channel: Channel::Push,
                                    snapshot,
                                }) {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(err) => tracker_warn!("Ignoring push frame: {}", err),
                        },
                        Some(Err(err)) => {
                            tracker_warn!("Push channel for job {} dropped: {}", job_id, err);
                            break;
                        }
                        None => {
                            tracker_info!("Push channel for job {} closed by server", job_id);
                            break;
                        }
                    }
                }
                if !sink.emit(TransportEvent::Health(PushHealth::Disconnected)) {
                    return;
                }
            }
            Err(err) => {
                tracker_warn!("Push connect for job {} failed: {}", job_id, err);
            }
        }

        if attempts >= settings.max_attempts {
            tracker_warn!(
                "Push reconnect budget of {} spent for job {}; relying on polling",
                settings.max_attempts,
                job_id
            );
            sink.emit(TransportEvent::Health(PushHealth::Exhausted));
            return;
        }

        let delay = reconnect_delay(attempts, settings.base_delay, settings.max_delay);
        attempts += 1;
        tracker_info!(
            "Reconnecting push channel in {:?} (attempt {}/{})",
            delay,
            attempts,
            settings.max_attempts
        );
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
