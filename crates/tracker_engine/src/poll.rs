use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracker_core::{Channel, JobId, StatusSnapshot};
use tracker_logging::{tracker_debug, tracker_info, tracker_warn};

use crate::decode::decode_status;
use crate::transport::{GuardedSink, Lifecycle, Transport, TransportSink};
use crate::{FailureKind, TransportError, TransportEvent};

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    /// How long to wait for a first status before giving up with a synthetic failure.
    pub staleness_threshold: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            staleness_threshold: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait::async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusSnapshot, TransportError>;
}

/// Fetches `GET {base_url}/api/questions/{job_id}/status`.
#[derive(Debug, Clone)]
pub struct ReqwestStatusFetcher {
    base_url: reqwest::Url,
    client: reqwest::Client,
}

impl ReqwestStatusFetcher {
    pub fn new(base_url: &str, settings: &PollSettings) -> Result<Self, TransportError> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|err| TransportError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::new(
                FailureKind::InvalidUrl,
                format!("{base_url} cannot be a base url"),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| TransportError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { base_url, client })
    }

    pub fn status_url(&self, job_id: &str) -> reqwest::Url {
        self.join(&["api", "questions", job_id, "status"])
    }

    /// Page listing the questions extracted from `job_id`.
    pub fn results_url(&self, job_id: &str) -> reqwest::Url {
        self.join(&["questions", job_id])
    }

    fn join(&self, path: &[&str]) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path);
        }
        url
    }
}

#[async_trait::async_trait]
impl StatusFetcher for ReqwestStatusFetcher {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusSnapshot, TransportError> {
        let response = self
            .client
            .get(self.status_url(job_id))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(decode_status(job_id, &body, Utc::now())?)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return TransportError::new(FailureKind::Malformed, err.to_string());
    }
    TransportError::new(FailureKind::Network, err.to_string())
}

/// Interval-based pull channel.
pub struct PollTransport {
    fetcher: Arc<dyn StatusFetcher>,
    settings: PollSettings,
    lifecycle: Lifecycle,
}

impl PollTransport {
    pub fn new(fetcher: Arc<dyn StatusFetcher>, settings: PollSettings) -> Self {
        Self {
            fetcher,
            settings,
            lifecycle: Lifecycle::default(),
        }
    }
}

impl Transport for PollTransport {
    fn channel(&self) -> Channel {
        Channel::Poll
    }

    fn start(&mut self, job_id: JobId, sink: Arc<dyn TransportSink>) {
        let (sink, cancel) = self.lifecycle.begin(sink);
        tracker_info!(
            "Polling status for job {} every {:?}",
            job_id,
            self.settings.interval
        );
        tokio::spawn(poll_loop(
            self.fetcher.clone(),
            job_id,
            self.settings.clone(),
            sink,
            cancel,
        ));
    }

    fn stop(&mut self) {
        if self.lifecycle.is_running() {
            tracker_debug!("Stopping poll transport");
        }
        self.lifecycle.end();
    }
}

impl Drop for PollTransport {
    fn drop(&mut self) {
        self.lifecycle.end();
    }
}

async fn poll_loop(
    fetcher: Arc<dyn StatusFetcher>,
    job_id: JobId,
    settings: PollSettings,
    sink: GuardedSink,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let mut received_any = false;
    let mut gave_up = false;
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = fetcher.fetch_status(&job_id) => result,
        };

        match result {
            Ok(snapshot) => {
                received_any = true;
                if !sink.emit(TransportEvent::Snapshot {
                    channel: Channel::Poll,
                    snapshot,
                }) {
                    break;
                }
            }
            Err(err) => {
                tracker_warn!("Status poll for job {} failed: {}", job_id, err);
                if !received_any && !gave_up && started.elapsed() >= settings.staleness_threshold
                {
                    gave_up = true;
                    tracker_warn!(
                        "No status for job {} after {:?}; reporting failure",
                        job_id,
                        settings.staleness_threshold
                    );
                    let snapshot = StatusSnapshot::synthetic_failure(
                        job_id.clone(),
                        format!("Error checking status. {}", err.message),
                        Utc::now(),
                    );
                    if !sink.emit(TransportEvent::Snapshot {
                        channel: Channel::Poll,
                        snapshot,
                    }) {
                        break;
                    }
                }
            }
        }
    }
    tracker_debug!("Poll loop for job {} ended", job_id);
}
