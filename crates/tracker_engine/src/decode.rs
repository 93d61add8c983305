use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use tracker_core::{PipelineStep, Stage, StatusSnapshot, SubProgress};

use crate::{FailureKind, TransportError};

/// Status payload shared by the poll endpoint and push `status_update` events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub page_analysis: Option<PagePayload>,
    #[serde(default)]
    pub questions_extracted: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub failed_step: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub document_id: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PagePayload {
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PushFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed status payload: {0}")]
    Malformed(String),
    #[error("server reported error: {0}")]
    ServerReported(String),
}

impl From<DecodeError> for TransportError {
    fn from(err: DecodeError) -> Self {
        let kind = match err {
            DecodeError::Malformed(_) => FailureKind::Malformed,
            DecodeError::ServerReported(_) => FailureKind::ServerReported,
        };
        TransportError::new(kind, err.to_string())
    }
}

/// Decode a poll response body into a snapshot for `job_id`.
pub fn decode_status(
    job_id: &str,
    body: &str,
    arrived_at: DateTime<Utc>,
) -> Result<StatusSnapshot, DecodeError> {
    let payload: StatusPayload =
        serde_json::from_str(body).map_err(|err| DecodeError::Malformed(err.to_string()))?;
    payload.into_snapshot(job_id, arrived_at)
}

/// Decode one push frame. Returns `Ok(None)` for other events and for
/// updates addressed to a different document.
pub fn decode_push_frame(
    job_id: &str,
    frame: &str,
    arrived_at: DateTime<Utc>,
) -> Result<Option<StatusSnapshot>, DecodeError> {
    let frame: PushFrame =
        serde_json::from_str(frame).map_err(|err| DecodeError::Malformed(err.to_string()))?;
    if frame.event != "status_update" {
        return Ok(None);
    }
    let payload: StatusPayload = serde_json::from_value(frame.data)
        .map_err(|err| DecodeError::Malformed(err.to_string()))?;
    match payload.document_id.as_ref().and_then(document_id_text) {
        Some(id) if id == job_id => payload.into_snapshot(job_id, arrived_at).map(Some),
        _ => Ok(None),
    }
}

/// Subscribe frame sent right after a push connection opens.
pub fn subscribe_frame(job_id: &str) -> String {
    serde_json::json!({
        "event": "subscribe",
        "data": { "document_id": job_id },
    })
    .to_string()
}

impl StatusPayload {
    pub fn into_snapshot(
        self,
        job_id: &str,
        arrived_at: DateTime<Utc>,
    ) -> Result<StatusSnapshot, DecodeError> {
        let raw_status = self.status.unwrap_or_else(|| "pending".to_string());
        let declared = Stage::from_wire(&raw_status);

        // An error on a failed job is the failure reason, not a fetch problem.
        let server_message = match (declared, self.error) {
            (Some(Stage::Failed), Some(error)) => Some(self.message.unwrap_or(error)),
            (_, Some(error)) => return Err(DecodeError::ServerReported(error)),
            (_, None) => self.message,
        };

        let (stage, message) = match declared {
            Some(stage) => (stage, server_message),
            // Unknown statuses still show progress; keep the raw value visible.
            None => (
                Stage::Processing,
                Some(match server_message {
                    Some(message) => format!("{raw_status}: {message}"),
                    None => raw_status,
                }),
            ),
        };

        let pages = self.page_analysis.unwrap_or_default();
        let failed_stage = if stage == Stage::Failed {
            self.failed_step.as_deref().and_then(PipelineStep::from_wire)
        } else {
            None
        };
        let observed_at = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(arrived_at);

        Ok(StatusSnapshot {
            job_id: job_id.to_string(),
            stage,
            overall_progress: self.progress,
            sub_progress: SubProgress {
                current_page: pages.current_page,
                total_pages: pages.total_pages,
                questions_extracted: self.questions_extracted,
            },
            message,
            failed_stage,
            observed_at,
            synthetic: false,
        })
    }
}

/// Accepts RFC 3339, or a naive ISO 8601 datetime taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn document_id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
