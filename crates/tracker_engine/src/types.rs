use std::fmt;

use tracker_core::{Channel, PushHealth, StatusSnapshot};

/// What a transport hands to its sink.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Snapshot {
        channel: Channel,
        snapshot: StatusSnapshot,
    },
    Health(PushHealth),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    /// The body could not be turned into a snapshot.
    Malformed,
    /// The server answered with an `error` field instead of a status.
    ServerReported,
    Connect,
    Closed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Malformed => write!(f, "malformed payload"),
            FailureKind::ServerReported => write!(f, "server reported error"),
            FailureKind::Connect => write!(f, "connect failed"),
            FailureKind::Closed => write!(f, "connection closed"),
        }
    }
}
