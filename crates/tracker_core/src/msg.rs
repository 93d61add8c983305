use std::time::Instant;

use crate::StatusSnapshot;

/// Delivery channel a snapshot arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Push,
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushHealth {
    /// No push connection has been established yet, or push is not configured.
    #[default]
    Unknown,
    Connected,
    Disconnected,
    /// The reconnect budget is spent; push will not come back.
    Exhausted,
}

impl PushHealth {
    pub fn is_connected(self) -> bool {
        self == PushHealth::Connected
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// A transport delivered a snapshot at client time `at`.
    SnapshotReceived {
        channel: Channel,
        snapshot: StatusSnapshot,
        at: Instant,
    },
    /// The push channel reported a health transition.
    PushHealthChanged(PushHealth),
    /// Periodic timer used for staleness detection.
    StalenessCheck { now: Instant },
}
