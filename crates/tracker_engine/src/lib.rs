//! Tracker engine: transports, payload decoding, and the reconciliation loop.
mod decode;
mod poll;
mod push;
mod tracker;
mod transport;
mod types;

pub use decode::{
    decode_push_frame, decode_status, parse_timestamp, subscribe_frame, DecodeError, PagePayload,
    StatusPayload,
};
pub use poll::{PollSettings, PollTransport, ReqwestStatusFetcher, StatusFetcher};
pub use push::{reconnect_delay, FrameStream, PushConnector, PushSettings, PushTransport, WsConnector};
pub use tracker::{StatusPresenter, Tracker, TrackerOutcome, TrackerSettings};
pub use transport::{ChannelTransportSink, Transport, TransportSink};
pub use types::{FailureKind, TransportError, TransportEvent};
