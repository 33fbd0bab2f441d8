//! Transport channels feeding the synchronization coordinator.
//!
//! Both channels are dumb pipes: they move payloads and report their own
//! lifecycle, and every payload is tagged with the observation generation it
//! was produced under so the coordinator can drop deliveries that outlive a
//! reset or reconnect.

pub mod poller;
pub mod push;

use crate::wire::StatusReport;

pub use poller::{FallbackPoller, StatusSource};
pub use push::PushSession;

/// Payload plus the observation generation it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEnvelope {
    pub generation: u64,
    pub payload: ChannelPayload,
}

/// What a channel has to say. Push lines stay unparsed here; the coordinator
/// decodes them, so one malformed line costs one envelope and nothing else.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelPayload {
    /// One newline-delimited JSON line from the push stream.
    PushRaw(String),
    /// One fetched pull-channel report.
    PollSnapshot(StatusReport),
    /// Push connection established and the observe handshake sent.
    PushOpened,
    /// Push connection closed by the remote end.
    PushClosed { reason: Option<String> },
    /// Push connection failed to open or broke mid-stream.
    PushFailed(String),
    /// One poll attempt failed.
    PollFailed(String),
}
