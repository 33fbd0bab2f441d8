//! Wire layer for the orchestration service.
//!
//! `protocol` holds the serde schemas for both channels; `normalizer` folds
//! them into the single operation vocabulary the reducer understands.

pub mod normalizer;
pub mod protocol;

pub use normalizer::{normalize_push, normalize_report, parse_push_line, seed_from_ack};
pub use protocol::{BriefAck, BriefRequest, ClientMessage, StatusReport};
