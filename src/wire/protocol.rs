//! Wire schemas for both channels of the orchestration service.
//!
//! The push channel is newline-delimited JSON over a persistent connection
//! (one event per line); the pull channel and submit/cancel requests are
//! JSON over HTTP. Phase and status labels travel as raw strings on purpose:
//! parsing them is the normalizer's job, so an unrecognized label degrades to
//! one skipped field instead of one rejected message.

use crate::domain::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Messages sent by this client over the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens an observation of one job. Must be the first line written on a
    /// fresh connection; the service answers with a `connected` event.
    Observe { job_id: JobId },
}

/// Events delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// Handshake acknowledgement for an accepted observe request.
    Connected { job_id: JobId },
    PhaseChange {
        job_id: JobId,
        data: PhaseChangeData,
    },
    StatusChange {
        job_id: JobId,
        team: String,
        data: StatusChangeData,
    },
    ThoughtAdded {
        job_id: JobId,
        team: String,
        data: ThoughtData,
    },
    CodeGenerated {
        job_id: JobId,
        team: String,
        data: CodeData,
    },
    /// Team errors carry the team label; a missing team means the job
    /// itself failed.
    Error {
        job_id: JobId,
        #[serde(default)]
        team: Option<String>,
        data: ErrorData,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseChangeData {
    pub phase: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeData {
    pub status: String,
}

/// One thought as it travels on the wire, shared by push events and pull
/// reports. Timestamps are RFC 3339 strings parsed best-effort downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtData {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeData {
    pub code: String,
    #[serde(default)]
    pub token_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
}

/// Full job status as returned by the pull channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub job_id: JobId,
    pub status: String,
    /// Server-computed completion estimate. Informational only; the engine
    /// never reduces it into job state.
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub teams: BTreeMap<String, TeamReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamReport {
    pub status: String,
    #[serde(default)]
    pub thoughts: Vec<ThoughtData>,
    #[serde(default)]
    pub generated_code: Option<String>,
    #[serde(default)]
    pub token_count: u64,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Body of the submit-brief request. Style preferences are a free-form
/// JSON object (colors, fonts, etc.), not a prose string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefRequest {
    pub brief: String,
    pub target_framework: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_preferences: Option<serde_json::Map<String, serde_json::Value>>,
    pub include_teams: Vec<String>,
}

/// Acknowledgement for an accepted brief; seeds the initial job state.
/// `teams` reuses the pull channel's per-team shape: each entry announces
/// the team's starting status and assigned model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefAck {
    pub job_id: JobId,
    pub status: String,
    #[serde(default)]
    pub teams: BTreeMap<String, TeamReport>,
}
