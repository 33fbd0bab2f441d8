//! Canonical operations consumed by the reducer, and the change facts it emits.
//!
//! Operations are channel-agnostic: the normalizer maps both push events and
//! poll snapshots into this one vocabulary, so the reducer never knows which
//! channel produced an update. Changes are facts for logging and display only;
//! consumers read state via the snapshot watch channel, not by replaying these.

use crate::domain::types::{Phase, TeamId, TeamStatus, Thought, ThoughtId};
use serde::Serialize;
use std::collections::BTreeMap;

/// One normalized update instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOp {
    /// Advance the job phase. The note is the optional human-readable
    /// message carried by the originating event.
    SetPhase { phase: Phase, note: Option<String> },
    /// Advance one team's status.
    SetTeamStatus { team: TeamId, status: TeamStatus },
    /// Append one thought to a team's stream (and, on acceptance, to the
    /// job-level feed).
    AppendThought { team: TeamId, thought: Thought },
    /// Attach a generated artifact and credit the tokens spent producing it.
    SetTeamCode {
        team: TeamId,
        code: String,
        token_delta: u64,
    },
    /// Record a team-level failure. Does not fail the job.
    SetTeamError { team: TeamId, message: String },
    /// Record an authoritative job-level failure. Terminal.
    SetGlobalError { message: String },
    /// Full state reported by the pull channel. Reduced by per-field
    /// decomposition against current state, never by replacement, so a stale
    /// snapshot cannot regress anything.
    Snapshot {
        phase: Option<Phase>,
        teams: BTreeMap<TeamId, TeamSnapshot>,
    },
}

/// Per-team slice of a pull-channel snapshot. Fields the report omitted, or
/// whose wire labels were unrecognized, stay `None` and are skipped while the
/// rest of the snapshot still applies.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TeamSnapshot {
    pub status: Option<TeamStatus>,
    pub thoughts: Vec<Thought>,
    pub generated_code: Option<String>,
    pub token_count: u64,
    pub model_used: Option<String>,
    pub error_message: Option<String>,
}

/// A fact about what one reduction actually changed. Empty change lists mean
/// the operation was a no-op replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StateChange {
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    TeamStatusChanged {
        team: TeamId,
        from: TeamStatus,
        to: TeamStatus,
    },
    ThoughtAppended {
        team: TeamId,
        thought_id: ThoughtId,
    },
    CodeAttached {
        team: TeamId,
        token_delta: u64,
    },
    /// A snapshot raised a team's token floor without attaching code.
    TokensAdvanced {
        team: TeamId,
        from: u64,
        to: u64,
    },
    ModelRecorded {
        team: TeamId,
        model: String,
    },
    TeamFailed {
        team: TeamId,
        message: String,
    },
    JobFailed {
        message: String,
    },
}
