//! Strongly typed domain primitives for observed jobs.
//!
//! These newtypes provide type safety for job, team, and thought identifiers,
//! plus the ranked phase and status enumerations used throughout the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier for one orchestration job, assigned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for one collaborating agent team within a job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub String);

impl From<&str> for TeamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TeamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for one thought, unique within its team's stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThoughtId(pub String);

impl From<&str> for ThoughtId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ThoughtId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ThoughtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Overall lifecycle stage of an observed job.
///
/// Ranks form a total order; `Error` is absorbing and reachable from any
/// non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Received,
    Planning,
    Dispatching,
    Awaiting,
    Synthesizing,
    Complete,
    Error,
}

impl Phase {
    /// Position in the forward ordering. Higher never yields to lower.
    pub fn rank(&self) -> u8 {
        match self {
            Phase::Received => 0,
            Phase::Planning => 1,
            Phase::Dispatching => 2,
            Phase::Awaiting => 3,
            Phase::Synthesizing => 4,
            Phase::Complete => 5,
            Phase::Error => 6,
        }
    }

    /// True for the two absorbing phases.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }

    /// Wire label as spoken by the remote service.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Received => "received",
            Phase::Planning => "planning",
            Phase::Dispatching => "dispatching",
            Phase::Awaiting => "awaiting",
            Phase::Synthesizing => "synthesizing",
            Phase::Complete => "complete",
            Phase::Error => "error",
        }
    }

    /// Parses a wire label. Unknown labels return `None` so callers can
    /// drop the field instead of failing the whole message.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "received" => Some(Phase::Received),
            "planning" => Some(Phase::Planning),
            "dispatching" => Some(Phase::Dispatching),
            "awaiting" => Some(Phase::Awaiting),
            "synthesizing" => Some(Phase::Synthesizing),
            "complete" => Some(Phase::Complete),
            "error" => Some(Phase::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Per-team activity status. Same ordering discipline as [`Phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    Idle,
    Pending,
    Thinking,
    Generating,
    Complete,
    Error,
}

impl TeamStatus {
    pub fn rank(&self) -> u8 {
        match self {
            TeamStatus::Idle => 0,
            TeamStatus::Pending => 1,
            TeamStatus::Thinking => 2,
            TeamStatus::Generating => 3,
            TeamStatus::Complete => 4,
            TeamStatus::Error => 5,
        }
    }

    /// Wire label as spoken by the remote service.
    pub fn label(&self) -> &'static str {
        match self {
            TeamStatus::Idle => "idle",
            TeamStatus::Pending => "pending",
            TeamStatus::Thinking => "thinking",
            TeamStatus::Generating => "generating",
            TeamStatus::Complete => "complete",
            TeamStatus::Error => "error",
        }
    }

    /// Parses a wire label; unknown labels return `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "idle" => Some(TeamStatus::Idle),
            "pending" => Some(TeamStatus::Pending),
            "thinking" => Some(TeamStatus::Thinking),
            "generating" => Some(TeamStatus::Generating),
            "complete" => Some(TeamStatus::Complete),
            "error" => Some(TeamStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One entry in a team's reasoning stream. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub id: ThoughtId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Team label or cross-team role ("planner", "reviewer", ...).
    pub source: String,
}
