//! The canonical aggregate for one observed job.
//!
//! `JobState` is pure data plus derived accessors. It is mutated exclusively
//! through the reduction in `reducer.rs`; nothing else writes to it.

use crate::domain::types::{JobId, Phase, TeamId, TeamStatus, Thought};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything known to seed a fresh observation of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSeed {
    pub job_id: JobId,
    pub phase: Phase,
    /// Teams announced at submission, each with its starting point.
    pub teams: BTreeMap<TeamId, TeamSeed>,
}

/// Announced starting point of one team: the status the service reported
/// at submission and the model it assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamSeed {
    pub status: TeamStatus,
    pub model: Option<String>,
}

impl JobSeed {
    /// Seed for observing an already-running job: nothing is known yet
    /// beyond the identifier, so teams arrive via the first snapshot.
    pub fn bare(job_id: JobId) -> Self {
        Self {
            job_id,
            phase: Phase::Received,
            teams: BTreeMap::new(),
        }
    }
}

/// Status of one collaborating agent team.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamState {
    pub status: TeamStatus,
    /// Append-only, deduplicated by thought id, in arrival order.
    pub thoughts: Vec<Thought>,
    pub token_count: u64,
    /// Once non-empty, never replaced.
    pub generated_code: Option<String>,
    pub model_used: Option<String>,
    pub error_message: Option<String>,
}

impl TeamState {
    pub fn new(status: TeamStatus) -> Self {
        Self {
            status,
            thoughts: Vec::new(),
            token_count: 0,
            generated_code: None,
            model_used: None,
            error_message: None,
        }
    }
}

/// The authoritative in-memory projection of one job's status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobState {
    pub job_id: JobId,
    pub phase: Phase,
    /// Message carried by the most recent accepted phase change.
    pub phase_note: Option<String>,
    pub teams: BTreeMap<TeamId, TeamState>,
    /// Cross-team thought stream: every accepted team thought, in arrival order.
    pub feed: Vec<Thought>,
    /// Always equals the sum of per-team token counts; recomputed after
    /// every reduction, never independently mutated.
    pub aggregate_tokens: u64,
    /// Present only when `phase == error`.
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl JobState {
    pub fn from_seed(seed: &JobSeed) -> Self {
        let mut teams = BTreeMap::new();
        for (team, announced) in &seed.teams {
            let mut state = TeamState::new(announced.status);
            state.model_used = announced.model.clone();
            teams.insert(team.clone(), state);
        }
        Self {
            job_id: seed.job_id.clone(),
            phase: seed.phase,
            phase_note: None,
            teams,
            feed: Vec::new(),
            aggregate_tokens: 0,
            last_error: None,
            started_at: Utc::now(),
        }
    }

    /// True once the job can no longer change: `complete` or `error`.
    pub fn terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Wall-clock time since the observation started. Channel messages never
    /// carry authoritative elapsed time, so this is derived locally.
    pub fn elapsed_since(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at
    }

    pub(crate) fn team_entry(&mut self, team: &TeamId) -> &mut TeamState {
        self.teams
            .entry(team.clone())
            .or_insert_with(|| TeamState::new(TeamStatus::Idle))
    }
}
