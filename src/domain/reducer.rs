//! The reduction: folds one canonical operation into the job state.
//!
//! `apply` is total and infallible. Every rule is monotone and idempotent,
//! which is what makes concurrent delivery from both channels safe without
//! locks: operations commute (append-if-absent, max-if-ordered,
//! sum-of-deltas), so any interleaving of push events and poll snapshots
//! converges to the same state.

use crate::domain::ops::{StateChange, SyncOp, TeamSnapshot};
use crate::domain::state::JobState;
use crate::domain::types::{Phase, TeamId, TeamStatus, Thought};

impl JobState {
    /// Applies one operation, returning the facts that actually changed.
    ///
    /// An empty return means the operation was a no-op replay: already
    /// applied, stale, or arriving after the job settled.
    pub fn apply(&mut self, op: &SyncOp) -> Vec<StateChange> {
        if self.terminal() {
            return Vec::new();
        }

        let mut changes = Vec::new();
        match op {
            SyncOp::SetPhase { phase, note } => {
                self.apply_phase(*phase, note.as_deref(), &mut changes);
            }
            SyncOp::SetTeamStatus { team, status } => {
                self.apply_team_status(team, *status, &mut changes);
            }
            SyncOp::AppendThought { team, thought } => {
                self.apply_thought(team, thought, &mut changes);
            }
            SyncOp::SetTeamCode {
                team,
                code,
                token_delta,
            } => {
                self.apply_code(team, code, *token_delta, &mut changes);
            }
            SyncOp::SetTeamError { team, message } => {
                self.apply_team_error(team, message, &mut changes);
            }
            SyncOp::SetGlobalError { message } => {
                self.apply_phase(Phase::Error, None, &mut changes);
                self.last_error = Some(message.clone());
                changes.push(StateChange::JobFailed {
                    message: message.clone(),
                });
            }
            SyncOp::Snapshot { phase, teams } => {
                // Teams before phase: a closing snapshot may carry both the
                // terminal phase and the final team fields, and all of them
                // must land within this one reduction.
                for (team, snap) in teams {
                    self.apply_team_snapshot(team, snap, &mut changes);
                }
                if let Some(phase) = phase {
                    self.apply_phase(*phase, None, &mut changes);
                }
            }
        }

        self.aggregate_tokens = self.teams.values().map(|t| t.token_count).sum();
        changes
    }

    fn apply_phase(&mut self, next: Phase, note: Option<&str>, changes: &mut Vec<StateChange>) {
        let current = self.phase;
        if next != Phase::Error && next.rank() <= current.rank() {
            return;
        }
        if next == current {
            return;
        }
        self.phase = next;
        if let Some(note) = note {
            self.phase_note = Some(note.to_string());
        }
        changes.push(StateChange::PhaseChanged { from: current, to: next });
    }

    fn apply_team_status(
        &mut self,
        team: &TeamId,
        next: TeamStatus,
        changes: &mut Vec<StateChange>,
    ) {
        let entry = self.team_entry(team);
        let current = entry.status;
        if next != TeamStatus::Error && next.rank() <= current.rank() {
            return;
        }
        if next == current {
            return;
        }
        entry.status = next;
        changes.push(StateChange::TeamStatusChanged {
            team: team.clone(),
            from: current,
            to: next,
        });
    }

    fn apply_thought(&mut self, team: &TeamId, thought: &Thought, changes: &mut Vec<StateChange>) {
        let entry = self.team_entry(team);
        if entry.thoughts.iter().any(|t| t.id == thought.id) {
            return;
        }
        entry.thoughts.push(thought.clone());
        self.feed.push(thought.clone());
        changes.push(StateChange::ThoughtAppended {
            team: team.clone(),
            thought_id: thought.id.clone(),
        });
    }

    fn apply_code(
        &mut self,
        team: &TeamId,
        code: &str,
        token_delta: u64,
        changes: &mut Vec<StateChange>,
    ) {
        let entry = self.team_entry(team);
        let applies = match &entry.generated_code {
            None => true,
            Some(current) => current.is_empty() && !code.is_empty(),
        };
        if !applies {
            return;
        }
        entry.generated_code = Some(code.to_string());
        // Tokens are credited only when the code lands, so a redelivered
        // event cannot double-count.
        entry.token_count = entry.token_count.saturating_add(token_delta);
        changes.push(StateChange::CodeAttached {
            team: team.clone(),
            token_delta,
        });
    }

    fn apply_team_error(&mut self, team: &TeamId, message: &str, changes: &mut Vec<StateChange>) {
        let entry = self.team_entry(team);
        if entry.status == TeamStatus::Error {
            return;
        }
        entry.status = TeamStatus::Error;
        entry.error_message = Some(message.to_string());
        changes.push(StateChange::TeamFailed {
            team: team.clone(),
            message: message.to_string(),
        });
    }

    fn apply_team_snapshot(
        &mut self,
        team: &TeamId,
        snap: &TeamSnapshot,
        changes: &mut Vec<StateChange>,
    ) {
        if let Some(message) = &snap.error_message {
            self.apply_team_error(team, message, changes);
        }
        if let Some(status) = snap.status {
            self.apply_team_status(team, status, changes);
        }
        for thought in &snap.thoughts {
            self.apply_thought(team, thought, changes);
        }
        if let Some(code) = &snap.generated_code {
            // Snapshots report absolute token counts, so the code rule
            // carries no delta; the floor below reconciles the count.
            self.apply_code(team, code, 0, changes);
        }
        if snap.token_count > 0 {
            let entry = self.team_entry(team);
            if snap.token_count > entry.token_count {
                let from = entry.token_count;
                entry.token_count = snap.token_count;
                changes.push(StateChange::TokensAdvanced {
                    team: team.clone(),
                    from,
                    to: snap.token_count,
                });
            }
        }
        if let Some(model) = &snap.model_used {
            let entry = self.team_entry(team);
            if entry.model_used.is_none() {
                entry.model_used = Some(model.clone());
                changes.push(StateChange::ModelRecorded {
                    team: team.clone(),
                    model: model.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/reducer_props.rs"]
mod props;
