//! Translation from wire shapes to canonical sync operations.
//!
//! Both channels funnel through here so the reducer only ever sees one
//! vocabulary. Translation is tolerant: a malformed line or an unrecognized
//! label is logged and dropped, and the rest of the stream keeps flowing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::{
    JobSeed, Phase, SyncOp, TeamId, TeamSeed, TeamSnapshot, TeamStatus, Thought, ThoughtId,
};
use crate::wire::protocol::{BriefAck, PushEvent, StatusReport, ThoughtData};

/// Parses one line from the push channel. Returns `None` for anything the
/// schema does not recognize.
pub fn parse_push_line(line: &str) -> Option<PushEvent> {
    match serde_json::from_str::<PushEvent>(line) {
        Ok(event) => Some(event),
        Err(error) => {
            warn!(%error, "Dropping malformed push line");
            None
        }
    }
}

/// Converts a push event into a sync operation. Handshake acknowledgements
/// and events with unrecognized labels produce `None`.
pub fn normalize_push(event: PushEvent) -> Option<SyncOp> {
    match event {
        PushEvent::Connected { job_id } => {
            debug!(job = %job_id, "Push channel handshake acknowledged");
            None
        }
        PushEvent::PhaseChange { data, .. } => match Phase::from_label(&data.phase) {
            Some(phase) => Some(SyncOp::SetPhase {
                phase,
                note: data.message,
            }),
            None => {
                warn!(label = %data.phase, "Dropping phase change with unknown label");
                None
            }
        },
        PushEvent::StatusChange { team, data, .. } => match TeamStatus::from_label(&data.status) {
            Some(status) => Some(SyncOp::SetTeamStatus {
                team: TeamId::from(team),
                status,
            }),
            None => {
                warn!(%team, label = %data.status, "Dropping status change with unknown label");
                None
            }
        },
        PushEvent::ThoughtAdded { team, data, .. } => {
            let thought = wire_thought(&team, data);
            Some(SyncOp::AppendThought {
                team: TeamId::from(team),
                thought,
            })
        }
        PushEvent::CodeGenerated { team, data, .. } => Some(SyncOp::SetTeamCode {
            team: TeamId::from(team),
            code: data.code,
            token_delta: data.token_count,
        }),
        PushEvent::Error { team, data, .. } => match team {
            Some(team) => Some(SyncOp::SetTeamError {
                team: TeamId::from(team),
                message: data.message,
            }),
            None => Some(SyncOp::SetGlobalError {
                message: data.message,
            }),
        },
    }
}

/// Converts a polled status report into one snapshot operation.
pub fn normalize_report(report: StatusReport) -> SyncOp {
    debug!(job = %report.job_id, progress = ?report.progress, "Normalizing polled report");
    let phase = Phase::from_label(&report.status);
    if phase.is_none() {
        warn!(label = %report.status, "Report carries unknown phase label");
    }
    let mut teams = BTreeMap::new();
    for (name, team) in report.teams {
        let status = TeamStatus::from_label(&team.status);
        if status.is_none() {
            warn!(team = %name, label = %team.status, "Report carries unknown status label");
        }
        let thoughts = team
            .thoughts
            .into_iter()
            .map(|data| wire_thought(&name, data))
            .collect();
        teams.insert(
            TeamId::from(name),
            TeamSnapshot {
                status,
                thoughts,
                generated_code: team.generated_code,
                token_count: team.token_count,
                model_used: team.model_used,
                error_message: team.error_message,
            },
        );
    }
    SyncOp::Snapshot { phase, teams }
}

/// Builds the initial job state seed from a submit acknowledgement. Each
/// team keeps the status and model the service announced; an unknown
/// status label degrades to `pending`.
pub fn seed_from_ack(ack: BriefAck) -> JobSeed {
    let phase = Phase::from_label(&ack.status).unwrap_or(Phase::Received);
    let mut teams = BTreeMap::new();
    for (name, team) in ack.teams {
        let status = match TeamStatus::from_label(&team.status) {
            Some(status) => status,
            None => {
                warn!(team = %name, label = %team.status, "Ack carries unknown status label");
                TeamStatus::Pending
            }
        };
        teams.insert(
            TeamId::from(name),
            TeamSeed {
                status,
                model: team.model_used,
            },
        );
    }
    JobSeed {
        job_id: ack.job_id,
        phase,
        teams,
    }
}

fn wire_thought(team: &str, data: ThoughtData) -> Thought {
    let timestamp = data
        .timestamp
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);
    Thought {
        id: ThoughtId::from(data.id),
        text: data.text,
        timestamp,
        source: data.source.unwrap_or_else(|| team.to_string()),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(error) => {
            warn!(%raw, %error, "Ignoring unparseable thought timestamp");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/normalizer_tests.rs"]
mod tests;
