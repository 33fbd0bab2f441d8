//! Structured JSONL log of engine activity for debugging and replay.
//!
//! Every reduction, channel lifecycle event, and coordinator transition is
//! written as one JSON object per line with a monotonic sequence number, so
//! an observed run can be reconstructed after the fact.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{JobId, StateChange, SyncOp};

/// Structured JSONL sink for one engine run.
pub struct SyncEventLog {
    run_id: String,
    seq: AtomicU64,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

/// A single log entry in JSONL format.
#[derive(Serialize, serde::Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number (unique across the run)
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds
    pub ts: String,
    /// Random ID correlating all entries of one process run
    pub run_id: String,
    /// Component that emitted the entry
    pub component: String,
    /// Structured event data
    pub event: Value,
}

impl SyncEventLog {
    /// Creates a log writing to `<log_dir>/sync.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log directory cannot be created or the log
    /// file cannot be opened.
    pub fn new(log_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join("sync.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            run_id: Uuid::new_v4().to_string(),
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path,
        })
    }

    /// Returns the next sequence number.
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Logs a structured event.
    ///
    /// The event is serialized to JSON and written as a single line.
    /// This method is thread-safe; write failures are ignored.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            run_id: self.run_id.clone(),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    /// Logs an operation entering the reducer.
    pub fn log_sync_op(&self, job: &JobId, op: &SyncOp) {
        self.log(
            "Reducer",
            serde_json::json!({
                "type": "SyncOp",
                "job": job,
                "op": format!("{:?}", op)
            }),
        );
    }

    /// Logs one state change produced by a reduction.
    pub fn log_state_change(&self, job: &JobId, change: &StateChange) {
        self.log(
            "Reducer",
            serde_json::json!({
                "type": "StateChange",
                "job": job,
                "change": change
            }),
        );
    }

    /// Logs a channel lifecycle event.
    pub fn log_channel(&self, channel: &str, detail: &str) {
        self.log(
            "Channel",
            serde_json::json!({
                "type": "Lifecycle",
                "channel": channel,
                "detail": detail
            }),
        );
    }

    /// Logs a coordinator activity transition.
    pub fn log_activity(&self, from: &str, to: &str) {
        self.log(
            "Coordinator",
            serde_json::json!({
                "type": "ActivityTransition",
                "from": from,
                "to": to
            }),
        );
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }
}

#[cfg(test)]
#[path = "tests/event_log_tests.rs"]
mod tests;
