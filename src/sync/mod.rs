//! Synchronization coordinator: the single owner of job state.
//!
//! The coordinator is an actor, so envelopes from both channels, reconnect
//! timers, and consumer requests are serialized through one mailbox and the
//! reducer never needs a lock. Channel activity is tracked separately from
//! the job phase: push is preferred, polling covers push outages, and a
//! terminal reduction stops every channel for good.

pub mod handle;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::{ChannelEnvelope, ChannelPayload, FallbackPoller, PushSession, StatusSource};
use crate::config::{CostModel, SyncTuning};
use crate::domain::{JobSeed, JobState, SyncOp};
use crate::event_log::SyncEventLog;
use crate::wire::{normalize_push, normalize_report, parse_push_line};

pub use handle::{spawn_sync, SyncHandle};

/// Which delivery mode the coordinator is in. Independent of the job phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelActivity {
    /// No job under observation.
    Initial,
    /// Live push stream; poller idle.
    PushPreferred,
    /// Push down; polling until a reconnect succeeds.
    PollFallback,
    /// Terminal state reached; both channels stopped for good.
    Settled,
}

impl ChannelActivity {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelActivity::Initial => "initial",
            ChannelActivity::PushPreferred => "push",
            ChannelActivity::PollFallback => "poll",
            ChannelActivity::Settled => "settled",
        }
    }
}

impl std::fmt::Display for ChannelActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Read model broadcast after every processed envelope.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot {
    pub activity: ChannelActivity,
    pub generation: u64,
    pub job: Option<JobState>,
    /// Derived from aggregate tokens on every broadcast, never stored.
    pub estimated_cost: f64,
}

impl SyncSnapshot {
    pub fn initial() -> Self {
        Self {
            activity: ChannelActivity::Initial,
            generation: 0,
            job: None,
            estimated_cost: 0.0,
        }
    }
}

impl From<&SyncState> for SyncSnapshot {
    fn from(state: &SyncState) -> Self {
        let tokens = state.job.as_ref().map_or(0, |job| job.aggregate_tokens);
        Self {
            activity: state.activity,
            generation: state.generation,
            job: state.job.clone(),
            estimated_cost: state.cost.estimate(tokens),
        }
    }
}

/// Messages accepted by the coordinator.
pub enum SyncMessage {
    /// Begin observing a job under a fresh generation, discarding any
    /// observation in progress.
    Observe(JobSeed),
    /// Envelope from either channel.
    Channel(ChannelEnvelope),
    /// Reconnect timer fired for the given generation.
    RetryPush { generation: u64 },
    /// Discard job state, stop channels, return to Initial.
    Reset(oneshot::Sender<()>),
    /// Read the current snapshot through the mailbox.
    GetSnapshot(oneshot::Sender<SyncSnapshot>),
}

/// Arguments for spawning the coordinator.
pub struct SyncArgs {
    /// Push listener address (`host:port`).
    pub events_addr: String,
    /// Source of full status reports for the fallback poller.
    pub source: Arc<dyn StatusSource>,
    /// Timing knobs.
    pub tuning: SyncTuning,
    /// Cost model for the snapshot readout.
    pub cost: CostModel,
    /// Watch sender broadcasting snapshots.
    pub snapshot_tx: watch::Sender<SyncSnapshot>,
    /// Optional JSONL event log.
    pub event_log: Option<Arc<SyncEventLog>>,
}

/// State maintained by the coordinator actor.
pub struct SyncState {
    events_addr: String,
    source: Arc<dyn StatusSource>,
    tuning: SyncTuning,
    cost: CostModel,
    snapshot_tx: watch::Sender<SyncSnapshot>,
    event_log: Option<Arc<SyncEventLog>>,
    envelope_tx: mpsc::UnboundedSender<ChannelEnvelope>,
    generation: u64,
    activity: ChannelActivity,
    job: Option<JobState>,
    push: Option<PushSession>,
    poller: FallbackPoller,
    retry: Option<JoinHandle<()>>,
    attempts: u32,
}

impl SyncState {
    fn begin_observation(&mut self, seed: JobSeed) {
        self.halt_channels();
        self.generation += 1;
        self.attempts = 0;
        info!(job = %seed.job_id, generation = self.generation, "Observation started");
        let job = JobState::from_seed(&seed);
        let already_terminal = job.terminal();
        self.job = Some(job);
        if already_terminal {
            // Nothing will ever change; do not open channels at all.
            self.settle();
            self.broadcast();
            return;
        }
        self.set_activity(ChannelActivity::PushPreferred);
        self.spawn_push();
        self.broadcast();
    }

    fn on_envelope(&mut self, envelope: ChannelEnvelope, myself: &ActorRef<SyncMessage>) {
        if envelope.generation != self.generation {
            debug!(
                envelope_generation = envelope.generation,
                current_generation = self.generation,
                "Dropping stale envelope"
            );
            return;
        }
        // A terminal reduction can leave already-queued envelopes from the
        // same generation behind it. Settled means settled.
        if matches!(
            self.activity,
            ChannelActivity::Settled | ChannelActivity::Initial
        ) {
            debug!("Dropping envelope outside an active observation");
            return;
        }

        match envelope.payload {
            ChannelPayload::PushOpened => {
                self.attempts = 0;
                self.poller.stop();
                self.log_channel("push", "opened");
                self.set_activity(ChannelActivity::PushPreferred);
                self.broadcast();
            }
            ChannelPayload::PushRaw(line) => {
                if let Some(op) = parse_push_line(&line).and_then(normalize_push) {
                    self.reduce(op);
                }
            }
            ChannelPayload::PollSnapshot(report) => {
                self.reduce(normalize_report(report));
            }
            ChannelPayload::PushClosed { reason } => {
                let detail = match reason {
                    Some(reason) => format!("closed: {}", reason),
                    None => "closed".to_string(),
                };
                self.log_channel("push", &detail);
                self.push = None;
                self.enter_poll_fallback(myself);
            }
            ChannelPayload::PushFailed(reason) => {
                self.log_channel("push", &format!("failed: {}", reason));
                self.push = None;
                self.enter_poll_fallback(myself);
            }
            ChannelPayload::PollFailed(reason) => {
                // The poller keeps its own schedule across failures.
                self.log_channel("poll", &format!("failed: {}", reason));
            }
        }
    }

    fn reduce(&mut self, op: SyncOp) {
        let Some(job) = self.job.as_mut() else {
            debug!("Dropping operation with no job under observation");
            return;
        };
        let job_id = job.job_id.clone();
        if let Some(log) = &self.event_log {
            log.log_sync_op(&job_id, &op);
        }

        let changes = job.apply(&op);
        let now_terminal = job.terminal();
        for change in &changes {
            debug!(job = %job_id, ?change, "State change");
            if let Some(log) = &self.event_log {
                log.log_state_change(&job_id, change);
            }
        }

        if now_terminal && self.activity != ChannelActivity::Settled {
            self.settle();
        }
        self.broadcast();
    }

    fn enter_poll_fallback(&mut self, myself: &ActorRef<SyncMessage>) {
        let Some(job) = &self.job else {
            return;
        };
        let job_id = job.job_id.clone();
        self.set_activity(ChannelActivity::PollFallback);
        self.poller.start(
            self.source.clone(),
            job_id,
            self.generation,
            self.tuning.poll_interval(),
            self.envelope_tx.clone(),
        );
        self.schedule_retry(myself);
        self.broadcast();
    }

    fn schedule_retry(&mut self, myself: &ActorRef<SyncMessage>) {
        if let Some(task) = self.retry.take() {
            task.abort();
        }
        let delay = backoff_delay(
            self.tuning.reconnect_base(),
            self.tuning.reconnect_max(),
            self.attempts,
        );
        self.attempts = self.attempts.saturating_add(1).min(10);
        debug!(?delay, attempt = self.attempts, "Push reconnect scheduled");

        let generation = self.generation;
        let actor = myself.clone();
        self.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = actor.send_message(SyncMessage::RetryPush { generation });
        }));
    }

    fn on_retry(&mut self, generation: u64) {
        if generation != self.generation || self.activity != ChannelActivity::PollFallback {
            debug!("Ignoring stale reconnect timer");
            return;
        }
        self.log_channel("push", "reconnecting");
        self.spawn_push();
    }

    fn spawn_push(&mut self) {
        let Some(job) = &self.job else {
            return;
        };
        if let Some(push) = self.push.take() {
            push.disconnect();
        }
        self.push = Some(PushSession::spawn(
            self.events_addr.clone(),
            job.job_id.clone(),
            self.generation,
            self.tuning.connect_timeout(),
            self.envelope_tx.clone(),
        ));
    }

    fn settle(&mut self) {
        info!("Job reached a terminal state; stopping channels");
        self.halt_channels();
        self.set_activity(ChannelActivity::Settled);
    }

    fn reset(&mut self) {
        info!(generation = self.generation, "Reset: discarding job state");
        self.halt_channels();
        self.generation += 1;
        self.attempts = 0;
        self.job = None;
        self.set_activity(ChannelActivity::Initial);
        self.broadcast();
    }

    fn halt_channels(&mut self) {
        if let Some(push) = self.push.take() {
            push.disconnect();
        }
        self.poller.stop();
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }

    fn set_activity(&mut self, next: ChannelActivity) {
        if self.activity == next {
            return;
        }
        info!(from = %self.activity, to = %next, "Channel activity changed");
        if let Some(log) = &self.event_log {
            log.log_activity(self.activity.label(), next.label());
        }
        self.activity = next;
    }

    fn log_channel(&self, channel: &str, detail: &str) {
        if let Some(log) = &self.event_log {
            log.log_channel(channel, detail);
        }
    }

    fn broadcast(&self) {
        let _ = self.snapshot_tx.send(SyncSnapshot::from(self));
    }
}

/// The coordinator actor.
pub struct SyncCoordinator;

#[async_trait]
impl Actor for SyncCoordinator {
    type Msg = SyncMessage;
    type State = SyncState;
    type Arguments = SyncArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (envelope_tx, mut envelope_rx) = mpsc::unbounded_channel();

        // Channels write to a plain mpsc sender; this pump owns the receiving
        // end and feeds the mailbox until the actor goes away.
        let forwarder = myself.clone();
        tokio::spawn(async move {
            while let Some(envelope) = envelope_rx.recv().await {
                if forwarder.send_message(SyncMessage::Channel(envelope)).is_err() {
                    return;
                }
            }
        });

        Ok(SyncState {
            events_addr: args.events_addr,
            source: args.source,
            tuning: args.tuning,
            cost: args.cost,
            snapshot_tx: args.snapshot_tx,
            event_log: args.event_log,
            envelope_tx,
            generation: 0,
            activity: ChannelActivity::Initial,
            job: None,
            push: None,
            poller: FallbackPoller::new(),
            retry: None,
            attempts: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SyncMessage::Observe(seed) => state.begin_observation(seed),
            SyncMessage::Channel(envelope) => state.on_envelope(envelope, &myself),
            SyncMessage::RetryPush { generation } => state.on_retry(generation),
            SyncMessage::Reset(reply) => {
                state.reset();
                if reply.send(()).is_err() {
                    debug!("Reset reply channel closed");
                }
            }
            SyncMessage::GetSnapshot(reply) => {
                if reply.send(SyncSnapshot::from(&*state)).is_err() {
                    debug!("Snapshot reply channel closed");
                }
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.halt_channels();
        Ok(())
    }
}

/// Backoff delay before the next push reconnect attempt.
fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let delay_ms = base_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(max_ms);
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
