//! Fallback poller: periodic full-status fetches while the push channel is
//! down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::channel::{ChannelEnvelope, ChannelPayload};
use crate::domain::JobId;
use crate::wire::StatusReport;

/// Anything that can produce a full status report for one job. The HTTP
/// client implements this; tests substitute scripted sources.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self, job: &JobId) -> Result<StatusReport>;
}

/// Periodic poll loop with idempotent start/stop.
pub struct FallbackPoller {
    task: Option<JoinHandle<()>>,
}

impl FallbackPoller {
    pub fn new() -> Self {
        Self { task: None }
    }

    /// Starts polling. The first fetch fires immediately, then every
    /// `interval`. Calling while already active is a no-op, so the loop can
    /// never be double-scheduled.
    pub fn start(
        &mut self,
        source: Arc<dyn StatusSource>,
        job_id: JobId,
        generation: u64,
        interval: Duration,
        tx: mpsc::UnboundedSender<ChannelEnvelope>,
    ) {
        if self.is_active() {
            debug!(job = %job_id, "Poller already active; start ignored");
            return;
        }
        self.task = Some(tokio::spawn(async move {
            run_poll_loop(source, job_id, generation, interval, tx).await;
        }));
    }

    /// Stops polling. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Default for FallbackPoller {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_poll_loop(
    source: Arc<dyn StatusSource>,
    job_id: JobId,
    generation: u64,
    interval: Duration,
    tx: mpsc::UnboundedSender<ChannelEnvelope>,
) {
    let mut ticker = tokio::time::interval(interval);
    // A fetch that overruns the interval delays the next tick instead of
    // bursting to catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let payload = match source.fetch(&job_id).await {
            Ok(report) => {
                debug!(job = %job_id, "Poll fetched report");
                ChannelPayload::PollSnapshot(report)
            }
            Err(error) => {
                warn!(job = %job_id, %error, "Poll fetch failed");
                ChannelPayload::PollFailed(error.to_string())
            }
        };
        if tx.send(ChannelEnvelope { generation, payload }).is_err() {
            return;
        }
    }
}

#[cfg(test)]
#[path = "tests/poller_tests.rs"]
mod tests;
