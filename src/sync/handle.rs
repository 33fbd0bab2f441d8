//! Consumer-facing handle over the coordinator actor.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ractor::{Actor, ActorRef};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::channel::StatusSource;
use crate::config::{CostModel, SyncTuning};
use crate::domain::JobSeed;
use crate::event_log::SyncEventLog;
use crate::sync::{SyncArgs, SyncCoordinator, SyncMessage, SyncSnapshot};

/// Cloneable handle for observing and controlling the coordinator.
#[derive(Clone)]
pub struct SyncHandle {
    actor: ActorRef<SyncMessage>,
    snapshot_rx: watch::Receiver<SyncSnapshot>,
}

impl SyncHandle {
    /// Starts observing a job, replacing any observation in progress.
    pub fn observe(&self, seed: JobSeed) -> Result<()> {
        self.actor
            .send_message(SyncMessage::Observe(seed))
            .map_err(|_| anyhow!("Coordinator is not running"))
    }

    /// Discards job state and stops both channels; resolves once the
    /// coordinator has processed the reset.
    pub async fn reset(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.actor
            .send_message(SyncMessage::Reset(tx))
            .map_err(|_| anyhow!("Coordinator is not running"))?;
        rx.await.context("Coordinator dropped the reset reply")
    }

    /// Current snapshot, read through the mailbox so it reflects every
    /// envelope processed so far.
    pub async fn snapshot(&self) -> Result<SyncSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.actor
            .send_message(SyncMessage::GetSnapshot(tx))
            .map_err(|_| anyhow!("Coordinator is not running"))?;
        rx.await.context("Coordinator dropped the snapshot reply")
    }

    /// Watch stream of snapshots; one value per processed envelope.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Stops the coordinator.
    pub fn shutdown(&self) {
        self.actor.stop(None);
    }
}

/// Spawns the coordinator and returns the consumer handle plus the actor's
/// join handle.
pub async fn spawn_sync(
    events_addr: String,
    source: Arc<dyn StatusSource>,
    tuning: SyncTuning,
    cost: CostModel,
    event_log: Option<Arc<SyncEventLog>>,
) -> Result<(SyncHandle, JoinHandle<()>)> {
    let (snapshot_tx, snapshot_rx) = watch::channel(SyncSnapshot::initial());
    let args = SyncArgs {
        events_addr,
        source,
        tuning,
        cost,
        snapshot_tx,
        event_log,
    };

    let (actor, task) = SyncCoordinator::spawn(None, SyncCoordinator, args)
        .await
        .context("Failed to spawn sync coordinator")?;

    Ok((SyncHandle { actor, snapshot_rx }, task))
}
