//! Push channel: one persistent TCP connection carrying newline-delimited
//! JSON events for one observed job.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEnvelope, ChannelPayload};
use crate::domain::JobId;
use crate::wire::ClientMessage;

/// Handle to one push connection attempt. The session never reconnects on
/// its own: it reports closure or failure and leaves the decision to the
/// coordinator.
pub struct PushSession {
    task: JoinHandle<()>,
}

impl PushSession {
    /// Spawns the connection task and returns immediately. Outcomes arrive
    /// as envelopes: `PushOpened` once the observe handshake is written,
    /// `PushRaw` per line, then exactly one `PushClosed` or `PushFailed`.
    pub fn spawn(
        addr: String,
        job_id: JobId,
        generation: u64,
        connect_timeout: Duration,
        tx: mpsc::UnboundedSender<ChannelEnvelope>,
    ) -> Self {
        let task = tokio::spawn(async move {
            run_session(addr, job_id, generation, connect_timeout, tx).await;
        });
        Self { task }
    }

    /// Tears the connection down. Idempotent; aborting a finished task is a
    /// no-op.
    pub fn disconnect(&self) {
        self.task.abort();
    }
}

async fn run_session(
    addr: String,
    job_id: JobId,
    generation: u64,
    connect_timeout: Duration,
    tx: mpsc::UnboundedSender<ChannelEnvelope>,
) {
    let send = |payload: ChannelPayload| {
        let _ = tx.send(ChannelEnvelope { generation, payload });
    };

    let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(error)) => {
            warn!(%addr, %error, "Push connection failed");
            send(ChannelPayload::PushFailed(error.to_string()));
            return;
        }
        Err(_) => {
            warn!(%addr, ?connect_timeout, "Push connection timed out");
            send(ChannelPayload::PushFailed(format!(
                "connect timed out after {:?}",
                connect_timeout
            )));
            return;
        }
    };

    let (read_half, mut write_half) = stream.into_split();

    let observe = match serde_json::to_string(&ClientMessage::Observe {
        job_id: job_id.clone(),
    }) {
        Ok(line) => line,
        Err(error) => {
            send(ChannelPayload::PushFailed(format!(
                "encode observe request: {}",
                error
            )));
            return;
        }
    };
    if let Err(error) = write_half.write_all(format!("{}\n", observe).as_bytes()).await {
        send(ChannelPayload::PushFailed(format!(
            "send observe request: {}",
            error
        )));
        return;
    }

    info!(job = %job_id, %addr, "Push channel open");
    send(ChannelPayload::PushOpened);

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                debug!(bytes = line.len(), "Push line received");
                send(ChannelPayload::PushRaw(line));
            }
            Ok(None) => {
                info!(job = %job_id, "Push channel closed by remote");
                send(ChannelPayload::PushClosed { reason: None });
                return;
            }
            Err(error) => {
                warn!(job = %job_id, %error, "Push channel read failed");
                send(ChannelPayload::PushFailed(error.to_string()));
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/push_tests.rs"]
mod tests;
