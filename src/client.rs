//! Blocking HTTP client for the orchestration service, plus the async
//! adapter that lets the fallback poller use it as a status source.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::channel::StatusSource;
use crate::domain::JobId;
use crate::wire::{BriefAck, BriefRequest, StatusReport};

const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin blocking client for the orchestration HTTP API.
#[derive(Clone)]
pub struct OrchestratorClient {
    agent: ureq::Agent,
    base_url: String,
}

impl OrchestratorClient {
    pub fn new(base_url: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(API_TIMEOUT))
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Submits a brief and returns the acknowledgement that seeds job state.
    pub fn submit_brief(&self, request: &BriefRequest) -> Result<BriefAck> {
        let body = serde_json::to_string(request).context("Failed to serialize brief request")?;
        let url = format!("{}/orchestrate/brief", self.base_url);

        let response: String = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&body)
            .context("Failed to submit brief")?
            .body_mut()
            .read_to_string()
            .context("Failed to read brief response")?;

        serde_json::from_str(&response).context("Failed to parse brief acknowledgement")
    }

    /// Fetches the full status report for one job.
    pub fn fetch_status(&self, job: &JobId) -> Result<StatusReport> {
        let url = format!("{}/orchestrate/status/{}", self.base_url, job.as_str());

        let response: String = self
            .agent
            .get(url.as_str())
            .call()
            .context("Failed to fetch job status")?
            .body_mut()
            .read_to_string()
            .context("Failed to read status response")?;

        serde_json::from_str(&response).context("Failed to parse status report")
    }

    /// Asks the service to cancel a running job.
    pub fn cancel_job(&self, job: &JobId) -> Result<()> {
        let url = format!("{}/orchestrate/job/{}", self.base_url, job.as_str());

        self.agent
            .delete(url.as_str())
            .call()
            .context("Failed to cancel job")?;

        Ok(())
    }
}

/// Runs the blocking client on the blocking pool so the poller can await it.
pub struct HttpStatusSource {
    client: OrchestratorClient,
}

impl HttpStatusSource {
    pub fn new(client: OrchestratorClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self, job: &JobId) -> Result<StatusReport> {
        let client = self.client.clone();
        let job = job.clone();
        tokio::task::spawn_blocking(move || client.fetch_status(&job))
            .await
            .context("Status fetch worker panicked")?
    }
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
