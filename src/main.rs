mod channel;
mod client;
mod config;
mod domain;
mod event_log;
mod sync;
mod wire;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use client::{HttpStatusSource, OrchestratorClient};
use config::Config;
use domain::{JobId, JobSeed, Phase};
use event_log::SyncEventLog;
use sync::{spawn_sync, ChannelActivity, SyncHandle, SyncSnapshot};
use wire::{seed_from_ack, BriefRequest};

#[derive(Parser)]
#[command(name = "briefwatch")]
#[command(about = "Submit a product brief and watch the multi-agent build live")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BRIEFWATCH_GIT_SHA"), ")"))]
#[command(arg_required_else_help = true)]
struct Cli {
    /// The product brief - what you want built (all arguments are joined)
    #[arg(trailing_var_arg = true)]
    brief: Vec<String>,

    /// Target framework for the generated code
    #[arg(short, long, default_value = "react")]
    framework: String,

    /// Teams to dispatch to (comma-separated; empty lets the service decide)
    #[arg(short, long, value_delimiter = ',')]
    team: Vec<String>,

    /// Style preferences as a JSON object, e.g. '{"theme":"dark"}'
    #[arg(long, value_name = "JSON")]
    style: Option<String>,

    /// Attach to an already-running job instead of submitting a brief
    #[arg(long, value_name = "JOB_ID")]
    watch_job: Option<String>,

    /// Config file (defaults to ~/.briefwatch/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the final state as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Ask the service to cancel the job when interrupted
    #[arg(long)]
    cancel_on_interrupt: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if cli.brief.is_empty() && cli.watch_job.is_none() {
        bail!("Provide a brief to submit, or --watch-job to attach to a running job");
    }

    let config = Config::load(cli.config.as_deref())?;

    let event_log = match &config.log_dir {
        Some(dir) => {
            let log = SyncEventLog::new(dir)?;
            eprintln!("[briefwatch] Event log: {}", log.path().display());
            Some(Arc::new(log))
        }
        None => None,
    };

    let client = OrchestratorClient::new(&config.service.base_url);

    let seed = match &cli.watch_job {
        Some(job_id) => JobSeed::bare(JobId::from(job_id.clone())),
        None => {
            let style = cli.style.as_deref().map(parse_style).transpose()?;
            let request = BriefRequest {
                brief: cli.brief.join(" "),
                target_framework: cli.framework.clone(),
                style_preferences: style,
                include_teams: cli.team.clone(),
            };
            let ack = client
                .submit_brief(&request)
                .context("Brief submission failed")?;
            eprintln!("[briefwatch] Job accepted: {}", ack.job_id);
            seed_from_ack(ack)
        }
    };
    let job_id = seed.job_id.clone();

    let source = Arc::new(HttpStatusSource::new(client.clone()));
    let (handle, _coordinator) = spawn_sync(
        config.service.events_addr.clone(),
        source,
        config.sync.clone(),
        config.cost.clone(),
        event_log,
    )
    .await?;

    handle.observe(seed)?;

    let outcome = watch_until_settled(&handle, &client, &job_id, cli.cancel_on_interrupt).await?;
    handle.shutdown();

    print_outcome(&outcome, cli.json)?;

    if outcome.job.as_ref().is_some_and(|job| job.phase == Phase::Error) {
        bail!("Job {} ended in error", job_id);
    }
    Ok(())
}

/// Streams status to stderr until the job settles or the user interrupts.
async fn watch_until_settled(
    handle: &SyncHandle,
    client: &OrchestratorClient,
    job_id: &JobId,
    cancel_on_interrupt: bool,
) -> Result<SyncSnapshot> {
    let mut rx = handle.subscribe();
    let mut printed_thoughts = 0;

    loop {
        tokio::select! {
            changed = rx.changed() => {
                changed.context("Coordinator stopped unexpectedly")?;
                let snapshot = rx.borrow_and_update().clone();
                render_status(&snapshot);
                if let Some(job) = &snapshot.job {
                    for thought in job.feed.iter().skip(printed_thoughts) {
                        eprintln!("    [{}] {}", thought.source, thought.text);
                    }
                    printed_thoughts = job.feed.len();
                }
                if snapshot.activity == ChannelActivity::Settled {
                    // Read the final state back through the mailbox so nothing
                    // broadcast after our borrow is missed.
                    return handle.snapshot().await;
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for interrupt")?;
                let last = rx.borrow_and_update().clone();
                eprintln!("[briefwatch] Interrupted; detaching from job {}", job_id);
                handle.reset().await?;
                if cancel_on_interrupt {
                    match cancel_job(client, job_id).await {
                        Ok(()) => eprintln!("[briefwatch] Cancel requested for job {}", job_id),
                        Err(error) => warn!(%error, "Cancel request failed"),
                    }
                }
                return Ok(last);
            }
        }
    }
}

/// The service only accepts style preferences as a JSON object, so the
/// flag value must parse as one.
fn parse_style(raw: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    serde_json::from_str(raw)
        .with_context(|| format!("--style must be a JSON object, got {:?}", raw))
}

async fn cancel_job(client: &OrchestratorClient, job_id: &JobId) -> Result<()> {
    let client = client.clone();
    let job = job_id.clone();
    tokio::task::spawn_blocking(move || client.cancel_job(&job))
        .await
        .context("Cancel worker panicked")?
}

fn render_status(snapshot: &SyncSnapshot) {
    let Some(job) = &snapshot.job else {
        return;
    };
    let teams = job
        .teams
        .iter()
        .map(|(team, state)| format!("{}:{}", team, state.status))
        .collect::<Vec<_>>()
        .join(" ");
    let elapsed = job.elapsed_since(Utc::now()).num_seconds();
    eprintln!(
        "[{}][{:>4}s] phase={} tokens={} cost=${:.4} {}",
        snapshot.activity, elapsed, job.phase, job.aggregate_tokens, snapshot.estimated_cost, teams
    );
}

fn print_outcome(snapshot: &SyncSnapshot, json: bool) -> Result<()> {
    if json {
        let encoded =
            serde_json::to_string_pretty(snapshot).context("Failed to encode final state")?;
        println!("{}", encoded);
        return Ok(());
    }

    let Some(job) = &snapshot.job else {
        println!("No job state observed.");
        return Ok(());
    };

    println!();
    println!("Job {}: {}", job.job_id, job.phase);
    if let Some(note) = &job.phase_note {
        println!("  note: {}", note);
    }
    if let Some(error) = &job.last_error {
        println!("  error: {}", error);
    }
    for (team, state) in &job.teams {
        let artifact = match &state.generated_code {
            Some(code) => format!("{} bytes of code", code.len()),
            None => "no code".to_string(),
        };
        let model = state.model_used.as_deref().unwrap_or("unknown model");
        println!(
            "  {}: {} ({}, {} tokens, {})",
            team, state.status, model, state.token_count, artifact
        );
        if let Some(message) = &state.error_message {
            println!("    error: {}", message);
        }
    }
    println!(
        "  elapsed {}s, {} tokens, estimated cost ${:.4}",
        job.elapsed_since(Utc::now()).num_seconds(),
        job.aggregate_tokens,
        snapshot.estimated_cost
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_flag_parses_json_object() {
        let style =
            parse_style(r##"{"theme":"dark","accent":"#7f5af0"}"##).expect("parse should succeed");
        assert_eq!(style["theme"], "dark");
        assert_eq!(style["accent"], "#7f5af0");
    }

    #[test]
    fn style_flag_rejects_plain_text() {
        assert!(parse_style("dark mode").is_err());
        assert!(parse_style(r#""dark mode""#).is_err());
    }
}
