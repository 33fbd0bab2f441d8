use super::*;

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;

use crate::domain::{JobId, Phase, TeamId, TeamSeed, TeamStatus, ThoughtId};
use crate::wire::protocol::{TeamReport, ThoughtData};
use crate::wire::StatusReport;

/// Serves scripted reports in order, repeating the last one forever. An
/// empty script makes every fetch fail.
struct ScriptedSource {
    reports: Mutex<VecDeque<StatusReport>>,
}

impl ScriptedSource {
    fn new(reports: Vec<StatusReport>) -> Arc<Self> {
        Arc::new(Self {
            reports: Mutex::new(reports.into_iter().collect()),
        })
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn fetch(&self, _job: &JobId) -> Result<StatusReport> {
        let mut reports = self.reports.lock().expect("Failed to lock reports");
        match reports.len() {
            0 => Err(anyhow::anyhow!("no report scripted")),
            1 => Ok(reports.front().cloned().expect("front exists")),
            _ => Ok(reports.pop_front().expect("pop exists")),
        }
    }
}

fn pending(name: &str) -> (TeamId, TeamSeed) {
    (
        TeamId::from(name),
        TeamSeed {
            status: TeamStatus::Pending,
            model: None,
        },
    )
}

fn seed() -> JobSeed {
    JobSeed {
        job_id: JobId::from("job-1"),
        phase: Phase::Received,
        teams: [pending("anthropic"), pending("google")].into(),
    }
}

fn tuning() -> SyncTuning {
    SyncTuning {
        poll_interval_ms: 250,
        connect_timeout_ms: 1000,
        reconnect_base_ms: 100,
        reconnect_max_ms: 400,
    }
}

fn report(status: &str, teams: Vec<(&str, TeamReport)>) -> StatusReport {
    StatusReport {
        job_id: JobId::from("job-1"),
        status: status.to_string(),
        progress: None,
        teams: teams
            .into_iter()
            .map(|(name, team)| (name.to_string(), team))
            .collect(),
    }
}

fn team_report(status: &str) -> TeamReport {
    TeamReport {
        status: status.to_string(),
        thoughts: Vec::new(),
        generated_code: None,
        token_count: 0,
        model_used: None,
        error_message: None,
    }
}

fn thought_data(id: &str) -> ThoughtData {
    ThoughtData {
        id: id.to_string(),
        text: format!("thought {}", id),
        timestamp: None,
        source: None,
    }
}

fn phase_line(phase: &str) -> String {
    format!(
        r#"{{"type":"phase_change","job_id":"job-1","data":{{"phase":"{}"}}}}"#,
        phase
    )
}

fn status_line(team: &str, status: &str) -> String {
    format!(
        r#"{{"type":"status_change","job_id":"job-1","team":"{}","data":{{"status":"{}"}}}}"#,
        team, status
    )
}

fn thought_line(team: &str, id: &str, text: &str) -> String {
    format!(
        r#"{{"type":"thought_added","job_id":"job-1","team":"{}","data":{{"id":"{}","text":"{}"}}}}"#,
        team, id, text
    )
}

async fn send_lines(write_half: &mut OwnedWriteHalf, lines: &[String]) {
    for line in lines {
        write_half
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .expect("Failed to write event line");
    }
}

async fn start(
    addr: String,
    source: Arc<dyn StatusSource>,
) -> (SyncHandle, watch::Receiver<SyncSnapshot>) {
    let (handle, _task) = spawn_sync(addr, source, tuning(), CostModel::default(), None)
        .await
        .expect("Failed to spawn coordinator");
    let rx = handle.subscribe();
    (handle, rx)
}

async fn wait_for<F>(
    rx: &mut watch::Receiver<SyncSnapshot>,
    what: &str,
    predicate: F,
) -> SyncSnapshot
where
    F: Fn(&SyncSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        {
            let snapshot = rx.borrow_and_update();
            if predicate(&snapshot) {
                return snapshot.clone();
            }
        }
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_else(|| panic!("Timed out waiting for {}", what));
        tokio::time::timeout(remaining, rx.changed())
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for {}", what))
            .expect("Coordinator dropped the snapshot channel");
    }
}

#[tokio::test]
async fn observe_prefers_push_and_reduces_events() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener
        .local_addr()
        .expect("Failed to read addr")
        .to_string();
    let (handle, mut rx) = start(addr, ScriptedSource::new(Vec::new())).await;
    handle.observe(seed()).expect("Failed to observe");

    let (stream, _) = listener.accept().await.expect("Failed to accept");
    let (read_half, mut write_half) = stream.into_split();
    let mut server_lines = BufReader::new(read_half).lines();
    let observe_line = server_lines
        .next_line()
        .await
        .expect("Failed to read observe")
        .expect("Observe line missing");
    assert_eq!(observe_line, r#"{"type":"observe","job_id":"job-1"}"#);

    wait_for(&mut rx, "push activity", |s| {
        s.activity == ChannelActivity::PushPreferred && s.job.is_some()
    })
    .await;

    // The duplicated thought must be dropped on arrival.
    send_lines(
        &mut write_half,
        &[
            phase_line("planning"),
            status_line("anthropic", "thinking"),
            thought_line("anthropic", "t1", "Analyzing the brief"),
            thought_line("anthropic", "t1", "Analyzing the brief"),
        ],
    )
    .await;

    wait_for(&mut rx, "reduced push events", |s| {
        s.job
            .as_ref()
            .is_some_and(|j| j.phase == Phase::Planning && !j.feed.is_empty())
    })
    .await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let snapshot = handle.snapshot().await.expect("Failed to snapshot");
    let job = snapshot.job.expect("Job must be present");
    assert_eq!(job.phase, Phase::Planning);
    let team = &job.teams[&TeamId::from("anthropic")];
    assert_eq!(team.status, TeamStatus::Thinking);
    assert_eq!(team.thoughts.len(), 1);
    assert_eq!(job.feed.len(), 1);
    assert_eq!(job.teams[&TeamId::from("google")].status, TeamStatus::Pending);
    handle.shutdown();
}

#[tokio::test]
async fn lost_push_falls_back_to_polling() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener
        .local_addr()
        .expect("Failed to read addr")
        .to_string();
    drop(listener);

    let mut generating = team_report("generating");
    generating.token_count = 40;
    let source = ScriptedSource::new(vec![report("dispatching", vec![("anthropic", generating)])]);

    let (handle, mut rx) = start(addr, source).await;
    handle.observe(seed()).expect("Failed to observe");

    wait_for(&mut rx, "poll fallback", |s| {
        s.activity == ChannelActivity::PollFallback
    })
    .await;
    let snapshot = wait_for(&mut rx, "polled state", |s| {
        s.job.as_ref().is_some_and(|j| j.phase == Phase::Dispatching)
    })
    .await;

    let job = snapshot.job.expect("Job must be present");
    let team = &job.teams[&TeamId::from("anthropic")];
    assert_eq!(team.status, TeamStatus::Generating);
    assert_eq!(team.token_count, 40);
    assert_eq!(job.aggregate_tokens, 40);
    // 40 tokens at the default 0.015 USD per 1k.
    assert!((snapshot.estimated_cost - 0.0006).abs() < 1e-9);
    handle.shutdown();
}

#[tokio::test]
async fn push_reconnects_after_fallback() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener
        .local_addr()
        .expect("Failed to read addr")
        .to_string();
    drop(listener);

    let source = ScriptedSource::new(vec![report("planning", Vec::new())]);
    let (handle, mut rx) = start(addr.clone(), source).await;
    handle.observe(seed()).expect("Failed to observe");

    wait_for(&mut rx, "poll fallback", |s| {
        s.activity == ChannelActivity::PollFallback
    })
    .await;

    // Free the port again; a scheduled reconnect should find it listening.
    let listener = TcpListener::bind(&addr).await.expect("Failed to rebind");
    let (stream, _) = listener.accept().await.expect("Failed to accept");
    let (read_half, mut write_half) = stream.into_split();
    let mut server_lines = BufReader::new(read_half).lines();
    let observe_line = server_lines
        .next_line()
        .await
        .expect("Failed to read observe")
        .expect("Observe line missing");
    assert!(observe_line.contains("job-1"));

    wait_for(&mut rx, "push preferred again", |s| {
        s.activity == ChannelActivity::PushPreferred
    })
    .await;

    send_lines(&mut write_half, &[phase_line("dispatching")]).await;
    wait_for(&mut rx, "dispatching over push", |s| {
        s.job.as_ref().is_some_and(|j| j.phase == Phase::Dispatching)
    })
    .await;
    handle.shutdown();
}

#[tokio::test]
async fn terminal_event_settles_and_stops_channels() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener
        .local_addr()
        .expect("Failed to read addr")
        .to_string();
    let (handle, mut rx) = start(addr, ScriptedSource::new(Vec::new())).await;
    handle.observe(seed()).expect("Failed to observe");

    let (stream, _) = listener.accept().await.expect("Failed to accept");
    let (read_half, mut write_half) = stream.into_split();
    let mut server_lines = BufReader::new(read_half).lines();
    let _ = server_lines.next_line().await.expect("Failed to read observe");
    send_lines(&mut write_half, &[phase_line("complete")]).await;

    let settled = wait_for(&mut rx, "settled", |s| {
        s.activity == ChannelActivity::Settled
    })
    .await;
    assert_eq!(settled.job.as_ref().map(|j| j.phase), Some(Phase::Complete));

    // Anything written after settling must be ignored.
    let _ = write_half
        .write_all(format!("{}\n", phase_line("error")).as_bytes())
        .await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let final_snapshot = handle.snapshot().await.expect("Failed to snapshot");
    assert_eq!(final_snapshot.activity, ChannelActivity::Settled);
    assert_eq!(
        final_snapshot.job.as_ref().map(|j| j.phase),
        Some(Phase::Complete)
    );
    handle.shutdown();
}

#[tokio::test]
async fn push_and_poll_merge_without_duplicates() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener
        .local_addr()
        .expect("Failed to read addr")
        .to_string();

    let mut mid = team_report("generating");
    mid.thoughts = vec![thought_data("t1"), thought_data("t2")];
    mid.token_count = 40;
    let mut done = team_report("complete");
    done.thoughts = vec![thought_data("t1"), thought_data("t2")];
    done.generated_code = Some("<html></html>".to_string());
    done.token_count = 40;
    let source = ScriptedSource::new(vec![
        report("dispatching", vec![("anthropic", mid)]),
        report("complete", vec![("anthropic", done)]),
    ]);

    let (handle, mut rx) = start(addr, source).await;
    handle.observe(seed()).expect("Failed to observe");

    let (stream, _) = listener.accept().await.expect("Failed to accept");
    // Close the listening socket so the reconnect attempts stay failing and
    // the poller keeps driving the job to completion.
    drop(listener);
    let (read_half, mut write_half) = stream.into_split();
    let mut server_lines = BufReader::new(read_half).lines();
    let _ = server_lines.next_line().await.expect("Failed to read observe");
    send_lines(
        &mut write_half,
        &[
            phase_line("planning"),
            status_line("anthropic", "thinking"),
            thought_line("anthropic", "t1", "Analyzing the brief"),
        ],
    )
    .await;
    write_half.shutdown().await.expect("Failed to shutdown");

    let settled = wait_for(&mut rx, "settled after polls", |s| {
        s.activity == ChannelActivity::Settled
    })
    .await;
    let job = settled.job.expect("Job must be present");
    assert_eq!(job.phase, Phase::Complete);

    let team = &job.teams[&TeamId::from("anthropic")];
    // t1 arrived first over push; the polled copy must neither duplicate it
    // nor replace its text.
    assert_eq!(team.thoughts.len(), 2);
    assert_eq!(team.thoughts[0].id, ThoughtId::from("t1"));
    assert_eq!(team.thoughts[0].text, "Analyzing the brief");
    assert_eq!(team.thoughts[1].id, ThoughtId::from("t2"));
    assert_eq!(team.status, TeamStatus::Complete);
    assert_eq!(team.generated_code.as_deref(), Some("<html></html>"));
    assert_eq!(team.token_count, 40);
    assert_eq!(job.aggregate_tokens, 40);
    assert_eq!(job.feed.len(), 2);
    handle.shutdown();
}

#[tokio::test]
async fn reset_discards_state_and_blocks_stale_deliveries() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener
        .local_addr()
        .expect("Failed to read addr")
        .to_string();
    let (handle, mut rx) = start(addr, ScriptedSource::new(Vec::new())).await;
    handle.observe(seed()).expect("Failed to observe");

    let (stream, _) = listener.accept().await.expect("Failed to accept");
    let (read_half, mut write_half) = stream.into_split();
    let mut server_lines = BufReader::new(read_half).lines();
    let _ = server_lines.next_line().await.expect("Failed to read observe");
    send_lines(&mut write_half, &[phase_line("planning")]).await;

    wait_for(&mut rx, "planning", |s| {
        s.job.as_ref().is_some_and(|j| j.phase == Phase::Planning)
    })
    .await;

    handle.reset().await.expect("Failed to reset");
    let after_reset = handle.snapshot().await.expect("Failed to snapshot");
    assert_eq!(after_reset.activity, ChannelActivity::Initial);
    assert!(after_reset.job.is_none());
    assert_eq!(after_reset.generation, 2);

    // The old session is gone; lines written now must never resurrect state.
    let _ = write_half
        .write_all(format!("{}\n", phase_line("dispatching")).as_bytes())
        .await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    let still_reset = handle.snapshot().await.expect("Failed to snapshot");
    assert!(still_reset.job.is_none());

    // A new observation starts clean under a fresh generation.
    handle.observe(seed()).expect("Failed to observe again");
    let (stream, _) = listener.accept().await.expect("Failed to accept again");
    let (_read_half, _write_half) = stream.into_split();
    let fresh = wait_for(&mut rx, "fresh observation", |s| {
        s.generation == 3 && s.job.is_some()
    })
    .await;
    assert_eq!(fresh.job.as_ref().map(|j| j.phase), Some(Phase::Received));
    handle.shutdown();
}

#[tokio::test]
async fn handle_reports_initial_snapshot() {
    let source = ScriptedSource::new(Vec::new());
    let (handle, rx) = start("127.0.0.1:9".to_string(), source).await;

    let watched = rx.borrow().clone();
    assert_eq!(watched.activity, ChannelActivity::Initial);
    assert_eq!(watched.generation, 0);
    assert!(watched.job.is_none());

    let snapshot = handle.snapshot().await.expect("Failed to snapshot");
    assert_eq!(snapshot.activity, ChannelActivity::Initial);
    assert!(snapshot.estimated_cost.abs() < 1e-12);
    handle.shutdown();
}

#[test]
fn backoff_delay_doubles_and_caps() {
    let base = Duration::from_millis(500);
    let max = Duration::from_secs(15);
    assert_eq!(backoff_delay(base, max, 0), Duration::from_millis(500));
    assert_eq!(backoff_delay(base, max, 1), Duration::from_secs(1));
    assert_eq!(backoff_delay(base, max, 2), Duration::from_secs(2));
    assert_eq!(backoff_delay(base, max, 5), Duration::from_secs(15)); // capped
    assert_eq!(backoff_delay(base, max, 64), Duration::from_secs(15)); // saturates
}
