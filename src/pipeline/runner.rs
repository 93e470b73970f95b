use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::db::JobStore;
use crate::errors::{with_retry, LanternError, RetryConfig};
use crate::live::JobLog;
use crate::models::{JobState, JobSummary, LogStream, Policy, ToolKind, ToolStatus};
use crate::normalize::{normalizer_for, CapturedOutput, NormalizeContext};
use crate::tools::{ExitOutcome, ToolAdapter, ToolHandle, ToolSettings};
use super::job::ActiveJob;

/// Knobs for one job's supervision.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Flush the running log to storage after this many new lines.
    pub log_flush_lines: usize,
    /// ...and at least this often while output is arriving.
    pub log_flush_interval: Duration,
    /// Added to the tool grace period before the watchdog abandons stragglers.
    pub watchdog_slack: Duration,
    pub retry: RetryConfig,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            log_flush_lines: 50,
            log_flush_interval: Duration::from_secs(2),
            watchdog_slack: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }
}

/// Everything the per-tool pumps report back. All tools share one channel,
/// so its receive order is the job log order.
enum RunnerMsg {
    Line {
        tool: ToolKind,
        stream: LogStream,
        text: String,
    },
    Finished {
        tool: ToolKind,
        outcome: ExitOutcome,
        captured: CapturedOutput,
    },
}

/// Owns one job from launch to finalization.
pub struct JobRunner {
    job: Arc<ActiveJob>,
    tools: Arc<ToolSettings>,
    store: Arc<dyn JobStore>,
    settings: RunnerSettings,
    skipped: Vec<(ToolKind, String)>,
}

impl JobRunner {
    pub fn new(
        job: Arc<ActiveJob>,
        tools: Arc<ToolSettings>,
        store: Arc<dyn JobStore>,
        settings: RunnerSettings,
    ) -> Self {
        Self { job, tools, store, settings, skipped: Vec::new() }
    }

    /// Mark a tool `skipped` instead of running it.
    pub fn skip_tool(mut self, tool: ToolKind, reason: impl Into<String>) -> Self {
        self.skipped.push((tool, reason.into()));
        self
    }

    /// Run every enabled tool, then persist. Returns the job's final state.
    pub async fn run(self) -> JobState {
        let outcome = self.execute().await;
        self.finalize(outcome).await
    }

    async fn execute(&self) -> JobState {
        let job = &self.job;
        let record = job.snapshot().await;
        let policy = record.policy;
        let targets = record.targets;

        info!(job_id = %job.id(), targets = targets.len(), policy = %policy.name, "Job starting");
        job.system_line(format!(
            "[*] Job {} against {} target(s): {}",
            job.id(),
            targets.len(),
            targets.join(", ")
        ));

        for (tool, reason) in &self.skipped {
            job.set_tool_status(*tool, ToolStatus::Skipped).await;
            job.system_line(format!("[-] {} skipped: {}", tool.display_name(), reason));
        }

        let mut pending: VecDeque<ToolAdapter> = VecDeque::new();
        for tool in policy.enabled_tools() {
            if self.skipped.iter().any(|(t, _)| *t == tool) {
                continue;
            }
            let adapter = ToolAdapter::new(tool, Arc::clone(&self.tools));
            match adapter.resolve() {
                Ok(path) => {
                    debug!(job_id = %job.id(), tool = %tool, path = %path.display(), "Tool resolved");
                    pending.push_back(adapter);
                }
                Err(e) => {
                    warn!(job_id = %job.id(), tool = %tool, error = %e, "Tool unavailable");
                    job.set_tool_status(tool, ToolStatus::Unavailable).await;
                    job.system_line(format!("[!] {} unavailable: {}", tool.display_name(), e));
                }
            }
        }

        let limit = policy.concurrency.max(1) as usize;
        let (tx, mut rx) = mpsc::unbounded_channel::<RunnerMsg>();
        let mut pumps = JoinSet::new();
        let mut in_flight = 0usize;
        let mut cancel_seen = false;
        let mut watchdog_at: Option<Instant> = None;
        let mut flusher = LogFlusher::new(job.id(), Arc::clone(&self.store), self.settings.log_flush_lines);
        let mut flush_tick = tokio::time::interval(self.settings.log_flush_interval);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if !cancel_seen
                && job.cancel_token().is_cancelled()
                && (in_flight > 0 || !pending.is_empty())
            {
                cancel_seen = true;
                watchdog_at = Some(self.begin_cancel(&mut pending).await);
            }

            while !cancel_seen && in_flight < limit {
                let Some(adapter) = pending.pop_front() else {
                    break;
                };
                if let Some(handle) = self.launch(&adapter, &targets, &policy).await {
                    pumps.spawn(pump(adapter.kind(), handle, tx.clone()));
                    in_flight += 1;
                }
            }

            if in_flight == 0 {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    if self.handle_msg(msg, &mut flusher, &policy).await {
                        in_flight -= 1;
                    }
                }
                _ = job.cancel_token().cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    watchdog_at = Some(self.begin_cancel(&mut pending).await);
                }
                _ = tokio::time::sleep_until(watchdog_at.unwrap_or_else(Instant::now)), if watchdog_at.is_some() => {
                    pumps.abort_all();
                    // tools that finished just before the deadline keep their results
                    let finished = self.drain_finished(&mut rx, &mut flusher, &policy).await;
                    let stragglers = self.abandon_running_tools().await;
                    warn!(job_id = %job.id(), finished, stragglers, "Watchdog expired; abandoning tools");
                    job.system_line(format!(
                        "[!] {} tool(s) did not stop within the grace period and were abandoned",
                        stragglers
                    ));
                    break;
                }
                _ = flush_tick.tick() => flusher.flush(job.log(), true),
            }
        }

        let statuses = job.snapshot().await.tool_status;
        if statuses.values().all(ToolStatus::is_clean) {
            JobState::Succeeded
        } else if cancel_seen {
            JobState::Canceled
        } else {
            JobState::Failed
        }
    }

    async fn launch(&self, adapter: &ToolAdapter, targets: &[String], policy: &Policy) -> Option<ToolHandle> {
        let job = &self.job;
        let tool = adapter.kind();
        match adapter.launch(targets, policy, job.cancel_token().child_token()) {
            Ok(handle) => {
                if job.state() == JobState::Queued {
                    job.transition(JobState::Running).await;
                }
                job.set_tool_status(tool, ToolStatus::Running).await;
                job.system_line(format!("[+] Starting {}", tool.display_name()));
                info!(job_id = %job.id(), tool = %tool, "Tool launched");
                Some(handle)
            }
            Err(e) => {
                let status = match e {
                    LanternError::ToolUnavailable(_) => ToolStatus::Unavailable,
                    _ => ToolStatus::Failed,
                };
                warn!(job_id = %job.id(), tool = %tool, error = %e, "Tool launch refused");
                job.set_tool_status(tool, status).await;
                job.system_line(format!("[!] {} could not start: {}", tool.display_name(), e));
                None
            }
        }
    }

    /// Apply one pump message. Returns true when a tool finished.
    async fn handle_msg(&self, msg: RunnerMsg, flusher: &mut LogFlusher, policy: &Policy) -> bool {
        match msg {
            RunnerMsg::Line { tool, stream, text } => {
                self.job.log().append(tool.as_str(), stream, text);
                flusher.flush(self.job.log(), false);
                false
            }
            RunnerMsg::Finished { tool, outcome, captured } => {
                self.complete_tool(tool, outcome, captured, policy).await;
                true
            }
        }
    }

    /// Apply everything already queued without waiting. Returns how many tools finished.
    async fn drain_finished(
        &self,
        rx: &mut mpsc::UnboundedReceiver<RunnerMsg>,
        flusher: &mut LogFlusher,
        policy: &Policy,
    ) -> usize {
        let mut finished = 0;
        while let Ok(msg) = rx.try_recv() {
            if self.handle_msg(msg, flusher, policy).await {
                finished += 1;
            }
        }
        finished
    }

    async fn complete_tool(&self, tool: ToolKind, outcome: ExitOutcome, captured: CapturedOutput, policy: &Policy) {
        let job = &self.job;
        let status = outcome.verdict();
        let normalized = normalizer_for(tool).parse(&captured, &NormalizeContext { policy });
        let found = normalized.findings.len();

        if normalized.malformed > 0 {
            job.add_parse_errors(tool, normalized.malformed).await;
            job.system_line(format!(
                "[!] {}: skipped {} malformed output record(s)",
                tool.display_name(),
                normalized.malformed
            ));
        }
        job.append_findings(normalized.findings).await;
        job.set_tool_status(tool, status).await;
        job.system_line(format!(
            "[+] {} {} after {:.1}s, {} finding(s)",
            tool.display_name(),
            status,
            outcome.duration.as_secs_f64(),
            found
        ));
        info!(
            job_id = %job.id(),
            tool = %tool,
            status = %status,
            exit_code = ?outcome.code,
            findings = found,
            "Tool finished"
        );
    }

    /// Stop launching, mark queued tools canceled, and return the watchdog deadline.
    async fn begin_cancel(&self, pending: &mut VecDeque<ToolAdapter>) -> Instant {
        let job = &self.job;
        info!(job_id = %job.id(), "Cancellation requested");
        job.system_line("[!] Cancellation requested; stopping running tools");
        for adapter in pending.drain(..) {
            job.set_tool_status(adapter.kind(), ToolStatus::Canceled).await;
            job.system_line(format!("[-] {} not started (job canceled)", adapter.kind().display_name()));
        }
        Instant::now() + self.tools.cancel_grace + self.settings.watchdog_slack
    }

    async fn abandon_running_tools(&self) -> usize {
        let mut abandoned = 0;
        for tool in ToolKind::ALL {
            if self.job.tool_status(tool).await == Some(ToolStatus::Running) {
                self.job.set_tool_status(tool, ToolStatus::Canceled).await;
                abandoned += 1;
            }
        }
        abandoned
    }

    async fn finalize(&self, outcome: JobState) -> JobState {
        let job = &self.job;
        let findings = job.findings().await;
        let summary = JobSummary::from_findings(&findings);
        job.system_line(format!(
            "[*] Job {}: {} finding(s), risk score {}",
            outcome, summary.findings, summary.risk_score
        ));
        job.update_record(|r| r.summary = Some(summary)).await;

        let mut record = job.snapshot().await;
        record.state = outcome;
        record.finished_at = Some(chrono::Utc::now());
        let log = job.log().snapshot();

        let (store, record_ref, findings_ref, log_ref) = (&self.store, &record, &findings, &log);
        let saved = with_retry("save_finished_job", &self.settings.retry, || async move {
            store.save_finished_job(record_ref, findings_ref, log_ref)
        })
        .await;

        let final_state = match saved {
            Ok(()) => {
                job.update_record(|r| r.finished_at = record.finished_at).await;
                outcome
            }
            Err(e) => {
                error!(job_id = %job.id(), error = %e, "Job results could not be persisted");
                job.system_line(format!("[!] Results could not be saved: {}", e));
                job.update_record(|r| {
                    r.outcome = Some(outcome);
                    r.error = Some(e.to_string());
                })
                .await;
                JobState::StorageFailed
            }
        };

        job.transition(final_state).await;
        job.log().close();
        info!(job_id = %job.id(), state = %final_state, findings = findings.len(), "Job finished");
        final_state
    }
}

/// Forward one tool's output into the runner channel, then report its exit.
async fn pump(tool: ToolKind, mut handle: ToolHandle, tx: mpsc::UnboundedSender<RunnerMsg>) {
    let mut captured = CapturedOutput::new(handle.invocation_targets());
    while let Some(event) = handle.next_event().await {
        captured.push(event.invocation, event.stream, &event.text);
        let _ = tx.send(RunnerMsg::Line { tool, stream: event.stream, text: event.text });
    }
    let outcome = handle.wait().await;
    let _ = tx.send(RunnerMsg::Finished { tool, outcome, captured });
}

/// Incremental, best-effort persistence of a running job's log.
struct LogFlusher {
    job_id: String,
    store: Arc<dyn JobStore>,
    every: usize,
    flushed: usize,
    warned: bool,
}

impl LogFlusher {
    fn new(job_id: &str, store: Arc<dyn JobStore>, every: usize) -> Self {
        Self { job_id: job_id.to_string(), store, every: every.max(1), flushed: 0, warned: false }
    }

    fn flush(&mut self, log: &JobLog, force: bool) {
        let len = log.len();
        if len <= self.flushed || (!force && len - self.flushed < self.every) {
            return;
        }
        let lines = log.range(self.flushed, len);
        match self.store.append_log_lines(&self.job_id, &lines) {
            Ok(()) => self.flushed = len,
            Err(e) if !self.warned => {
                warn!(job_id = %self.job_id, error = %e, "Incremental log flush failed");
                self.warned = true;
            }
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use chrono::{DateTime, Utc};

    use crate::db::Database;
    use crate::models::{Finding, JobRecord, LogLine, NewScanDefinition, ScanDefinition};

    /// Store whose finalization always fails.
    struct BrokenStore;

    impl JobStore for BrokenStore {
        fn save_finished_job(&self, _: &JobRecord, _: &[Finding], _: &[LogLine]) -> Result<(), LanternError> {
            Err(LanternError::Storage("disk full".into()))
        }
        fn append_log_lines(&self, _: &str, _: &[LogLine]) -> Result<(), LanternError> {
            Err(LanternError::Storage("disk full".into()))
        }
        fn load_job(&self, _: &str) -> Result<Option<JobRecord>, LanternError> {
            Ok(None)
        }
        fn load_findings(&self, _: &str) -> Result<Vec<Finding>, LanternError> {
            Ok(Vec::new())
        }
        fn load_log(&self, _: &str) -> Result<Vec<LogLine>, LanternError> {
            Ok(Vec::new())
        }
        fn list_jobs(&self, _: usize) -> Result<Vec<JobRecord>, LanternError> {
            Ok(Vec::new())
        }
        fn job_start_times(&self, _: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>, LanternError> {
            Ok(Vec::new())
        }
        fn insert_definition(&self, _: &NewScanDefinition) -> Result<ScanDefinition, LanternError> {
            Err(LanternError::Storage("disk full".into()))
        }
        fn list_definitions(&self) -> Result<Vec<ScanDefinition>, LanternError> {
            Ok(Vec::new())
        }
        fn get_definition(&self, _: i64) -> Result<Option<ScanDefinition>, LanternError> {
            Ok(None)
        }
        fn record_definition_fired(&self, _: i64, _: DateTime<Utc>) -> Result<(), LanternError> {
            Ok(())
        }
    }

    fn missing_tools() -> Arc<ToolSettings> {
        let executables: BTreeMap<_, _> = ToolKind::ALL
            .into_iter()
            .map(|kind| (kind, PathBuf::from(format!("/nonexistent/{}", kind))))
            .collect();
        Arc::new(ToolSettings { executables, ..Default::default() })
    }

    fn settings() -> RunnerSettings {
        RunnerSettings {
            retry: RetryConfig { max_retries: 1, base_delay: Duration::from_millis(1) },
            ..Default::default()
        }
    }

    fn job() -> Arc<ActiveJob> {
        Arc::new(ActiveJob::new(JobRecord::new(
            "job-1".into(),
            vec!["10.0.0.5".into()],
            Policy::default(),
            None,
        )))
    }

    #[tokio::test]
    async fn test_unavailable_tools_fail_job_and_persist() {
        let db = Database::in_memory().unwrap();
        let job = job();
        let state = JobRunner::new(Arc::clone(&job), missing_tools(), Arc::new(db.clone()), settings())
            .run()
            .await;

        assert_eq!(state, JobState::Failed);
        let record = db.get_job("job-1").unwrap().unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.tool_status.get(&ToolKind::Nmap), Some(&ToolStatus::Unavailable));
        assert_eq!(record.tool_status.get(&ToolKind::Nuclei), Some(&ToolStatus::Unavailable));
        assert!(job.log().is_closed());
        let persisted = db.get_log("job-1").unwrap();
        assert_eq!(persisted, job.log().snapshot());
        assert!(persisted.iter().any(|l| l.text.contains("unavailable")));
    }

    #[tokio::test]
    async fn test_storage_failure_is_distinct_state() {
        let job = job();
        let state = JobRunner::new(Arc::clone(&job), missing_tools(), Arc::new(BrokenStore), settings())
            .run()
            .await;

        assert_eq!(state, JobState::StorageFailed);
        assert_eq!(job.state(), JobState::StorageFailed);
        let record = job.snapshot().await;
        assert_eq!(record.outcome, Some(JobState::Failed));
        assert!(record.error.as_deref().unwrap_or_default().contains("disk full"));
        assert!(job.log().snapshot().iter().any(|l| l.text.starts_with("[!] Results could not be saved")));
    }

    #[tokio::test]
    async fn test_skipped_tools_count_as_clean() {
        let db = Database::in_memory().unwrap();
        let job = job();
        let state = JobRunner::new(Arc::clone(&job), missing_tools(), Arc::new(db), settings())
            .skip_tool(ToolKind::Nmap, "not needed")
            .skip_tool(ToolKind::Nuclei, "not needed")
            .run()
            .await;
        assert_eq!(state, JobState::Succeeded);
        assert_eq!(job.snapshot().await.summary.map(|s| s.findings), Some(0));
    }

    #[tokio::test]
    async fn test_watchdog_drain_keeps_finished_tool() {
        let db = Database::in_memory().unwrap();
        let job = job();
        let runner = JobRunner::new(Arc::clone(&job), missing_tools(), Arc::new(db), settings());
        job.set_tool_status(ToolKind::Nmap, ToolStatus::Running).await;
        job.set_tool_status(ToolKind::Nuclei, ToolStatus::Running).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let targets = vec![vec!["10.0.0.5".to_string()]];
        let mut captured = CapturedOutput::new(&targets);
        captured.push(0, LogStream::Stdout, "22/tcp open  ssh     OpenSSH 8.9p1");
        tx.send(RunnerMsg::Line {
            tool: ToolKind::Nmap,
            stream: LogStream::Stdout,
            text: "22/tcp open  ssh     OpenSSH 8.9p1".into(),
        })
        .unwrap();
        tx.send(RunnerMsg::Finished {
            tool: ToolKind::Nmap,
            outcome: ExitOutcome { code: Some(0), duration: Duration::from_secs(1), kind: crate::tools::ExitKind::Success },
            captured,
        })
        .unwrap();

        let mut flusher = LogFlusher::new(job.id(), Arc::clone(&runner.store), 50);
        let policy = job.snapshot().await.policy;
        assert_eq!(runner.drain_finished(&mut rx, &mut flusher, &policy).await, 1);
        assert_eq!(runner.abandon_running_tools().await, 1);

        assert_eq!(job.tool_status(ToolKind::Nmap).await, Some(ToolStatus::Succeeded));
        assert_eq!(job.tool_status(ToolKind::Nuclei).await, Some(ToolStatus::Canceled));
        assert_eq!(job.findings().await.len(), 1);
        assert!(job.log().snapshot().iter().any(|l| l.tool == "nmap" && l.text.contains("22/tcp")));
    }

    #[tokio::test]
    async fn test_cancel_before_launch() {
        let db = Database::in_memory().unwrap();
        let job = job();
        job.request_cancel();
        let state = JobRunner::new(Arc::clone(&job), missing_tools(), Arc::new(db), settings())
            .run()
            .await;
        // nothing resolved, so nothing was left to cancel
        assert_eq!(state, JobState::Failed);
    }
}
