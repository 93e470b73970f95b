use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::finding::{Finding, Severity};
use super::policy::Policy;
use super::tool::{ToolKind, ToolStatus};

/// Job lifecycle: `queued -> running -> {succeeded, failed, canceled}`.
/// `storage_failed` marks a finished job whose results could not be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
    StorageFailed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Queued | JobState::Running)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Queued, JobState::Running) => true,
            // a job can finish without launching anything: canceled while
            // waiting, or every tool unavailable or skipped
            (JobState::Queued, n) => n.is_terminal(),
            (JobState::Running, n) => n.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Canceled => "canceled",
            JobState::StorageFailed => "storage_failed",
        }
    }

    pub fn parse(s: &str) -> Option<JobState> {
        [
            JobState::Queued,
            JobState::Running,
            JobState::Succeeded,
            JobState::Failed,
            JobState::Canceled,
            JobState::StorageFailed,
        ]
        .into_iter()
        .find(|state| state.as_str() == s)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Lines written by the engine itself (headers, errors, state changes).
    System,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
            LogStream::System => "system",
        }
    }

    pub fn parse(s: &str) -> LogStream {
        match s {
            "stdout" => LogStream::Stdout,
            "stderr" => LogStream::Stderr,
            _ => LogStream::System,
        }
    }
}

/// Source label used on log lines the engine writes itself.
pub const SYSTEM_SOURCE: &str = "lantern";

/// One timestamped, attributed line of a job's merged log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Position in the job log, starting at 0 and gapless.
    pub seq: u64,
    pub ts: DateTime<Utc>,
    /// Originating tool name, or `lantern` for engine lines.
    pub tool: String,
    pub stream: LogStream,
    pub text: String,
}

impl LogLine {
    pub fn render(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.ts.format("%H:%M:%S"),
            self.tool,
            self.text
        )
    }
}

/// Severity roll-up attached to every finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobSummary {
    pub findings: usize,
    pub severity: BTreeMap<Severity, usize>,
    pub risk_score: u32,
}

impl JobSummary {
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut severity: BTreeMap<Severity, usize> =
            Severity::ALL.into_iter().map(|s| (s, 0)).collect();
        let mut total = 0;
        for finding in findings {
            *severity.entry(finding.severity).or_insert(0) += 1;
            total += 1;
        }
        let risk_score = severity
            .iter()
            .map(|(sev, count)| sev.risk_weight() * *count as u32)
            .sum();
        Self { findings: total, severity, risk_score }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.severity.get(&severity).copied().unwrap_or(0)
    }
}

/// Snapshot of a job's metadata. Findings and log are stored alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    /// Saved definition this job was spawned from, if scheduled.
    pub definition_id: Option<i64>,
    pub targets: Vec<String>,
    pub policy: Policy,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tool_status: BTreeMap<ToolKind, ToolStatus>,
    /// Malformed output lines/documents skipped per tool.
    pub parse_errors: BTreeMap<ToolKind, usize>,
    pub summary: Option<JobSummary>,
    /// Scan outcome when `state` is `storage_failed`.
    pub outcome: Option<JobState>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(id: String, targets: Vec<String>, policy: Policy, definition_id: Option<i64>) -> Self {
        let tool_status = policy
            .enabled_tools()
            .into_iter()
            .map(|t| (t, ToolStatus::Pending))
            .collect();
        Self {
            id,
            definition_id,
            targets,
            policy,
            state: JobState::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            tool_status,
            parse_errors: BTreeMap::new(),
            summary: None,
            outcome: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
