use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::live::JobLog;
use crate::models::{Finding, JobRecord, JobState, LogLine, LogStream, ToolKind, ToolStatus, SYSTEM_SOURCE};

/// A job the engine is running or has just finished running. Only its own
/// runner mutates it; everyone else reads snapshots.
pub struct ActiveJob {
    id: String,
    definition_id: Option<i64>,
    record: RwLock<JobRecord>,
    findings: RwLock<Vec<Finding>>,
    log: Arc<JobLog>,
    cancel: CancellationToken,
    state_tx: watch::Sender<JobState>,
}

impl ActiveJob {
    pub fn new(record: JobRecord) -> Self {
        let (state_tx, _) = watch::channel(record.state);
        Self {
            id: record.id.clone(),
            definition_id: record.definition_id,
            record: RwLock::new(record),
            findings: RwLock::new(Vec::new()),
            log: Arc::new(JobLog::new()),
            cancel: CancellationToken::new(),
            state_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn definition_id(&self) -> Option<i64> {
        self.definition_id
    }

    pub fn log(&self) -> &Arc<JobLog> {
        &self.log
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> JobState {
        *self.state_tx.borrow()
    }

    pub async fn snapshot(&self) -> JobRecord {
        self.record.read().await.clone()
    }

    pub async fn findings(&self) -> Vec<Finding> {
        self.findings.read().await.clone()
    }

    pub fn system_line(&self, text: impl Into<String>) -> Option<LogLine> {
        self.log.append(SYSTEM_SOURCE, LogStream::System, text)
    }

    /// Apply a lifecycle transition. Illegal transitions are refused and logged.
    pub async fn transition(&self, next: JobState) -> bool {
        let mut record = self.record.write().await;
        if !record.state.can_transition_to(next) {
            warn!(job_id = %self.id, from = %record.state, to = %next, "Refusing job state transition");
            return false;
        }
        record.state = next;
        if next == JobState::Running {
            record.started_at = Some(Utc::now());
        } else if next.is_terminal() && record.finished_at.is_none() {
            record.finished_at = Some(Utc::now());
        }
        drop(record);
        self.state_tx.send_replace(next);
        true
    }

    pub async fn set_tool_status(&self, tool: ToolKind, status: ToolStatus) {
        self.record.write().await.tool_status.insert(tool, status);
    }

    pub async fn tool_status(&self, tool: ToolKind) -> Option<ToolStatus> {
        self.record.read().await.tool_status.get(&tool).copied()
    }

    pub async fn add_parse_errors(&self, tool: ToolKind, count: usize) {
        if count == 0 {
            return;
        }
        *self.record.write().await.parse_errors.entry(tool).or_insert(0) += count;
    }

    pub async fn append_findings(&self, findings: Vec<Finding>) {
        self.findings.write().await.extend(findings);
    }

    pub async fn update_record(&self, f: impl FnOnce(&mut JobRecord)) {
        f(&mut *self.record.write().await);
    }

    /// Resolve once the job reaches a terminal state.
    pub async fn wait_terminal(&self) -> JobState {
        let mut rx = self.state_tx.subscribe();
        let state = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }
}
