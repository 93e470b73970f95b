use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

use crate::config::LanternConfig;
use crate::db::JobStore;
use crate::errors::LanternError;
use crate::live::{replay, LogEventStream};
use crate::models::{
    validate_target, validate_targets, Finding, JobRecord, JobState, LogLine, NewScanDefinition, Policy,
    ScanDefinition, ToolKind,
};
use crate::reporting::{self, ExportDocument, ExportFormat, JobExport, SeveritySummary, ThroughputPoint};
use crate::scheduler::{CronExpr, JobLauncher};
use crate::tools::{ToolAdapter, ToolSettings};
use super::job::ActiveJob;
use super::registry::JobRegistry;
use super::runner::{JobRunner, RunnerSettings};

/// Entry point for everything that creates, observes, or controls jobs.
/// Request handlers, the CLI and the scheduler all go through it.
#[derive(Clone)]
pub struct ScanEngine {
    registry: Arc<JobRegistry>,
    store: Arc<dyn JobStore>,
    tools: Arc<ToolSettings>,
    /// Global cap on concurrently active jobs.
    slots: Arc<Semaphore>,
    runner: RunnerSettings,
    lag_limit: usize,
}

impl ScanEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        tools: ToolSettings,
        runner: RunnerSettings,
        max_concurrent_jobs: usize,
        lag_limit: usize,
    ) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            store,
            tools: Arc::new(tools),
            slots: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            runner,
            lag_limit,
        }
    }

    pub fn from_config(config: &LanternConfig, store: Arc<dyn JobStore>) -> Self {
        let runner = RunnerSettings {
            log_flush_lines: config.runner.log_flush_lines,
            retry: config.retry_config(),
            ..Default::default()
        };
        Self::new(
            store,
            config.tool_settings(),
            runner,
            config.runner.max_concurrent_jobs,
            config.runner.subscriber_lag_limit,
        )
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Start an ad-hoc job. Configuration problems are reported here and the
    /// job is never created; everything after launch is reflected in its state.
    pub fn create_job(&self, targets: Vec<String>, policy: Policy) -> Result<String, LanternError> {
        validate_targets(&targets)?;
        policy.validate()?;
        for tool in policy.enabled_tools() {
            ToolAdapter::new(tool, Arc::clone(&self.tools)).validate(&policy)?;
        }

        let job = self.register(targets, policy, None);
        let id = job.id().to_string();
        let runner = JobRunner::new(
            Arc::clone(&job),
            Arc::clone(&self.tools),
            Arc::clone(&self.store),
            self.runner.clone(),
        );

        // ad-hoc jobs never wait for a slot, but occupy one when available
        let permit = Arc::clone(&self.slots).try_acquire_owned().ok();
        if permit.is_none() {
            warn!(job_id = %id, "Concurrent job limit reached; starting ad-hoc job anyway");
        }
        self.supervise(job, runner, Slot::Held(permit));
        Ok(id)
    }

    /// Start a job on behalf of a saved definition. The job stays `queued`
    /// until a global slot frees up.
    pub fn create_scheduled_job(&self, def: &ScanDefinition) -> Result<String, LanternError> {
        validate_targets(&def.targets)?;
        def.policy.validate()?;

        let mut skipped = Vec::new();
        for tool in def.policy.enabled_tools() {
            if let Err(e) = ToolAdapter::new(tool, Arc::clone(&self.tools)).validate(&def.policy) {
                skipped.push((tool, e.to_string()));
            }
        }
        if skipped.len() == def.policy.enabled_tools().len() {
            return Err(LanternError::Configuration(format!(
                "no runnable tool in definition '{}'",
                def.name
            )));
        }

        let job = self.register(def.targets.clone(), def.policy.clone(), Some(def.id));
        let id = job.id().to_string();
        let runner = skipped.into_iter().fold(
            JobRunner::new(
                Arc::clone(&job),
                Arc::clone(&self.tools),
                Arc::clone(&self.store),
                self.runner.clone(),
            ),
            |runner, (tool, reason): (ToolKind, String)| runner.skip_tool(tool, reason),
        );
        self.supervise(job, runner, Slot::Wait);
        Ok(id)
    }

    fn register(&self, targets: Vec<String>, policy: Policy, definition_id: Option<i64>) -> Arc<ActiveJob> {
        let id = uuid::Uuid::new_v4().to_string();
        let job = Arc::new(ActiveJob::new(JobRecord::new(id, targets, policy, definition_id)));
        self.registry.insert(Arc::clone(&job));
        info!(
            job_id = %job.id(),
            definition_id = ?definition_id,
            active = self.registry.len(),
            "Job created"
        );
        job
    }

    fn supervise(&self, job: Arc<ActiveJob>, runner: JobRunner, slot: Slot) {
        let registry = Arc::clone(&self.registry);
        let slots = Arc::clone(&self.slots);
        tokio::spawn(async move {
            let _permit = match slot {
                Slot::Held(permit) => permit,
                Slot::Wait => {
                    job.system_line("[*] Waiting for a free job slot");
                    tokio::select! {
                        permit = slots.acquire_owned() => permit.ok(),
                        _ = job.cancel_token().cancelled() => None,
                    }
                }
            };
            let state = runner.run().await;
            // unsaved results stay reachable in memory until restart
            if state != JobState::StorageFailed {
                registry.remove(job.id());
            }
        });
    }

    pub async fn stream_job(&self, id: &str) -> Result<LogEventStream, LanternError> {
        if let Some(job) = self.registry.get(id) {
            return Ok(job.log().subscribe(self.lag_limit));
        }
        match self.store.load_job(id)? {
            Some(_) => Ok(replay(self.store.load_log(id)?)),
            None => Err(LanternError::NotFound(format!("job {}", id))),
        }
    }

    /// Request cancellation. Already-finished jobs are left alone.
    pub async fn cancel_job(&self, id: &str) -> Result<JobState, LanternError> {
        if let Some(job) = self.registry.get(id) {
            let state = job.state();
            if !state.is_terminal() {
                info!(job_id = %id, state = %state, "Cancel requested");
                job.request_cancel();
            }
            return Ok(state);
        }
        self.job(id).await.map(|record| record.state)
    }

    pub async fn job(&self, id: &str) -> Result<JobRecord, LanternError> {
        if let Some(job) = self.registry.get(id) {
            return Ok(job.snapshot().await);
        }
        self.store
            .load_job(id)?
            .ok_or_else(|| LanternError::NotFound(format!("job {}", id)))
    }

    pub async fn job_findings(&self, id: &str) -> Result<Vec<Finding>, LanternError> {
        if let Some(job) = self.registry.get(id) {
            return Ok(job.findings().await);
        }
        self.job(id).await?;
        self.store.load_findings(id)
    }

    pub async fn job_log(&self, id: &str) -> Result<Vec<LogLine>, LanternError> {
        if let Some(job) = self.registry.get(id) {
            return Ok(job.log().snapshot());
        }
        self.job(id).await?;
        self.store.load_log(id)
    }

    /// Active and stored jobs, newest first.
    pub async fn list_jobs(&self, limit: usize) -> Result<Vec<JobRecord>, LanternError> {
        let mut jobs = Vec::new();
        for job in self.registry.all() {
            jobs.push(job.snapshot().await);
        }
        let mut seen: HashSet<String> = jobs.iter().map(|j| j.id.clone()).collect();
        for record in self.store.list_jobs(limit)? {
            if seen.insert(record.id.clone()) {
                jobs.push(record);
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    pub async fn export_job(&self, id: &str, format: ExportFormat) -> Result<ExportDocument, LanternError> {
        let record = self.job(id).await?;
        if !record.is_terminal() {
            return Err(LanternError::Configuration(format!(
                "job {} is still {}; export is available once it finishes",
                id, record.state
            )));
        }
        let findings = self.job_findings(id).await?;
        reporting::assemble(JobExport::new(record, findings), format)
    }

    /// Resolve once the job is terminal.
    pub async fn wait_for(&self, id: &str) -> Result<JobState, LanternError> {
        match self.registry.get(id) {
            Some(job) => Ok(job.wait_terminal().await),
            None => self.job(id).await.map(|record| record.state),
        }
    }

    /// Like [`ScanEngine::wait_for`], bounded.
    pub async fn wait_for_timeout(&self, id: &str, limit: Duration) -> Result<JobState, LanternError> {
        tokio::time::timeout(limit, self.wait_for(id))
            .await
            .map_err(|_| LanternError::Internal(format!("job {} did not finish within {:?}", id, limit)))?
    }

    pub fn register_scan_definition(&self, def: NewScanDefinition) -> Result<ScanDefinition, LanternError> {
        if def.name.trim().is_empty() {
            return Err(LanternError::Configuration("definition name is empty".into()));
        }
        def.policy.validate()?;
        def.targets.iter().try_for_each(|t| validate_target(t))?;
        if let Some(expr) = &def.cron {
            CronExpr::parse(expr)?;
        }
        let saved = self.store.insert_definition(&def)?;
        info!(definition_id = saved.id, name = %saved.name, cron = ?saved.cron, "Scan definition registered");
        Ok(saved)
    }

    /// Run a saved definition now, outside its schedule.
    pub fn run_definition(&self, id: i64) -> Result<String, LanternError> {
        let def = self
            .store
            .get_definition(id)?
            .ok_or_else(|| LanternError::NotFound(format!("scan definition {}", id)))?;
        info!(definition_id = def.id, name = %def.name, "Manual run of scan definition");
        self.create_scheduled_job(&def)
    }

    pub fn list_definitions(&self) -> Result<Vec<ScanDefinition>, LanternError> {
        self.store.list_definitions()
    }

    pub async fn stats_summary(&self) -> Result<SeveritySummary, LanternError> {
        reporting::stats_summary(self.store.as_ref())
    }

    pub async fn stats_throughput(&self, days: i64) -> Result<Vec<ThroughputPoint>, LanternError> {
        reporting::stats_throughput(self.store.as_ref(), days, chrono::Utc::now())
    }
}

enum Slot {
    Held(Option<OwnedSemaphorePermit>),
    Wait,
}

impl JobLauncher for ScanEngine {
    fn has_active_job(&self, definition_id: i64) -> bool {
        !self.registry.active_for_definition(definition_id).is_empty()
    }

    fn launch_scheduled(&self, def: &ScanDefinition) -> Result<String, LanternError> {
        self.create_scheduled_job(def)
    }
}
