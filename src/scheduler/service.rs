use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::JobStore;
use crate::errors::LanternError;
use crate::models::ScanDefinition;
use super::cron::CronExpr;

/// The job-creation entry point the scheduler hands due definitions to.
pub trait JobLauncher: Send + Sync {
    /// Whether a job spawned from this definition is still queued or running.
    fn has_active_job(&self, definition_id: i64) -> bool;
    fn launch_scheduled(&self, def: &ScanDefinition) -> Result<String, LanternError>;
}

/// What one pass over the saved definitions did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub launched: Vec<String>,
    pub skipped: usize,
    pub errors: usize,
}

/// Polls saved definitions and fires each due instant at most once.
pub struct SchedulerLoop {
    store: Arc<dyn JobStore>,
    launcher: Arc<dyn JobLauncher>,
    interval: Duration,
}

impl SchedulerLoop {
    pub fn new(store: Arc<dyn JobStore>, launcher: Arc<dyn JobLauncher>, interval: Duration) -> Self {
        Self { store, launcher, interval }
    }

    /// One scheduling pass at `now`. Errors are logged per definition and
    /// never stop the pass.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let definitions = match self.store.list_definitions() {
            Ok(defs) => defs,
            Err(e) => {
                error!(error = %e, "Could not load scan definitions");
                report.errors += 1;
                return report;
            }
        };

        for def in definitions {
            match self.consider(&def, now) {
                Ok(Some(job_id)) => report.launched.push(job_id),
                Ok(None) => {}
                Err(Skip::Quiet) => {}
                Err(Skip::Skipped) => report.skipped += 1,
                Err(Skip::Failed) => report.errors += 1,
            }
        }
        report
    }

    fn consider(&self, def: &ScanDefinition, now: DateTime<Utc>) -> Result<Option<String>, Skip> {
        let Some(cron) = def.cron.as_deref() else {
            return Err(Skip::Quiet);
        };
        let expr = CronExpr::parse(cron).map_err(|e| {
            warn!(definition_id = def.id, cron, error = %e, "Skipping definition with invalid cron");
            Skip::Failed
        })?;

        // catch-up-once: every missed instant collapses into the latest one
        let Some(due) = expr.latest_between(def.schedule_baseline(), now) else {
            return Ok(None);
        };

        // record before launching so a failed or slow launch cannot fire twice
        if let Err(e) = self.store.record_definition_fired(def.id, due) {
            error!(definition_id = def.id, error = %e, "Could not record firing; not launching");
            return Err(Skip::Failed);
        }

        if def.targets.is_empty() {
            warn!(definition_id = def.id, name = %def.name, due = %due, "Definition has no targets; skipping");
            return Err(Skip::Skipped);
        }
        if self.launcher.has_active_job(def.id) {
            info!(definition_id = def.id, name = %def.name, due = %due, "Previous run still active; skipping");
            return Err(Skip::Skipped);
        }

        match self.launcher.launch_scheduled(def) {
            Ok(job_id) => {
                info!(definition_id = def.id, name = %def.name, due = %due, job_id = %job_id, "Scheduled scan fired");
                Ok(Some(job_id))
            }
            Err(e) => {
                warn!(definition_id = def.id, name = %def.name, error = %e, "Scheduled scan could not start");
                Err(Skip::Failed)
            }
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick(Utc::now());
                    debug!(
                        launched = report.launched.len(),
                        skipped = report.skipped,
                        errors = report.errors,
                        "Scheduler tick"
                    );
                }
                _ = shutdown.cancelled() => {
                    info!("Scheduler shutting down");
                    break;
                }
            }
        }
    }
}

enum Skip {
    /// Not scheduled at all.
    Quiet,
    Skipped,
    Failed,
}

/// Spawn the scheduler on the current runtime.
pub fn spawn_scheduler(scheduler: SchedulerLoop, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(scheduler.run(shutdown))
}
