use chrono::{DateTime, Utc};

use crate::errors::LanternError;
use crate::models::{Finding, JobRecord, LogLine, NewScanDefinition, ScanDefinition};
use super::Database;

/// Persistence boundary for finished jobs, their logs, and saved scans.
///
/// A finished job becomes visible to readers outside the process only
/// through [`JobStore::save_finished_job`], written once at finalization.
pub trait JobStore: Send + Sync {
    fn save_finished_job(&self, record: &JobRecord, findings: &[Finding], log: &[LogLine]) -> Result<(), LanternError>;
    /// Best-effort incremental log persistence while a job is running.
    fn append_log_lines(&self, job_id: &str, lines: &[LogLine]) -> Result<(), LanternError>;
    fn load_job(&self, id: &str) -> Result<Option<JobRecord>, LanternError>;
    fn load_findings(&self, id: &str) -> Result<Vec<Finding>, LanternError>;
    fn load_log(&self, id: &str) -> Result<Vec<LogLine>, LanternError>;
    fn list_jobs(&self, limit: usize) -> Result<Vec<JobRecord>, LanternError>;
    fn job_start_times(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>, LanternError>;
    fn insert_definition(&self, def: &NewScanDefinition) -> Result<ScanDefinition, LanternError>;
    fn list_definitions(&self) -> Result<Vec<ScanDefinition>, LanternError>;
    fn get_definition(&self, id: i64) -> Result<Option<ScanDefinition>, LanternError>;
    fn record_definition_fired(&self, id: i64, at: DateTime<Utc>) -> Result<(), LanternError>;
}

impl JobStore for Database {
    fn save_finished_job(&self, record: &JobRecord, findings: &[Finding], log: &[LogLine]) -> Result<(), LanternError> {
        self.save_job(record, findings, log)
    }

    fn append_log_lines(&self, job_id: &str, lines: &[LogLine]) -> Result<(), LanternError> {
        self.append_log(job_id, lines)
    }

    fn load_job(&self, id: &str) -> Result<Option<JobRecord>, LanternError> {
        self.get_job(id)
    }

    fn load_findings(&self, id: &str) -> Result<Vec<Finding>, LanternError> {
        self.get_findings(id)
    }

    fn load_log(&self, id: &str) -> Result<Vec<LogLine>, LanternError> {
        self.get_log(id)
    }

    fn list_jobs(&self, limit: usize) -> Result<Vec<JobRecord>, LanternError> {
        Database::list_jobs(self, limit)
    }

    fn job_start_times(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>, LanternError> {
        Database::job_start_times(self, since)
    }

    fn insert_definition(&self, def: &NewScanDefinition) -> Result<ScanDefinition, LanternError> {
        self.create_definition(def)
    }

    fn list_definitions(&self) -> Result<Vec<ScanDefinition>, LanternError> {
        Database::list_definitions(self)
    }

    fn get_definition(&self, id: i64) -> Result<Option<ScanDefinition>, LanternError> {
        Database::get_definition(self, id)
    }

    fn record_definition_fired(&self, id: i64, at: DateTime<Utc>) -> Result<(), LanternError> {
        self.set_definition_fired(id, at)
    }
}
