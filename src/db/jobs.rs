use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use crate::errors::LanternError;
use crate::models::{Finding, JobRecord, JobState, JobSummary, LogLine, Severity};
use super::connection::{parse_opt_ts, parse_ts};
use super::findings::insert_findings;
use super::logs::insert_log_lines;
use super::Database;

const JOB_COLUMNS: &str = "id, definition_id, state, outcome, targets, policy, tool_status, parse_errors, \
    finding_count_critical, finding_count_high, finding_count_medium, finding_count_low, finding_count_info, \
    risk_score, error_message, created_at, started_at, finished_at";

struct JobRow {
    id: String,
    definition_id: Option<i64>,
    state: String,
    outcome: Option<String>,
    targets: String,
    policy: String,
    tool_status: String,
    parse_errors: String,
    counts: [i64; 5],
    risk_score: i64,
    error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            definition_id: row.get(1)?,
            state: row.get(2)?,
            outcome: row.get(3)?,
            targets: row.get(4)?,
            policy: row.get(5)?,
            tool_status: row.get(6)?,
            parse_errors: row.get(7)?,
            counts: [row.get(8)?, row.get(9)?, row.get(10)?, row.get(11)?, row.get(12)?],
            risk_score: row.get(13)?,
            error: row.get(14)?,
            created_at: row.get(15)?,
            started_at: row.get(16)?,
            finished_at: row.get(17)?,
        })
    }

    fn into_record(self) -> Result<JobRecord, LanternError> {
        let state = JobState::parse(&self.state)
            .ok_or_else(|| LanternError::Storage(format!("Unknown job state '{}'", self.state)))?;
        let severity: BTreeMap<Severity, usize> = Severity::ALL
            .into_iter()
            .zip(self.counts)
            .map(|(sev, count)| (sev, count.max(0) as usize))
            .collect();
        let summary = JobSummary {
            findings: severity.values().sum(),
            severity,
            risk_score: self.risk_score.max(0) as u32,
        };
        Ok(JobRecord {
            id: self.id,
            definition_id: self.definition_id,
            targets: serde_json::from_str(&self.targets)?,
            policy: serde_json::from_str(&self.policy)?,
            state,
            created_at: parse_ts(&self.created_at)?,
            started_at: parse_opt_ts(self.started_at)?,
            finished_at: parse_opt_ts(self.finished_at)?,
            tool_status: serde_json::from_str(&self.tool_status)?,
            parse_errors: serde_json::from_str(&self.parse_errors)?,
            summary: Some(summary),
            outcome: self.outcome.as_deref().and_then(JobState::parse),
            error: self.error,
        })
    }
}

impl Database {
    /// Persist a finished job, its findings and its complete log in one transaction.
    pub fn save_job(&self, record: &JobRecord, findings: &[Finding], log: &[LogLine]) -> Result<(), LanternError> {
        let summary = record
            .summary
            .clone()
            .unwrap_or_else(|| JobSummary::from_findings(findings));
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!("INSERT OR REPLACE INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)", JOB_COLUMNS),
            rusqlite::params![
                record.id,
                record.definition_id,
                record.state.as_str(),
                record.outcome.map(|s| s.as_str()),
                serde_json::to_string(&record.targets)?,
                serde_json::to_string(&record.policy)?,
                serde_json::to_string(&record.tool_status)?,
                serde_json::to_string(&record.parse_errors)?,
                summary.count(Severity::Critical) as i64,
                summary.count(Severity::High) as i64,
                summary.count(Severity::Medium) as i64,
                summary.count(Severity::Low) as i64,
                summary.count(Severity::Info) as i64,
                summary.risk_score as i64,
                record.error,
                record.created_at.to_rfc3339(),
                record.started_at.map(|t| t.to_rfc3339()),
                record.finished_at.map(|t| t.to_rfc3339()),
            ],
        ).map_err(|e| LanternError::Storage(format!("Failed to save job: {}", e)))?;
        insert_findings(&tx, &record.id, findings)?;
        insert_log_lines(&tx, &record.id, log)?;
        tx.commit()
            .map_err(|e| LanternError::Storage(format!("Failed to commit job: {}", e)))?;
        Ok(())
    }

    pub fn get_job(&self, id: &str) -> Result<Option<JobRecord>, LanternError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
            rusqlite::params![id],
            JobRow::from_row,
        );
        match result {
            Ok(row) => Ok(Some(row.into_record()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LanternError::Storage(format!("Query error: {}", e))),
        }
    }

    /// Most recent jobs first.
    pub fn list_jobs(&self, limit: usize) -> Result<Vec<JobRecord>, LanternError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            &format!("SELECT {} FROM jobs ORDER BY created_at DESC LIMIT ?1", JOB_COLUMNS)
        ).map_err(|e| LanternError::Storage(format!("Query failed: {}", e)))?;

        let rows = stmt.query_map(rusqlite::params![limit as i64], JobRow::from_row)
            .map_err(|e| LanternError::Storage(format!("Query error: {}", e)))?;

        let mut jobs = Vec::new();
        for row in rows {
            let row = row.map_err(|e| LanternError::Storage(format!("Row error: {}", e)))?;
            jobs.push(row.into_record()?);
        }
        Ok(jobs)
    }

    /// Start instants of every job started at or after `since`.
    pub fn job_start_times(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>, LanternError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT started_at FROM jobs WHERE started_at IS NOT NULL AND started_at >= ?1 ORDER BY started_at"
        ).map_err(|e| LanternError::Storage(format!("Query failed: {}", e)))?;
        let rows = stmt.query_map(rusqlite::params![since.to_rfc3339()], |row| row.get::<_, String>(0))
            .map_err(|e| LanternError::Storage(format!("Query error: {}", e)))?;
        let mut out = Vec::new();
        for row in rows {
            let ts = row.map_err(|e| LanternError::Storage(format!("Row error: {}", e)))?;
            out.push(parse_ts(&ts)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogStream, Policy, ToolKind, ToolStatus};
    use serde_json::json;

    fn finished_record(id: &str) -> JobRecord {
        let mut record = JobRecord::new(id.into(), vec!["10.0.0.5".into()], Policy::default(), Some(7));
        record.state = JobState::Succeeded;
        record.started_at = Some(Utc::now());
        record.finished_at = Some(Utc::now());
        record.tool_status.insert(ToolKind::Nmap, ToolStatus::Succeeded);
        record.tool_status.insert(ToolKind::Nuclei, ToolStatus::Succeeded);
        record.parse_errors.insert(ToolKind::Nuclei, 2);
        record
    }

    #[test]
    fn test_save_and_load_finished_job() {
        let db = Database::in_memory().unwrap();
        let findings = vec![
            Finding::new(ToolKind::Nmap, Severity::Info, "10.0.0.5", "Open port 22/tcp (ssh)", "", json!({"port": 22})),
            Finding::new(ToolKind::Nuclei, Severity::High, "http://10.0.0.5", "B", "desc", json!({"template-id": "b"})),
        ];
        let mut record = finished_record("job-1");
        record.summary = Some(JobSummary::from_findings(&findings));
        let log = vec![LogLine {
            seq: 0,
            ts: Utc::now(),
            tool: "nmap".into(),
            stream: LogStream::Stdout,
            text: "hello".into(),
        }];
        db.save_job(&record, &findings, &log).unwrap();

        let loaded = db.get_job("job-1").unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Succeeded);
        assert_eq!(loaded.definition_id, Some(7));
        assert_eq!(loaded.targets, vec!["10.0.0.5"]);
        assert_eq!(loaded.policy, Policy::default());
        assert_eq!(loaded.parse_errors.get(&ToolKind::Nuclei), Some(&2));
        let summary = loaded.summary.unwrap();
        assert_eq!(summary.findings, 2);
        assert_eq!(summary.risk_score, 6);

        let stored = db.get_findings("job-1").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].raw["template-id"], "b");
        assert_eq!(db.get_log("job-1").unwrap().len(), 1);
    }

    #[test]
    fn test_get_missing_job() {
        let db = Database::in_memory().unwrap();
        assert!(db.get_job("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_jobs_newest_first() {
        let db = Database::in_memory().unwrap();
        let mut older = finished_record("old");
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        db.save_job(&older, &[], &[]).unwrap();
        db.save_job(&finished_record("new"), &[], &[]).unwrap();
        let ids: Vec<_> = db.list_jobs(10).unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(db.list_jobs(1).unwrap().len(), 1);
    }
}
