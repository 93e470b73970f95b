use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::JobStore;
use crate::errors::LanternError;
use crate::models::Severity;

/// Finished jobs aggregated by the dashboard summary.
pub const SUMMARY_WINDOW: usize = 50;
pub const MAX_THROUGHPUT_DAYS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub severity: BTreeMap<Severity, usize>,
    pub risk_score: u32,
    /// Jobs that contributed to the counts.
    pub jobs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputPoint {
    pub day: NaiveDate,
    pub jobs: usize,
}

/// Severity counts over the most recent finished jobs.
pub fn stats_summary(store: &dyn JobStore) -> Result<SeveritySummary, LanternError> {
    let mut severity: BTreeMap<Severity, usize> = Severity::ALL.into_iter().map(|s| (s, 0)).collect();
    let mut risk_score = 0;
    let mut jobs = 0;

    for record in store.list_jobs(SUMMARY_WINDOW)? {
        let Some(summary) = record.summary.filter(|_| record.state.is_terminal()) else {
            continue;
        };
        for (sev, count) in &summary.severity {
            *severity.entry(*sev).or_insert(0) += count;
        }
        risk_score += summary.risk_score;
        jobs += 1;
    }
    Ok(SeveritySummary { severity, risk_score, jobs })
}

/// Jobs started per UTC day for the last `days` days, oldest first.
pub fn stats_throughput(
    store: &dyn JobStore,
    days: i64,
    now: DateTime<Utc>,
) -> Result<Vec<ThroughputPoint>, LanternError> {
    let days = days.clamp(1, MAX_THROUGHPUT_DAYS);
    let today = now.date_naive();
    let first = today - Duration::days(days - 1);
    let since = first
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .ok_or_else(|| LanternError::Internal(format!("no midnight on {}", first)))?;

    let mut counts: BTreeMap<NaiveDate, usize> =
        first.iter_days().take(days as usize).map(|day| (day, 0)).collect();
    for started in store.job_start_times(since)? {
        if let Some(count) = counts.get_mut(&started.date_naive()) {
            *count += 1;
        }
    }
    Ok(counts.into_iter().map(|(day, jobs)| ThroughputPoint { day, jobs }).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    use crate::db::Database;
    use crate::models::{Finding, JobRecord, JobState, JobSummary, Policy, ToolKind};

    fn save(db: &Database, id: &str, started: DateTime<Utc>, findings: &[Finding]) {
        let mut record = JobRecord::new(id.into(), vec!["a".into()], Policy::default(), None);
        record.state = JobState::Succeeded;
        record.started_at = Some(started);
        record.summary = Some(JobSummary::from_findings(findings));
        db.save_job(&record, findings, &[]).unwrap();
    }

    #[test]
    fn test_summary_adds_up_jobs() {
        let db = Database::in_memory().unwrap();
        let high = Finding::new(ToolKind::Nuclei, Severity::High, "a", "x", "", json!({}));
        let low = Finding::new(ToolKind::Nuclei, Severity::Low, "a", "y", "", json!({}));
        save(&db, "1", Utc::now(), &[high.clone(), low]);
        save(&db, "2", Utc::now(), &[high]);

        let summary = stats_summary(&db).unwrap();
        assert_eq!(summary.jobs, 2);
        assert_eq!(summary.severity[&Severity::High], 2);
        assert_eq!(summary.severity[&Severity::Low], 1);
        assert_eq!(summary.severity[&Severity::Critical], 0);
        assert_eq!(summary.risk_score, 6 + 1 + 6);
    }

    #[test]
    fn test_throughput_buckets_by_day() {
        let db = Database::in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap();
        save(&db, "1", Utc.with_ymd_and_hms(2024, 3, 10, 1, 0, 0).unwrap(), &[]);
        save(&db, "2", Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap(), &[]);
        save(&db, "3", Utc.with_ymd_and_hms(2024, 3, 8, 23, 59, 0).unwrap(), &[]);
        save(&db, "4", Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(), &[]);

        let points = stats_throughput(&db, 3, now).unwrap();
        let counts: Vec<(String, usize)> = points.iter().map(|p| (p.day.to_string(), p.jobs)).collect();
        assert_eq!(
            counts,
            vec![("2024-03-08".into(), 1), ("2024-03-09".into(), 0), ("2024-03-10".into(), 2)]
        );
        assert_eq!(stats_throughput(&db, 0, now).unwrap().len(), 1);
        assert_eq!(stats_throughput(&db, 500, now).unwrap().len(), 60);
    }
}
