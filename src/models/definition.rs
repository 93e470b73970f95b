use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::Policy;

/// A saved scan. Only the Scheduler Loop acts on it, by spawning jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDefinition {
    pub id: i64,
    pub name: String,
    pub policy: Policy,
    pub targets: Vec<String>,
    /// Five-field cron expression or `@macro`. `None` means manual-only.
    pub cron: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Latest due instant the scheduler has consumed for this definition.
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl ScanDefinition {
    /// Instant after which the next due time is searched.
    pub fn schedule_baseline(&self) -> DateTime<Utc> {
        match self.last_fired_at {
            Some(fired) if fired > self.created_at => fired,
            _ => self.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewScanDefinition {
    pub name: String,
    #[serde(default)]
    pub policy: Policy,
    pub targets: Vec<String>,
    #[serde(default)]
    pub cron: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_baseline_prefers_latest() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut def = ScanDefinition {
            id: 1,
            name: "nightly".into(),
            policy: Policy::default(),
            targets: vec!["10.0.0.1".into()],
            cron: Some("0 2 * * *".into()),
            created_at: created,
            last_fired_at: None,
        };
        assert_eq!(def.schedule_baseline(), created);
        let fired = Utc.with_ymd_and_hms(2024, 1, 3, 2, 0, 0).unwrap();
        def.last_fired_at = Some(fired);
        assert_eq!(def.schedule_baseline(), fired);
    }
}
