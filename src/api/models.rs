use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{normalize_targets, JobRecord, JobState, Policy, Severity, ToolKind, ToolStatus};

/// Targets as a list, or as free-form text to be split and filtered.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TargetsInput {
    List(Vec<String>),
    Text(String),
}

impl TargetsInput {
    pub fn into_targets(self) -> Vec<String> {
        match self {
            TargetsInput::List(targets) => targets.into_iter().map(|t| t.trim().to_string()).collect(),
            TargetsInput::Text(raw) => normalize_targets(&raw),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub targets: TargetsInput,
    /// Explicit policy; takes precedence over `template`.
    pub policy: Option<Policy>,
    /// Id of a built-in scan template.
    pub template: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobCreatedResponse {
    pub id: String,
    pub state: JobState,
}

/// Compact listing entry.
#[derive(Debug, Serialize)]
pub struct JobListItem {
    pub id: String,
    pub state: JobState,
    pub targets: Vec<String>,
    pub policy: String,
    pub created_at: String,
    pub finished_at: Option<String>,
    pub findings: Option<usize>,
    pub risk_score: Option<u32>,
    pub severity: Option<BTreeMap<Severity, usize>>,
    pub tool_status: BTreeMap<ToolKind, ToolStatus>,
}

impl From<JobRecord> for JobListItem {
    fn from(record: JobRecord) -> Self {
        Self {
            id: record.id,
            state: record.state,
            targets: record.targets,
            policy: record.policy.name,
            created_at: record.created_at.to_rfc3339(),
            finished_at: record.finished_at.map(|t| t.to_rfc3339()),
            findings: record.summary.as_ref().map(|s| s.findings),
            risk_score: record.summary.as_ref().map(|s| s.risk_score),
            severity: record.summary.map(|s| s.severity),
            tool_status: record.tool_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_input_forms() {
        let list: CreateJobRequest = serde_json::from_str(r#"{"targets": [" 10.0.0.5 "]}"#).unwrap();
        assert_eq!(list.targets.into_targets(), vec!["10.0.0.5"]);
        let text: CreateJobRequest =
            serde_json::from_str(r#"{"targets": "a.example, b.example; a.example"}"#).unwrap();
        assert_eq!(text.targets.into_targets(), vec!["a.example", "b.example"]);
    }
}
