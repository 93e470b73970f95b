use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tool::ToolKind;

/// Severity level for a finding, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Returns a numeric rank where lower values indicate higher severity.
    /// Critical = 0, High = 1, Medium = 2, Low = 3, Info = 4.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
        }
    }

    /// Weight of one finding of this severity in the job risk score.
    pub fn risk_weight(&self) -> u32 {
        match self {
            Severity::Critical => 9,
            Severity::High => 6,
            Severity::Medium => 3,
            Severity::Low => 1,
            Severity::Info => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Lenient parse of a tool-provided severity label. Returns `None` for
    /// labels with no canonical equivalent (e.g. "unknown").
    pub fn from_label(label: &str) -> Option<Severity> {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "crit" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" | "moderate" | "med" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" | "informational" | "information" | "none" => Some(Severity::Info),
            _ => None,
        }
    }

    /// Map a CVSS base score onto the canonical scale.
    pub fn from_cvss(score: f64) -> Severity {
        if score >= 9.0 {
            Severity::Critical
        } else if score >= 7.0 {
            Severity::High
        } else if score >= 4.0 {
            Severity::Medium
        } else if score > 0.0 {
            Severity::Low
        } else {
            Severity::Info
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized observation produced by one tool invocation of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// The tool that produced this finding.
    pub tool: ToolKind,
    pub severity: Severity,
    pub target: String,
    pub title: String,
    pub description: String,
    /// Tool-specific record kept verbatim for export fidelity.
    pub raw: serde_json::Value,
    pub discovered_at: DateTime<Utc>,
}

impl Finding {
    pub fn new(
        tool: ToolKind,
        severity: Severity,
        target: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        raw: serde_json::Value,
    ) -> Self {
        Self {
            tool,
            severity,
            target: target.into(),
            title: title.into(),
            description: description.into(),
            raw,
            discovered_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_ordering() {
        assert!(Severity::Critical.rank() < Severity::High.rank());
        assert!(Severity::Low.rank() < Severity::Info.rank());
    }

    #[test]
    fn test_from_label() {
        assert_eq!(Severity::from_label("HIGH"), Some(Severity::High));
        assert_eq!(Severity::from_label(" moderate "), Some(Severity::Medium));
        assert_eq!(Severity::from_label("informational"), Some(Severity::Info));
        assert_eq!(Severity::from_label("unknown"), None);
    }

    #[test]
    fn test_from_cvss() {
        assert_eq!(Severity::from_cvss(9.8), Severity::Critical);
        assert_eq!(Severity::from_cvss(7.5), Severity::High);
        assert_eq!(Severity::from_cvss(5.3), Severity::Medium);
        assert_eq!(Severity::from_cvss(2.1), Severity::Low);
        assert_eq!(Severity::from_cvss(0.0), Severity::Info);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        let parsed: Severity = serde_json::from_str("\"info\"").unwrap();
        assert_eq!(parsed, Severity::Info);
    }
}
