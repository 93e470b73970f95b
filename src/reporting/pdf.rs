use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{JobSummary, Severity, ToolKind};
use super::export::JobExport;

/// Findings listed before the report is truncated.
pub const PDF_FINDING_LIMIT: usize = 40;

/// Layout-free content of the PDF report. Page rendering belongs to the
/// consumer of this document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfReport {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub severity_table: Vec<SeverityRow>,
    pub total_findings: usize,
    pub risk_score: u32,
    pub findings: Vec<PdfFinding>,
    /// Template-scanner findings left out by the listing limit.
    pub truncated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityRow {
    pub severity: Severity,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfFinding {
    pub severity: Severity,
    pub title: String,
    pub target: String,
}

impl PdfReport {
    pub fn from_export(export: &JobExport) -> Self {
        let template: Vec<_> = export
            .findings
            .iter()
            .filter(|f| f.tool == ToolKind::Nuclei)
            .collect();
        let summary = JobSummary::from_findings(template.iter().copied());

        Self {
            title: format!("Lantern report for job {}", export.job.id),
            generated_at: export.exported_at,
            severity_table: Severity::ALL
                .into_iter()
                .map(|severity| SeverityRow { severity, count: summary.count(severity) })
                .collect(),
            total_findings: summary.findings,
            risk_score: summary.risk_score,
            findings: template
                .iter()
                .take(PDF_FINDING_LIMIT)
                .map(|f| PdfFinding { severity: f.severity, title: f.title.clone(), target: f.target.clone() })
                .collect(),
            truncated: template.len().saturating_sub(PDF_FINDING_LIMIT),
        }
    }

    /// Plain-text rendition, one entry per output line.
    pub fn text_lines(&self) -> Vec<String> {
        let mut lines = vec![
            self.title.clone(),
            format!("Generated: {}", self.generated_at.to_rfc3339()),
            String::new(),
            "| Severity | Count |".to_string(),
            "|---|---|".to_string(),
        ];
        for row in &self.severity_table {
            lines.push(format!("| {} | {} |", row.severity, row.count));
        }
        lines.push(format!("| **Total** | **{}** |", self.total_findings));
        lines.push(format!("Risk score: {}", self.risk_score));
        lines.push(String::new());
        lines.push("Top findings:".to_string());
        if self.findings.is_empty() {
            lines.push("(no findings)".to_string());
        }
        for f in &self.findings {
            lines.push(format!("- [{:>8}] {}", f.severity.as_str().to_uppercase(), f.title));
            lines.push(format!("  {}", f.target));
        }
        if self.truncated > 0 {
            lines.push(format!("... {} more", self.truncated));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Finding, JobRecord, Policy};
    use serde_json::json;

    #[test]
    fn test_truncates_listing_but_counts_everything() {
        let findings: Vec<Finding> = (0..45)
            .map(|i| {
                let sev = if i % 3 == 0 { Severity::Critical } else { Severity::High };
                Finding::new(ToolKind::Nuclei, sev, "http://a/", format!("finding {}", i), "", json!({}))
            })
            .chain(std::iter::once(Finding::new(ToolKind::Nmap, Severity::Info, "a", "port", "", json!({}))))
            .collect();
        let export = JobExport::new(JobRecord::new("j".into(), vec!["a".into()], Policy::default(), None), findings);
        let report = PdfReport::from_export(&export);

        assert_eq!(report.findings.len(), PDF_FINDING_LIMIT);
        assert_eq!(report.truncated, 5);
        assert_eq!(report.total_findings, 45);
        assert_eq!(report.severity_table[0], SeverityRow { severity: Severity::Critical, count: 15 });
        assert_eq!(report.severity_table[4].count, 0);
        assert_eq!(report.risk_score, 15 * 9 + 30 * 6);
        assert!(report.text_lines().iter().any(|l| l == "... 5 more"));
    }

    #[test]
    fn test_empty_report() {
        let export = JobExport::new(JobRecord::new("j".into(), vec!["a".into()], Policy::default(), None), vec![]);
        let lines = PdfReport::from_export(&export).text_lines();
        assert!(lines.contains(&"(no findings)".to_string()));
    }
}
