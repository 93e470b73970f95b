use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::LanternError;
use crate::models::{Finding, JobRecord};
use super::csv::render_csv;
use super::pdf::PdfReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<ExportFormat> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            "pdf" => Some(ExportFormat::Pdf),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = LanternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExportFormat::parse(s)
            .ok_or_else(|| LanternError::Configuration(format!("unknown export format '{}'", s)))
    }
}

/// Everything known about a finished job: metadata plus every finding with
/// its raw tool payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExport {
    pub job: JobRecord,
    pub findings: Vec<Finding>,
    pub exported_at: DateTime<Utc>,
}

impl JobExport {
    pub fn new(job: JobRecord, findings: Vec<Finding>) -> Self {
        Self { job, findings, exported_at: Utc::now() }
    }
}

/// A rendered export, ready to hand to a client or a renderer.
#[derive(Debug, Clone)]
pub enum ExportDocument {
    Json(JobExport),
    Csv(String),
    Pdf(PdfReport),
}

impl ExportDocument {
    pub fn format(&self) -> ExportFormat {
        match self {
            ExportDocument::Json(_) => ExportFormat::Json,
            ExportDocument::Csv(_) => ExportFormat::Csv,
            ExportDocument::Pdf(_) => ExportFormat::Pdf,
        }
    }

    /// PDF-ready documents are shipped as JSON for the external renderer.
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportDocument::Json(_) | ExportDocument::Pdf(_) => "application/json",
            ExportDocument::Csv(_) => "text/csv; charset=utf-8",
        }
    }

    pub fn file_name(&self, job_id: &str) -> String {
        match self {
            ExportDocument::Pdf(_) => format!("job_{}.pdf.json", job_id),
            other => format!("job_{}.{}", job_id, other.format().extension()),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, LanternError> {
        Ok(match self {
            ExportDocument::Json(export) => serde_json::to_vec_pretty(export)?,
            ExportDocument::Csv(text) => text.clone().into_bytes(),
            ExportDocument::Pdf(report) => serde_json::to_vec_pretty(report)?,
        })
    }
}

pub fn assemble(export: JobExport, format: ExportFormat) -> Result<ExportDocument, LanternError> {
    Ok(match format {
        ExportFormat::Json => ExportDocument::Json(export),
        ExportFormat::Csv => ExportDocument::Csv(render_csv(&export)),
        ExportFormat::Pdf => ExportDocument::Pdf(PdfReport::from_export(&export)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobState, Policy, Severity, ToolKind};
    use serde_json::json;

    fn sample_export() -> JobExport {
        let mut job = JobRecord::new("j-42".into(), vec!["10.0.0.5".into()], Policy::default(), None);
        job.state = JobState::Succeeded;
        let findings = vec![
            Finding::new(ToolKind::Nmap, Severity::Info, "10.0.0.5", "Open port 22/tcp (ssh)", "", json!({"port": 22})),
            Finding::new(ToolKind::Nuclei, Severity::High, "http://10.0.0.5/admin", "Exposed panel", "", json!({"template-id": "panel"})),
            Finding::new(ToolKind::Nuclei, Severity::Info, "http://10.0.0.5/", "Tech detect", "", json!({})),
        ];
        JobExport::new(job, findings)
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(ExportFormat::parse("CSV"), Some(ExportFormat::Csv));
        assert!("docx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_json_keeps_raw_payloads() {
        let doc = assemble(sample_export(), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(value["job"]["id"], "j-42");
        assert_eq!(value["findings"].as_array().unwrap().len(), 3);
        assert_eq!(value["findings"][1]["raw"]["template-id"], "panel");
        assert_eq!(doc.file_name("j-42"), "job_j-42.json");
    }

    #[test]
    fn test_content_types() {
        let csv = assemble(sample_export(), ExportFormat::Csv).unwrap();
        assert!(csv.content_type().starts_with("text/csv"));
        assert_eq!(csv.file_name("7"), "job_7.csv");
        let pdf = assemble(sample_export(), ExportFormat::Pdf).unwrap();
        assert_eq!(pdf.content_type(), "application/json");
    }
}
