use serde_json::json;

use lantern::models::{Finding, JobRecord, JobState, Policy, Severity, ToolKind};
use lantern::reporting::{assemble, ExportDocument, ExportFormat, JobExport};

fn finished_export() -> JobExport {
    let policy = Policy {
        nuclei_severities: [Severity::Medium, Severity::Critical].into_iter().collect(),
        ..Default::default()
    };
    let mut job = JobRecord::new("j-7".into(), vec!["shop.example.com".into()], policy, None);
    job.state = JobState::Succeeded;
    let findings = vec![
        Finding::new(ToolKind::Nmap, Severity::Info, "shop.example.com", "Open port 443/tcp (https)", "", json!({"port": 443})),
        Finding::new(ToolKind::Nuclei, Severity::Medium, "https://shop.example.com", "Missing CSP", "", json!({"template-id": "csp"})),
        // recorded before the policy was narrowed; exports drop it
        Finding::new(ToolKind::Nuclei, Severity::Low, "https://shop.example.com", "Cookie without Secure", "", json!({})),
        Finding::new(ToolKind::Nuclei, Severity::Critical, "https://shop.example.com/api", "SQL injection, blind", "", json!({"template-id": "sqli"})),
        Finding::new(ToolKind::Nikto, Severity::Medium, "https://shop.example.com", "Server banner", "", json!({})),
    ];
    JobExport::new(job, findings)
}

#[test]
fn test_json_export_rederives_csv_rows() {
    let original = finished_export();
    let json = assemble(original.clone(), ExportFormat::Json).unwrap().to_bytes().unwrap();
    let restored: JobExport = serde_json::from_slice(&json).unwrap();
    assert_eq!(restored, original);

    let ExportDocument::Csv(from_restored) = assemble(restored.clone(), ExportFormat::Csv).unwrap() else {
        panic!("expected a CSV document");
    };
    let ExportDocument::Csv(from_original) = assemble(original, ExportFormat::Csv).unwrap() else {
        panic!("expected a CSV document");
    };
    assert_eq!(from_restored, from_original);

    let expected: Vec<&Finding> = restored
        .findings
        .iter()
        .filter(|f| f.tool == ToolKind::Nuclei && restored.job.policy.wants_severity(f.severity))
        .collect();
    let rows: Vec<&str> = from_restored.split("\r\n").skip(1).filter(|r| !r.is_empty()).collect();
    assert_eq!(rows.len(), expected.len());
    assert_eq!(rows[0], "https://shop.example.com,medium,Missing CSP,nuclei");
    assert_eq!(rows[1], "https://shop.example.com/api,critical,\"SQL injection, blind\",nuclei");
}

#[test]
fn test_pdf_document_matches_json() {
    let export = finished_export();
    let ExportDocument::Pdf(report) = assemble(export.clone(), ExportFormat::Pdf).unwrap() else {
        panic!("expected a PDF document");
    };
    // every template-scanner finding, regardless of the severity filter
    assert_eq!(report.total_findings, 3);
    assert_eq!(report.truncated, 0);
    assert!(report.text_lines().iter().any(|l| l.contains("SQL injection, blind")));
}
