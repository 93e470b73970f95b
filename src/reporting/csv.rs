use crate::models::{Finding, ToolKind};
use super::export::JobExport;

pub const CSV_COLUMNS: [&str; 4] = ["target", "severity", "title", "tool"];

/// Template-scanner findings only, restricted to the severities the job's
/// policy asked for.
pub fn csv_findings(export: &JobExport) -> impl Iterator<Item = &Finding> {
    export
        .findings
        .iter()
        .filter(|f| f.tool == ToolKind::Nuclei)
        .filter(|f| export.job.policy.wants_severity(f.severity))
}

pub fn render_csv(export: &JobExport) -> String {
    let mut out = String::new();
    push_row(&mut out, &CSV_COLUMNS);
    for finding in csv_findings(export) {
        push_row(
            &mut out,
            &[&finding.target, finding.severity.as_str(), &finding.title, finding.tool.as_str()],
        );
    }
    out
}

fn push_row(out: &mut String, fields: &[&str]) {
    let row: Vec<String> = fields.iter().map(|f| escape(f)).collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

/// RFC 4180 quoting. Embedded newlines are flattened to spaces.
fn escape(field: &str) -> String {
    let flat = field.replace(['\r', '\n'], " ");
    if flat.contains([',', '"']) || flat.starts_with(' ') || flat.ends_with(' ') {
        format!("\"{}\"", flat.replace('"', "\"\""))
    } else {
        flat
    }
}
