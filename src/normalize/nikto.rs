use serde_json::json;

use crate::models::{Finding, Severity, ToolKind};
use super::{CapturedOutput, NormalizeContext, NormalizedOutput, Normalizer};

/// Report lines that describe the scan itself rather than an observation.
const HEADER_PREFIXES: &[&str] = &[
    "Target IP:",
    "Target Hostname:",
    "Target Port:",
    "Start Time:",
    "End Time:",
    "Server:",
    "SSL Info:",
    "Subject:",
    "Issuer:",
    "Ciphers:",
    "Root page",
    "No CGI Directories found",
    "Scan terminated:",
];

const HIGH_MARKERS: &[&str] = &[
    "remote code",
    "command execution",
    "sql injection",
    "arbitrary file",
    "backdoor",
    "default password",
    "cve-",
];

const LOW_MARKERS: &[&str] = &[
    "header is not set",
    "header is not present",
    "cookie created without",
    "uncommon header",
    "allowed http methods",
    "retrieved x-powered-by",
    "retrieved via header",
];

/// Line-oriented text report: one finding per `+ ` line that is not header material.
pub struct NiktoNormalizer;

fn is_header(body: &str) -> bool {
    HEADER_PREFIXES.iter().any(|p| body.starts_with(p))
        || body.contains("host(s) tested")
        || body.contains("item(s) reported")
}

fn infer_severity(body: &str) -> Severity {
    let lower = body.to_ascii_lowercase();
    if HIGH_MARKERS.iter().any(|m| lower.contains(m)) {
        Severity::High
    } else if LOW_MARKERS.iter().any(|m| lower.contains(m)) {
        Severity::Low
    } else {
        Severity::Medium
    }
}

fn split_reference(body: &str) -> (Option<&str>, &str) {
    // "/admin/: Admin login page found." -> ("/admin/", "Admin login page found.")
    match body.split_once(": ") {
        Some((path, rest)) if path.starts_with('/') && !path.contains(' ') => (Some(path), rest),
        _ => (None, body),
    }
}

impl Normalizer for NiktoNormalizer {
    fn parse(&self, output: &CapturedOutput, _ctx: &NormalizeContext<'_>) -> NormalizedOutput {
        let mut result = NormalizedOutput::default();
        for segment in &output.segments {
            let mut target = segment.single_target().map(str::to_string);
            for line in &segment.stdout {
                let Some(body) = line.trim().strip_prefix("+ ") else {
                    continue;
                };
                let body = body.trim();
                if let Some(host) = body.strip_prefix("Target Hostname:") {
                    target.get_or_insert_with(|| host.trim().to_string());
                }
                if body.is_empty() || is_header(body) {
                    continue;
                }
                let (path, message) = split_reference(body);
                let title: String = message.chars().take(160).collect();
                let raw = json!({ "line": body, "path": path });
                result.findings.push(Finding::new(
                    ToolKind::Nikto,
                    infer_severity(body),
                    target.clone().unwrap_or_default(),
                    title,
                    body,
                    raw,
                ));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Policy;

    const REPORT: &str = "\
- Nikto v2.5.0
---------------------------------------------------------------------------
+ Target IP:          10.0.0.5
+ Target Hostname:    10.0.0.5
+ Target Port:        80
+ Start Time:         2024-05-01 10:00:00 (GMT0)
---------------------------------------------------------------------------
+ Server: nginx/1.18.0
+ /: The anti-clickjacking X-Frame-Options header is not present.
+ /admin/: Admin login page/section found.
+ /cgi-bin/test.cgi: Site appears vulnerable to remote code execution (CVE-2014-6271).
+ 8102 requests: 0 error(s) and 3 item(s) reported on remote host
+ End Time:           2024-05-01 10:05:00 (GMT0) (300 seconds)
---------------------------------------------------------------------------
+ 1 host(s) tested";

    #[test]
    fn test_flagged_lines_become_findings() {
        let policy = Policy::default();
        let out = NiktoNormalizer.parse(
            &CapturedOutput::from_stdout(&["http://10.0.0.5"], REPORT),
            &NormalizeContext { policy: &policy },
        );
        let titles: Vec<_> = out.findings.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(out.findings.len(), 3, "{:?}", titles);
        assert_eq!(out.findings[0].severity, Severity::Low);
        assert_eq!(out.findings[1].severity, Severity::Medium);
        assert_eq!(out.findings[1].raw["path"], "/admin/");
        assert_eq!(out.findings[2].severity, Severity::High);
        assert!(out.findings.iter().all(|f| f.target == "http://10.0.0.5"));
    }

    #[test]
    fn test_defaults_to_medium() {
        assert_eq!(infer_severity("/backup/: Directory indexing found."), Severity::Medium);
    }
}
