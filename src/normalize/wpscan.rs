use serde_json::{json, Value};

use crate::models::{Finding, Severity, ToolKind};
use super::{CapturedOutput, NormalizeContext, NormalizedOutput, Normalizer};

/// Single JSON document per launch; one finding per vulnerability entry.
pub struct WpscanNormalizer;

fn severity_of(vuln: &Value) -> Severity {
    if let Some(score) = vuln.pointer("/cvss/score").and_then(Value::as_f64) {
        return Severity::from_cvss(score);
    }
    vuln.get("severity")
        .and_then(Value::as_str)
        .and_then(Severity::from_label)
        .unwrap_or(Severity::Info)
}

fn component_vulns<'a>(doc: &'a Value) -> Vec<(String, &'a Value)> {
    let mut out = Vec::new();
    if let Some(version) = doc.get("version").filter(|v| v.is_object()) {
        let label = match version.get("number").and_then(Value::as_str) {
            Some(n) => format!("WordPress {}", n),
            None => "WordPress core".to_string(),
        };
        out.push((label, version));
    }
    if let Some(theme) = doc.get("main_theme").filter(|v| v.is_object()) {
        let slug = theme.get("slug").and_then(Value::as_str).unwrap_or("main theme");
        out.push((format!("theme {}", slug), theme));
    }
    for (kind, key) in [("plugin", "plugins"), ("theme", "themes")] {
        if let Some(map) = doc.get(key).and_then(Value::as_object) {
            for (slug, component) in map {
                out.push((format!("{} {}", kind, slug), component));
            }
        }
    }
    out
}

impl Normalizer for WpscanNormalizer {
    fn parse(&self, output: &CapturedOutput, _ctx: &NormalizeContext<'_>) -> NormalizedOutput {
        let mut result = NormalizedOutput::default();
        for segment in &output.segments {
            let text = segment.stdout.join("\n");
            if text.trim().is_empty() {
                continue;
            }
            let doc: Value = match serde_json::from_str(&text) {
                Ok(v @ Value::Object(_)) => v,
                _ => {
                    result.malformed += 1;
                    continue;
                }
            };
            let target = doc
                .get("target_url")
                .and_then(Value::as_str)
                .or_else(|| segment.single_target())
                .unwrap_or_default()
                .to_string();
            for (component, node) in component_vulns(&doc) {
                let Some(vulns) = node.get("vulnerabilities").and_then(Value::as_array) else {
                    continue;
                };
                for vuln in vulns {
                    let title = vuln
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or("Unnamed vulnerability")
                        .to_string();
                    let description = match vuln.get("fixed_in").and_then(Value::as_str) {
                        Some(fixed) => format!("Affects {}; fixed in {}", component, fixed),
                        None => format!("Affects {}", component),
                    };
                    let raw = json!({ "component": component, "vulnerability": vuln });
                    result.findings.push(Finding::new(
                        ToolKind::Wpscan,
                        severity_of(vuln),
                        target.clone(),
                        title,
                        description,
                        raw,
                    ));
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Policy;

    const DOC: &str = r#"{
      "target_url": "http://wp.example/",
      "version": {"number": "5.8.1", "vulnerabilities": [
        {"title": "WP < 5.8.2 - Expired DST Root CA X3", "fixed_in": "5.8.2", "cvss": {"score": 7.5}}
      ]},
      "main_theme": {"slug": "twentytwentyone", "vulnerabilities": []},
      "plugins": {
        "contact-form-7": {"vulnerabilities": [
          {"title": "CF7 < 5.3.2 - Unrestricted File Upload", "severity": "critical"},
          {"title": "CF7 - Info Leak", "severity": "whatever"}
        ]}
      }
    }"#;

    #[test]
    fn test_vulnerabilities_across_components() {
        let policy = Policy::default();
        let out = WpscanNormalizer.parse(
            &CapturedOutput::from_stdout(&["wp.example"], DOC),
            &NormalizeContext { policy: &policy },
        );
        assert_eq!(out.malformed, 0);
        assert_eq!(out.findings.len(), 3);
        assert_eq!(out.findings[0].severity, Severity::High);
        assert_eq!(out.findings[0].description, "Affects WordPress 5.8.1; fixed in 5.8.2");
        assert_eq!(out.findings[1].severity, Severity::Critical);
        assert_eq!(out.findings[2].severity, Severity::Info);
        assert_eq!(out.findings[2].target, "http://wp.example/");
        assert_eq!(out.findings[1].raw["component"], "plugin contact-form-7");
    }

    #[test]
    fn test_malformed_document_counted_once() {
        let policy = Policy::default();
        let out = WpscanNormalizer.parse(
            &CapturedOutput::from_stdout(&["wp.example"], "Scan Aborted: not WordPress\n{"),
            &NormalizeContext { policy: &policy },
        );
        assert_eq!(out.malformed, 1);
        assert!(out.findings.is_empty());
    }
}
