use serde_json::Value;

use crate::models::{Finding, Severity, ToolKind};
use super::{CapturedOutput, NormalizeContext, NormalizedOutput, Normalizer};

/// One finding per JSONL record whose severity the policy asked for.
pub struct NucleiNormalizer;

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

impl Normalizer for NucleiNormalizer {
    fn parse(&self, output: &CapturedOutput, ctx: &NormalizeContext<'_>) -> NormalizedOutput {
        let mut result = NormalizedOutput::default();
        for segment in &output.segments {
            for line in segment.stdout.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
                let record: Value = match serde_json::from_str(line) {
                    Ok(v @ Value::Object(_)) => v,
                    _ => {
                        result.malformed += 1;
                        continue;
                    }
                };
                let severity = str_at(&record, "/info/severity")
                    .and_then(Severity::from_label)
                    .unwrap_or(Severity::Info);
                if !ctx.policy.wants_severity(severity) {
                    continue;
                }
                let template = str_at(&record, "/template-id")
                    .or_else(|| str_at(&record, "/templateID"))
                    .unwrap_or("unknown-template");
                let title = str_at(&record, "/info/name").unwrap_or(template).to_string();
                let target = str_at(&record, "/matched-at")
                    .or_else(|| str_at(&record, "/host"))
                    .or_else(|| segment.single_target())
                    .unwrap_or_default()
                    .to_string();
                let description = str_at(&record, "/info/description")
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string();
                result.findings.push(Finding::new(
                    ToolKind::Nuclei,
                    severity,
                    target,
                    title,
                    description,
                    record,
                ));
            }
        }
        result
    }
}
