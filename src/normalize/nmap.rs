use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::models::{Finding, Severity, ToolKind};
use super::{CapturedOutput, NormalizeContext, NormalizedOutput, Normalizer};

static REPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Nmap scan report for (.+)$").expect("report pattern is valid"));

static PORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)/(tcp|udp|sctp)\s+open\s+(\S+)\s*(.*)$").expect("port pattern is valid")
});

/// One `info` finding per open port in the human-readable report.
pub struct NmapNormalizer;

impl Normalizer for NmapNormalizer {
    fn parse(&self, output: &CapturedOutput, _ctx: &NormalizeContext<'_>) -> NormalizedOutput {
        let mut result = NormalizedOutput::default();
        for segment in &output.segments {
            let fallback = segment.targets.join(",");
            let mut host: Option<String> = None;
            for line in &segment.stdout {
                let line = line.trim_end();
                if let Some(caps) = REPORT_RE.captures(line) {
                    host = Some(caps[1].trim().to_string());
                    continue;
                }
                let Some(caps) = PORT_RE.captures(line.trim_start()) else {
                    continue;
                };
                let port = &caps[1];
                let protocol = &caps[2];
                let service = &caps[3];
                let version = caps[4].trim();
                let target = host.clone().unwrap_or_else(|| fallback.clone());
                let title = format!("Open port {}/{} ({})", port, protocol, service);
                let description = if version.is_empty() {
                    format!("{} is listening on {}/{}", service, port, protocol)
                } else {
                    format!("{} {} is listening on {}/{}", service, version, port, protocol)
                };
                let raw = json!({
                    "host": target,
                    "port": port.parse::<u16>().unwrap_or(0),
                    "protocol": protocol,
                    "service": service,
                    "version": version,
                    "line": line,
                });
                result.findings.push(Finding::new(
                    ToolKind::Nmap,
                    Severity::Info,
                    target,
                    title,
                    description,
                    raw,
                ));
            }
        }
        result
    }
}
