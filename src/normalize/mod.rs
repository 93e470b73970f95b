//! Per-tool parsers that turn raw scanner output into [`Finding`] records.

pub mod nikto;
pub mod nmap;
pub mod nuclei;
pub mod wpscan;

use crate::models::{Finding, LogStream, Policy, ToolKind};

/// Output of one tool launch, split by stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSegment {
    pub targets: Vec<String>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl OutputSegment {
    /// The target this launch was pointed at when it covered exactly one.
    pub fn single_target(&self) -> Option<&str> {
        match self.targets.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}

/// Everything a tool printed, one segment per launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub segments: Vec<OutputSegment>,
}

impl CapturedOutput {
    pub fn new(invocation_targets: &[Vec<String>]) -> Self {
        Self {
            segments: invocation_targets
                .iter()
                .map(|targets| OutputSegment { targets: targets.clone(), ..Default::default() })
                .collect(),
        }
    }

    /// Record a line; engine-written lines are not tool output and are ignored.
    pub fn push(&mut self, invocation: usize, stream: LogStream, text: &str) {
        if self.segments.len() <= invocation {
            self.segments.resize_with(invocation + 1, OutputSegment::default);
        }
        let segment = &mut self.segments[invocation];
        match stream {
            LogStream::Stdout => segment.stdout.push(text.to_string()),
            LogStream::Stderr => segment.stderr.push(text.to_string()),
            LogStream::System => {}
        }
    }

    #[cfg(test)]
    pub fn from_stdout(targets: &[&str], stdout: &str) -> Self {
        Self {
            segments: vec![OutputSegment {
                targets: targets.iter().map(|t| t.to_string()).collect(),
                stdout: stdout.lines().map(String::from).collect(),
                stderr: Vec::new(),
            }],
        }
    }
}

pub struct NormalizeContext<'a> {
    pub policy: &'a Policy,
}

#[derive(Debug, Default)]
pub struct NormalizedOutput {
    pub findings: Vec<Finding>,
    /// Lines or documents that could not be parsed and were skipped.
    pub malformed: usize,
}

pub trait Normalizer: Send + Sync {
    fn parse(&self, output: &CapturedOutput, ctx: &NormalizeContext<'_>) -> NormalizedOutput;
}

pub fn normalizer_for(tool: ToolKind) -> &'static dyn Normalizer {
    match tool {
        ToolKind::Nmap => &nmap::NmapNormalizer,
        ToolKind::Nuclei => &nuclei::NucleiNormalizer,
        ToolKind::Nikto => &nikto::NiktoNormalizer,
        ToolKind::Wpscan => &wpscan::WpscanNormalizer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_routes_streams() {
        let mut captured = CapturedOutput::new(&[vec!["a".into()], vec!["b".into()]]);
        captured.push(1, LogStream::Stdout, "hello");
        captured.push(0, LogStream::Stderr, "warn");
        captured.push(0, LogStream::System, "$ tool");
        assert_eq!(captured.segments[1].stdout, vec!["hello"]);
        assert_eq!(captured.segments[0].stderr, vec!["warn"]);
        assert!(captured.segments[0].stdout.is_empty());
        assert_eq!(captured.segments[1].single_target(), Some("b"));
    }
}
