use serde::{Deserialize, Serialize};

/// The external scanners the engine knows how to drive.
///
/// Adding a scanner means adding a variant here plus its argument builder in
/// `tools::command` and its normalizer in `normalize`; the job runner only
/// ever iterates over `ToolKind` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Network scanner.
    Nmap,
    /// Template-based web scanner.
    Nuclei,
    /// Web-server auditor.
    Nikto,
    /// CMS auditor.
    Wpscan,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::Nmap,
        ToolKind::Nuclei,
        ToolKind::Nikto,
        ToolKind::Wpscan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Nmap => "nmap",
            ToolKind::Nuclei => "nuclei",
            ToolKind::Nikto => "nikto",
            ToolKind::Wpscan => "wpscan",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ToolKind::Nmap => "Nmap",
            ToolKind::Nuclei => "Nuclei",
            ToolKind::Nikto => "Nikto",
            ToolKind::Wpscan => "WPScan",
        }
    }

    /// Whether the tool is pointed at URLs rather than bare hosts.
    pub fn wants_url(&self) -> bool {
        !matches!(self, ToolKind::Nmap)
    }

    pub fn parse(name: &str) -> Option<ToolKind> {
        ToolKind::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tool progress within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Executable missing; surfaced without occupying a concurrency slot.
    Unavailable,
    Skipped,
    /// Stopped, or never launched, because the job was canceled.
    Canceled,
}

impl ToolStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ToolStatus::Pending | ToolStatus::Running)
    }

    /// Statuses that leave a job eligible for `succeeded`.
    pub fn is_clean(&self) -> bool {
        matches!(self, ToolStatus::Succeeded | ToolStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Pending => "pending",
            ToolStatus::Running => "running",
            ToolStatus::Succeeded => "succeeded",
            ToolStatus::Failed => "failed",
            ToolStatus::Unavailable => "unavailable",
            ToolStatus::Skipped => "skipped",
            ToolStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
