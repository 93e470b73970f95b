use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::LanternError;
use super::finding::Severity;
use super::tool::ToolKind;

/// Network scanner intensity profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NmapProfile {
    /// Top ports with service detection.
    #[serde(alias = "quick")]
    Discovery,
    /// Every TCP port with service detection.
    Full,
    /// Default scripts plus the `vuln` script category.
    #[default]
    Vuln,
}

impl NmapProfile {
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            NmapProfile::Discovery => &["-T4", "-F", "-sV", "-Pn"],
            NmapProfile::Full => &["-T4", "-p-", "-sV", "-Pn"],
            NmapProfile::Vuln => &["-T3", "-sV", "-sC", "--script", "vuln", "-Pn"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub user: String,
    pub pass: String,
}

/// Which tools a job runs and how. A job keeps its own copy, so later edits
/// to a saved definition never affect a job already created from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub name: String,
    pub use_nmap: bool,
    pub nmap_profile: NmapProfile,
    pub use_nuclei: bool,
    pub nuclei_severities: BTreeSet<Severity>,
    pub use_nikto: bool,
    pub use_wpscan: bool,
    /// Maximum number of tools running at once within a job.
    pub concurrency: u32,
    /// Requests per second, passed through to tools that support it.
    pub rate_limit: Option<u32>,
    pub basic_auth: Option<BasicAuth>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            name: "Ad-hoc".to_string(),
            use_nmap: true,
            nmap_profile: NmapProfile::Vuln,
            use_nuclei: true,
            nuclei_severities: [Severity::Critical, Severity::High, Severity::Medium]
                .into_iter()
                .collect(),
            use_nikto: false,
            use_wpscan: false,
            concurrency: 2,
            rate_limit: None,
            basic_auth: None,
        }
    }
}

impl Policy {
    /// Enabled tools in launch order.
    pub fn enabled_tools(&self) -> Vec<ToolKind> {
        ToolKind::ALL
            .into_iter()
            .filter(|t| self.is_enabled(*t))
            .collect()
    }

    pub fn is_enabled(&self, tool: ToolKind) -> bool {
        match tool {
            ToolKind::Nmap => self.use_nmap,
            ToolKind::Nuclei => self.use_nuclei,
            ToolKind::Nikto => self.use_nikto,
            ToolKind::Wpscan => self.use_wpscan,
        }
    }

    pub fn validate(&self) -> Result<(), LanternError> {
        if self.enabled_tools().is_empty() {
            return Err(LanternError::InvalidPolicy("no tool is enabled".into()));
        }
        if self.concurrency == 0 {
            return Err(LanternError::InvalidPolicy("concurrency must be positive".into()));
        }
        if self.use_nuclei && self.nuclei_severities.is_empty() {
            return Err(LanternError::InvalidPolicy(
                "template scanner enabled with an empty severity set".into(),
            ));
        }
        if self.rate_limit == Some(0) {
            return Err(LanternError::InvalidPolicy("rate_limit must be positive".into()));
        }
        Ok(())
    }

    /// Comma-separated severity list in the template scanner's flag format.
    pub fn severity_list(&self) -> String {
        self.nuclei_severities
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn wants_severity(&self, severity: Severity) -> bool {
        self.nuclei_severities.contains(&severity)
    }
}
