pub mod command;
pub mod process;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::LanternError;
use crate::models::{Policy, ToolKind};

pub use command::{build_invocations, CommandContext, Invocation};
pub use process::{ExitKind, ExitOutcome, ProcessLimits, ToolEvent, ToolHandle};

/// Deployment-level tool configuration shared by every adapter.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Executable overrides; tools not listed are looked up on `PATH` by name.
    pub executables: BTreeMap<ToolKind, PathBuf>,
    pub wpscan_api_token: Option<String>,
    /// Refuse to run the CMS auditor without an API token.
    pub wpscan_require_token: bool,
    pub timeout: Duration,
    pub cancel_grace: Duration,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            executables: BTreeMap::new(),
            wpscan_api_token: None,
            wpscan_require_token: false,
            timeout: Duration::from_secs(3600),
            cancel_grace: Duration::from_secs(5),
        }
    }
}

impl ToolSettings {
    pub fn has_wpscan_token(&self) -> bool {
        self.wpscan_api_token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Wraps one external scanner: argument construction, launch, verdict.
#[derive(Debug, Clone)]
pub struct ToolAdapter {
    kind: ToolKind,
    settings: Arc<ToolSettings>,
}

impl ToolAdapter {
    pub fn new(kind: ToolKind, settings: Arc<ToolSettings>) -> Self {
        Self { kind, settings }
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    /// Configuration-time checks. Nothing is spawned.
    pub fn validate(&self, policy: &Policy) -> Result<(), LanternError> {
        if !policy.is_enabled(self.kind) {
            return Err(LanternError::Configuration(format!(
                "{} is not enabled by policy '{}'",
                self.kind.display_name(),
                policy.name
            )));
        }
        if self.kind == ToolKind::Wpscan
            && self.settings.wpscan_require_token
            && !self.settings.has_wpscan_token()
        {
            return Err(LanternError::Configuration(
                "WPScan requires an API token (set WPSCAN_API_TOKEN)".into(),
            ));
        }
        Ok(())
    }

    /// Locate the executable, either the configured path or by name on `PATH`.
    pub fn resolve(&self) -> Result<PathBuf, LanternError> {
        let program = self
            .settings
            .executables
            .get(&self.kind)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(self.kind.as_str()));
        which::which(&program).map_err(|e| {
            LanternError::ToolUnavailable(format!("{} ({}): {}", self.kind, program.display(), e))
        })
    }

    pub fn launch(
        &self,
        targets: &[String],
        policy: &Policy,
        cancel: CancellationToken,
    ) -> Result<ToolHandle, LanternError> {
        self.validate(policy)?;
        let program = self.resolve()?;
        let ctx = CommandContext {
            wpscan_api_token: self.settings.wpscan_api_token.as_deref(),
        };
        let invocations = build_invocations(self.kind, &program, targets, policy, &ctx);
        debug!(tool = %self.kind, launches = invocations.len(), "Launching tool");
        let limits = ProcessLimits {
            timeout: self.settings.timeout,
            grace: self.settings.cancel_grace,
        };
        Ok(ToolHandle::spawn(invocations, limits, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(require_token: bool, token: Option<&str>) -> Arc<ToolSettings> {
        Arc::new(ToolSettings {
            wpscan_require_token: require_token,
            wpscan_api_token: token.map(String::from),
            ..Default::default()
        })
    }

    #[test]
    fn test_disabled_tool_rejected() {
        let adapter = ToolAdapter::new(ToolKind::Nikto, settings(false, None));
        assert!(matches!(
            adapter.validate(&Policy::default()),
            Err(LanternError::Configuration(_))
        ));
    }

    #[test]
    fn test_wpscan_token_requirement() {
        let policy = Policy { use_wpscan: true, ..Default::default() };
        let strict = ToolAdapter::new(ToolKind::Wpscan, settings(true, None));
        assert!(matches!(strict.validate(&policy), Err(LanternError::Configuration(_))));
        let blank = ToolAdapter::new(ToolKind::Wpscan, settings(true, Some("  ")));
        assert!(blank.validate(&policy).is_err());
        let ok = ToolAdapter::new(ToolKind::Wpscan, settings(true, Some("tok")));
        assert!(ok.validate(&policy).is_ok());
        let lenient = ToolAdapter::new(ToolKind::Wpscan, settings(false, None));
        assert!(lenient.validate(&policy).is_ok());
    }

    #[test]
    fn test_missing_executable_unavailable() {
        let mut executables = BTreeMap::new();
        executables.insert(ToolKind::Nmap, PathBuf::from("/nonexistent/bin/nmap"));
        let adapter = ToolAdapter::new(
            ToolKind::Nmap,
            Arc::new(ToolSettings { executables, ..Default::default() }),
        );
        assert!(matches!(adapter.resolve(), Err(LanternError::ToolUnavailable(_))));
    }
}
