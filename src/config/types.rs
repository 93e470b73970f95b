use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::RetryConfig;
use crate::models::ToolKind;
use crate::tools::ToolSettings;
use super::credentials::resolve_credential;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct LanternConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub runner: RunnerConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8787 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub database: String,
    /// Attempts after the first when finalizing a job fails.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: "lantern.db".into(),
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true, interval_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Global cap on jobs running at once.
    pub max_concurrent_jobs: usize,
    pub tool_timeout_secs: u64,
    pub cancel_grace_secs: u64,
    /// Live lines a subscriber may fall behind before it is dropped. 0 disables.
    pub subscriber_lag_limit: usize,
    /// Flush the running log to storage after this many new lines.
    pub log_flush_lines: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            tool_timeout_secs: 3600,
            cancel_grace_secs: 5,
            subscriber_lag_limit: 10_000,
            log_flush_lines: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub nmap: Option<PathBuf>,
    pub nuclei: Option<PathBuf>,
    pub nikto: Option<PathBuf>,
    pub wpscan: Option<PathBuf>,
    /// Literal token, or `$VAR` to read it from the environment.
    pub wpscan_api_token: Option<String>,
    pub wpscan_require_token: bool,
}

impl ToolsConfig {
    pub fn executables(&self) -> BTreeMap<ToolKind, PathBuf> {
        [
            (ToolKind::Nmap, &self.nmap),
            (ToolKind::Nuclei, &self.nuclei),
            (ToolKind::Nikto, &self.nikto),
            (ToolKind::Wpscan, &self.wpscan),
        ]
        .into_iter()
        .filter_map(|(kind, path)| path.clone().map(|p| (kind, p)))
        .collect()
    }
}

impl LanternConfig {
    /// Apply `SCHEDULER_DISABLED`, `WPSCAN_API_TOKEN` and `LANTERN_DB`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("SCHEDULER_DISABLED") {
            let value = value.trim();
            if !value.is_empty() && value != "0" {
                self.scheduler.enabled = false;
            }
        }
        if let Some(token) = lookup("WPSCAN_API_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.tools.wpscan_api_token = Some(token);
        }
        if let Some(db) = lookup("LANTERN_DB").filter(|d| !d.trim().is_empty()) {
            self.storage.database = db;
        }
    }

    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            executables: self.tools.executables(),
            wpscan_api_token: self
                .tools
                .wpscan_api_token
                .as_deref()
                .map(resolve_credential)
                .filter(|t| !t.trim().is_empty()),
            wpscan_require_token: self.tools.wpscan_require_token,
            timeout: Duration::from_secs(self.runner.tool_timeout_secs),
            cancel_grace: Duration::from_secs(self.runner.cancel_grace_secs),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.storage.max_retries,
            base_delay: Duration::from_millis(self.storage.retry_base_delay_ms),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SCHEDULER_DISABLED", "1"),
            ("WPSCAN_API_TOKEN", "tok"),
            ("LANTERN_DB", "/var/lib/lantern/jobs.db"),
        ]
        .into_iter()
        .collect();
        let mut config = LanternConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert!(!config.scheduler.enabled);
        assert_eq!(config.tools.wpscan_api_token.as_deref(), Some("tok"));
        assert_eq!(config.storage.database, "/var/lib/lantern/jobs.db");
    }

    #[test]
    fn test_scheduler_disabled_zero_keeps_enabled() {
        let mut config = LanternConfig::default();
        config.apply_overrides_from(|k| (k == "SCHEDULER_DISABLED").then(|| "0".to_string()));
        assert!(config.scheduler.enabled);
    }

    #[test]
    fn test_tool_settings_from_config() {
        let mut config = LanternConfig::default();
        config.tools.nuclei = Some(PathBuf::from("/opt/nuclei"));
        config.runner.tool_timeout_secs = 60;
        let settings = config.tool_settings();
        assert_eq!(settings.executables.get(&ToolKind::Nuclei), Some(&PathBuf::from("/opt/nuclei")));
        assert!(!settings.executables.contains_key(&ToolKind::Nmap));
        assert_eq!(settings.timeout, Duration::from_secs(60));
        assert!(!settings.has_wpscan_token());
    }
}
