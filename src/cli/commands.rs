use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::{Policy, Severity, ToolKind};
use crate::errors::LanternError;

#[derive(Parser)]
#[command(name = "lantern", version = long_version(), about = "Vulnerability scan orchestration engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit operator logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (built ",
        env!("BUILD_TIMESTAMP"),
        ")"
    )
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server and the scheduler
    Serve(ServeArgs),
    /// Run an ad-hoc scan and stream its log to the terminal
    Scan(ScanArgs),
    /// Print the stored log of a job
    Logs(LogsArgs),
    /// Export a finished job
    Export(ExportArgs),
    /// Ask a running server to cancel a job
    Cancel(CancelArgs),
    /// Manage saved scan definitions
    #[command(subcommand)]
    Definitions(DefinitionsCommand),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct ServeArgs {
    /// Listen address (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port (overrides config)
    #[arg(long)]
    pub port: Option<u16>,

    /// SQLite database path (overrides config)
    #[arg(long)]
    pub db: Option<String>,

    /// Do not start the scheduler loop
    #[arg(long)]
    pub no_scheduler: bool,
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// Hosts, IPs or URLs; commas and whitespace also separate entries
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Start from a built-in template (see /api/templates)
    #[arg(long)]
    pub template: Option<String>,

    /// Comma-separated tools to run: nmap, nuclei, nikto, wpscan
    #[arg(long, value_delimiter = ',')]
    pub tools: Vec<String>,

    /// Network scanner profile: discovery, full, vuln
    #[arg(long)]
    pub profile: Option<String>,

    /// Comma-separated template-scanner severities
    #[arg(long, value_delimiter = ',')]
    pub severities: Vec<String>,

    /// Tools running at once
    #[arg(long)]
    pub concurrency: Option<u32>,

    /// Requests per second passed to the tools
    #[arg(long)]
    pub rate_limit: Option<u32>,

    /// SQLite database path (overrides config)
    #[arg(long)]
    pub db: Option<String>,
}

impl ScanArgs {
    /// Merge command-line switches over the template (or default) policy.
    pub fn policy(&self) -> Result<Policy, LanternError> {
        let mut policy = match &self.template {
            Some(id) => crate::models::templates::find_template(id)
                .map(|t| t.policy)
                .ok_or_else(|| LanternError::Configuration(format!("unknown template '{}'", id)))?,
            None => Policy::default(),
        };

        if !self.tools.is_empty() {
            let tools = self
                .tools
                .iter()
                .map(|name| {
                    ToolKind::parse(name)
                        .ok_or_else(|| LanternError::InvalidPolicy(format!("unknown tool '{}'", name)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            policy.use_nmap = tools.contains(&ToolKind::Nmap);
            policy.use_nuclei = tools.contains(&ToolKind::Nuclei);
            policy.use_nikto = tools.contains(&ToolKind::Nikto);
            policy.use_wpscan = tools.contains(&ToolKind::Wpscan);
        }
        if let Some(profile) = &self.profile {
            policy.nmap_profile = serde_json::from_value(serde_json::Value::String(profile.clone()))
                .map_err(|_| LanternError::InvalidPolicy(format!("unknown nmap profile '{}'", profile)))?;
        }
        if !self.severities.is_empty() {
            policy.nuclei_severities = self
                .severities
                .iter()
                .map(|s| {
                    Severity::from_label(s)
                        .ok_or_else(|| LanternError::InvalidPolicy(format!("unknown severity '{}'", s)))
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(concurrency) = self.concurrency {
            policy.concurrency = concurrency;
        }
        if self.rate_limit.is_some() {
            policy.rate_limit = self.rate_limit;
        }
        Ok(policy)
    }
}

#[derive(Args, Clone)]
pub struct LogsArgs {
    /// Job ID
    pub job_id: String,

    /// Number of lines to show (0 for all)
    #[arg(short, long, default_value = "0")]
    pub lines: usize,

    /// SQLite database path (overrides config)
    #[arg(long)]
    pub db: Option<String>,
}

#[derive(Args, Clone)]
pub struct ExportArgs {
    /// Job ID
    pub job_id: String,

    /// json, csv or pdf
    #[arg(short, long, default_value = "json")]
    pub format: String,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long)]
    pub db: Option<String>,
}

#[derive(Args, Clone)]
pub struct CancelArgs {
    /// Job ID
    pub job_id: String,

    /// Server base URL (defaults to the configured listen address)
    #[arg(long)]
    pub server: Option<String>,
}

#[derive(Subcommand, Clone)]
pub enum DefinitionsCommand {
    /// Save a scan definition
    Add(DefinitionAddArgs),
    /// List saved scan definitions
    List(DefinitionListArgs),
    /// Run a saved scan definition now and follow its output
    Run(DefinitionRunArgs),
}

#[derive(Args, Clone)]
pub struct DefinitionAddArgs {
    /// Definition name
    #[arg(long)]
    pub name: String,

    /// Cron expression, e.g. "0 2 * * *" or "@daily"; omit for manual-only
    #[arg(long)]
    pub cron: Option<String>,

    #[command(flatten)]
    pub scan: ScanArgs,
}

#[derive(Args, Clone)]
pub struct DefinitionRunArgs {
    /// Definition id, as shown by `definitions list`
    pub id: i64,

    /// SQLite database path (overrides config)
    #[arg(long)]
    pub db: Option<String>,
}

#[derive(Args, Clone)]
pub struct DefinitionListArgs {
    /// SQLite database path (overrides config)
    #[arg(long)]
    pub db: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    use crate::models::NmapProfile;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_policy_overrides() {
        let cli = Cli::parse_from([
            "lantern", "scan", "10.0.0.5", "--tools", "nmap,nikto", "--profile", "quick",
            "--severities", "high,critical", "--concurrency", "1",
        ]);
        let Commands::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        let policy = args.policy().unwrap();
        assert!(policy.use_nmap && policy.use_nikto && !policy.use_nuclei);
        assert_eq!(policy.nmap_profile, NmapProfile::Discovery);
        assert_eq!(policy.nuclei_severities.len(), 2);
        assert_eq!(policy.concurrency, 1);
    }

    #[test]
    fn test_definitions_run_takes_id() {
        let cli = Cli::parse_from(["lantern", "definitions", "run", "7", "--db", "scans.db"]);
        let Commands::Definitions(DefinitionsCommand::Run(args)) = cli.command else {
            panic!("expected definitions run");
        };
        assert_eq!(args.id, 7);
        assert_eq!(args.db.as_deref(), Some("scans.db"));
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let cli = Cli::parse_from(["lantern", "scan", "10.0.0.5", "--tools", "sqlmap"]);
        let Commands::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert!(matches!(args.policy(), Err(LanternError::InvalidPolicy(_))));
    }
}
