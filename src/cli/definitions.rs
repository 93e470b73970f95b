use console::style;
use tracing::info;

use crate::cli::commands::DefinitionsCommand;
use crate::config::LanternConfig;
use crate::errors::LanternError;
use crate::models::{normalize_targets, NewScanDefinition};

pub async fn handle_definitions(command: DefinitionsCommand, config: LanternConfig) -> Result<(), LanternError> {
    match command {
        DefinitionsCommand::Add(args) => {
            let engine = super::local_engine(&config, args.scan.db.as_deref())?;
            let saved = engine.register_scan_definition(NewScanDefinition {
                name: args.name.clone(),
                policy: args.scan.policy()?,
                targets: normalize_targets(&args.scan.targets.join(" ")),
                cron: args.cron.clone(),
            })?;
            println!(
                "Saved definition {} ({}), {} target(s), schedule: {}",
                style(saved.id).cyan(),
                saved.name,
                saved.targets.len(),
                saved.cron.as_deref().unwrap_or("manual")
            );
        }
        DefinitionsCommand::List(args) => {
            let engine = super::local_engine(&config, args.db.as_deref())?;
            for def in engine.list_definitions()? {
                println!(
                    "{:>4}  {:<24} {:<14} {:<20} {}",
                    def.id,
                    def.name,
                    def.cron.as_deref().unwrap_or("manual"),
                    def.last_fired_at.map(|t| t.format("%Y-%m-%d %H:%M").to_string()).unwrap_or_else(|| "-".into()),
                    def.targets.join(", ")
                );
            }
        }
        DefinitionsCommand::Run(args) => {
            let engine = super::local_engine(&config, args.db.as_deref())?;
            let job_id = engine.run_definition(args.id)?;
            info!(job_id = %job_id, definition_id = args.id, "Definition run started");
            super::scan::follow_job(&engine, &job_id).await?;
        }
    }
    Ok(())
}
