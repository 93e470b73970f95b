use crate::cli::commands::LogsArgs;
use crate::config::LanternConfig;
use crate::errors::LanternError;

pub async fn handle_logs(args: LogsArgs, config: LanternConfig) -> Result<(), LanternError> {
    let engine = super::local_engine(&config, args.db.as_deref())?;
    let lines = engine.job_log(&args.job_id).await?;
    let start = if args.lines == 0 { 0 } else { lines.len().saturating_sub(args.lines) };

    for line in &lines[start..] {
        println!("{}", line.render());
    }
    Ok(())
}
