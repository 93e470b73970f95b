use std::io::Write;

use tracing::info;

use crate::cli::commands::ExportArgs;
use crate::config::LanternConfig;
use crate::errors::LanternError;
use crate::reporting::{ExportDocument, ExportFormat};

pub async fn handle_export(args: ExportArgs, config: LanternConfig) -> Result<(), LanternError> {
    let format: ExportFormat = args.format.parse()?;
    let engine = super::local_engine(&config, args.db.as_deref())?;
    let document = engine.export_job(&args.job_id, format).await?;

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, document.to_bytes()?).await?;
            info!(job_id = %args.job_id, path = %path.display(), "Export written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            match &document {
                ExportDocument::Pdf(report) => {
                    for line in report.text_lines() {
                        writeln!(stdout, "{}", line)?;
                    }
                }
                other => stdout.write_all(&other.to_bytes()?)?,
            }
            stdout.flush()?;
        }
    }
    Ok(())
}
