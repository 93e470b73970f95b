use console::style;
use tokio_stream::StreamExt;
use tracing::info;

use crate::cli::commands::ScanArgs;
use crate::config::LanternConfig;
use crate::errors::LanternError;
use crate::live::LogEvent;
use crate::models::{normalize_targets, JobState, LogLine, LogStream, Severity};
use crate::pipeline::ScanEngine;

pub async fn handle_scan(args: ScanArgs, config: LanternConfig) -> Result<(), LanternError> {
    let policy = args.policy()?;
    let targets = normalize_targets(&args.targets.join(" "));
    if targets.is_empty() {
        return Err(LanternError::InvalidTarget(format!(
            "no valid target in {:?}",
            args.targets
        )));
    }

    let engine = super::local_engine(&config, args.db.as_deref())?;
    let job_id = engine.create_job(targets, policy)?;
    info!(job_id = %job_id, "Scan started");
    follow_job(&engine, &job_id).await
}

/// Print a job's live log until it ends, then its summary. Ctrl-C cancels the job.
pub(crate) async fn follow_job(engine: &ScanEngine, job_id: &str) -> Result<(), LanternError> {
    println!("{} {}", style("Job").bold(), style(job_id).cyan());

    let mut events = engine.stream_job(job_id).await?;
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(LogEvent::Line(line)) => print_line(&line),
                Some(LogEvent::Lagged { .. }) | Some(LogEvent::End) | None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("{}", style("Interrupted; canceling job").yellow());
                engine.cancel_job(job_id).await?;
            }
        }
    }

    let state = engine.wait_for(job_id).await?;
    let record = engine.job(job_id).await?;
    if let Some(summary) = &record.summary {
        println!(
            "{} {} finding(s), risk score {}  [C:{} H:{} M:{} L:{} I:{}]",
            style("Summary:").bold(),
            summary.findings,
            summary.risk_score,
            summary.count(Severity::Critical),
            summary.count(Severity::High),
            summary.count(Severity::Medium),
            summary.count(Severity::Low),
            summary.count(Severity::Info),
        );
    }
    for (tool, status) in &record.tool_status {
        println!("  {:<8} {}", tool.as_str(), status);
    }

    match state {
        JobState::Succeeded | JobState::Canceled => {
            println!("{} {}", style("Job").bold(), style(state).green());
            Ok(())
        }
        JobState::StorageFailed => Err(LanternError::Storage(
            record.error.unwrap_or_else(|| "results could not be saved".into()),
        )),
        other => Err(LanternError::ToolExecution(format!("job {} ended {}", job_id, other))),
    }
}

fn print_line(line: &LogLine) {
    let rendered = line.render();
    match line.stream {
        LogStream::System => println!("{}", style(rendered).cyan()),
        LogStream::Stderr => println!("{}", style(rendered).yellow()),
        LogStream::Stdout => println!("{}", rendered),
    }
}
