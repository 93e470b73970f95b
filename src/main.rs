use clap::Parser;
use tracing_subscriber::EnvFilter;

use lantern::cli::{self, Cli, Commands};
use lantern::config::{self, load_config};
use lantern::errors::LanternError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let exit_code = match &e {
            LanternError::Configuration(_) | LanternError::Yaml(_) | LanternError::Cron(_) => 2,
            LanternError::Storage(_) => 3,
            LanternError::NotFound(_) => 4,
            LanternError::InvalidPolicy(_) | LanternError::InvalidTarget(_) => 5,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}

async fn run(cli: Cli) -> Result<(), LanternError> {
    if let Commands::Validate(args) = &cli.command {
        return handle_validate(&args.config).await;
    }

    let config = load_config(cli.config.as_deref()).await?;
    match cli.command {
        Commands::Serve(args) => cli::serve::handle_serve(args, config).await,
        Commands::Scan(args) => cli::scan::handle_scan(args, config).await,
        Commands::Logs(args) => cli::logs::handle_logs(args, config).await,
        Commands::Export(args) => cli::export::handle_export(args, config).await,
        Commands::Cancel(args) => cli::cancel::handle_cancel(args, config).await,
        Commands::Definitions(command) => cli::definitions::handle_definitions(command, config).await,
        Commands::Validate(_) => Ok(()),
    }
}

async fn handle_validate(path: &std::path::Path) -> Result<(), LanternError> {
    let _config = config::parse_config(path).await?;
    println!("Configuration is valid: {}", path.display());
    Ok(())
}
