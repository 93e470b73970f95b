use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api;
use crate::cli::commands::ServeArgs;
use crate::config::LanternConfig;
use crate::errors::LanternError;
use crate::scheduler::{spawn_scheduler, JobLauncher, SchedulerLoop};

pub async fn handle_serve(args: ServeArgs, mut config: LanternConfig) -> Result<(), LanternError> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(db) = args.db {
        config.storage.database = db;
    }

    let state = api::create_app_state(&config)?;
    let shutdown = CancellationToken::new();

    let scheduler = if config.scheduler.enabled && !args.no_scheduler {
        let launcher: Arc<dyn JobLauncher> = Arc::new(state.engine.clone());
        let scheduler = SchedulerLoop::new(
            Arc::clone(state.engine.store()),
            launcher,
            Duration::from_secs(config.scheduler.interval_secs),
        );
        Some(spawn_scheduler(scheduler, shutdown.clone()))
    } else {
        info!("Scheduler disabled; definitions are manual-only");
        None
    };

    let app = api::build_router(state);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, database = %config.storage.database, "Listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            signal.cancel();
        })
        .await
        .map_err(|e| LanternError::Internal(format!("Server error: {}", e)))?;

    shutdown.cancel();
    if let Some(handle) = scheduler {
        let _ = handle.await;
    }
    Ok(())
}
