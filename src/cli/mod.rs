pub mod cancel;
pub mod commands;
pub mod definitions;
pub mod export;
pub mod logs;
pub mod scan;
pub mod serve;

pub use commands::{Cli, Commands};

use std::sync::Arc;

use crate::config::LanternConfig;
use crate::db::{Database, JobStore};
use crate::errors::LanternError;
use crate::pipeline::ScanEngine;

/// Open the configured database, honouring a per-command `--db` override.
pub(crate) fn open_store(config: &LanternConfig, db: Option<&str>) -> Result<Arc<dyn JobStore>, LanternError> {
    let path = db.unwrap_or(&config.storage.database);
    Ok(Arc::new(Database::new(path)?))
}

pub(crate) fn local_engine(config: &LanternConfig, db: Option<&str>) -> Result<ScanEngine, LanternError> {
    Ok(ScanEngine::from_config(config, open_store(config, db)?))
}
