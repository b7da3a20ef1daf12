// The console owns the terminal, so log lines go to a file instead of
// stderr. `RUST_LOG` controls the filter.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::ConsoleConfig;

pub fn init(config: &ConsoleConfig) -> Result<()> {
    if let Some(dir) = config.log_file.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Creating log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .with_context(|| format!("Opening log file {}", config.log_file.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Installing log subscriber: {e}"))?;
    Ok(())
}
