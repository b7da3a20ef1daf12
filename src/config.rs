// Console configuration, read from environment variables.
//
// Every setting has a default so the console starts against a local
// front-end with no configuration at all.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;

use crate::transcript::RenderMode;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8087";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub base_url: Url,
    pub render_mode: RenderMode,
    pub request_timeout: Duration,
    /// JSON command table replacing the built-in one.
    pub commands_file: Option<PathBuf>,
    pub session_file: PathBuf,
    pub log_file: PathBuf,
}

impl ConsoleConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes
    /// the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url =
            lookup("ITISADB_CONSOLE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("Invalid ITISADB_CONSOLE_URL {base_url:?}"))?;

        let render_mode = match lookup("ITISADB_CONSOLE_RENDER") {
            Some(mode) => mode
                .parse::<RenderMode>()
                .context("Invalid ITISADB_CONSOLE_RENDER")?,
            None => RenderMode::default(),
        };

        let timeout_secs = match lookup("ITISADB_CONSOLE_TIMEOUT_SECS") {
            Some(secs) => secs
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .with_context(|| {
                    format!(
                        "Invalid ITISADB_CONSOLE_TIMEOUT_SECS {secs:?}, \
                         expected a positive number of seconds"
                    )
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let session_file = lookup("ITISADB_CONSOLE_SESSION")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".itisadb_console_session"));
        let log_file = lookup("ITISADB_CONSOLE_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::cache_dir()
                    .unwrap_or(home)
                    .join("itisadb-console")
                    .join("console.log")
            });

        Ok(ConsoleConfig {
            base_url,
            render_mode,
            request_timeout: Duration::from_secs(timeout_secs),
            commands_file: lookup("ITISADB_CONSOLE_COMMANDS").map(PathBuf::from),
            session_file,
            log_file,
        })
    }
}
