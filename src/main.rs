// Entrypoint for the console.
// - Keeps `main` small: read config, log in, then hand over to the UI loop.
// - Returns `anyhow::Result` so start-up failures print with their context.

use std::sync::Arc;

use anyhow::Context;
use itisadb_console::{
    api::ApiClient, config::ConsoleConfig, console::Console, help::CommandTable, logging,
    router::Router, ui,
};

fn main() -> anyhow::Result<()> {
    let config = ConsoleConfig::from_env()?;
    logging::init(&config)?;
    tracing::info!(
        url = %config.base_url,
        mode = %config.render_mode,
        "console starting"
    );

    let table = match &config.commands_file {
        Some(path) => CommandTable::load(path)
            .with_context(|| format!("Loading command table {}", path.display()))?,
        None => CommandTable::builtin(),
    };

    let api = ApiClient::from_config(&config)?;
    ui::ensure_session(&api, &config.session_file)?;

    let console = Console::new(
        Router::new(table),
        config.render_mode,
        Arc::new(api.clone()),
        api.cookies().clone(),
        api.base_url().clone(),
    )
    .with_session_file(config.session_file.clone());

    // Blocks until the operator quits or a command navigates away.
    if let Some(url) = ui::run(console)? {
        println!("Continue at {url}");
    }
    Ok(())
}
