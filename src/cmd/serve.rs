//! HTTP server command: `triage serve`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use triage::config::TriageToml;
use triage::server::{ServerConfig, start_server};
use triage::workflow::TicketDb;

/// CLI flags that take precedence over file and environment settings.
pub struct ServeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
}

pub async fn cmd_serve(
    config_path: &Path,
    verbose: bool,
    overrides: ServeOverrides,
    init: bool,
) -> Result<()> {
    let mut toml = TriageToml::load_layered(config_path)?;
    if let Some(host) = overrides.host {
        toml.server.host = host;
    }
    if let Some(port) = overrides.port {
        toml.server.port = port;
    }
    if let Some(db_path) = overrides.db_path {
        toml.server.db_path = db_path;
    }

    let _telemetry = triage::telemetry::init(&toml.logging, verbose)?;
    for warning in toml.validate() {
        tracing::warn!(%warning, "Configuration warning");
    }

    let config = ServerConfig::from_toml(&toml);

    if init {
        if let Some(parent) = config.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        let db = TicketDb::new(&config.db_path)?;
        println!(
            "Ticket database initialized at {} ({} tickets)",
            config.db_path.display(),
            db.count()?
        );
        return Ok(());
    }

    start_server(config, &toml).await
}
