//! Configuration view and validation commands: `triage config`.

use std::path::Path;

use anyhow::{Context, Result};
use triage::config::{TriageToml, template};

use super::super::ConfigCommands;

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => show(config_path),
        Some(ConfigCommands::Validate) => validate(config_path),
        Some(ConfigCommands::Init) => init(config_path),
    }
}

fn show(config_path: &Path) -> Result<()> {
    println!();
    println!("{}", console::style("Triage Configuration").bold());
    println!("====================");
    println!();

    if config_path.exists() {
        println!("Config file: {}", config_path.display());
    } else {
        println!("No triage.toml found at {}", config_path.display());
        println!("Using default configuration.");
    }
    println!();

    let toml = TriageToml::load_layered(config_path)?;

    println!("[server]");
    println!("  host = \"{}\"", toml.server.host);
    println!("  port = {}", toml.server.port);
    println!("  db_path = \"{}\"", toml.server.db_path.display());
    println!("  cors_permissive = {}", toml.server.cors_permissive);
    println!();

    println!("[auth]");
    println!("  mode = \"{}\"", toml.auth.mode);
    println!(
        "  jwt_secret = {}",
        if toml.auth.jwt_secret.is_some() {
            "(set)"
        } else {
            "(unset)"
        }
    );
    println!("  token_ttl_hours = {}", toml.auth.token_ttl_hours);
    println!("  tokens = {}", toml.auth.tokens.len());
    for entry in &toml.auth.tokens {
        let department = if entry.department.is_empty() {
            "-"
        } else {
            entry.department.as_str()
        };
        println!("    {} ({}, {})", entry.identity, entry.role, department);
    }
    println!();

    println!("[events]");
    println!("  capacity = {}", toml.events.capacity);
    println!();

    println!("[logging]");
    println!(
        "  level = \"{}\"",
        toml.logging.level.as_deref().unwrap_or("info")
    );
    println!("  json = {}", toml.logging.json);
    if let Some(dir) = &toml.logging.directory {
        println!("  directory = \"{}\"", dir.display());
    }
    println!();

    if !config_path.exists() {
        println!("Run 'triage config init' to create a triage.toml file.");
        println!();
    }
    Ok(())
}

fn validate(config_path: &Path) -> Result<()> {
    println!();
    println!("Validating configuration...");
    println!();

    if !config_path.exists() {
        println!("No triage.toml found. Using defaults.");
    }

    let toml = TriageToml::load_layered(config_path)?;
    let warnings = toml.validate();

    if warnings.is_empty() {
        println!("{}", console::style("Configuration is valid.").green());
    } else {
        println!("{}", console::style("Configuration warnings:").yellow());
        for warning in warnings {
            println!("  - {}", warning);
        }
    }
    println!();
    Ok(())
}

fn init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("triage.toml already exists at {}", config_path.display());
        println!("Delete it first if you want to recreate it.");
        return Ok(());
    }

    if let Some(parent) = config_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(config_path, template())
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    println!("Created triage.toml at {}", config_path.display());
    println!();
    println!("You can now customize:");
    println!("  - [server] host, port, db_path");
    println!("  - [auth] mode, jwt_secret, [[auth.tokens]]");
    println!("  - [logging] level, json, directory");
    println!();
    Ok(())
}
