//! Token minting command: `triage token`.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use triage::config::{AuthMode, TriageToml};
use triage::server::identity::JwtProvider;
use triage_common::{Actor, Role};

pub fn cmd_token(
    config_path: &Path,
    identity: &str,
    role: &str,
    department: &str,
    ttl_hours: Option<u64>,
) -> Result<()> {
    let toml = TriageToml::load_layered(config_path)?;
    let secret = toml
        .auth
        .jwt_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .context("No jwt_secret configured; set [auth].jwt_secret or TRIAGE_JWT_SECRET")?;

    let role = Role::from_str(role).map_err(|e| anyhow::anyhow!(e))?;
    if identity.trim().is_empty() {
        anyhow::bail!("Identity must not be empty");
    }
    if role != Role::Admin && department.trim().is_empty() {
        anyhow::bail!("--department is required for {}", role);
    }
    let department = if role == Role::Admin { "" } else { department };

    if toml.auth.mode != AuthMode::Jwt {
        eprintln!(
            "{} auth.mode is '{}'; the server will not accept this token until it is 'jwt'.",
            console::style("warning:").yellow().bold(),
            toml.auth.mode
        );
    }

    let provider = JwtProvider::new(
        secret.as_bytes(),
        ttl_hours.unwrap_or(toml.auth.token_ttl_hours),
    )?;
    let token = provider.mint(&Actor::new(identity, role, department))?;
    println!("{}", token);
    Ok(())
}
