//! Configuration for the triage server, read from `.triage/triage.toml`.
//!
//! Settings are layered: file, then environment (`TRIAGE_*`, with `.env`
//! loaded through dotenvy), then CLI flags applied by the caller.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! db_path = ".triage/tickets.db"
//! cors_permissive = false
//!
//! [auth]
//! mode = "static"            # or "jwt"
//! jwt_secret = "change-me"
//! token_ttl_hours = 8
//!
//! [[auth.tokens]]
//! token = "alice-token"
//! identity = "alice"
//! role = "Employee"
//! department = "Engineering"
//!
//! [events]
//! capacity = 256
//!
//! [logging]
//! level = "info"
//! json = false
//! directory = ".triage/logs"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use triage_common::Role;

pub const CONFIG_DIR: &str = ".triage";
pub const CONFIG_FILE: &str = "triage.toml";

/// Upper bound on `[auth].token_ttl_hours` (ten years).
pub const MAX_TOKEN_TTL_HOURS: u64 = 24 * 365 * 10;

/// Default location of the config file relative to the working directory.
pub fn default_config_path() -> PathBuf {
    Path::new(CONFIG_DIR).join(CONFIG_FILE)
}

/// How bearer credentials are turned into actors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Fixed token table from `[[auth.tokens]]`
    #[default]
    Static,
    /// HS256-signed JWTs
    Jwt,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::Static => write!(f, "static"),
            AuthMode::Jwt => write!(f, "jwt"),
        }
    }
}

impl std::str::FromStr for AuthMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(AuthMode::Static),
            "jwt" => Ok(AuthMode::Jwt),
            _ => anyhow::bail!("Invalid auth mode '{}'. Valid values: static, jwt", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Allow any origin (local front-end development)
    #[serde(default)]
    pub cors_permissive: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

fn default_db_path() -> PathBuf {
    Path::new(CONFIG_DIR).join("tickets.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            cors_permissive: false,
        }
    }
}

/// One entry of the static token table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticToken {
    pub token: String,
    pub identity: String,
    pub role: Role,
    #[serde(default)]
    pub department: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
    #[serde(default)]
    pub tokens: Vec<StaticToken>,
}

fn default_token_ttl_hours() -> u64 {
    8
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            jwt_secret: None,
            token_ttl_hours: default_token_ttl_hours(),
            tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsSection {
    /// Broadcast buffer per subscriber before it starts lagging
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default)]
    pub json: bool,
    /// Write daily-rolling log files here in addition to stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

/// The complete triage.toml configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub events: EventsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl TriageToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse triage.toml")
    }

    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize triage.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Load the file (or defaults) and layer the process environment on top.
    pub fn load_layered(path: &Path) -> Result<Self> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `TRIAGE_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("TRIAGE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("TRIAGE_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid TRIAGE_PORT '{}'", port))?;
        }
        if let Some(path) = lookup("TRIAGE_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }
        if let Some(secret) = lookup("TRIAGE_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(mode) = lookup("TRIAGE_AUTH_MODE") {
            self.auth.mode = mode.parse()?;
        }
        if let Some(level) = lookup("TRIAGE_LOG_LEVEL") {
            self.logging.level = Some(level);
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.auth.mode {
            AuthMode::Jwt => {
                if self.auth.jwt_secret.as_deref().is_none_or(str::is_empty) {
                    warnings.push(
                        "auth.mode is 'jwt' but no jwt_secret is set; every request will be rejected"
                            .to_string(),
                    );
                }
                if self.auth.token_ttl_hours == 0 {
                    warnings.push("auth.token_ttl_hours is 0; minted tokens expire immediately".to_string());
                }
                if self.auth.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
                    warnings.push(format!(
                        "auth.token_ttl_hours is {}; the maximum is {}",
                        self.auth.token_ttl_hours, MAX_TOKEN_TTL_HOURS
                    ));
                }
            }
            AuthMode::Static => {
                if self.auth.tokens.is_empty() {
                    warnings.push(
                        "auth.mode is 'static' but no [[auth.tokens]] are configured".to_string(),
                    );
                }
            }
        }

        let mut seen = HashSet::new();
        for entry in &self.auth.tokens {
            if entry.token.is_empty() {
                warnings.push(format!("Static token for '{}' is empty", entry.identity));
            } else if !seen.insert(entry.token.as_str()) {
                warnings.push(format!(
                    "Duplicate static token for '{}'; only the first entry is used",
                    entry.identity
                ));
            }
            if entry.role != Role::Admin && entry.department.trim().is_empty() {
                warnings.push(format!(
                    "Static token for '{}' ({}) has no department",
                    entry.identity, entry.role
                ));
            }
        }

        if self.events.capacity == 0 {
            warnings.push("events.capacity is 0; a capacity of 1 will be used".to_string());
        }

        if let Some(level) = &self.logging.level
            && tracing_subscriber::EnvFilter::try_new(level).is_err()
        {
            warnings.push(format!("Invalid logging.level directive '{}'", level));
        }

        warnings
    }
}

/// Commented starter file written by `triage config init`.
pub fn template() -> &'static str {
    r#"# Triage configuration.
# Environment variables TRIAGE_HOST, TRIAGE_PORT, TRIAGE_DB_PATH,
# TRIAGE_JWT_SECRET, TRIAGE_AUTH_MODE and TRIAGE_LOG_LEVEL override these.

[server]
host = "127.0.0.1"
port = 3141
db_path = ".triage/tickets.db"
cors_permissive = false

[auth]
# "static" resolves bearer tokens from the table below; "jwt" verifies
# HS256 tokens minted with `triage token`.
mode = "static"
# jwt_secret = "change-me"
token_ttl_hours = 8

# [[auth.tokens]]
# token = "alice-token"
# identity = "alice"
# role = "Employee"          # Employee | DepartmentHead | Admin
# department = "Engineering"

[events]
capacity = 256

[logging]
# level = "info"
json = false
# directory = ".triage/logs"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = TriageToml::parse("").unwrap();
        assert_eq!(config, TriageToml::default());
        assert_eq!(config.server.port, 3141);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.db_path, PathBuf::from(".triage/tickets.db"));
        assert_eq!(config.auth.mode, AuthMode::Static);
        assert_eq!(config.auth.token_ttl_hours, 8);
        assert_eq!(config.events.capacity, 256);
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config = TriageToml::parse(template()).unwrap();
        assert_eq!(config, TriageToml::default());
    }

    #[test]
    fn test_parse_full_config() {
        let config = TriageToml::parse(
            r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            db_path = "/var/lib/triage/tickets.db"
            cors_permissive = true

            [auth]
            mode = "jwt"
            jwt_secret = "s3cret"
            token_ttl_hours = 2

            [[auth.tokens]]
            token = "t-alice"
            identity = "alice"
            role = "Employee"
            department = "Engineering"

            [[auth.tokens]]
            token = "t-root"
            identity = "root"
            role = "Admin"

            [events]
            capacity = 32

            [logging]
            level = "debug"
            json = true
            directory = "logs"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.server.cors_permissive);
        assert_eq!(config.auth.mode, AuthMode::Jwt);
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.auth.tokens.len(), 2);
        assert_eq!(config.auth.tokens[1].role, Role::Admin);
        assert_eq!(config.auth.tokens[1].department, "");
        assert_eq!(config.events.capacity, 32);
        assert!(config.logging.json);
        assert_eq!(config.logging.directory, Some(PathBuf::from("logs")));
        assert!(config.validate().is_empty(), "{:?}", config.validate());
    }

    #[test]
    fn test_parse_rejects_unknown_role() {
        let err = TriageToml::parse(
            r#"
            [[auth.tokens]]
            token = "t"
            identity = "x"
            role = "Overlord"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("TRIAGE_HOST", "0.0.0.0"),
            ("TRIAGE_PORT", "9000"),
            ("TRIAGE_DB_PATH", "/tmp/t.db"),
            ("TRIAGE_AUTH_MODE", "JWT"),
            ("TRIAGE_JWT_SECRET", "from-env"),
            ("TRIAGE_LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();
        let mut config = TriageToml::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.db_path, PathBuf::from("/tmp/t.db"));
        assert_eq!(config.auth.mode, AuthMode::Jwt);
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("from-env"));
        assert_eq!(config.logging.level.as_deref(), Some("warn"));
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut config = TriageToml::default();
        let err = config
            .apply_env(|key| (key == "TRIAGE_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("TRIAGE_PORT"));

        let err = config
            .apply_env(|key| (key == "TRIAGE_AUTH_MODE").then(|| "ldap".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid auth mode"));
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut config = TriageToml::default();
        config.auth.mode = AuthMode::Jwt;
        config.events.capacity = 0;
        config.logging.level = Some("triage=loud".to_string());
        config.auth.tokens = vec![
            StaticToken {
                token: "dup".to_string(),
                identity: "alice".to_string(),
                role: Role::Employee,
                department: String::new(),
            },
            StaticToken {
                token: "dup".to_string(),
                identity: "bob".to_string(),
                role: Role::Admin,
                department: String::new(),
            },
        ];
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("jwt_secret")));
        assert!(warnings.iter().any(|w| w.contains("Duplicate static token")));
        assert!(warnings.iter().any(|w| w.contains("'alice'") && w.contains("department")));
        assert!(warnings.iter().any(|w| w.contains("events.capacity")));
        assert!(warnings.iter().any(|w| w.contains("logging.level")));
    }

    #[test]
    fn test_validate_bounds_token_ttl() {
        let mut config = TriageToml::default();
        config.auth.mode = AuthMode::Jwt;
        config.auth.jwt_secret = Some("s".to_string());
        config.auth.token_ttl_hours = MAX_TOKEN_TTL_HOURS;
        assert!(config.validate().is_empty());

        config.auth.token_ttl_hours = u64::MAX;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("token_ttl_hours"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = TriageToml::default();
        config.server.port = 4000;
        config.auth.tokens.push(StaticToken {
            token: "t".to_string(),
            identity: "hank".to_string(),
            role: Role::DepartmentHead,
            department: "Engineering".to_string(),
        });
        config.save(&path).unwrap();
        assert_eq!(TriageToml::load(&path).unwrap(), config);
        assert_eq!(
            TriageToml::load_or_default(&dir.path().join("missing.toml")).unwrap(),
            TriageToml::default()
        );
    }
}
