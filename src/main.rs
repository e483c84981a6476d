use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "triage")]
#[command(version, about = "HR support-ticket escalation and status workflow server")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to triage.toml (defaults to .triage/triage.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(triage::config::default_config_path)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP + WebSocket server
    Serve {
        /// Address to bind (overrides [server].host)
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on (overrides [server].port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path (overrides [server].db_path)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Initialize the database and exit
        #[arg(long)]
        init: bool,
    },
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Mint a signed bearer token (jwt auth mode)
    Token {
        /// Identity the token is issued to
        identity: String,

        /// Employee, DepartmentHead or Admin
        #[arg(short, long)]
        role: String,

        /// Department of the identity (ignored for Admin)
        #[arg(short, long, default_value = "")]
        department: String,

        /// Lifetime in hours (overrides [auth].token_ttl_hours)
        #[arg(long)]
        ttl_hours: Option<u64>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default triage.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path();

    match &cli.command {
        Commands::Serve {
            host,
            port,
            db_path,
            init,
        } => {
            cmd::cmd_serve(
                &config_path,
                cli.verbose,
                cmd::ServeOverrides {
                    host: host.clone(),
                    port: *port,
                    db_path: db_path.clone(),
                },
                *init,
            )
            .await?;
        }
        Commands::Config { command } => cmd::cmd_config(&config_path, command.clone())?,
        Commands::Token {
            identity,
            role,
            department,
            ttl_hours,
        } => cmd::cmd_token(&config_path, identity, role, department, *ttl_hours)?,
    }

    Ok(())
}
