//! Tracing subscriber setup.
//!
//! Filter precedence is `RUST_LOG`, then `[logging].level`, then `info`;
//! `--verbose` forces `debug`. Output goes to stderr (human or JSON) and,
//! when `[logging].directory` is set, to a daily-rolling file as well.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LoggingSection;

const LOG_FILE_PREFIX: &str = "triage.log";
const DEFAULT_DIRECTIVE: &str = "info";

/// Keeps the file writer flushing; drop it only at process exit.
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
}

pub fn init(logging: &LoggingSection, verbose: bool) -> Result<TelemetryGuard> {
    let filter = build_filter(
        logging.level.as_deref(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(),
        verbose,
    )?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(stderr_layer(logging.json));

    let mut file_guard = None;
    if let Some(dir) = &logging.directory {
        let (layer, guard) = file_layer(dir, logging.json)?;
        layers.push(layer);
        file_guard = Some(guard);
    }

    compose(layers, filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(TelemetryGuard { _file: file_guard })
}

/// The filter wraps the output layers so it gates every one of them.
fn compose(
    layers: Vec<Box<dyn Layer<Registry> + Send + Sync>>,
    filter: EnvFilter,
) -> impl tracing::Subscriber + Send + Sync {
    Registry::default().with(layers).with(filter)
}

/// Resolve the effective filter from the configured level, `RUST_LOG`
/// and the verbose flag.
fn build_filter(configured: Option<&str>, env: Option<&str>, verbose: bool) -> Result<EnvFilter> {
    let directive = if verbose {
        "debug"
    } else {
        env.filter(|v| !v.trim().is_empty())
            .or(configured)
            .unwrap_or(DEFAULT_DIRECTIVE)
    };
    EnvFilter::try_new(directive)
        .with_context(|| format!("Invalid log filter directive '{}'", directive))
}

fn stderr_layer(json: bool) -> Box<dyn Layer<Registry> + Send + Sync> {
    if json {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_current_span(true),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
    }
}

fn file_layer(
    dir: &Path,
    json: bool,
) -> Result<(Box<dyn Layer<Registry> + Send + Sync>, WorkerGuard)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
    };
    Ok((layer, guard))
}
