//! Diagnostics on stderr.
//!
//! stdout is reserved for command output (paths, reports), so log lines always
//! go to stderr, as text or as JSON lines. `RAMSYNC_LOG` takes an `EnvFilter`
//! directive and replaces the level chosen from the command-line flags.

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub const LOG_ENV: &str = "RAMSYNC_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Debug output, plus a closing event with timings for each `rsync_mirror` span.
    pub verbose: bool,
    /// Warnings and errors only. Ignored when `verbose` is set.
    pub quiet: bool,
}

impl LogConfig {
    fn level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }

    fn default_directive(&self) -> String {
        format!("ramsync={}", self.level().as_str().to_lowercase())
    }

    fn span_events(&self) -> FmtSpan {
        if self.verbose {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    let json = (config.format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(config.span_events())
            .with_current_span(true)
    });
    let text = (config.format == LogFormat::Text).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(config.span_events())
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init()
        .context("Failed to install log subscriber")
}
