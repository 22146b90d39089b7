//! Labelled loggers over `tracing`. The verbosity threshold comes from the shared config when a logger is created.

use crate::config::{Config, SharedConfig};
use std::fmt::Display;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Hands out loggers bound to the live configuration.
#[derive(Clone, Debug)]
pub struct LoggerFactory {
    config: SharedConfig,
}

impl LoggerFactory {
    pub fn new(config: SharedConfig) -> Self {
        LoggerFactory { config }
    }

    /// Logger scoped under `label`. Reads `loglevel` now, so earlier config merges are honored.
    pub fn get_logger(&self, label: &str) -> Logger {
        let level = parse_level(&self.config.read().loglevel);
        Logger {
            label: label.to_string(),
            level,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Logger {
    label: String,
    level: LevelFilter,
}

impl Logger {
    pub fn new(label: impl Into<String>, level: LevelFilter) -> Self {
        Logger {
            label: label.into(),
            level,
        }
    }

    /// Child logger labelled `parent:sub`; keeps the parent's threshold.
    pub fn bind(&self, sub: &str) -> Logger {
        Logger {
            label: format!("{}:{}", self.label, sub),
            level: self.level,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    pub fn error(&self, message: impl Display) {
        if self.enabled(Level::ERROR) {
            tracing::error!(label = %self.label, "{}", message);
        }
    }

    pub fn warn(&self, message: impl Display) {
        if self.enabled(Level::WARN) {
            tracing::warn!(label = %self.label, "{}", message);
        }
    }

    pub fn info(&self, message: impl Display) {
        if self.enabled(Level::INFO) {
            tracing::info!(label = %self.label, "{}", message);
        }
    }

    pub fn debug(&self, message: impl Display) {
        if self.enabled(Level::DEBUG) {
            tracing::debug!(label = %self.label, "{}", message);
        }
    }

    pub fn trace(&self, message: impl Display) {
        if self.enabled(Level::TRACE) {
            tracing::trace!(label = %self.label, "{}", message);
        }
    }
}

/// Accepts tracing level names plus `fatal` and `silent`. Unknown names fall back to `info`.
pub fn parse_level(name: &str) -> LevelFilter {
    match name.trim().to_ascii_lowercase().as_str() {
        "silent" => LevelFilter::OFF,
        "fatal" => LevelFilter::ERROR,
        other => LevelFilter::from_str(other).unwrap_or(LevelFilter::INFO),
    }
}

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured level. Returns false if one was already set.
pub fn init_tracing(config: &Config) -> bool {
    let level = parse_level(&config.loglevel);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), level)));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}
