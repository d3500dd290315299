//! Unified logging system
//!
//! Structured logging on top of `tracing-subscriber` with configurable output.

use crate::{config_error, WardenResult};
use serde::{Deserialize, Serialize};
use std::io;
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Whether to include file and line information
    pub include_location: bool,
    /// Whether to include thread information
    pub include_thread: bool,
    /// Whether to log to file
    pub log_to_file: bool,
    /// Log file path (if log_to_file is true)
    pub log_file_path: Option<String>,
    /// Custom filter directives
    pub filter_directives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            include_thread: false,
            log_to_file: false,
            log_file_path: None,
            filter_directives: vec![
                "warden_core=info".to_string(),
                "warden_store=info".to_string(),
                "sqlx=warn".to_string(),
            ],
        }
    }
}

impl LoggingConfig {
    /// Same configuration with the level raised to `debug`
    pub fn verbose(mut self) -> Self {
        self.level = "debug".to_string();
        self.filter_directives = self
            .filter_directives
            .into_iter()
            .map(|d| d.replace("=info", "=debug"))
            .collect();
        self
    }
}

fn make_writer(config: &LoggingConfig) -> WardenResult<BoxMakeWriter> {
    if !config.log_to_file {
        return Ok(BoxMakeWriter::new(io::stdout));
    }

    let log_path = config.log_file_path.as_ref().ok_or_else(|| {
        config_error!(
            "log_file_path must be specified when log_to_file is true",
            "logging"
        )
    })?;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    Ok(BoxMakeWriter::new(std::sync::Mutex::new(file)))
}

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber has already been installed.
pub fn init_logging(config: &LoggingConfig) -> WardenResult<()> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    for directive in &config.filter_directives {
        let parsed: Directive = directive.parse().map_err(|e| {
            config_error!(format!("Invalid filter directive '{}'", directive), "logging", e)
        })?;
        filter = filter.add_directive(parsed);
    }

    let writer = make_writer(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_thread_ids(config.include_thread)
                    .with_thread_names(config.include_thread)
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_thread_ids(config.include_thread)
                    .with_thread_names(config.include_thread)
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_thread_ids(config.include_thread)
                    .with_thread_names(config.include_thread)
                    .with_writer(writer),
            )
            .try_init(),
    };

    result.map_err(|e| config_error!("Failed to install tracing subscriber", "logging", e))
}
