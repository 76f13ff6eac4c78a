//! Tracing setup for the CLI
//!
//! Logs go to stderr so `--json` output on stdout stays parseable. When a
//! log file is configured, a second plain-text layer appends to it.

use std::fs::OpenOptions;
use std::sync::Mutex;

use memlink::config::LoggingConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{CliError, CliResult};

/// `RUST_LOG` wins; otherwise the configured level
pub fn build_filter(config: &LoggingConfig) -> CliResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| CliError::Config(format!("Invalid log level '{}': {e}", config.level)))
}

pub fn init_logging(config: &LoggingConfig) -> CliResult<()> {
    let filter = build_filter(config)?;

    let file_layer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    CliError::Config(format!("Cannot open log file {}: {e}", path.display()))
                })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {e}").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_builds_filter() {
        let config = LoggingConfig {
            level: "memlink=debug,warn".to_string(),
            file: None,
        };
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn unwritable_log_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "info".to_string(),
            file: Some(dir.path().join("missing").join("memlink.log")),
        };
        let err = init_logging(&config).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
