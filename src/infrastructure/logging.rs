//! Logging system initialization
//!
//! Console and daily rolling file outputs, each optionally JSON. `RUST_LOG`
//! takes precedence over the configured level.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub use crate::infrastructure::config::LoggingConfig;

pub const LOG_FILE_PREFIX: &str = "catalog-sync.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builds the filter used when `RUST_LOG` is unset.
///
/// Statement-level sqlx logs stay at `warn` unless `trace` is requested.
pub fn build_env_filter(level: &str) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(level).with_context(|| format!("invalid log level {level:?}"))?;

    if !level.to_lowercase().contains("trace") {
        for directive in ["sqlx::query=warn", "sqlx::postgres=warn", "hyper=warn", "h2=warn"] {
            filter = filter.add_directive(directive.parse()?);
        }
    }
    Ok(filter)
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    if !config.console_output && !config.file_output {
        return Err(anyhow!("No logging output configured"));
    }

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_env_filter(&config.level)?,
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.console_output {
        layers.push(console_layer(config.json_format));
    }

    if config.file_output {
        let log_dir = Path::new(&config.log_dir);
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        let (writer, file_guard) = non_blocking(rolling::daily(log_dir, LOG_FILE_PREFIX));
        guard = Some(file_guard);

        let layer = fmt::layer()
            .with_writer(writer)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false);
        layers.push(if config.json_format {
            layer.json().with_current_span(true).boxed()
        } else {
            layer.with_target(false).boxed()
        });
    }

    Registry::default()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    info!(
        level = %config.level,
        json = config.json_format,
        console = config.console_output,
        file = config.file_output,
        log_dir = %config.log_dir,
        "logging initialized"
    );
    Ok(guard)
}

fn console_layer(json: bool) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_timer(ChronoUtc::rfc_3339());
    if json {
        layer.json().with_current_span(true).boxed()
    } else {
        layer.with_target(false).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_logs_quieted_below_trace() {
        let filter = build_env_filter("info").unwrap().to_string();
        assert!(filter.contains("sqlx::query=warn"));

        let filter = build_env_filter("trace").unwrap().to_string();
        assert!(!filter.contains("sqlx::query"));
    }

    #[test]
    fn test_no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&config).is_err());
    }
}
