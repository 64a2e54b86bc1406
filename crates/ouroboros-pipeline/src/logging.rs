//! Subscriber setup for the `tracing` events the pipeline emits

use crate::error::{PipelineError, PipelineResult};
use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Structured JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Install the global subscriber.
///
/// Fails if the filter directive is invalid or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> PipelineResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| PipelineError::Configuration(format!("Invalid log filter '{}': {}", config.filter, e)))?;

    let result = if config.json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true);
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).with_line_number(true);
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()
    };
    result.map_err(|e| PipelineError::Configuration(format!("Logging already initialized: {}", e)))?;

    tracing::debug!(filter = %config.filter, json = config.json, "Logging initialized");
    Ok(())
}
