//! Telemetry: structured logging with redaction, and authorization metrics.

pub mod logging;
pub mod metrics;

pub use logging::{
    init_logging, LogFormat, LoggingConfig, RedactionConfig, RedactionPattern,
    SensitiveFieldRedactor,
};
pub use metrics::describe_metrics;

/// Initialize logging and describe metrics. Call once at process start.
pub fn init_telemetry(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    init_logging(config, environment)?;
    describe_metrics();
    tracing::info!(environment, "Telemetry initialized");
    Ok(())
}
