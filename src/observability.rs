//! Observability module for logging and metrics setup.
//!
//! This module provides:
//! - Structured logging with configurable levels and formats
//! - Pipeline metrics recorded through the `metrics` facade
//!
//! No exporter is installed here; without a recorder the metric calls are
//! no-ops, so embedding applications choose their own backend.

use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::prelude::*;

use crate::observability_config::{LogFormat, ObservabilityConfig};

/// Initialize structured logging from environment variables
pub fn init_tracing_from_env() -> Result<()> {
    init_tracing(&ObservabilityConfig::from_env())
}

/// Initialize structured logging with tracing and configuration.
///
/// Installing a second global subscriber is not an error; the call is
/// skipped so tests and embedding applications can call it freely.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
        .add_directive(format!("page_prep={}", config.log_level).parse()?)
        .add_directive(format!("ocr_preprocessing={}", config.log_level).parse()?);

    let installed = match config.effective_format() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init(),
    };

    if installed.is_ok() {
        tracing::info!(
            environment = %config.environment,
            log_level = %config.log_level,
            "Tracing initialized with structured logging"
        );
    }
    Ok(())
}

/// Record the outcome of one pipeline run
pub fn record_pipeline_metrics(success: bool, duration: Duration, skew_angle: Option<f32>) {
    metrics::counter!("preprocessing_runs_total", "result" => if success { "success" } else { "failure" })
        .increment(1);
    metrics::histogram!("preprocessing_duration_seconds").record(duration.as_secs_f64());
    if let Some(angle) = skew_angle {
        metrics::histogram!("preprocessing_skew_angle_degrees").record(angle as f64);
    }
}

/// Record the time spent in a single pipeline stage
pub fn record_stage_duration(stage: &'static str, duration: Duration) {
    metrics::histogram!("preprocessing_stage_duration_seconds", "stage" => stage)
        .record(duration.as_secs_f64());
}

/// Record a collaborator call (OCR, background removal, classifier)
pub fn record_collaborator_metrics(collaborator: &'static str, success: bool, duration: Duration) {
    metrics::counter!(
        "collaborator_calls_total",
        "collaborator" => collaborator,
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
    metrics::histogram!("collaborator_duration_seconds", "collaborator" => collaborator)
        .record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_repeatable() {
        let config = ObservabilityConfig::default();
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }

    #[test]
    fn test_init_tracing_rejects_bad_level() {
        let config = ObservabilityConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn test_metrics_without_recorder_are_noops() {
        record_pipeline_metrics(true, Duration::from_millis(12), Some(3.0));
        record_pipeline_metrics(false, Duration::from_millis(1), None);
        record_stage_duration("binarize", Duration::from_micros(40));
        record_collaborator_metrics("ocr", true, Duration::from_millis(5));
    }
}
