//! # Preprocessing Error Types
//!
//! This module defines the error types shared by every preprocessing stage,
//! the configuration loader and the collaborator wiring around the pipeline.

use std::fmt;

/// Errors that can occur while preparing a page for OCR.
#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessingError {
    /// Buffer has a zero dimension, an unsupported channel count or a
    /// sample count that does not match its declared shape
    InvalidImage {
        width: u32,
        height: u32,
        channels: u8,
        reason: String,
    },
    /// Configuration validation or parsing errors
    InvalidConfig(String),
    /// Failed to load, decode or encode an image
    ImageLoad(String),
    /// An external collaborator (OCR engine, background remover, classifier) failed
    Collaborator(String),
    /// An external collaborator exceeded its time budget
    Timeout(String),
}

impl PreprocessingError {
    /// Shorthand for an `InvalidImage` error describing the offending shape.
    pub fn invalid_image(width: u32, height: u32, channels: u8, reason: impl Into<String>) -> Self {
        PreprocessingError::InvalidImage {
            width,
            height,
            channels,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessingError::InvalidImage {
                width,
                height,
                channels,
                reason,
            } => write!(
                f,
                "[INVALID_IMAGE] {}x{} buffer with {} channel(s): {}",
                width, height, channels, reason
            ),
            PreprocessingError::InvalidConfig(msg) => write!(f, "[CONFIG] {}", msg),
            PreprocessingError::ImageLoad(msg) => write!(f, "[IMAGE_LOAD] {}", msg),
            PreprocessingError::Collaborator(msg) => write!(f, "[COLLABORATOR] {}", msg),
            PreprocessingError::Timeout(msg) => write!(f, "[TIMEOUT] {}", msg),
        }
    }
}

impl std::error::Error for PreprocessingError {}

impl From<anyhow::Error> for PreprocessingError {
    fn from(err: anyhow::Error) -> Self {
        PreprocessingError::Collaborator(err.to_string())
    }
}

impl From<image::ImageError> for PreprocessingError {
    fn from(err: image::ImageError) -> Self {
        PreprocessingError::ImageLoad(err.to_string())
    }
}

impl From<std::io::Error> for PreprocessingError {
    fn from(err: std::io::Error) -> Self {
        PreprocessingError::ImageLoad(err.to_string())
    }
}

impl From<serde_json::Error> for PreprocessingError {
    fn from(err: serde_json::Error) -> Self {
        PreprocessingError::InvalidConfig(err.to_string())
    }
}

/// Result type alias for convenience
pub type PrepResult<T> = Result<T, PreprocessingError>;

/// Standardized error logging utilities for consistent error reporting
pub mod error_logging {
    use tracing::error;

    /// Log a failed preprocessing stage with the image shape it was working on
    pub fn log_preprocessing_error(
        error: &impl std::fmt::Display,
        stage: &str,
        dimensions: Option<(u32, u32)>,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            stage = %stage,
            dimensions = ?dimensions,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "Preprocessing stage failed"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }

    /// Log a failure reported by an external collaborator
    pub fn log_collaborator_error(
        error: &impl std::fmt::Display,
        collaborator: &str,
        operation: &str,
    ) {
        error!(
            error = %error,
            collaborator = %collaborator,
            operation = %operation,
            "Collaborator failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_image_display_includes_shape() {
        let err = PreprocessingError::invalid_image(0, 10, 1, "zero width");
        let text = err.to_string();
        assert!(text.contains("0x10"));
        assert!(text.contains("zero width"));
    }

    #[test]
    fn test_serde_error_maps_to_config() {
        let err: PreprocessingError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, PreprocessingError::InvalidConfig(_)));
    }
}
