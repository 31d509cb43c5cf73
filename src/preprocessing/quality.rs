//! # Image Quality Assessment Module
//!
//! This module computes global intensity statistics for a page and maps the
//! detected defects to bounded correction strengths for the enhancer.

use tracing;

use super::types::{AdaptiveStrengths, PixelBuffer, QualityMetrics};
use crate::config::{AnalysisThresholds, StrengthConfig};
use crate::errors::PrepResult;

/// Computes brightness, contrast and variance of the single-channel reduction
/// of `image` and flags the defects they indicate.
///
/// # Arguments
///
/// * `image` - Page to analyze, any supported channel count
/// * `thresholds` - Flag thresholds
///
/// # Returns
///
/// Returns the metrics, or `InvalidImage` for a zero-dimension buffer
///
/// # Examples
///
/// ```
/// use page_prep::config::AnalysisThresholds;
/// use page_prep::preprocessing::{analyze, PixelBuffer};
///
/// let page = PixelBuffer::from_raw(4, 4, 1, vec![255; 16]).unwrap();
/// let metrics = analyze(&page, &AnalysisThresholds::default()).unwrap();
/// assert!(metrics.low_contrast);
/// assert!(!metrics.is_dark);
/// ```
pub fn analyze(image: &PixelBuffer, thresholds: &AnalysisThresholds) -> PrepResult<QualityMetrics> {
    image.ensure_non_empty()?;
    let gray = image.to_gray();

    let (brightness, variance) = mean_and_variance(gray.as_raw());
    let contrast = variance.sqrt();

    let metrics = QualityMetrics {
        brightness,
        contrast,
        variance,
        is_dark: brightness < thresholds.dark_threshold,
        is_bright: brightness > thresholds.bright_threshold,
        low_contrast: contrast < thresholds.low_contrast_threshold,
        is_noisy: variance > thresholds.noise_variance_threshold,
    };

    tracing::debug!(
        target: "ocr_preprocessing",
        brightness = metrics.brightness,
        contrast = metrics.contrast,
        variance = metrics.variance,
        is_dark = metrics.is_dark,
        is_bright = metrics.is_bright,
        low_contrast = metrics.low_contrast,
        is_noisy = metrics.is_noisy,
        "Image analysis"
    );

    Ok(metrics)
}

/// Maps quality metrics to correction intensities.
///
/// Each strength is zero unless its flag is set, and otherwise grows linearly
/// with how far the metric is past its reference point, saturating at 1.
pub fn strengths(metrics: &QualityMetrics, config: &StrengthConfig) -> AdaptiveStrengths {
    let dark = if metrics.is_dark {
        clamp01((config.dark_reference - metrics.brightness) / config.dark_reference)
    } else {
        0.0
    };
    let contrast = if metrics.low_contrast {
        clamp01((config.contrast_reference - metrics.contrast) / config.contrast_reference)
    } else {
        0.0
    };
    let noise = if metrics.is_noisy {
        clamp01((metrics.variance - config.noise_reference) / config.noise_span)
    } else {
        0.0
    };

    let strengths = AdaptiveStrengths {
        dark,
        contrast,
        noise,
    };

    tracing::debug!(
        target: "ocr_preprocessing",
        "Adaptive strength: dark={:.2}, contrast={:.2}, noise={:.2}",
        strengths.dark,
        strengths.contrast,
        strengths.noise
    );

    strengths
}

/// Population mean and variance of 8-bit samples.
pub(crate) fn mean_and_variance(samples: &[u8]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mut histogram = [0u64; 256];
    for &sample in samples {
        histogram[sample as usize] += 1;
    }
    let count = samples.len() as f64;
    let sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &n)| value as f64 * n as f64)
        .sum();
    let mean = sum / count;
    let variance = histogram
        .iter()
        .enumerate()
        .map(|(value, &n)| (value as f64 - mean).powi(2) * n as f64)
        .sum::<f64>()
        / count;
    (mean, variance)
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
