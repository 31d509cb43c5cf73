//! # Adaptive Enhancement Module
//!
//! Applies brightness, noise and contrast corrections scaled by the adaptive
//! strengths, or flattens the illumination of a page that needs none of them.

use image::GrayImage;
use std::time::Instant;
use tracing;

use super::filtering::{apply_clahe, apply_gamma, apply_median, normalize_lighting};
use super::quality::mean_and_variance;
use super::types::{
    AdaptiveStrengths, EnhancedImage, EnhancementAction, PixelBuffer, QualityMetrics,
};
use crate::config::EnhancementConfig;
use crate::errors::PrepResult;

/// Runs the corrective stages selected by `strengths`, in fixed order:
///
/// 1. dark: gamma correction followed by CLAHE at a fixed intensity of 1
/// 2. noise: median filter, 5x5 when `1 + noise` reaches the cutoff, else 3x3
/// 3. contrast: CLAHE with clip `base + (1 + contrast)`
/// 4. page not flagged dark, low contrast or noisy: lighting normalization
///
/// Every stage works on the single-channel reduction of the previous output.
/// The last stage follows the `metrics` flags, not the strengths, so a
/// flagged page whose strength clamps to zero is left as is.
pub fn enhance(
    image: &PixelBuffer,
    metrics: &QualityMetrics,
    strengths: &AdaptiveStrengths,
    config: &EnhancementConfig,
) -> PrepResult<EnhancedImage> {
    let start_time = Instant::now();
    image.ensure_non_empty()?;

    let mut processed = image.to_gray();
    let mut actions = Vec::new();

    if strengths.dark > 0.0 {
        let intensity = 1.0 + strengths.dark;
        let gamma = brightness_gamma(&processed, intensity, config);
        tracing::debug!(
            target: "ocr_preprocessing",
            "Brightness correction (strength={:.2}, gamma={:.3})",
            strengths.dark,
            gamma
        );
        if (gamma - 1.0).abs() > f64::EPSILON {
            processed = apply_gamma(&processed, gamma)?;
        }
        actions.push(EnhancementAction::GammaCorrection { gamma });

        let clip_limit = clahe_clip(config, 1.0);
        processed = apply_clahe(&processed, clip_limit, config.clahe_tile_grid)?;
        actions.push(EnhancementAction::Clahe { clip_limit });
    }

    if strengths.noise > 0.0 {
        let intensity = 1.0 + strengths.noise;
        let window = if intensity >= config.median_large_cutoff {
            config.median_large_window
        } else {
            config.median_small_window
        };
        tracing::debug!(
            target: "ocr_preprocessing",
            "Noise reduction (strength={:.2}, window={})",
            strengths.noise,
            window
        );
        processed = apply_median(&processed, window)?;
        actions.push(EnhancementAction::MedianFilter { window });
    }

    if strengths.contrast > 0.0 {
        let clip_limit = clahe_clip(config, 1.0 + strengths.contrast);
        tracing::debug!(
            target: "ocr_preprocessing",
            "Contrast enhancement (strength={:.2}, clip_limit={:.2})",
            strengths.contrast,
            clip_limit
        );
        processed = apply_clahe(&processed, clip_limit, config.clahe_tile_grid)?;
        actions.push(EnhancementAction::Clahe { clip_limit });
    }

    if metrics.is_clean() {
        tracing::debug!(target: "ocr_preprocessing", "Normal image -> normalize lighting");
        processed = normalize_lighting(&processed, config.lighting_blur_window)?;
        actions.push(EnhancementAction::LightingNormalization);
    }

    let processing_time = start_time.elapsed();
    tracing::debug!(
        target: "ocr_preprocessing",
        "Enhancement completed in {}ms with {} action(s)",
        processing_time.as_millis(),
        actions.len()
    );

    Ok(EnhancedImage {
        image: processed,
        actions,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

/// Gamma for the brightness stage, chosen from the mean of the stage input.
/// Midtones keep the identity gamma.
fn brightness_gamma(image: &GrayImage, intensity: f64, config: &EnhancementConfig) -> f64 {
    let (mean, _) = mean_and_variance(image.as_raw());
    if mean < config.gamma_dark_mean_cutoff {
        config.gamma_dark_base * intensity
    } else if mean > config.gamma_bright_mean_cutoff {
        config.gamma_bright_base * intensity
    } else {
        1.0
    }
}

fn clahe_clip(config: &EnhancementConfig, intensity: f64) -> f32 {
    config.clahe_base_clip + intensity as f32
}
