//! # Enhancement and Deskew Pipeline
//!
//! Runs the stages in their fixed order:
//! analyze -> strengths -> enhance -> binarize -> detect skew -> deskew.
//! Every call owns its buffers, so independent pages can run concurrently
//! without locking; [`enhance_batch`] does exactly that on the rayon pool.

use rayon::prelude::*;
use std::time::{Duration, Instant};
use tracing;

use super::deskewing::{deskew, detect_skew};
use super::enhancement::enhance;
use super::quality::{analyze, strengths};
use super::thresholding::{binarize, snap_to_bilevel};
use super::types::{PixelBuffer, PreprocessingResult};
use crate::config::PreprocessingConfig;
use crate::errors::{error_logging, PrepResult};
use crate::observability::{record_pipeline_metrics, record_stage_duration};

/// Prepares one page for OCR.
///
/// # Arguments
///
/// * `image` - Decoded page, grayscale or RGB
/// * `config` - Pipeline parameters, validated before any stage runs
///
/// # Returns
///
/// The bilevel, deskewed page together with everything the stages decided
/// along the way. Malformed input aborts the run with `InvalidImage`.
///
/// # Examples
///
/// ```
/// use page_prep::config::PreprocessingConfig;
/// use page_prep::preprocessing::{enhance_for_ocr, PixelBuffer};
///
/// let page = PixelBuffer::from_raw(100, 100, 1, vec![255; 100 * 100]).unwrap();
/// let result = enhance_for_ocr(&page, &PreprocessingConfig::default()).unwrap();
/// assert!(result.metrics.low_contrast);
/// assert_eq!(result.final_dimensions, (100, 100));
/// ```
pub fn enhance_for_ocr(
    image: &PixelBuffer,
    config: &PreprocessingConfig,
) -> PrepResult<PreprocessingResult> {
    let start_time = Instant::now();
    let result = run_stages(image, config);
    let duration = start_time.elapsed();

    match &result {
        Ok(report) => {
            record_pipeline_metrics(true, duration, Some(report.skew.angle_degrees));
            tracing::info!(
                target: "ocr_preprocessing",
                width = report.original_dimensions.0,
                height = report.original_dimensions.1,
                actions = report.actions.len(),
                skew_angle = report.skew.angle_degrees,
                degenerate_skew = report.skew.degenerate,
                duration_ms = report.processing_time_ms,
                "Page prepared for OCR"
            );
        }
        Err(e) => {
            record_pipeline_metrics(false, duration, None);
            error_logging::log_preprocessing_error(
                e,
                "enhance_for_ocr",
                Some(image.dimensions()),
                Some(duration),
            );
        }
    }

    result
}

fn run_stages(image: &PixelBuffer, config: &PreprocessingConfig) -> PrepResult<PreprocessingResult> {
    let start_time = Instant::now();
    config.validate()?;
    image.ensure_non_empty()?;
    let original_dimensions = image.dimensions();

    let stage_start = Instant::now();
    let metrics = analyze(image, &config.analysis)?;
    let strengths = strengths(&metrics, &config.strengths);
    record_stage_duration("analyze", stage_start.elapsed());

    let enhanced = enhance(image, &metrics, &strengths, &config.enhancement)?;
    record_stage_duration(
        "enhance",
        Duration::from_millis(enhanced.processing_time_ms as u64),
    );
    let enhanced_page = PixelBuffer::Gray(enhanced.image);

    let stage_start = Instant::now();
    let binary = PixelBuffer::Gray(binarize(&enhanced_page, &config.binarization)?);
    record_stage_duration("binarize", stage_start.elapsed());

    let stage_start = Instant::now();
    let skew = detect_skew(&binary, &config.skew)?;
    record_stage_duration("detect_skew", stage_start.elapsed());

    let stage_start = Instant::now();
    let mut deskewed = deskew(&binary, skew.angle_degrees, &config.deskew)?.to_gray();
    // Bilinear sampling and a mid-gray background both leave intermediate values
    snap_to_bilevel(&mut deskewed, config.skew.foreground_cutoff);
    record_stage_duration("deskew", stage_start.elapsed());

    let final_dimensions = deskewed.dimensions();
    Ok(PreprocessingResult {
        image: PixelBuffer::Gray(deskewed),
        metrics,
        strengths,
        actions: enhanced.actions,
        skew,
        original_dimensions,
        final_dimensions,
        processing_time_ms: start_time.elapsed().as_millis() as u32,
    })
}

/// Prepares many pages in parallel, one independent pipeline per page.
///
/// Results are returned in input order; a failing page does not affect the
/// others.
pub fn enhance_batch(
    images: &[PixelBuffer],
    config: &PreprocessingConfig,
) -> Vec<PrepResult<PreprocessingResult>> {
    let start_time = Instant::now();
    let results: Vec<_> = images
        .par_iter()
        .map(|image| enhance_for_ocr(image, config))
        .collect();

    let failures = results.iter().filter(|r| r.is_err()).count();
    tracing::info!(
        target: "ocr_preprocessing",
        pages = images.len(),
        failures,
        duration_ms = start_time.elapsed().as_millis() as u64,
        "Batch preprocessing completed"
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_invalid_config_aborts_before_stages() {
        let mut config = PreprocessingConfig::default();
        config.binarization.window_size = 4;
        let page = PixelBuffer::Gray(GrayImage::from_pixel(10, 10, Luma([255])));
        assert!(enhance_for_ocr(&page, &config).is_err());
    }

    #[test]
    fn test_output_is_single_channel_bilevel() {
        let page = PixelBuffer::Rgb(image::RgbImage::from_fn(48, 48, |x, y| {
            let v = if (y / 6) % 2 == 0 { 30 } else { 220 };
            image::Rgb([v, v.saturating_add((x % 5) as u8), v])
        }));
        let result = enhance_for_ocr(&page, &PreprocessingConfig::default()).unwrap();
        assert_eq!(result.image.channels(), 1);
        assert!(result
            .image
            .as_samples()
            .iter()
            .all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn test_batch_keeps_order_and_isolates_failures() {
        let pages = vec![
            PixelBuffer::Gray(GrayImage::from_pixel(20, 10, Luma([255]))),
            PixelBuffer::Gray(GrayImage::new(0, 0)),
            PixelBuffer::Gray(GrayImage::from_pixel(30, 12, Luma([255]))),
        ];
        let results = enhance_batch(&pages, &PreprocessingConfig::default());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().original_dimensions, (20, 10));
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().original_dimensions, (30, 12));
    }
}
