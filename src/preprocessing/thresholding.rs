//! # Image Thresholding Module
//!
//! This module converts an enhanced grayscale page to a bilevel image using a
//! locally-windowed mean threshold, then removes speckle with a small opening.

use image::{GrayImage, Luma};
use imageproc::filter::box_filter;
use std::time::Instant;
use tracing;

use super::filtering::apply_opening;
use super::types::PixelBuffer;
use crate::config::BinarizationConfig;
use crate::errors::PrepResult;

/// Binarizes `image` with an adaptive mean threshold.
///
/// A sample becomes 255 when it is strictly greater than the mean of its
/// `window_size x window_size` neighborhood minus `offset`, otherwise 0, so
/// dark text lands on a white background regardless of uneven lighting.
/// The result is then opened with an `opening_kernel`-sized square element.
///
/// # Arguments
///
/// * `image` - Page to binarize; reduced to a single channel first
/// * `config` - Window size, offset and structuring element size
///
/// # Returns
///
/// A single-channel buffer containing only 0 and 255
pub fn binarize(image: &PixelBuffer, config: &BinarizationConfig) -> PrepResult<GrayImage> {
    let start_time = Instant::now();
    image.ensure_non_empty()?;
    config.validate()?;

    let gray = image.to_gray();
    let thresholded = adaptive_mean_threshold(&gray, config.window_size, config.offset);
    let cleaned = apply_opening(&thresholded, config.opening_kernel)?;

    let processing_time = start_time.elapsed();
    tracing::debug!(
        target: "ocr_preprocessing",
        "Adaptive binarization completed in {}ms: window={}, offset={}, opening={}x{}",
        processing_time.as_millis(),
        config.window_size,
        config.offset,
        config.opening_kernel,
        config.opening_kernel
    );

    Ok(cleaned)
}

/// Maps samples below `cutoff` to 0 and the rest to 255, in place.
///
/// Leaves a bilevel image unchanged.
pub fn snap_to_bilevel(image: &mut GrayImage, cutoff: u8) {
    for pixel in image.pixels_mut() {
        pixel[0] = if pixel[0] < cutoff { 0 } else { 255 };
    }
}

/// Compares each sample with its local mean minus `offset`.
fn adaptive_mean_threshold(image: &GrayImage, window_size: u32, offset: i32) -> GrayImage {
    let radius = window_size / 2;
    let local_mean = box_filter(image, radius, radius);

    let mut output = GrayImage::new(image.width(), image.height());
    for ((out, src), mean) in output
        .pixels_mut()
        .zip(image.pixels())
        .zip(local_mean.pixels())
    {
        let threshold = mean[0] as i32 - offset;
        *out = Luma([if src[0] as i32 > threshold { 255 } else { 0 }]);
    }
    output
}
