//! # Image Filtering Module
//!
//! This module provides the single-channel filters the enhancer and binarizer
//! compose: gamma correction, tiled contrast-limited histogram equalization
//! (CLAHE), median noise reduction, illumination flattening and morphological
//! opening.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::{median_filter, separable_filter_equal};
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};

use crate::errors::{PreprocessingError, PrepResult};

/// Applies `out = 255 * (in / 255) ^ gamma` through a lookup table.
pub fn apply_gamma(image: &GrayImage, gamma: f64) -> PrepResult<GrayImage> {
    if !(gamma.is_finite() && gamma > 0.0) {
        return Err(PreprocessingError::InvalidConfig(format!(
            "Invalid gamma: {}. Must be > 0.0",
            gamma
        )));
    }

    let mut lut = [0u8; 256];
    for (value, entry) in lut.iter_mut().enumerate() {
        let corrected = (value as f64 / 255.0).powf(gamma) * 255.0;
        // Truncating cast, matching an unsigned 8-bit conversion of the clipped float
        *entry = corrected.clamp(0.0, 255.0) as u8;
    }

    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = lut[pixel[0] as usize];
    }
    Ok(output)
}

/// Applies Contrast Limited Adaptive Histogram Equalization (CLAHE).
///
/// The image is split into a `tile_grid.0 x tile_grid.1` grid. Each tile gets
/// an equalization lookup table built from its histogram, clipped at
/// `clip_limit * tile_area / 256` with the excess redistributed evenly. Output
/// pixels blend the tables of the four nearest tile centers bilinearly so tile
/// seams do not show.
///
/// # Arguments
///
/// * `image` - Single-channel input
/// * `clip_limit` - Histogram clip factor (the enhancer uses 3.0 to 4.0)
/// * `tile_grid` - Number of tiles along (x, y)
pub fn apply_clahe(
    image: &GrayImage,
    clip_limit: f32,
    tile_grid: (u32, u32),
) -> PrepResult<GrayImage> {
    if !(clip_limit.is_finite() && clip_limit > 0.0) {
        return Err(PreprocessingError::InvalidConfig(format!(
            "Invalid clip limit: {}. Must be > 0.0",
            clip_limit
        )));
    }
    if tile_grid.0 == 0 || tile_grid.1 == 0 {
        return Err(PreprocessingError::InvalidConfig(
            "Invalid tile grid: dimensions must be > 0".to_string(),
        ));
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Ok(image.clone());
    }

    // Rounding the tile size up can leave fewer tiles than requested
    let tile_width = width.div_ceil(tile_grid.0.min(width));
    let tile_height = height.div_ceil(tile_grid.1.min(height));
    let tiles_x = width.div_ceil(tile_width);
    let tiles_y = height.div_ceil(tile_height);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for tile_y in 0..tiles_y {
        for tile_x in 0..tiles_x {
            let start_x = tile_x * tile_width;
            let start_y = tile_y * tile_height;
            let end_x = (start_x + tile_width).min(width);
            let end_y = (start_y + tile_height).min(height);
            luts.push(tile_lut(image, (start_x, start_y, end_x, end_y), clip_limit));
        }
    }

    let mut output = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let (x0, x1, wx) = neighbor_tiles(x, tile_width, tiles_x);
        let (y0, y1, wy) = neighbor_tiles(y, tile_height, tiles_y);
        let value = pixel[0] as usize;

        let lut_at = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][value] as f32;
        let top = lut_at(x0, y0) * (1.0 - wx) + lut_at(x1, y0) * wx;
        let bottom = lut_at(x0, y1) * (1.0 - wx) + lut_at(x1, y1) * wx;
        let blended = top * (1.0 - wy) + bottom * wy;

        output.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
    }

    Ok(output)
}

/// Builds the clipped equalization table for one tile.
fn tile_lut(image: &GrayImage, bounds: (u32, u32, u32, u32), clip_limit: f32) -> [u8; 256] {
    let (start_x, start_y, end_x, end_y) = bounds;
    let mut histogram = [0u32; 256];
    for y in start_y..end_y {
        for x in start_x..end_x {
            histogram[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let area = (end_x - start_x) * (end_y - start_y);
    let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for count in &mut histogram {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }

    // Redistribute excess pixels uniformly, spreading the remainder over evenly spaced bins
    let increment = excess / 256;
    let remainder = excess % 256;
    for count in &mut histogram {
        *count += increment;
    }
    if remainder > 0 {
        let step = (256 / remainder).max(1) as usize;
        for count in histogram.iter_mut().step_by(step).take(remainder as usize) {
            *count += 1;
        }
    }

    let scale = 255.0 / area as f32;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (entry, &count) in lut.iter_mut().zip(histogram.iter()) {
        cumulative += count;
        *entry = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Indices of the two tiles whose centers surround `coord`, and the weight of the second.
fn neighbor_tiles(coord: u32, tile_size: u32, tile_count: u32) -> (u32, u32, f32) {
    let position = (coord as f32 + 0.5) / tile_size as f32 - 0.5;
    let lower = position.floor();
    let weight = position - lower;
    let last = tile_count as i64 - 1;
    let first = (lower as i64).clamp(0, last) as u32;
    let second = (lower as i64 + 1).clamp(0, last) as u32;
    (first, second, weight)
}

/// Median filter over a square `window x window` neighborhood.
pub fn apply_median(image: &GrayImage, window: u32) -> PrepResult<GrayImage> {
    if window == 0 || window % 2 == 0 {
        return Err(PreprocessingError::InvalidConfig(format!(
            "Invalid median window: {}. Must be odd",
            window
        )));
    }
    let radius = window / 2;
    Ok(median_filter(image, radius, radius))
}

/// Flattens large-scale illumination: divides the image by a heavily blurred
/// copy of itself and rescales to `[0, 255]`.
///
/// `window` is the side of the Gaussian kernel; its sigma follows the usual
/// `0.3 * ((window - 1) / 2 - 1) + 0.8` rule for a given aperture.
pub fn normalize_lighting(image: &GrayImage, window: u32) -> PrepResult<GrayImage> {
    if window < 3 || window % 2 == 0 {
        return Err(PreprocessingError::InvalidConfig(format!(
            "Invalid blur window: {}. Must be an odd number >= 3",
            window
        )));
    }

    let kernel = gaussian_kernel(window);
    let samples: Vec<f32> = image.as_raw().iter().map(|&v| v as f32).collect();
    let as_float: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(image.width(), image.height(), samples).ok_or_else(|| {
            PreprocessingError::invalid_image(image.width(), image.height(), 1, "buffer mismatch")
        })?;
    let background = separable_filter_equal(&as_float, &kernel);

    let mut output = GrayImage::new(image.width(), image.height());
    for ((out, src), bg) in output
        .pixels_mut()
        .zip(image.pixels())
        .zip(background.pixels())
    {
        let divisor = bg[0];
        out[0] = if divisor <= f32::EPSILON {
            0
        } else {
            (src[0] as f32 * 255.0 / divisor).round().clamp(0.0, 255.0) as u8
        };
    }
    Ok(output)
}

/// Normalized 1-D Gaussian of the given odd length.
fn gaussian_kernel(window: u32) -> Vec<f32> {
    let sigma = 0.3 * ((window as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (window / 2) as i32;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Morphological opening with a `size x size` square structuring element.
///
/// Erosion takes the minimum over the element anchored at its top-left
/// sample; dilation takes the maximum over the reflected element, so shapes
/// that survive the opening keep their position even for even sizes.
pub fn apply_opening(image: &GrayImage, size: u8) -> PrepResult<GrayImage> {
    if size == 0 {
        return Err(PreprocessingError::InvalidConfig(
            "Invalid structuring element: size must be > 0".to_string(),
        ));
    }
    let element = GrayImage::from_pixel(size as u32, size as u32, Luma([255]));
    let erode_mask = Mask::from_image(&element, 0, 0);
    let dilate_mask = Mask::from_image(&element, size - 1, size - 1);

    let eroded = grayscale_erode(image, &erode_mask);
    Ok(grayscale_dilate(&eroded, &dilate_mask))
}
