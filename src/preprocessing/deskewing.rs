//! # Image Deskewing Module
//!
//! This module detects the dominant text-line orientation of a bilevel page
//! with a brute-force projection profile search and rotates the page back to
//! horizontal.
//!
//! Angles are in degrees, positive meaning counter-clockwise on screen. The
//! angle returned by the detector is the correction: passing it to [`deskew`]
//! aligns the text lines with the horizontal axis.

use image::{GrayImage, Luma, Rgb};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use rayon::prelude::*;
use std::time::Instant;
use tracing;

use super::types::{PixelBuffer, SkewDetection};
use crate::config::{DeskewConfig, DeskewInterpolation, SkewSearchConfig};
use crate::errors::{PreprocessingError, PrepResult};

/// Placement of a rotated page on its output canvas.
///
/// Maps source pixel coordinates to output canvas coordinates: the source
/// center is moved to the origin, rotated, then moved to the canvas center.
/// The skew search and the final rotation share this mapping.
#[derive(Debug, Clone, Copy)]
pub struct RotationGeometry {
    projection: Projection,
    /// Output canvas size
    pub width: u32,
    pub height: u32,
}

impl RotationGeometry {
    /// Rotation by `angle_degrees` onto a canvas of the given size
    pub fn new(source: (u32, u32), canvas: (u32, u32), angle_degrees: f32) -> RotationGeometry {
        let (src_cx, src_cy) = center(source);
        let (dst_cx, dst_cy) = center(canvas);
        // imageproc rotates clockwise for positive theta since y points down
        let projection = Projection::translate(dst_cx, dst_cy)
            * Projection::rotate(-angle_degrees.to_radians())
            * Projection::translate(-src_cx, -src_cy);
        RotationGeometry {
            projection,
            width: canvas.0,
            height: canvas.1,
        }
    }

    /// Rotation that keeps the source frame size
    pub fn fixed(source: (u32, u32), angle_degrees: f32) -> RotationGeometry {
        Self::new(source, source, angle_degrees)
    }

    /// Rotation onto the smallest canvas holding the whole rotated rectangle
    pub fn expanded(source: (u32, u32), angle_degrees: f32) -> RotationGeometry {
        Self::new(source, expanded_dimensions(source, angle_degrees), angle_degrees)
    }

    /// Canvas coordinates of a source pixel
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        self.projection * (x, y)
    }

    /// Canvas pixel a source pixel lands on, if it stays inside the canvas
    fn map_to_pixel(&self, x: f32, y: f32) -> Option<(u32, u32)> {
        let (mx, my) = self.map_point(x, y);
        let px = (mx + 0.5).floor();
        let py = (my + 0.5).floor();
        if px < 0.0 || py < 0.0 || px >= self.width as f32 || py >= self.height as f32 {
            None
        } else {
            Some((px as u32, py as u32))
        }
    }
}

fn center((width, height): (u32, u32)) -> (f32, f32) {
    ((width as f32 - 1.0) / 2.0, (height as f32 - 1.0) / 2.0)
}

/// Bounding box of a `width x height` rectangle rotated by `angle_degrees`,
/// never smaller than the source in either dimension.
///
/// ```
/// use page_prep::preprocessing::deskewing::expanded_dimensions;
///
/// assert_eq!(expanded_dimensions((100, 50), 90.0), (100, 100));
/// assert_eq!(expanded_dimensions((100, 50), 0.0), (100, 50));
/// ```
pub fn expanded_dimensions((width, height): (u32, u32), angle_degrees: f32) -> (u32, u32) {
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let (sin, cos) = (sin.abs() as f64, cos.abs() as f64);
    let (w, h) = (width as f64, height as f64);
    // Tolerance absorbs float error at exact multiples of 90 degrees
    let new_width = (h * sin + w * cos - 1e-3).ceil().max(0.0) as u32;
    let new_height = (h * cos + w * sin - 1e-3).ceil().max(0.0) as u32;
    (new_width.max(width), new_height.max(height))
}

/// Returns the correction angle for a bilevel page.
///
/// Thin wrapper over [`detect_skew`] for callers that only need the number.
pub fn detect_angle(image: &PixelBuffer, config: &SkewSearchConfig) -> PrepResult<f32> {
    Ok(detect_skew(image, config)?.angle_degrees)
}

/// Searches the configured angle range for the rotation that best aligns
/// text lines with the horizontal axis.
///
/// For every candidate the foreground samples (below `foreground_cutoff`) are
/// rotated about the page center within the fixed page frame, and the
/// candidate is scored by the variance of the resulting row counts. Samples
/// rotated out of the frame are dropped. Candidates are scored in parallel;
/// the winner is the first maximal score in iteration order (most negative
/// angle first).
///
/// When every candidate scores the same, as on a page with no foreground, no
/// angle is preferable. The detection is then flagged as degenerate and the
/// candidate closest to zero is returned.
///
/// # Arguments
///
/// * `image` - Bilevel page, reduced to a single channel first
/// * `config` - Angle range, step and foreground cutoff
///
/// # Returns
///
/// The chosen angle with its score, or `InvalidImage` for an empty buffer
pub fn detect_skew(image: &PixelBuffer, config: &SkewSearchConfig) -> PrepResult<SkewDetection> {
    let start_time = Instant::now();
    image.ensure_non_empty()?;
    config.validate()?;

    let gray = image.to_gray();
    let dimensions = gray.dimensions();
    let points = foreground_points(&gray, config.foreground_cutoff);
    let candidates = config.candidates();

    let scores: Vec<f64> = candidates
        .par_iter()
        .map(|&angle| projection_score(&points, dimensions, angle))
        .collect();

    let detection = select_angle(&candidates, &scores);

    let processing_time = start_time.elapsed();
    if detection.degenerate {
        tracing::warn!(
            target: "ocr_preprocessing",
            foreground_pixels = points.len(),
            candidates = candidates.len(),
            "No dominant text orientation found, using {:.1}°",
            detection.angle_degrees
        );
    } else {
        tracing::debug!(
            target: "ocr_preprocessing",
            "Skew detection completed in {}ms: angle={:.1}°, score={:.2}, candidates={}",
            processing_time.as_millis(),
            detection.angle_degrees,
            detection.score,
            candidates.len()
        );
    }

    Ok(detection)
}

fn foreground_points(image: &GrayImage, cutoff: u8) -> Vec<(f32, f32)> {
    image
        .enumerate_pixels()
        .filter(|(_, _, pixel)| pixel[0] < cutoff)
        .map(|(x, y, _)| (x as f32, y as f32))
        .collect()
}

/// Variance of the horizontal projection profile after rotating `points`
/// by `angle_degrees` within the source frame.
fn projection_score(points: &[(f32, f32)], dimensions: (u32, u32), angle_degrees: f32) -> f64 {
    let geometry = RotationGeometry::fixed(dimensions, angle_degrees);
    let mut rows = vec![0u32; dimensions.1 as usize];
    for &(x, y) in points {
        if let Some((_, row)) = geometry.map_to_pixel(x, y) {
            rows[row as usize] += 1;
        }
    }

    let count = rows.len() as f64;
    let mean = rows.iter().map(|&r| r as f64).sum::<f64>() / count;
    rows.iter()
        .map(|&r| (r as f64 - mean).powi(2))
        .sum::<f64>()
        / count
}

fn select_angle(candidates: &[f32], scores: &[f64]) -> SkewDetection {
    let mut best = 0;
    for (index, &score) in scores.iter().enumerate() {
        if score > scores[best] {
            best = index;
        }
    }

    let degenerate = scores.iter().all(|&score| score == scores[best]);
    if degenerate {
        let mut closest = 0;
        for (index, angle) in candidates.iter().enumerate() {
            if angle.abs() < candidates[closest].abs() {
                closest = index;
            }
        }
        best = closest;
    }

    SkewDetection {
        angle_degrees: candidates[best],
        score: scores[best],
        degenerate,
    }
}

/// Rotates `image` by `angle_degrees` about its center.
///
/// Below `expand_threshold_degrees` in magnitude the page keeps its size and
/// content rotated past the frame is lost. At or above it the page is rotated
/// onto the bounding canvas of the rotated rectangle with the content kept
/// centered. Exposed area is filled with `background` in every channel. The
/// channel count of the input is preserved.
pub fn deskew(
    image: &PixelBuffer,
    angle_degrees: f32,
    config: &DeskewConfig,
) -> PrepResult<PixelBuffer> {
    let start_time = Instant::now();
    image.ensure_non_empty()?;
    config.validate()?;
    if !angle_degrees.is_finite() {
        return Err(PreprocessingError::InvalidConfig(format!(
            "rotation angle must be finite, got {}",
            angle_degrees
        )));
    }

    let source = image.dimensions();
    let expand = angle_degrees.abs() >= config.expand_threshold_degrees;
    if angle_degrees == 0.0 && !expand {
        return Ok(image.clone());
    }

    let geometry = if expand {
        RotationGeometry::expanded(source, angle_degrees)
    } else {
        RotationGeometry::fixed(source, angle_degrees)
    };
    let rotated = rotate(image, &geometry, config);

    let processing_time = start_time.elapsed();
    tracing::debug!(
        target: "ocr_preprocessing",
        "Deskewing completed in {}ms: rotated {:.1}°, {}x{} -> {}x{}{}",
        processing_time.as_millis(),
        angle_degrees,
        source.0,
        source.1,
        geometry.width,
        geometry.height,
        if expand { " (expanded canvas)" } else { "" }
    );

    Ok(rotated)
}

fn rotate(image: &PixelBuffer, geometry: &RotationGeometry, config: &DeskewConfig) -> PixelBuffer {
    let interpolation = match config.interpolation {
        DeskewInterpolation::Nearest => Interpolation::Nearest,
        DeskewInterpolation::Bilinear => Interpolation::Bilinear,
    };
    let fill = config.background;

    match image {
        PixelBuffer::Gray(gray) => {
            let mut out = GrayImage::from_pixel(geometry.width, geometry.height, Luma([fill]));
            warp_into(gray, &geometry.projection, interpolation, Luma([fill]), &mut out);
            PixelBuffer::Gray(out)
        }
        PixelBuffer::Rgb(rgb) => {
            let background = Rgb([fill, fill, fill]);
            let mut out = image::RgbImage::from_pixel(geometry.width, geometry.height, background);
            warp_into(rgb, &geometry.projection, interpolation, background, &mut out);
            PixelBuffer::Rgb(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dark horizontal bands on white
    fn banded_page(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |_, y| {
            if y % 16 < 6 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    fn rotate_gray(image: &GrayImage, angle: f32) -> GrayImage {
        let config = DeskewConfig {
            expand_threshold_degrees: 90.0,
            ..Default::default()
        };
        deskew(&PixelBuffer::Gray(image.clone()), angle, &config)
            .unwrap()
            .to_gray()
    }

    #[test]
    fn test_expanded_dimensions_formula() {
        let (w, h) = expanded_dimensions((200, 100), 30.0);
        let expected_w = 100.0 * 0.5 + 200.0 * 30f64.to_radians().cos();
        let expected_h = 100.0 * 30f64.to_radians().cos() + 200.0 * 0.5;
        assert!((w as f64 - expected_w).abs() <= 1.0);
        assert!((h as f64 - expected_h).abs() <= 1.0);
    }

    #[test]
    fn test_geometry_keeps_center() {
        let geometry = RotationGeometry::expanded((101, 51), 33.0);
        let (x, y) = geometry.map_point(50.0, 25.0);
        assert!((x - (geometry.width as f32 - 1.0) / 2.0).abs() < 1e-3);
        assert!((y - (geometry.height as f32 - 1.0) / 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_positive_angle_is_counter_clockwise() {
        // A point right of center moves up when rotated counter-clockwise
        let geometry = RotationGeometry::fixed((101, 101), 90.0);
        let (x, y) = geometry.map_point(100.0, 50.0);
        assert!((x - 50.0).abs() < 1e-3);
        assert!((y - 0.0).abs() < 1e-3);
    }

    #[test]
    fn test_detects_inverse_of_injected_rotation() {
        let page = banded_page(160, 160);
        let search = SkewSearchConfig::default();
        for injected in [-30.0f32, -12.0, -4.0, 7.0, 18.0, 25.0] {
            let rotated = rotate_gray(&page, injected);
            let angle = detect_angle(&PixelBuffer::Gray(rotated), &search).unwrap();
            assert!(
                (angle + injected).abs() <= 1.0,
                "injected {} detected {}",
                injected,
                angle
            );
        }
    }

    #[test]
    fn test_aligned_page_detects_zero() {
        let detection =
            detect_skew(&PixelBuffer::Gray(banded_page(96, 96)), &SkewSearchConfig::default())
                .unwrap();
        assert_eq!(detection.angle_degrees, 0.0);
        assert!(!detection.degenerate);
    }

    #[test]
    fn test_blank_page_is_degenerate_with_zero_angle() {
        let blank = PixelBuffer::Gray(GrayImage::from_pixel(40, 30, Luma([255])));
        let detection = detect_skew(&blank, &SkewSearchConfig::default()).unwrap();
        assert!(detection.degenerate);
        assert_eq!(detection.angle_degrees, 0.0);
        assert_eq!(detection.score, 0.0);
    }

    #[test]
    fn test_degenerate_without_zero_candidate_picks_smallest_magnitude() {
        let blank = PixelBuffer::Gray(GrayImage::from_pixel(20, 20, Luma([255])));
        let search = SkewSearchConfig {
            min_angle: 5.0,
            max_angle: 15.0,
            ..Default::default()
        };
        assert_eq!(detect_angle(&blank, &search).unwrap(), 5.0);
    }

    #[test]
    fn test_ties_resolve_to_first_maximum() {
        let detection = select_angle(&[-2.0, -1.0, 0.0, 1.0], &[1.0, 3.0, 2.0, 3.0]);
        assert_eq!(detection.angle_degrees, -1.0);
        assert!(!detection.degenerate);
    }

    #[test]
    fn test_small_angle_keeps_dimensions() {
        let page = PixelBuffer::Gray(banded_page(120, 80));
        for angle in [-9.9f32, -3.0, 0.5, 9.0] {
            let out = deskew(&page, angle, &DeskewConfig::default()).unwrap();
            assert_eq!(out.dimensions(), (120, 80));
        }
    }

    #[test]
    fn test_large_angle_expands_canvas() {
        let page = PixelBuffer::Gray(banded_page(120, 80));
        for angle in [10.0f32, -10.0, 25.0, -45.0, 60.0] {
            let out = deskew(&page, angle, &DeskewConfig::default()).unwrap();
            let expected = expanded_dimensions((120, 80), angle);
            assert_eq!(out.dimensions(), expected);
            assert!(out.width() >= 120 && out.height() >= 80);
        }
    }

    #[test]
    fn test_deskew_preserves_channel_count_and_fills_white() {
        let page = PixelBuffer::Rgb(image::RgbImage::from_pixel(60, 40, Rgb([0, 0, 0])));
        let out = deskew(&page, 30.0, &DeskewConfig::default()).unwrap();
        assert_eq!(out.channels(), 3);
        match out {
            PixelBuffer::Rgb(rgb) => assert_eq!(*rgb.get_pixel(0, 0), Rgb([255, 255, 255])),
            PixelBuffer::Gray(_) => panic!("expected rgb output"),
        }
    }

    #[test]
    fn test_nearest_rotation_keeps_bilevel_values() {
        let page = PixelBuffer::Gray(banded_page(64, 64));
        let out = deskew(&page, 17.0, &DeskewConfig::default()).unwrap().to_gray();
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_rejects_non_finite_angle() {
        let page = PixelBuffer::Gray(banded_page(8, 8));
        assert!(deskew(&page, f32::NAN, &DeskewConfig::default()).is_err());
    }
}
