//! # Shared Types for Image Preprocessing
//!
//! This module contains the tagged pixel buffer and the metric, strength and
//! result types passed between the preprocessing stages.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use serde::Serialize;

use crate::errors::{PreprocessingError, PrepResult};

/// Luminance weights used for every multi-channel to single-channel reduction.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// An 8-bit image with an explicit channel count.
///
/// Stages never inspect array shapes to guess the layout: each one asks for
/// the arity it needs through [`PixelBuffer::to_gray`] or
/// [`PixelBuffer::to_rgb`].
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    /// Single-channel samples
    Gray(GrayImage),
    /// Three channels in R, G, B order
    Rgb(RgbImage),
}

impl PixelBuffer {
    /// Builds a buffer from interleaved samples.
    pub fn from_raw(width: u32, height: u32, channels: u8, samples: Vec<u8>) -> PrepResult<Self> {
        if width == 0 || height == 0 {
            return Err(PreprocessingError::invalid_image(
                width,
                height,
                channels,
                "image dimensions must be non-zero",
            ));
        }
        let expected = width as usize * height as usize * channels as usize;
        if samples.len() != expected {
            return Err(PreprocessingError::invalid_image(
                width,
                height,
                channels,
                format!("expected {} samples, got {}", expected, samples.len()),
            ));
        }
        let shape_error = || {
            PreprocessingError::invalid_image(width, height, channels, "sample buffer rejected")
        };
        match channels {
            1 => GrayImage::from_raw(width, height, samples)
                .map(PixelBuffer::Gray)
                .ok_or_else(shape_error),
            3 => RgbImage::from_raw(width, height, samples)
                .map(PixelBuffer::Rgb)
                .ok_or_else(shape_error),
            _ => Err(PreprocessingError::invalid_image(
                width,
                height,
                channels,
                "only 1 or 3 channels are supported",
            )),
        }
    }

    /// Wraps a decoded image. Luma layouts stay single-channel, everything
    /// else becomes RGB with any alpha dropped.
    pub fn from_dynamic(image: DynamicImage) -> PrepResult<Self> {
        let buffer = match image {
            DynamicImage::ImageLuma8(gray) => PixelBuffer::Gray(gray),
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
                PixelBuffer::Gray(image.to_luma8())
            }
            DynamicImage::ImageRgb8(rgb) => PixelBuffer::Rgb(rgb),
            other => PixelBuffer::Rgb(other.to_rgb8()),
        };
        buffer.ensure_non_empty()?;
        Ok(buffer)
    }

    pub fn width(&self) -> u32 {
        match self {
            PixelBuffer::Gray(img) => img.width(),
            PixelBuffer::Rgb(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            PixelBuffer::Gray(img) => img.height(),
            PixelBuffer::Rgb(img) => img.height(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn channels(&self) -> u8 {
        match self {
            PixelBuffer::Gray(_) => 1,
            PixelBuffer::Rgb(_) => 3,
        }
    }

    /// Fails with `InvalidImage` when either dimension is zero.
    pub fn ensure_non_empty(&self) -> PrepResult<()> {
        let (width, height) = self.dimensions();
        if width == 0 || height == 0 {
            return Err(PreprocessingError::invalid_image(
                width,
                height,
                self.channels(),
                "image dimensions must be non-zero",
            ));
        }
        Ok(())
    }

    /// Single-channel view of the buffer, reducing RGB with fixed luminance weights.
    pub fn to_gray(&self) -> GrayImage {
        match self {
            PixelBuffer::Gray(img) => img.clone(),
            PixelBuffer::Rgb(img) => {
                let mut gray = GrayImage::new(img.width(), img.height());
                for (x, y, pixel) in img.enumerate_pixels() {
                    let Rgb([r, g, b]) = *pixel;
                    let luma = LUMA_WEIGHTS[0] * r as f32
                        + LUMA_WEIGHTS[1] * g as f32
                        + LUMA_WEIGHTS[2] * b as f32;
                    gray.put_pixel(x, y, Luma([luma.round().clamp(0.0, 255.0) as u8]));
                }
                gray
            }
        }
    }

    /// Three-channel view of the buffer, replicating single-channel samples.
    pub fn to_rgb(&self) -> RgbImage {
        match self {
            PixelBuffer::Rgb(img) => img.clone(),
            PixelBuffer::Gray(img) => {
                let mut rgb = RgbImage::new(img.width(), img.height());
                for (x, y, pixel) in img.enumerate_pixels() {
                    let value = pixel[0];
                    rgb.put_pixel(x, y, Rgb([value, value, value]));
                }
                rgb
            }
        }
    }

    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            PixelBuffer::Gray(img) => DynamicImage::ImageLuma8(img),
            PixelBuffer::Rgb(img) => DynamicImage::ImageRgb8(img),
        }
    }

    /// Raw interleaved samples.
    pub fn as_samples(&self) -> &[u8] {
        match self {
            PixelBuffer::Gray(img) => img.as_raw(),
            PixelBuffer::Rgb(img) => img.as_raw(),
        }
    }
}

impl From<GrayImage> for PixelBuffer {
    fn from(image: GrayImage) -> Self {
        PixelBuffer::Gray(image)
    }
}

impl From<RgbImage> for PixelBuffer {
    fn from(image: RgbImage) -> Self {
        PixelBuffer::Rgb(image)
    }
}

/// Global intensity statistics and the defect flags derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityMetrics {
    /// Mean sample value
    pub brightness: f64,
    /// Standard deviation of the samples
    pub contrast: f64,
    /// Variance of the samples
    pub variance: f64,
    pub is_dark: bool,
    pub is_bright: bool,
    pub low_contrast: bool,
    pub is_noisy: bool,
}

impl QualityMetrics {
    /// True when no corrective enhancement is called for.
    pub fn is_clean(&self) -> bool {
        !(self.is_dark || self.low_contrast || self.is_noisy)
    }
}

/// Correction intensities in `[0, 1]`; zero skips the correction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AdaptiveStrengths {
    pub dark: f64,
    pub contrast: f64,
    pub noise: f64,
}

/// A corrective step applied by the enhancer, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum EnhancementAction {
    GammaCorrection { gamma: f64 },
    Clahe { clip_limit: f32 },
    MedianFilter { window: u32 },
    LightingNormalization,
}

/// Result of the enhancement stage.
#[derive(Debug, Clone)]
pub struct EnhancedImage {
    /// Single-channel enhanced image
    pub image: GrayImage,
    /// Corrections applied, in order
    pub actions: Vec<EnhancementAction>,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Outcome of the angle search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SkewDetection {
    /// Rotation in degrees (counter-clockwise positive) that best aligns text lines
    pub angle_degrees: f32,
    /// Projection-profile variance at the chosen angle
    pub score: f64,
    /// True when every candidate scored the same, e.g. on a blank page
    pub degenerate: bool,
}

/// Result of the full enhancement and deskew pipeline.
#[derive(Debug, Clone)]
pub struct PreprocessingResult {
    /// Bilevel, deskewed single-channel image
    pub image: PixelBuffer,
    pub metrics: QualityMetrics,
    pub strengths: AdaptiveStrengths,
    pub actions: Vec<EnhancementAction>,
    pub skew: SkewDetection,
    /// Input dimensions (width, height)
    pub original_dimensions: (u32, u32),
    /// Output dimensions (width, height)
    pub final_dimensions: (u32, u32),
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_rejects_zero_dimensions() {
        let result = PixelBuffer::from_raw(0, 10, 1, Vec::new());
        assert!(matches!(result, Err(PreprocessingError::InvalidImage { .. })));
    }

    #[test]
    fn test_from_raw_rejects_unsupported_channels() {
        let result = PixelBuffer::from_raw(2, 2, 4, vec![0; 16]);
        assert!(matches!(
            result,
            Err(PreprocessingError::InvalidImage { channels: 4, .. })
        ));
    }

    #[test]
    fn test_from_raw_rejects_wrong_sample_count() {
        let result = PixelBuffer::from_raw(2, 2, 3, vec![0; 11]);
        assert!(result.is_err());
    }

    #[test]
    fn test_gray_rgb_gray_is_lossless() {
        let samples: Vec<u8> = (0..=255).collect();
        let gray = PixelBuffer::from_raw(16, 16, 1, samples.clone()).unwrap();
        let rgb = PixelBuffer::Rgb(gray.to_rgb());
        assert_eq!(rgb.channels(), 3);
        assert_eq!(rgb.to_gray().into_raw(), samples);
    }

    #[test]
    fn test_rgb_reduction_uses_luminance_weights() {
        let rgb = PixelBuffer::from_raw(3, 1, 3, vec![255, 0, 0, 0, 255, 0, 0, 0, 255]).unwrap();
        let gray = rgb.to_gray();
        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        assert_eq!(gray.get_pixel(1, 0)[0], 150);
        assert_eq!(gray.get_pixel(2, 0)[0], 29);
    }

    #[test]
    fn test_from_dynamic_drops_alpha() {
        let rgba = image::RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 40]));
        let buffer = PixelBuffer::from_dynamic(DynamicImage::ImageRgba8(rgba)).unwrap();
        assert_eq!(buffer.channels(), 3);
        assert_eq!(buffer.dimensions(), (4, 3));
        assert_eq!(&buffer.as_samples()[..3], &[10, 20, 30]);
    }

    #[test]
    fn test_from_dynamic_keeps_luma() {
        let gray = GrayImage::from_pixel(5, 5, Luma([7]));
        let buffer = PixelBuffer::from_dynamic(DynamicImage::ImageLuma8(gray)).unwrap();
        assert_eq!(buffer.channels(), 1);
    }

    #[test]
    fn test_from_dynamic_rejects_empty() {
        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        assert!(PixelBuffer::from_dynamic(empty).is_err());
    }
}
