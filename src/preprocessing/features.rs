//! Page-level features for external quality classifiers.
//!
//! The feature vector describes whether a capture is likely to be a readable
//! document page at all. It is computed on the raw input, before any
//! enhancement, and handed to a [`QualityClassifier`](crate::collaborators::QualityClassifier).

use imageproc::edges::canny;
use serde::Serialize;
use tracing;

use super::quality::mean_and_variance;
use super::types::PixelBuffer;
use crate::errors::PrepResult;

/// Hysteresis thresholds for the edge map
pub const CANNY_LOW_THRESHOLD: f32 = 100.0;
pub const CANNY_HIGH_THRESHOLD: f32 = 200.0;

/// Global statistics of a page capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageFeatures {
    /// Mean sample value
    pub brightness: f64,
    /// Standard deviation of the samples
    pub contrast: f64,
    /// Fraction of pixels on a Canny edge
    pub edge_density: f64,
    /// Variance of the 0/255 edge map
    pub edge_variance: f64,
    /// Shannon entropy of the intensity histogram, in bits
    pub entropy: f64,
}

impl PageFeatures {
    /// Features in classifier input order
    pub fn as_vec(&self) -> Vec<f64> {
        vec![
            self.brightness,
            self.contrast,
            self.edge_density,
            self.edge_variance,
            self.entropy,
        ]
    }
}

/// Computes [`PageFeatures`] on the single-channel reduction of `image`.
pub fn extract_page_features(image: &PixelBuffer) -> PrepResult<PageFeatures> {
    image.ensure_non_empty()?;
    let gray = image.to_gray();

    let (brightness, variance) = mean_and_variance(gray.as_raw());
    let edges = canny(&gray, CANNY_LOW_THRESHOLD, CANNY_HIGH_THRESHOLD);
    let edge_pixels = edges.pixels().filter(|p| p[0] > 0).count();
    let (_, edge_variance) = mean_and_variance(edges.as_raw());

    let features = PageFeatures {
        brightness,
        contrast: variance.sqrt(),
        edge_density: edge_pixels as f64 / edges.as_raw().len() as f64,
        edge_variance,
        entropy: shannon_entropy(gray.as_raw()),
    };

    tracing::debug!(
        target: "ocr_preprocessing",
        brightness = features.brightness,
        contrast = features.contrast,
        edge_density = features.edge_density,
        entropy = features.entropy,
        "Page features extracted"
    );

    Ok(features)
}

fn shannon_entropy(samples: &[u8]) -> f64 {
    let mut histogram = [0u64; 256];
    for &sample in samples {
        histogram[sample as usize] += 1;
    }
    let total = samples.len() as f64;
    histogram
        .iter()
        .filter(|&&n| n > 0)
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum()
}
