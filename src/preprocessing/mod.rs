//! # Image Preprocessing Module
//!
//! This module prepares document pages for OCR. It measures global image
//! quality, applies corrections scaled by the defects it found, binarizes
//! the page and corrects its rotation.
//!
//! The module is organized into focused sub-modules:
//! - `quality`: Quality metrics and adaptive correction strengths
//! - `filtering`: Gamma, CLAHE, median, lighting and morphology primitives
//! - `enhancement`: Strength-driven sequence of corrections
//! - `thresholding`: Adaptive mean binarization with speckle removal
//! - `deskewing`: Projection profile skew search and rotation
//! - `features`: Page features for external quality classifiers
//! - `pipeline`: The complete stage sequence and batch processing
//! - `types`: Pixel buffer and shared result types

pub mod deskewing;
pub mod enhancement;
pub mod features;
pub mod filtering;
pub mod pipeline;
pub mod quality;
pub mod thresholding;
pub mod types;

// Re-export commonly used types and functions for convenience
pub use types::{
    AdaptiveStrengths, EnhancedImage, EnhancementAction, PixelBuffer, PreprocessingResult,
    QualityMetrics, SkewDetection,
};

// Re-export main functions from sub-modules
pub use deskewing::{deskew, detect_angle, detect_skew};
pub use enhancement::enhance;
pub use features::{extract_page_features, PageFeatures};
pub use pipeline::{enhance_batch, enhance_for_ocr};
pub use quality::{analyze, strengths};
pub use thresholding::binarize;
