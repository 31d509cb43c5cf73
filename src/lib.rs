//! # page-prep
//!
//! Adaptive enhancement and deskew pipeline that prepares photographed or
//! scanned document pages for OCR. Quality metrics decide which corrections
//! run and how strongly; the corrected page is binarized, its skew is found
//! by a projection profile search and rotated away.

pub mod collaborators;
pub mod config;
pub mod errors;
pub mod observability;
pub mod observability_config;
#[cfg(feature = "tesseract")]
pub mod ocr;
pub mod preprocessing;

// Re-export types for easier access
pub use config::PreprocessingConfig;
pub use errors::{PreprocessingError, PrepResult};
pub use preprocessing::{enhance_for_ocr, PixelBuffer, PreprocessingResult};
