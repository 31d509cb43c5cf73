//! # Tesseract OCR Adapter
//!
//! [`OcrEngine`] implementation backed by the Tesseract engine through
//! `leptess`. Available with the `tesseract` cargo feature.

use std::io::Cursor;
use std::time::Instant;

use image::ImageFormat;
use leptess::{LepTess, Variable};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::collaborators::OcrEngine;
use crate::errors::{PreprocessingError, PrepResult};
use crate::preprocessing::PixelBuffer;

/// Tesseract settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    /// Language codes joined with `+`, e.g. `eng+fra`
    pub languages: String,
    /// Directory holding `*.traineddata`; the Tesseract default when unset
    pub tessdata_path: Option<String>,
    /// Page segmentation mode, 3 is fully automatic layout analysis
    pub page_segmentation_mode: u8,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            languages: "eng".to_string(),
            tessdata_path: None,
            page_segmentation_mode: 3,
        }
    }
}

/// Creates a fresh Tesseract instance per call, so the engine is freely
/// shareable between threads.
#[derive(Debug, Clone, Default)]
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    fn create_instance(&self) -> PrepResult<LepTess> {
        let mut tess = LepTess::new(self.config.tessdata_path.as_deref(), &self.config.languages)
            .map_err(|e| {
                PreprocessingError::Collaborator(format!(
                    "Failed to initialize Tesseract OCR instance: {}",
                    e
                ))
            })?;
        tess.set_variable(
            Variable::TesseditPagesegMode,
            &self.config.page_segmentation_mode.to_string(),
        )
        .map_err(|e| PreprocessingError::Collaborator(format!("Failed to set PSM mode: {}", e)))?;
        Ok(tess)
    }
}

impl OcrEngine for TesseractEngine {
    fn extract_text(&self, image: &PixelBuffer) -> PrepResult<String> {
        let start_time = Instant::now();

        let mut encoded = Cursor::new(Vec::new());
        image
            .clone()
            .into_dynamic()
            .write_to(&mut encoded, ImageFormat::Png)?;
        debug!(bytes = encoded.get_ref().len(), "Encoded page for Tesseract");

        let mut tess = self.create_instance()?;
        tess.set_image_from_mem(encoded.get_ref()).map_err(|e| {
            PreprocessingError::Collaborator(format!("Failed to load image for OCR: {}", e))
        })?;
        let text = tess.get_utf8_text().map_err(|e| {
            PreprocessingError::Collaborator(format!("Failed to extract text from image: {}", e))
        })?;

        info!(
            "OCR processing completed in {}ms, extracted {} characters",
            start_time.elapsed().as_millis(),
            text.len()
        );
        Ok(text)
    }
}
