//! # External Collaborators
//!
//! Interfaces for the services that surround the preprocessing pipeline:
//! text recognition, background removal and page quality classification.
//! [`DocumentProcessor`] wires them around
//! [`enhance_for_ocr`](crate::preprocessing::enhance_for_ocr). The skip
//! decision is made here, before the pipeline is invoked, never inside it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PreprocessingConfig;
use crate::errors::{error_logging, PreprocessingError, PrepResult};
use crate::observability::record_collaborator_metrics;
use crate::preprocessing::{
    enhance_for_ocr, extract_page_features, PageFeatures, PixelBuffer, PreprocessingResult,
};

/// Text recognition over a prepared page
pub trait OcrEngine: Send + Sync {
    fn extract_text(&self, image: &PixelBuffer) -> PrepResult<String>;
}

/// Image-to-image transform that removes the page background
pub trait BackgroundRemover: Send + Sync {
    fn remove_background(&self, image: PixelBuffer) -> PrepResult<PixelBuffer>;
}

/// Decides from page features whether a capture is worth recognizing
pub trait QualityClassifier: Send + Sync {
    fn is_unsuitable(&self, features: &PageFeatures) -> PrepResult<bool>;
}

/// Settings for the orchestration around the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Stop before the pipeline when the classifier flags the page
    pub skip_unsuitable: bool,
    /// Time budget for one document in [`DocumentProcessor::process_async`]
    pub timeout_secs: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            skip_unsuitable: true,
            timeout_secs: 30,
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> PrepResult<()> {
        if self.timeout_secs == 0 {
            return Err(PreprocessingError::InvalidConfig(
                "timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Recognized text with the preprocessing report that produced its input
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub text: String,
    pub preprocessing: PreprocessingResult,
    /// Processing time in milliseconds, collaborators included
    pub processing_time_ms: u32,
}

/// What happened to a submitted page
#[derive(Debug, Clone)]
pub enum DocumentOutcome {
    /// The classifier judged the page unsuitable and skipping is enabled
    Skipped { features: PageFeatures },
    Processed(ProcessedDocument),
}

/// Runs classifier, background removal, the pipeline and OCR for one page.
#[derive(Clone)]
pub struct DocumentProcessor {
    preprocessing: PreprocessingConfig,
    config: ProcessorConfig,
    ocr: Arc<dyn OcrEngine>,
    background_remover: Option<Arc<dyn BackgroundRemover>>,
    classifier: Option<Arc<dyn QualityClassifier>>,
}

impl DocumentProcessor {
    pub fn new(
        preprocessing: PreprocessingConfig,
        config: ProcessorConfig,
        ocr: Arc<dyn OcrEngine>,
    ) -> PrepResult<Self> {
        preprocessing.validate()?;
        config.validate()?;
        Ok(Self {
            preprocessing,
            config,
            ocr,
            background_remover: None,
            classifier: None,
        })
    }

    pub fn with_background_remover(mut self, remover: Arc<dyn BackgroundRemover>) -> Self {
        self.background_remover = Some(remover);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn QualityClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Processes one page on the calling thread.
    pub fn process(&self, image: PixelBuffer) -> PrepResult<DocumentOutcome> {
        let start_time = Instant::now();
        image.ensure_non_empty()?;

        if let Some(classifier) = &self.classifier {
            let features = extract_page_features(&image)?;
            let unsuitable = call_collaborator("classifier", "is_unsuitable", || {
                classifier.is_unsuitable(&features)
            })?;
            if unsuitable {
                if self.config.skip_unsuitable {
                    info!(
                        brightness = features.brightness,
                        edge_density = features.edge_density,
                        "Page classified as unsuitable for OCR, skipping"
                    );
                    return Ok(DocumentOutcome::Skipped { features });
                }
                warn!("Page classified as unsuitable for OCR, processing anyway");
            }
        }

        let image = match &self.background_remover {
            Some(remover) => call_collaborator("background_remover", "remove_background", || {
                remover.remove_background(image)
            })?,
            None => image,
        };

        let preprocessing = enhance_for_ocr(&image, &self.preprocessing)?;

        let raw_text = call_collaborator("ocr", "extract_text", || {
            self.ocr.extract_text(&preprocessing.image)
        })?;
        let text = clean_text(&raw_text);

        let processing_time_ms = start_time.elapsed().as_millis() as u32;
        info!(
            characters = text.len(),
            duration_ms = processing_time_ms,
            "Document processed"
        );

        Ok(DocumentOutcome::Processed(ProcessedDocument {
            text,
            preprocessing,
            processing_time_ms,
        }))
    }

    /// Processes one page on the blocking thread pool within the configured
    /// time budget.
    ///
    /// On timeout the blocking work is not interrupted; its result is
    /// discarded.
    pub async fn process_async(&self, image: PixelBuffer) -> PrepResult<DocumentOutcome> {
        let processor = self.clone();
        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let start_time = Instant::now();

        let task = tokio::task::spawn_blocking(move || processor.process(image));
        match tokio::time::timeout(timeout_duration, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(PreprocessingError::Collaborator(format!(
                "document processing task failed: {}",
                join_error
            ))),
            Err(_) => {
                warn!(
                    "Document processing timed out after {}ms (limit: {}s)",
                    start_time.elapsed().as_millis(),
                    self.config.timeout_secs
                );
                Err(PreprocessingError::Timeout(format!(
                    "document processing timed out after {} seconds",
                    self.config.timeout_secs
                )))
            }
        }
    }
}

fn call_collaborator<T>(
    collaborator: &'static str,
    operation: &str,
    call: impl FnOnce() -> PrepResult<T>,
) -> PrepResult<T> {
    let start_time = Instant::now();
    let result = call();
    let duration = start_time.elapsed();
    record_collaborator_metrics(collaborator, result.is_ok(), duration);

    match &result {
        Ok(_) => debug!(
            collaborator,
            operation,
            duration_ms = duration.as_millis() as u64,
            "Collaborator call completed"
        ),
        Err(e) => error_logging::log_collaborator_error(e, collaborator, operation),
    }
    result
}

/// Trims every line and drops blank ones.
pub fn clean_text(text: &str) -> String {
    text.trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join("\n")
}
