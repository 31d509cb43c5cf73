//! # Document Processor Tests
//!
//! Orchestration around the pipeline with mock collaborators.


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use page_prep::collaborators::{
    BackgroundRemover, DocumentOutcome, DocumentProcessor, OcrEngine, ProcessorConfig,
    QualityClassifier,
};
use page_prep::config::PreprocessingConfig;
use page_prep::preprocessing::{PageFeatures, PixelBuffer};
use page_prep::{PreprocessingError, PrepResult};
use test_helpers::*;

/// Returns fixed text and counts its calls
struct MockOcr {
    calls: AtomicUsize,
    text: String,
}

impl MockOcr {
    fn returning(text: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            text: text.to_string(),
        })
    }
}

impl OcrEngine for MockOcr {
    fn extract_text(&self, image: &PixelBuffer) -> PrepResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(image.channels(), 1);
        Ok(self.text.clone())
    }
}

struct FailingOcr;

impl OcrEngine for FailingOcr {
    fn extract_text(&self, _image: &PixelBuffer) -> PrepResult<String> {
        Err(PreprocessingError::Collaborator("engine unavailable".to_string()))
    }
}

struct SlowOcr(Duration);

impl OcrEngine for SlowOcr {
    fn extract_text(&self, _image: &PixelBuffer) -> PrepResult<String> {
        std::thread::sleep(self.0);
        Ok(String::new())
    }
}

/// Replaces the page with a blank one of the same size
#[derive(Default)]
struct BlankingRemover {
    calls: AtomicUsize,
}

impl BackgroundRemover for BlankingRemover {
    fn remove_background(&self, image: PixelBuffer) -> PrepResult<PixelBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = image.dimensions();
        Ok(PixelBuffer::Gray(uniform_page(width, height, PAPER)))
    }
}

struct FixedClassifier(bool);

impl QualityClassifier for FixedClassifier {
    fn is_unsuitable(&self, features: &PageFeatures) -> PrepResult<bool> {
        assert!(features.brightness >= 0.0);
        Ok(self.0)
    }
}

fn page() -> PixelBuffer {
    PixelBuffer::Gray(framed_text_page(120, 90))
}

fn processor(ocr: Arc<dyn OcrEngine>, config: ProcessorConfig) -> DocumentProcessor {
    DocumentProcessor::new(PreprocessingConfig::default(), config, ocr).unwrap()
}

#[test]
fn test_processes_page_and_cleans_text() {
    let ocr = MockOcr::returning("  2 cups flour  \n\n   \n1 tsp salt\n");
    let outcome = processor(ocr.clone(), ProcessorConfig::default())
        .process(page())
        .unwrap();

    match outcome {
        DocumentOutcome::Processed(document) => {
            assert_eq!(document.text, "2 cups flour\n1 tsp salt");
            assert_eq!(document.preprocessing.original_dimensions, (120, 90));
        }
        DocumentOutcome::Skipped { .. } => panic!("page should not be skipped"),
    }
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsuitable_page_is_skipped_before_pipeline() {
    let ocr = MockOcr::returning("never");
    let remover = Arc::new(BlankingRemover::default());
    let outcome = processor(ocr.clone(), ProcessorConfig::default())
        .with_classifier(Arc::new(FixedClassifier(true)))
        .with_background_remover(remover.clone())
        .process(page())
        .unwrap();

    assert!(matches!(outcome, DocumentOutcome::Skipped { .. }));
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    assert_eq!(remover.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unsuitable_page_processed_when_skipping_disabled() {
    let ocr = MockOcr::returning("text");
    let config = ProcessorConfig {
        skip_unsuitable: false,
        ..Default::default()
    };
    let outcome = processor(ocr.clone(), config)
        .with_classifier(Arc::new(FixedClassifier(true)))
        .process(page())
        .unwrap();

    assert!(matches!(outcome, DocumentOutcome::Processed(_)));
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_background_remover_output_feeds_pipeline() {
    let remover = Arc::new(BlankingRemover::default());
    let outcome = processor(MockOcr::returning(""), ProcessorConfig::default())
        .with_classifier(Arc::new(FixedClassifier(false)))
        .with_background_remover(remover.clone())
        .process(page())
        .unwrap();

    assert_eq!(remover.calls.load(Ordering::SeqCst), 1);
    match outcome {
        DocumentOutcome::Processed(document) => {
            // The blank page from the remover has nothing to align
            assert!(document.preprocessing.skew.degenerate);
            assert!(document.preprocessing.metrics.low_contrast);
        }
        DocumentOutcome::Skipped { .. } => panic!("page should not be skipped"),
    }
}

#[test]
fn test_collaborator_errors_propagate() {
    let result = processor(Arc::new(FailingOcr), ProcessorConfig::default()).process(page());
    assert!(matches!(result, Err(PreprocessingError::Collaborator(_))));
}

#[test]
fn test_invalid_page_is_rejected_before_collaborators() {
    let ocr = MockOcr::returning("");
    let result = processor(ocr.clone(), ProcessorConfig::default())
        .with_classifier(Arc::new(FixedClassifier(false)))
        .process(PixelBuffer::Gray(image::GrayImage::new(0, 0)));
    assert!(matches!(result, Err(PreprocessingError::InvalidImage { .. })));
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_invalid_configuration_rejected() {
    let mut preprocessing = PreprocessingConfig::default();
    preprocessing.skew.step = 0.0;
    let result = DocumentProcessor::new(
        preprocessing,
        ProcessorConfig::default(),
        MockOcr::returning(""),
    );
    assert!(matches!(result, Err(PreprocessingError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_process_async_returns_outcome() {
    let outcome = processor(MockOcr::returning("line"), ProcessorConfig::default())
        .process_async(page())
        .await
        .unwrap();
    match outcome {
        DocumentOutcome::Processed(document) => assert_eq!(document.text, "line"),
        DocumentOutcome::Skipped { .. } => panic!("page should not be skipped"),
    }
}

#[tokio::test]
async fn test_process_async_times_out() {
    let config = ProcessorConfig {
        timeout_secs: 1,
        ..Default::default()
    };
    let result = processor(Arc::new(SlowOcr(Duration::from_secs(2))), config)
        .process_async(page())
        .await;
    assert!(matches!(result, Err(PreprocessingError::Timeout(_))));
}
