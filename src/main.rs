use anyhow::{Context, Result};
use page_prep::config::PreprocessingConfig;
use page_prep::errors::error_logging;
use page_prep::observability;
use page_prep::preprocessing::{enhance_for_ocr, PixelBuffer};
use std::env;
use std::path::PathBuf;
use tracing::info;

const USAGE: &str = "usage: page-prep <input-image> <output-image> [--ocr]";

struct CliArgs {
    input: PathBuf,
    output: PathBuf,
    ocr: bool,
}

fn parse_args() -> Result<CliArgs> {
    let mut positional = Vec::new();
    let mut ocr = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--ocr" => ocr = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    match <[PathBuf; 2]>::try_from(positional) {
        Ok([input, output]) => Ok(CliArgs { input, output, ocr }),
        Err(_) => Err(anyhow::anyhow!(USAGE)),
    }
}

/// Configuration file named by `PAGE_PREP_CONFIG`, otherwise defaults with
/// environment overrides
fn load_config() -> Result<PreprocessingConfig> {
    let result = match env::var("PAGE_PREP_CONFIG") {
        Ok(path) => PreprocessingConfig::from_file(&path),
        Err(_) => PreprocessingConfig::from_env(),
    };
    result.map_err(|e| {
        error_logging::log_config_error(&e, "PAGE_PREP_CONFIG", "load_config");
        anyhow::anyhow!("Invalid preprocessing configuration: {}", e)
    })
}

#[cfg(feature = "tesseract")]
fn recognize(image: &PixelBuffer) -> Result<String> {
    use page_prep::collaborators::{clean_text, OcrEngine};
    use page_prep::ocr::{TesseractConfig, TesseractEngine};

    let config = TesseractConfig {
        languages: env::var("OCR_LANGUAGES").unwrap_or_else(|_| "eng".to_string()),
        tessdata_path: env::var("TESSDATA_PREFIX").ok(),
        ..Default::default()
    };
    let text = TesseractEngine::new(config).extract_text(image)?;
    Ok(clean_text(&text))
}

#[cfg(not(feature = "tesseract"))]
fn recognize(_image: &PixelBuffer) -> Result<String> {
    Err(anyhow::anyhow!(
        "--ocr requires page-prep to be built with the `tesseract` feature"
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    observability::init_tracing_from_env()?;

    let args = parse_args()?;
    let config = load_config()?;
    info!(config = %config.summary(), "Configuration loaded");

    let input = args.input.clone();
    let decoded = tokio::task::spawn_blocking(move || image::open(&input))
        .await?
        .with_context(|| format!("Failed to decode {}", args.input.display()))?;
    let page = PixelBuffer::from_dynamic(decoded)?;

    let ocr = args.ocr;
    let (result, text) = tokio::task::spawn_blocking(move || -> Result<_> {
        let result = enhance_for_ocr(&page, &config)?;
        let text = if ocr {
            Some(recognize(&result.image)?)
        } else {
            None
        };
        Ok((result, text))
    })
    .await??;

    result
        .image
        .clone()
        .into_dynamic()
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!(
        brightness = result.metrics.brightness,
        contrast = result.metrics.contrast,
        variance = result.metrics.variance,
        actions = ?result.actions,
        skew_angle = result.skew.angle_degrees,
        degenerate_skew = result.skew.degenerate,
        original = ?result.original_dimensions,
        output = ?result.final_dimensions,
        duration_ms = result.processing_time_ms,
        "Wrote {}",
        args.output.display()
    );

    if let Some(text) = text {
        println!("{}", text);
    }

    Ok(())
}
