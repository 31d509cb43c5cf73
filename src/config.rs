//! # Preprocessing Configuration
//!
//! Every threshold, window size and search bound used by the enhancement and
//! deskew pipeline lives here as a named field. The configuration is treated
//! as immutable for a pipeline run; it can be built from defaults, a JSON
//! document, or environment variable overrides.

use crate::errors::{PreprocessingError, PrepResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Thresholds that turn raw statistics into quality flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisThresholds {
    /// Mean below this value marks the page as dark
    pub dark_threshold: f64,
    /// Mean above this value marks the page as bright
    pub bright_threshold: f64,
    /// Standard deviation below this value marks the page as low contrast
    pub low_contrast_threshold: f64,
    /// Variance above this value marks the page as noisy
    pub noise_variance_threshold: f64,
}

impl Default for AnalysisThresholds {
    fn default() -> Self {
        Self {
            dark_threshold: 80.0,
            bright_threshold: 180.0,
            low_contrast_threshold: 40.0,
            noise_variance_threshold: 2000.0,
        }
    }
}

impl AnalysisThresholds {
    pub fn validate(&self) -> PrepResult<()> {
        let values = [
            ("dark_threshold", self.dark_threshold),
            ("bright_threshold", self.bright_threshold),
            ("low_contrast_threshold", self.low_contrast_threshold),
            ("noise_variance_threshold", self.noise_variance_threshold),
        ];
        for (name, value) in values {
            if !value.is_finite() {
                return Err(PreprocessingError::InvalidConfig(format!(
                    "{} must be a finite number",
                    name
                )));
            }
        }
        if self.dark_threshold > self.bright_threshold {
            return Err(PreprocessingError::InvalidConfig(
                "dark_threshold cannot be greater than bright_threshold".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reference points for the linear strength formulas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrengthConfig {
    /// `dark = (dark_reference - brightness) / dark_reference`
    pub dark_reference: f64,
    /// `contrast = (contrast_reference - contrast) / contrast_reference`
    pub contrast_reference: f64,
    /// `noise = (variance - noise_reference) / noise_span`
    pub noise_reference: f64,
    pub noise_span: f64,
}

impl Default for StrengthConfig {
    fn default() -> Self {
        Self {
            dark_reference: 100.0,
            contrast_reference: 40.0,
            noise_reference: 2000.0,
            noise_span: 3000.0,
        }
    }
}

impl StrengthConfig {
    pub fn validate(&self) -> PrepResult<()> {
        if !(self.dark_reference.is_finite() && self.dark_reference > 0.0) {
            return Err(PreprocessingError::InvalidConfig(
                "dark_reference must be > 0".to_string(),
            ));
        }
        if !(self.contrast_reference.is_finite() && self.contrast_reference > 0.0) {
            return Err(PreprocessingError::InvalidConfig(
                "contrast_reference must be > 0".to_string(),
            ));
        }
        if !self.noise_reference.is_finite() {
            return Err(PreprocessingError::InvalidConfig(
                "noise_reference must be a finite number".to_string(),
            ));
        }
        if !(self.noise_span.is_finite() && self.noise_span > 0.0) {
            return Err(PreprocessingError::InvalidConfig(
                "noise_span must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the corrective enhancement stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Gamma base used when the stage input mean is below `gamma_dark_mean_cutoff`
    pub gamma_dark_base: f64,
    /// Gamma base used when the stage input mean is above `gamma_bright_mean_cutoff`
    pub gamma_bright_base: f64,
    pub gamma_dark_mean_cutoff: f64,
    pub gamma_bright_mean_cutoff: f64,
    /// Clip limit is `clahe_base_clip + intensity`
    pub clahe_base_clip: f32,
    /// Number of CLAHE tiles along (x, y)
    pub clahe_tile_grid: (u32, u32),
    /// Intensity (`1 + noise`) at or above which the large median window is used
    pub median_large_cutoff: f64,
    pub median_small_window: u32,
    pub median_large_window: u32,
    /// Side of the Gaussian window used to estimate the illumination field
    pub lighting_blur_window: u32,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            gamma_dark_base: 0.6,
            gamma_bright_base: 1.4,
            gamma_dark_mean_cutoff: 100.0,
            gamma_bright_mean_cutoff: 160.0,
            clahe_base_clip: 2.0,
            clahe_tile_grid: (8, 8),
            median_large_cutoff: 1.5,
            median_small_window: 3,
            median_large_window: 5,
            lighting_blur_window: 55,
        }
    }
}

impl EnhancementConfig {
    pub fn validate(&self) -> PrepResult<()> {
        if !(self.gamma_dark_base > 0.0 && self.gamma_bright_base > 0.0) {
            return Err(PreprocessingError::InvalidConfig(
                "gamma bases must be > 0".to_string(),
            ));
        }
        if self.gamma_dark_mean_cutoff > self.gamma_bright_mean_cutoff {
            return Err(PreprocessingError::InvalidConfig(
                "gamma_dark_mean_cutoff cannot be greater than gamma_bright_mean_cutoff"
                    .to_string(),
            ));
        }
        if !(self.clahe_base_clip.is_finite() && self.clahe_base_clip > 0.0) {
            return Err(PreprocessingError::InvalidConfig(format!(
                "Invalid clip limit base: {}. Must be > 0.0",
                self.clahe_base_clip
            )));
        }
        if self.clahe_tile_grid.0 == 0 || self.clahe_tile_grid.1 == 0 {
            return Err(PreprocessingError::InvalidConfig(
                "Invalid tile grid: dimensions must be > 0".to_string(),
            ));
        }
        validate_odd_window("median_small_window", self.median_small_window)?;
        validate_odd_window("median_large_window", self.median_large_window)?;
        validate_odd_window("lighting_blur_window", self.lighting_blur_window)?;
        Ok(())
    }
}

/// Parameters of the adaptive threshold and speckle cleanup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarizationConfig {
    /// Side of the square neighborhood used for the local mean
    pub window_size: u32,
    /// Amount subtracted from the local mean before comparing
    pub offset: i32,
    /// Side of the square structuring element used for the opening
    pub opening_kernel: u8,
}

impl Default for BinarizationConfig {
    fn default() -> Self {
        Self {
            window_size: 31,
            offset: 15,
            opening_kernel: 2,
        }
    }
}

impl BinarizationConfig {
    pub fn validate(&self) -> PrepResult<()> {
        validate_odd_window("window_size", self.window_size)?;
        if self.opening_kernel == 0 {
            return Err(PreprocessingError::InvalidConfig(
                "opening_kernel must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Largest skew angle magnitude, in degrees, a search may cover
pub const MAX_SKEW_ANGLE: f32 = 90.0;

/// Upper bound on the number of candidate angles scored per page
pub const MAX_SKEW_CANDIDATES: usize = 3601;

/// Discretized angle search space for skew detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkewSearchConfig {
    pub min_angle: f32,
    pub max_angle: f32,
    pub step: f32,
    /// Samples strictly below this value count as foreground (text)
    pub foreground_cutoff: u8,
}

impl Default for SkewSearchConfig {
    fn default() -> Self {
        Self {
            min_angle: -45.0,
            max_angle: 45.0,
            step: 1.0,
            foreground_cutoff: 128,
        }
    }
}

impl SkewSearchConfig {
    pub fn validate(&self) -> PrepResult<()> {
        if !(self.min_angle.is_finite() && self.max_angle.is_finite()) {
            return Err(PreprocessingError::InvalidConfig(
                "skew search bounds must be finite".to_string(),
            ));
        }
        if self.min_angle > self.max_angle {
            return Err(PreprocessingError::InvalidConfig(format!(
                "min_angle ({}) cannot be greater than max_angle ({})",
                self.min_angle, self.max_angle
            )));
        }
        if self.min_angle < -MAX_SKEW_ANGLE || self.max_angle > MAX_SKEW_ANGLE {
            return Err(PreprocessingError::InvalidConfig(format!(
                "skew search range [{}, {}] must lie within [-{}, {}]",
                self.min_angle, self.max_angle, MAX_SKEW_ANGLE, MAX_SKEW_ANGLE
            )));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(PreprocessingError::InvalidConfig(
                "skew search step must be > 0".to_string(),
            ));
        }
        let count = self.step_count() + 1.0;
        if count > MAX_SKEW_CANDIDATES as f32 {
            return Err(PreprocessingError::InvalidConfig(format!(
                "skew search step {} yields {} candidates (max {})",
                self.step, count, MAX_SKEW_CANDIDATES
            )));
        }
        Ok(())
    }

    fn step_count(&self) -> f32 {
        ((self.max_angle - self.min_angle) / self.step + 1e-4).floor()
    }

    /// Candidate angles in iteration order, most negative first.
    ///
    /// Expects a validated search; the count is capped at
    /// `MAX_SKEW_CANDIDATES` regardless.
    pub fn candidates(&self) -> Vec<f32> {
        let count = (self.step_count() as usize).min(MAX_SKEW_CANDIDATES - 1) + 1;
        (0..count)
            .map(|i| self.min_angle + i as f32 * self.step)
            .collect()
    }
}

/// Sampling used when rotating a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeskewInterpolation {
    /// Keeps bilevel input bilevel
    #[default]
    Nearest,
    /// Smooths edges but produces intermediate values; the pipeline
    /// re-thresholds its output at the skew foreground cutoff
    Bilinear,
}

/// Rotation correction policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskewConfig {
    /// Angles with magnitude at or above this value rotate into an expanded canvas
    pub expand_threshold_degrees: f32,
    /// Fill value for exposed border area (replicated across channels)
    pub background: u8,
    pub interpolation: DeskewInterpolation,
}

impl Default for DeskewConfig {
    fn default() -> Self {
        Self {
            expand_threshold_degrees: 10.0,
            background: 255,
            interpolation: DeskewInterpolation::Nearest,
        }
    }
}

impl DeskewConfig {
    pub fn validate(&self) -> PrepResult<()> {
        if !(self.expand_threshold_degrees.is_finite() && self.expand_threshold_degrees >= 0.0) {
            return Err(PreprocessingError::InvalidConfig(
                "expand_threshold_degrees must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub analysis: AnalysisThresholds,
    pub strengths: StrengthConfig,
    pub enhancement: EnhancementConfig,
    pub binarization: BinarizationConfig,
    pub skew: SkewSearchConfig,
    pub deskew: DeskewConfig,
}

impl PreprocessingConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> PrepResult<Self> {
        let mut config = Self::default();

        override_from_env("PAGE_PREP_DARK_THRESHOLD", &mut config.analysis.dark_threshold)?;
        override_from_env(
            "PAGE_PREP_BRIGHT_THRESHOLD",
            &mut config.analysis.bright_threshold,
        )?;
        override_from_env(
            "PAGE_PREP_LOW_CONTRAST_THRESHOLD",
            &mut config.analysis.low_contrast_threshold,
        )?;
        override_from_env(
            "PAGE_PREP_NOISE_THRESHOLD",
            &mut config.analysis.noise_variance_threshold,
        )?;
        override_from_env(
            "PAGE_PREP_BINARIZE_WINDOW",
            &mut config.binarization.window_size,
        )?;
        override_from_env("PAGE_PREP_BINARIZE_OFFSET", &mut config.binarization.offset)?;
        override_from_env("PAGE_PREP_SKEW_MIN_ANGLE", &mut config.skew.min_angle)?;
        override_from_env("PAGE_PREP_SKEW_MAX_ANGLE", &mut config.skew.max_angle)?;
        override_from_env("PAGE_PREP_SKEW_STEP", &mut config.skew.step)?;
        override_from_env(
            "PAGE_PREP_EXPAND_THRESHOLD",
            &mut config.deskew.expand_threshold_degrees,
        )?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> PrepResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> PrepResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PreprocessingError::InvalidConfig(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json_str(&contents)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> PrepResult<()> {
        self.analysis.validate()?;
        self.strengths.validate()?;
        self.enhancement.validate()?;
        self.binarization.validate()?;
        self.skew.validate()?;
        self.deskew.validate()?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: dark<{}, bright>{}, low_contrast<{}, noisy>{}, binarize={}x{}-{}, skew=[{}, {}] step {}, expand>={}",
            self.analysis.dark_threshold,
            self.analysis.bright_threshold,
            self.analysis.low_contrast_threshold,
            self.analysis.noise_variance_threshold,
            self.binarization.window_size,
            self.binarization.window_size,
            self.binarization.offset,
            self.skew.min_angle,
            self.skew.max_angle,
            self.skew.step,
            self.deskew.expand_threshold_degrees
        )
    }
}

fn validate_odd_window(name: &str, size: u32) -> PrepResult<()> {
    if size < 3 || size % 2 == 0 {
        return Err(PreprocessingError::InvalidConfig(format!(
            "{} must be an odd number >= 3, got {}",
            name, size
        )));
    }
    Ok(())
}

fn override_from_env<T: std::str::FromStr>(key: &str, target: &mut T) -> PrepResult<()> {
    if let Ok(raw) = env::var(key) {
        *target = raw.trim().parse().map_err(|_| {
            PreprocessingError::InvalidConfig(format!("{} must be a valid number", key))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = PreprocessingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.binarization.window_size, 31);
        assert_eq!(config.deskew.expand_threshold_degrees, 10.0);
    }

    #[test]
    fn test_default_candidates_cover_search_range() {
        let candidates = SkewSearchConfig::default().candidates();
        assert_eq!(candidates.len(), 91);
        assert_eq!(candidates[0], -45.0);
        assert_eq!(candidates[45], 0.0);
        assert_eq!(candidates[90], 45.0);
    }

    #[test]
    fn test_fractional_step_candidates() {
        let config = SkewSearchConfig {
            min_angle: -1.0,
            max_angle: 1.0,
            step: 0.5,
            ..Default::default()
        };
        assert_eq!(config.candidates(), vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_window_validation() {
        let mut config = BinarizationConfig::default();

        // Invalid: even window
        config.window_size = 30;
        assert!(config.validate().is_err());

        // Invalid: too small
        config.window_size = 1;
        assert!(config.validate().is_err());

        config.window_size = 31;
        assert!(config.validate().is_ok());

        // Invalid: empty structuring element
        config.opening_kernel = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_skew_search_validation() {
        let mut config = SkewSearchConfig::default();

        config.step = 0.0;
        assert!(config.validate().is_err());
        config.step = 1.0;

        config.min_angle = 10.0;
        config.max_angle = -10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_skew_search_range_is_bounded() {
        let mut config = SkewSearchConfig {
            min_angle: -1e30,
            max_angle: 1e30,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PreprocessingError::InvalidConfig(_))
        ));
        assert_eq!(config.candidates().len(), MAX_SKEW_CANDIDATES);

        config.min_angle = -90.0;
        config.max_angle = 90.0;
        assert!(config.validate().is_ok());
        assert_eq!(config.candidates().len(), 181);

        config.max_angle = 90.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_skew_search_candidate_count_is_capped() {
        let mut config = SkewSearchConfig {
            step: 1e-9,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PreprocessingError::InvalidConfig(_))
        ));

        config.step = 0.1;
        assert!(config.validate().is_ok());
        assert_eq!(config.candidates().len(), 901);
    }

    #[test]
    fn test_enhancement_validation() {
        let mut config = EnhancementConfig::default();

        config.clahe_tile_grid = (0, 8);
        assert!(config.validate().is_err());
        config.clahe_tile_grid = (8, 8);

        config.clahe_base_clip = 0.0;
        assert!(config.validate().is_err());
        config.clahe_base_clip = 2.0;

        config.lighting_blur_window = 54;
        assert!(config.validate().is_err());
        config.lighting_blur_window = 55;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PreprocessingConfig::from_json_str(
            r#"{ "deskew": { "expand_threshold_degrees": 5.0 }, "binarization": { "offset": 10 } }"#,
        )
        .unwrap();

        assert_eq!(config.deskew.expand_threshold_degrees, 5.0);
        assert_eq!(config.binarization.offset, 10);
        assert_eq!(config.binarization.window_size, 31);
        assert_eq!(config.analysis, AnalysisThresholds::default());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let result = PreprocessingConfig::from_json_str(r#"{ "binarization": { "window_size": 4 } }"#);
        assert!(matches!(result, Err(PreprocessingError::InvalidConfig(_))));
    }

    #[test]
    fn test_interpolation_parses_lowercase() {
        let config =
            PreprocessingConfig::from_json_str(r#"{ "deskew": { "interpolation": "bilinear" } }"#)
                .unwrap();
        assert_eq!(config.deskew.interpolation, DeskewInterpolation::Bilinear);
        assert_eq!(config.deskew.background, 255);
    }

    #[test]
    fn test_summary_mentions_thresholds() {
        let summary = PreprocessingConfig::default().summary();
        assert!(summary.contains("dark<80"));
        assert!(summary.contains("expand>=10"));
    }
}
