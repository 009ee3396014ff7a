//! Application Configuration
//!
//! Recognition settings stored in TOML format. Every threshold the fusion
//! logic uses lives here so deployments can tune them without a rebuild.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::meaningful::{FilterProfile, Strictness};
use crate::vision::ocr::PassKind;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Visual classifier settings
    pub classifier: ClassifierSettings,
    /// OCR settings
    pub ocr: OcrSettings,
    /// Meaningfulness filter settings
    pub filter: FilterSettings,
    /// Fusion gate settings
    pub fusion: FusionSettings,
    /// Known-product registry settings
    pub registry: RegistrySettings,
}

/// Visual classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Override path of the ONNX model (defaults to the data directory)
    pub model_file: Option<PathBuf>,
    /// Override path of the label file (defaults to the data directory)
    pub labels_file: Option<PathBuf>,
    /// Square input size of the network
    pub input_size: u32,
    /// Shorter side after the initial resize, before center cropping
    pub resize_shorter: u32,
    /// Normalization mean [R, G, B]
    pub mean: [f32; 3],
    /// Normalization std [R, G, B]
    pub std: [f32; 3],
    /// Number of ranked labels returned
    pub top_k: usize,
    /// Apply softmax to raw model output (disable if the graph already does)
    pub apply_softmax: bool,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            model_file: None,
            labels_file: None,
            input_size: 224,
            resize_shorter: 256,
            // ImageNet statistics
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            top_k: 5,
            apply_softmax: true,
            intra_threads: 4,
        }
    }
}

/// OCR settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Tesseract language codes (e.g. "deu+eng")
    pub language: String,
    /// Optional tessdata directory
    pub data_path: Option<PathBuf>,
    /// Images with a smaller side below this are upscaled before OCR
    pub min_dimension: u32,
    /// Images with a larger side above this are downscaled before OCR
    pub max_dimension: u32,
    /// Contrast factor of the small-print pass
    pub contrast_factor: f32,
    /// Sharpen the small-print pass after contrast enhancement
    pub sharpen_small_print: bool,
    /// Characters allowed in the digits/date pass
    pub numeric_whitelist: String,
    /// Passes to run, in order
    pub passes: Vec<PassKind>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "deu+eng".to_string(),
            data_path: None,
            min_dimension: 80,
            max_dimension: 1920,
            contrast_factor: 2.0,
            sharpen_small_print: false,
            numeric_whitelist: "0123456789MHD./-: ".to_string(),
            passes: vec![PassKind::General, PassKind::SmallPrint, PassKind::DigitsAndDates],
        }
    }
}

/// Meaningfulness filter settings
///
/// The profile picks the base thresholds; any `Some` override replaces the
/// corresponding profile value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub profile: Strictness,
    pub min_length: Option<usize>,
    pub max_noise_ratio: Option<f32>,
    pub min_word_length: Option<usize>,
    pub min_letter_ratio: Option<f32>,
}

impl FilterSettings {
    /// Resolve the effective filter thresholds
    pub fn resolve(&self) -> FilterProfile {
        let mut profile = FilterProfile::for_strictness(self.profile);
        if let Some(v) = self.min_length {
            profile.min_length = v;
        }
        if let Some(v) = self.max_noise_ratio {
            profile.max_noise_ratio = v;
        }
        if let Some(v) = self.min_word_length {
            profile.min_word_length = v;
        }
        if let Some(v) = self.min_letter_ratio {
            profile.min_letter_ratio = v;
        }
        profile
    }
}

/// Fusion gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    /// Above this top visual confidence the text channel is skipped
    pub high_confidence: f32,
    /// Above this top visual confidence text must be specific to override
    pub moderate_confidence: f32,
    /// Minimum confidence boost for text to override a moderate visual read
    pub min_specific_boost: f32,
    /// Text entry confidence = scale x boost
    pub text_confidence_scale: f32,
    /// Maximum number of entries in a prediction list
    pub max_predictions: usize,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            high_confidence: 0.75,
            moderate_confidence: 0.4,
            min_specific_boost: 1.2,
            text_confidence_scale: 0.95,
            max_predictions: 5,
        }
    }
}

impl FusionSettings {
    /// Reject threshold combinations the gates cannot honor
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.high_confidence) {
            anyhow::bail!("high_confidence must be within [0, 1], got {}", self.high_confidence);
        }
        if self.moderate_confidence > self.high_confidence {
            anyhow::bail!(
                "moderate_confidence ({}) must not exceed high_confidence ({})",
                self.moderate_confidence,
                self.high_confidence
            );
        }
        if self.text_confidence_scale <= 0.0 {
            anyhow::bail!("text_confidence_scale must be positive");
        }
        if self.max_predictions == 0 {
            anyhow::bail!("max_predictions must be at least 1");
        }
        Ok(())
    }
}

/// Known-product registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// JSON registry replacing the built-in one
    pub path: Option<PathBuf>,
    /// Boost given to identities synthesized from free text
    pub synthesized_boost: f32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            path: None,
            synthesized_boost: 0.85,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.fusion.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
