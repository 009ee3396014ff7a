//! OCR (Optical Character Recognition) module
//!
//! Multi-pass text extraction. Each pass pairs an image preparation with a
//! recognition mode; pass outputs are merged into one normalized string.
//! A failing pass contributes nothing and never aborts the extraction.

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ocr_preprocess::{enhance_contrast, fit_for_ocr, sharpen, to_grayscale};
use crate::config::OcrSettings;
use crate::error::OcrError;

/// Extracted text is logged up to this many characters
const LOG_PREVIEW_CHARS: usize = 100;

/// Recognition profile requested from an OCR backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionMode {
    /// Scattered text anywhere on the image
    SparseText,
    /// One uniform block, suited to small print
    SingleBlock,
    /// Digits, date separators and best-before markers only
    DigitsAndDates,
}

/// An OCR pass: preparation + recognition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// Plain grayscale, sparse text
    General,
    /// Contrast-enhanced, single block
    SmallPrint,
    /// Plain grayscale, restricted character set
    DigitsAndDates,
}

impl PassKind {
    pub fn mode(&self) -> RecognitionMode {
        match self {
            PassKind::General => RecognitionMode::SparseText,
            PassKind::SmallPrint => RecognitionMode::SingleBlock,
            PassKind::DigitsAndDates => RecognitionMode::DigitsAndDates,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PassKind::General => "general",
            PassKind::SmallPrint => "small-print",
            PassKind::DigitsAndDates => "digits-and-dates",
        }
    }
}

/// OCR capability: grayscale image + mode -> raw text
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image: &GrayImage, mode: RecognitionMode) -> Result<String, OcrError>;
}

/// Backend used when no OCR engine is compiled in; every pass fails
#[derive(Debug, Clone)]
pub struct UnavailableOcr {
    reason: String,
}

impl UnavailableOcr {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl Default for UnavailableOcr {
    fn default() -> Self {
        Self::new("built without the `tesseract` feature")
    }
}

impl OcrBackend for UnavailableOcr {
    fn recognize(&self, _image: &GrayImage, _mode: RecognitionMode) -> Result<String, OcrError> {
        Err(OcrError::Unavailable(self.reason.clone()))
    }
}

/// Tesseract via leptess
///
/// A fresh engine is created for every call, so the backend holds no
/// mutable state and can be shared across threads.
#[cfg(feature = "tesseract")]
pub struct TesseractOcr {
    language: String,
    data_path: Option<String>,
    numeric_whitelist: String,
}

#[cfg(feature = "tesseract")]
impl TesseractOcr {
    /// Create the backend, checking once that the language data loads
    pub fn new(settings: &OcrSettings) -> Result<Self, OcrError> {
        let backend = Self {
            language: settings.language.clone(),
            data_path: settings
                .data_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            numeric_whitelist: settings.numeric_whitelist.clone(),
        };
        backend.engine()?;
        info!("Tesseract initialized with language '{}'", backend.language);
        Ok(backend)
    }

    fn engine(&self) -> Result<leptess::LepTess, OcrError> {
        leptess::LepTess::new(self.data_path.as_deref(), &self.language).map_err(|e| {
            OcrError::Init(format!(
                "Failed to initialize Tesseract with language '{}': {}",
                self.language, e
            ))
        })
    }
}

#[cfg(feature = "tesseract")]
impl OcrBackend for TesseractOcr {
    fn recognize(&self, image: &GrayImage, mode: RecognitionMode) -> Result<String, OcrError> {
        use leptess::Variable;

        let mut lt = self.engine()?;

        let psm = match mode {
            RecognitionMode::SparseText => "11",
            RecognitionMode::SingleBlock => "6",
            RecognitionMode::DigitsAndDates => "3",
        };
        lt.set_variable(Variable::TesseditPagesegMode, psm)
            .map_err(|e| OcrError::Init(format!("Failed to set PSM: {}", e)))?;

        if mode == RecognitionMode::DigitsAndDates {
            lt.set_variable(Variable::TesseditCharWhitelist, &self.numeric_whitelist)
                .map_err(|e| OcrError::Init(format!("Failed to set whitelist: {}", e)))?;
        }

        // leptess reads encoded image data
        let mut png_buf = std::io::Cursor::new(Vec::new());
        image.write_to(&mut png_buf, image::ImageFormat::Png)?;

        lt.set_image_from_mem(png_buf.get_ref())
            .map_err(|e| OcrError::Recognition(format!("Failed to set image from memory: {}", e)))?;

        lt.get_utf8_text()
            .map_err(|e| OcrError::Recognition(format!("Failed to read text: {}", e)))
    }
}

/// Merge raw pass outputs: split into lines, trim, drop empties, join with single spaces
pub fn normalize_ocr_output<S: AsRef<str>>(passes: &[S]) -> String {
    passes
        .iter()
        .flat_map(|pass| pass.as_ref().lines())
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncated form of extracted text for logs
pub fn preview(text: &str) -> String {
    if text.chars().count() > LOG_PREVIEW_CHARS {
        let head: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Multi-pass text extractor
pub struct TextExtractor {
    backend: Box<dyn OcrBackend>,
    settings: OcrSettings,
}

impl TextExtractor {
    pub fn new(backend: Box<dyn OcrBackend>, settings: OcrSettings) -> Self {
        Self { backend, settings }
    }

    /// Tesseract when compiled in and initializable, otherwise [`UnavailableOcr`]
    pub fn from_settings(settings: &OcrSettings) -> Self {
        Self::new(default_backend(settings), settings.clone())
    }

    /// Best-effort text; `""` when nothing legible is found
    pub fn extract_text(&self, image: &DynamicImage) -> String {
        let gray = to_grayscale(image);
        if gray.width() == 0 || gray.height() == 0 {
            return String::new();
        }
        let base = fit_for_ocr(&gray, self.settings.min_dimension, self.settings.max_dimension);

        let mut outputs = Vec::with_capacity(self.settings.passes.len());
        for &pass in &self.settings.passes {
            let prepared = self.prepare(&base, pass);
            match self.backend.recognize(&prepared, pass.mode()) {
                Ok(text) => {
                    debug!("OCR pass {} produced {} chars", pass.name(), text.trim().chars().count());
                    outputs.push(text);
                }
                Err(e) => warn!("OCR pass {} failed: {}", pass.name(), e),
            }
        }

        let text = normalize_ocr_output(&outputs);
        if !text.is_empty() {
            info!("Extracted text: {}", preview(&text));
        }
        text
    }

    fn prepare(&self, base: &GrayImage, pass: PassKind) -> GrayImage {
        match pass {
            PassKind::General | PassKind::DigitsAndDates => base.clone(),
            PassKind::SmallPrint => {
                let enhanced = enhance_contrast(base, self.settings.contrast_factor);
                if self.settings.sharpen_small_print {
                    sharpen(&enhanced)
                } else {
                    enhanced
                }
            }
        }
    }
}

#[cfg(feature = "tesseract")]
fn default_backend(settings: &OcrSettings) -> Box<dyn OcrBackend> {
    match TesseractOcr::new(settings) {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            warn!("Tesseract unavailable, text channel disabled: {}", e);
            Box::new(UnavailableOcr::new(e.to_string()))
        }
    }
}

#[cfg(not(feature = "tesseract"))]
fn default_backend(_settings: &OcrSettings) -> Box<dyn OcrBackend> {
    warn!("Built without OCR support, text channel disabled");
    Box::new(UnavailableOcr::default())
}
