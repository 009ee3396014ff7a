//! Vision Layer
//!
//! The two recognition channels:
//! - Visual classification via ONNX Runtime
//! - Multi-pass OCR (Tesseract when built with the `tesseract` feature)

pub mod classifier;
pub mod models;
pub mod ocr;
pub mod ocr_preprocess;
pub mod preprocess;

pub use classifier::{Classification, ClassifierBackend, OnnxClassifier, VisualClassifier};
pub use models::{ModelManager, ModelStatus, ModelType, OnnxSession};
pub use ocr::{normalize_ocr_output, OcrBackend, PassKind, RecognitionMode, TextExtractor, UnavailableOcr};
pub use preprocess::{decode_image, PreprocessConfig};

#[cfg(feature = "tesseract")]
pub use ocr::TesseractOcr;
