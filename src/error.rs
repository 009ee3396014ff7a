//! Error types for the recognition core
//!
//! Fatal failures (`RecognitionError`) abort a request. OCR failures are
//! recovered inside the text extractor and never surface here.

use thiserror::Error;

/// Failure of the visual classifier or its model files
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("ONNX Runtime error: {0}")]
    Runtime(#[from] ort::Error),

    #[error("Failed to build ONNX session: {0}")]
    SessionBuilder(String),

    #[error("Image cannot be prepared for the classifier: {0}")]
    InvalidInput(String),

    #[error("Classifier produced {got} scores for {expected} labels")]
    LabelMismatch { expected: usize, got: usize },

    #[error("Invalid label set: {0}")]
    InvalidLabels(String),

    #[error("Model file missing: {0}")]
    MissingModel(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Failure of a single OCR pass
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to initialize OCR engine: {0}")]
    Init(String),

    #[error("Failed to run OCR: {0}")]
    Recognition(String),

    #[error("Failed to encode image for OCR: {0}")]
    Encode(#[from] image::ImageError),
}

/// Failure while loading or validating the known-product registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read registry: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse registry: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Registry entry {index}: {reason}")]
    InvalidEntry { index: usize, reason: String },

    #[error("Duplicate registry keyword '{0}'")]
    DuplicateKeyword(String),
}

/// Fatal failure of a recognition request
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Classifier failed: {0}")]
    Model(#[from] ModelError),
}
