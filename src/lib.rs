//! PantryLens - product recognition from photos
//!
//! Fuses a pretrained image classifier with OCR of the packaging text.
//! The single entry point is [`fusion::FusionEngine::predict`].

pub mod analysis;
pub mod config;
pub mod error;
pub mod fusion;
pub mod storage;
pub mod vision;

pub use config::AppConfig;
pub use error::{ModelError, OcrError, RecognitionError, RegistryError};
pub use fusion::{FusionEngine, PredictionEntry, PredictionList, SourceKind};
