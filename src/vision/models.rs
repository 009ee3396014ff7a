//! Model management for ONNX Runtime
//!
//! Locates, verifies and loads the classifier model and its label file.
//! Files are provisioned out of band; nothing here touches the network.

use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ModelError;

/// Model file identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// ImageNet classification network
    Classifier,
    /// Label names, one per output index
    Labels,
}

impl ModelType {
    pub const ALL: [ModelType; 2] = [ModelType::Classifier, ModelType::Labels];

    /// Get the filename for this model type
    pub fn filename(&self) -> &'static str {
        match self {
            ModelType::Classifier => "resnet50.onnx",
            ModelType::Labels => "imagenet_labels.txt",
        }
    }

    /// Plausible file size bounds (in bytes)
    pub fn expected_size_range(&self) -> (u64, u64) {
        match self {
            ModelType::Classifier => (1_000_000, 1_000_000_000), // resnet50 ~98 MB
            ModelType::Labels => (10, 10_000_000),                // ~22 KB
        }
    }

    /// Display name for status reporting
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelType::Classifier => "Image Classifier",
            ModelType::Labels => "Class Labels",
        }
    }
}

/// Model manifest tracking verified model files
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    pub version: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub recorded_at: String,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            models: Vec::new(),
        }
    }
}

/// Availability of one model file
#[derive(Debug, Clone)]
pub struct ModelStatus {
    pub model_type: ModelType,
    pub path: PathBuf,
    pub available: bool,
    pub size_bytes: Option<u64>,
    /// `None` when no digest has been recorded yet
    pub verified: Option<bool>,
}

/// Model manager for locating and verifying model files
pub struct ModelManager {
    models_dir: PathBuf,
}

impl ModelManager {
    /// Create a model manager rooted at `<data_dir>/models`
    pub fn new() -> Result<Self> {
        let data_dir = crate::storage::get_data_dir()?;
        Self::with_dir(data_dir.join("models"))
    }

    /// Create model manager with custom directory
    pub fn with_dir(models_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)
            .with_context(|| format!("Failed to create models directory {:?}", models_dir))?;
        Ok(Self { models_dir })
    }

    /// Get the models directory path
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Get the path to a specific model file
    pub fn model_path(&self, model_type: ModelType) -> PathBuf {
        self.models_dir.join(model_type.filename())
    }

    /// Check if a model file is present with a plausible size
    pub fn is_model_available(&self, model_type: ModelType) -> bool {
        is_plausible(&self.model_path(model_type), model_type)
    }

    /// Check if all required files are available
    pub fn are_models_ready(&self) -> bool {
        ModelType::ALL.iter().all(|&m| self.is_model_available(m))
    }

    /// Resolve the file to load, preferring an explicit override
    pub fn resolve(&self, model_type: ModelType, override_path: Option<&Path>) -> Result<PathBuf, ModelError> {
        let path = override_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.model_path(model_type));

        if !path.exists() {
            return Err(ModelError::MissingModel(format!(
                "{} not found; expected at {}",
                model_type.display_name(),
                path.display()
            )));
        }
        if !is_plausible(&path, model_type) {
            warn!(
                "{} at {:?} has an unexpected size; loading anyway",
                model_type.display_name(),
                path
            );
        }
        Ok(path)
    }

    /// Get status of all model files
    pub fn get_model_status(&self) -> Vec<ModelStatus> {
        let manifest = self.load_manifest().unwrap_or_default();

        ModelType::ALL
            .iter()
            .map(|&model_type| {
                let path = self.model_path(model_type);
                let size_bytes = std::fs::metadata(&path).ok().map(|m| m.len());
                let verified = manifest
                    .models
                    .iter()
                    .find(|m| m.filename == model_type.filename())
                    .map(|info| file_sha256(&path).map(|h| h == info.sha256).unwrap_or(false));
                ModelStatus {
                    model_type,
                    available: self.is_model_available(model_type),
                    path,
                    size_bytes,
                    verified,
                }
            })
            .collect()
    }

    /// Record the current digest of a model file in the manifest
    pub fn record(&self, model_type: ModelType) -> Result<ModelInfo> {
        let path = self.model_path(model_type);
        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("{} missing at {:?}", model_type.display_name(), path))?;

        let model_info = ModelInfo {
            model_type: format!("{:?}", model_type),
            filename: model_type.filename().to_string(),
            size_bytes: metadata.len(),
            sha256: file_sha256(&path)?,
            recorded_at: unix_timestamp(),
        };

        let mut manifest = self.load_manifest().unwrap_or_default();
        if let Some(existing) = manifest.models.iter_mut().find(|m| m.filename == model_info.filename) {
            *existing = model_info.clone();
        } else {
            manifest.models.push(model_info.clone());
        }
        self.save_manifest(&manifest)?;

        info!("Recorded {} digest {}", model_type.display_name(), model_info.sha256);
        Ok(model_info)
    }

    /// Compare a model file against its recorded digest
    pub fn verify(&self, model_type: ModelType) -> Result<bool> {
        let manifest = self.load_manifest()?;
        let info = manifest
            .models
            .iter()
            .find(|m| m.filename == model_type.filename())
            .with_context(|| format!("No digest recorded for {}", model_type.display_name()))?;

        let actual = file_sha256(&self.model_path(model_type))?;
        if actual != info.sha256 {
            warn!(
                "Checksum mismatch for {}: expected {}, got {}",
                model_type.filename(),
                info.sha256,
                actual
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Load the model manifest
    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.models_dir.join("manifest.json");
        if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)?;
            let manifest: ModelManifest = serde_json::from_str(&content)?;
            Ok(manifest)
        } else {
            Ok(ModelManifest::default())
        }
    }

    /// Save the model manifest
    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let manifest_path = self.models_dir.join("manifest.json");
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(manifest_path, content)?;
        Ok(())
    }
}

fn is_plausible(path: &Path, model_type: ModelType) -> bool {
    match std::fs::metadata(path) {
        Ok(metadata) => {
            let (min, max) = model_type.expected_size_range();
            (min..=max).contains(&metadata.len())
        }
        Err(_) => false,
    }
}

fn file_sha256(path: &Path) -> Result<String> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(format!("{:x}", hasher.finalize()))
}

fn unix_timestamp() -> String {
    use std::time::SystemTime;

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}", now)
}

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    session: Session,
}

impl OnnxSession {
    /// Create a new ONNX session from a model file
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self, ModelError> {
        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| ModelError::SessionBuilder(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelError::SessionBuilder(e.to_string()))?
            .with_intra_threads(intra_threads.max(1))
            .map_err(|e| ModelError::SessionBuilder(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| ModelError::SessionBuilder(format!("{:?}: {}", model_path, e)))?;

        let input_names: Vec<String> = session.inputs.iter().map(|input| input.name.clone()).collect();
        let output_names: Vec<String> = session.outputs.iter().map(|output| output.name.clone()).collect();

        info!("Model loaded. Inputs: {:?}, Outputs: {:?}", input_names, output_names);

        if input_names.is_empty() || output_names.is_empty() {
            return Err(ModelError::InvalidInput(format!(
                "model {:?} must expose at least one input and one output",
                model_path
            )));
        }

        Ok(Self { session })
    }

    /// Get the underlying session mutably for running inference
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_labels(manager: &ModelManager, count: usize) {
        let labels: Vec<String> = (0..count).map(|i| format!("label {}", i)).collect();
        std::fs::write(manager.model_path(ModelType::Labels), labels.join("\n")).unwrap();
    }

    #[test]
    fn test_model_type_filenames() {
        assert_eq!(ModelType::Classifier.filename(), "resnet50.onnx");
        assert_eq!(ModelType::Labels.filename(), "imagenet_labels.txt");
    }

    #[test]
    fn test_model_status_empty_dir() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().join("models")).unwrap();

        let status = manager.get_model_status();
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|s| !s.available && s.verified.is_none()));
        assert!(!manager.are_models_ready());
    }

    #[test]
    fn test_resolve_missing_names_location() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();

        match manager.resolve(ModelType::Classifier, None) {
            Err(ModelError::MissingModel(msg)) => assert!(msg.contains("resnet50.onnx")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_resolve_prefers_override() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();
        let custom = dir.path().join("custom.txt");
        std::fs::write(&custom, "a\nb\n").unwrap();

        let resolved = manager.resolve(ModelType::Labels, Some(&custom)).unwrap();
        assert_eq!(resolved, custom);
    }

    #[test]
    fn test_record_and_verify() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();
        write_labels(&manager, 10);

        let info = manager.record(ModelType::Labels).unwrap();
        assert_eq!(info.sha256.len(), 64);
        assert!(manager.verify(ModelType::Labels).unwrap());

        write_labels(&manager, 11);
        assert!(!manager.verify(ModelType::Labels).unwrap());

        let status = manager.get_model_status();
        let labels = status.iter().find(|s| s.model_type == ModelType::Labels).unwrap();
        assert_eq!(labels.verified, Some(false));
    }

    #[test]
    fn test_verify_without_record_fails() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();
        write_labels(&manager, 3);
        assert!(manager.verify(ModelType::Labels).is_err());
    }

    #[test]
    fn test_implausible_size_unavailable() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();
        std::fs::write(manager.model_path(ModelType::Classifier), b"tiny").unwrap();
        assert!(!manager.is_model_available(ModelType::Classifier));
    }
}
