//! Visual classifier
//!
//! Maps an image to a ranked list of labels from a fixed label space.
//! The network sits behind [`ClassifierBackend`] so the ranking logic can be
//! exercised without model files.

use image::DynamicImage;
use ort::value::TensorRef;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

use super::models::OnnxSession;
use super::preprocess::{preprocess_for_classification, PreprocessConfig};
use crate::config::ClassifierSettings;
use crate::error::ModelError;

/// One ranked label
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Index into the label space
    pub label_id: usize,
    /// Human-readable label
    pub label_name: String,
    /// Probability in [0, 1]
    pub confidence: f32,
}

/// Source of raw scores over the label space
pub trait ClassifierBackend: Send + Sync {
    /// Raw scores (logits or probabilities), one per label
    fn scores(&self, image: &DynamicImage) -> Result<Vec<f32>, ModelError>;
}

/// ONNX Runtime backed classifier network
pub struct OnnxClassifier {
    // Session::run needs exclusive access
    session: Mutex<OnnxSession>,
    preprocess: PreprocessConfig,
}

impl OnnxClassifier {
    pub fn new(model_path: &Path, settings: &ClassifierSettings) -> Result<Self, ModelError> {
        let session = OnnxSession::new(model_path, settings.intra_threads)?;
        Ok(Self {
            session: Mutex::new(session),
            preprocess: PreprocessConfig::from(settings),
        })
    }
}

impl ClassifierBackend for OnnxClassifier {
    fn scores(&self, image: &DynamicImage) -> Result<Vec<f32>, ModelError> {
        let input = preprocess_for_classification(image, &self.preprocess)?;

        let mut session = self.session.lock();
        let input_tensor = TensorRef::from_array_view(input.view())?;
        let outputs = session.session_mut().run(ort::inputs![input_tensor])?;

        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        debug!("Classifier output shape: {:?}", shape);

        // [1, N] or [N]
        if shape.len() > 2 || (shape.len() == 2 && shape[0] != 1) {
            return Err(ModelError::Inference(format!("unexpected output shape {:?}", shape)));
        }

        Ok(data.to_vec())
    }
}

/// Read a label file: one label per line, no blank lines
pub fn load_labels(path: &Path) -> Result<Vec<String>, ModelError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ModelError::InvalidLabels(format!("failed to read {:?}: {}", path, e)))?;
    let labels = parse_labels(&content)?;
    info!("Loaded {} class labels from {:?}", labels.len(), path);
    Ok(labels)
}

fn parse_labels(content: &str) -> Result<Vec<String>, ModelError> {
    let mut labels = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let label = line.trim();
        if label.is_empty() {
            return Err(ModelError::InvalidLabels(format!("line {} is blank", index + 1)));
        }
        labels.push(label.to_string());
    }
    if labels.is_empty() {
        return Err(ModelError::InvalidLabels("no labels".to_string()));
    }
    Ok(labels)
}

/// Numerically stable softmax
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Indices of the `k` highest values, descending; lower index wins ties
pub fn top_k_indices(values: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));
    indices.truncate(k);
    indices
}

/// Ranks backend scores against a label set
pub struct VisualClassifier {
    backend: Box<dyn ClassifierBackend>,
    labels: Vec<String>,
    top_k: usize,
    apply_softmax: bool,
}

impl VisualClassifier {
    pub fn new(
        backend: Box<dyn ClassifierBackend>,
        labels: Vec<String>,
        top_k: usize,
        apply_softmax: bool,
    ) -> Result<Self, ModelError> {
        if top_k == 0 {
            return Err(ModelError::InvalidLabels("top_k must be at least 1".to_string()));
        }
        if labels.len() < top_k {
            return Err(ModelError::InvalidLabels(format!(
                "{} labels cannot fill top_k = {}",
                labels.len(),
                top_k
            )));
        }
        Ok(Self {
            backend,
            labels,
            top_k,
            apply_softmax,
        })
    }

    /// Load the ONNX network and its labels as configured
    pub fn from_settings(
        model_path: &Path,
        labels_path: &Path,
        settings: &ClassifierSettings,
    ) -> Result<Self, ModelError> {
        let labels = load_labels(labels_path)?;
        let backend = OnnxClassifier::new(model_path, settings)?;
        Self::new(Box::new(backend), labels, settings.top_k, settings.apply_softmax)
    }

    /// Top-k labels, descending by confidence
    pub fn predict(&self, image: &DynamicImage) -> Result<Vec<Classification>, ModelError> {
        let raw = self.backend.scores(image)?;
        if raw.len() != self.labels.len() {
            return Err(ModelError::LabelMismatch {
                expected: self.labels.len(),
                got: raw.len(),
            });
        }

        let probs = if self.apply_softmax { softmax(&raw) } else { raw };

        let ranked: Vec<Classification> = top_k_indices(&probs, self.top_k)
            .into_iter()
            .map(|i| Classification {
                label_id: i,
                label_name: self.labels[i].clone(),
                confidence: probs[i],
            })
            .collect();

        if let Some(top) = ranked.first() {
            debug!("Top visual label '{}' ({:.3})", top.label_name, top.confidence);
        }
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct FixedScores(Vec<f32>);

    impl ClassifierBackend for FixedScores {
        fn scores(&self, _image: &DynamicImage) -> Result<Vec<f32>, ModelError> {
            Ok(self.0.clone())
        }
    }

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("label {}", i)).collect()
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, 1000.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!(probs[3] > 0.99);
    }

    #[test]
    fn test_top_k_ties_break_by_index() {
        assert_eq!(top_k_indices(&[0.2, 0.5, 0.5, 0.1], 3), vec![1, 2, 0]);
    }

    #[test]
    fn test_predict_ranked_descending() {
        let backend = FixedScores(vec![0.1, 3.0, 2.0, 0.5, 1.0, -1.0]);
        let classifier = VisualClassifier::new(Box::new(backend), labels(6), 5, true).unwrap();

        let ranked = classifier.predict(&image()).unwrap();
        assert_eq!(ranked.len(), 5);
        let ids: Vec<usize> = ranked.iter().map(|c| c.label_id).collect();
        assert_eq!(ids, vec![1, 2, 4, 3, 0]);
        assert!(ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert_eq!(ranked[0].label_name, "label 1");
    }

    #[test]
    fn test_predict_without_softmax_keeps_scores() {
        let backend = FixedScores(vec![0.2, 0.7, 0.1]);
        let classifier = VisualClassifier::new(Box::new(backend), labels(3), 2, false).unwrap();

        let ranked = classifier.predict(&image()).unwrap();
        assert_eq!(ranked[0].confidence, 0.7);
        assert_eq!(ranked[1].confidence, 0.2);
    }

    #[test]
    fn test_predict_label_mismatch() {
        let backend = FixedScores(vec![0.5, 0.5]);
        let classifier = VisualClassifier::new(Box::new(backend), labels(3), 1, true).unwrap();

        assert!(matches!(
            classifier.predict(&image()),
            Err(ModelError::LabelMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_too_few_labels_rejected() {
        let backend = FixedScores(vec![1.0]);
        assert!(VisualClassifier::new(Box::new(backend), labels(1), 5, true).is_err());
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(parse_labels("tench\ngoldfish\n").unwrap(), vec!["tench", "goldfish"]);
        assert!(parse_labels("tench\n\ngoldfish").is_err());
        assert!(parse_labels("").is_err());
    }

    #[test]
    fn test_load_labels_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "water bottle\nbeer bottle\n").unwrap();

        let labels = load_labels(&path).unwrap();
        assert_eq!(labels, vec!["water bottle", "beer bottle"]);
    }
}
