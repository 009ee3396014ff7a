//! Fusion Engine
//!
//! Merges the visual ranking and the text channel into one prediction list.
//!
//! Per request:
//! 1. Classify the image.
//! 2. If the top visual confidence is high, stop there.
//! 3. Otherwise extract text, keep it only if meaningful, and identify a product.
//! 4. A moderately confident visual read is only overridden by specific text.
//! 5. The text entry, if any, leads; visual entries follow; the list is truncated.

use anyhow::Context;
use image::DynamicImage;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::analysis::{is_meaningful, IdentifiedProduct, ProductIdentifier};
use crate::config::{AppConfig, FusionSettings};
use crate::error::RecognitionError;
use crate::storage::{load_registry, ProductRegistry};
use crate::vision::{decode_image, Classification, ModelManager, ModelType, TextExtractor, VisualClassifier};

/// Label id of entries produced by the text channel
pub const TEXT_CLASS_ID: i64 = -1;

/// Which channel produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Visual,
    Text,
}

/// One ranked prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionEntry {
    pub class_id: i64,
    pub class_name: String,
    pub class_description: String,
    pub confidence: f32,
    pub source: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub identified_by_text: bool,
}

impl PredictionEntry {
    fn from_text(product: &IdentifiedProduct, text: &str, scale: f32) -> Self {
        Self {
            class_id: TEXT_CLASS_ID,
            class_name: product.name.clone(),
            class_description: product.description.clone(),
            confidence: scale * product.confidence_boost,
            source: SourceKind::Text,
            extracted_text: Some(text.to_string()),
            identified_by_text: true,
        }
    }

    fn from_visual(classification: &Classification) -> Self {
        Self {
            class_id: classification.label_id as i64,
            class_name: label_slug(&classification.label_name),
            class_description: classification.label_name.clone(),
            confidence: classification.confidence,
            source: SourceKind::Visual,
            extracted_text: None,
            identified_by_text: false,
        }
    }
}

/// Ordered predictions; a text entry, if present, is first
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PredictionList(Vec<PredictionEntry>);

impl PredictionList {
    pub fn entries(&self) -> &[PredictionEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Description of the leading entry
    pub fn top_description(&self) -> Option<&str> {
        self.0.first().map(|e| e.class_description.as_str())
    }
}

/// Lowercase, spaces to underscores, apostrophes and commas removed
pub fn label_slug(label: &str) -> String {
    label
        .to_lowercase()
        .replace(' ', "_")
        .replace(['\'', ','], "")
}

/// Both recognition channels plus the gating policy
pub struct FusionEngine {
    classifier: VisualClassifier,
    extractor: TextExtractor,
    identifier: ProductIdentifier,
    settings: FusionSettings,
}

impl FusionEngine {
    pub fn new(
        classifier: VisualClassifier,
        extractor: TextExtractor,
        identifier: ProductIdentifier,
        settings: FusionSettings,
    ) -> Self {
        Self {
            classifier,
            extractor,
            identifier,
            settings,
        }
    }

    /// Load model, labels and registry as configured
    pub fn from_config(config: &AppConfig, models: &ModelManager) -> anyhow::Result<Self> {
        config.fusion.validate()?;

        let model_path = models.resolve(ModelType::Classifier, config.classifier.model_file.as_deref())?;
        let labels_path = models.resolve(ModelType::Labels, config.classifier.labels_file.as_deref())?;
        let classifier = VisualClassifier::from_settings(&model_path, &labels_path, &config.classifier)
            .context("Failed to load visual classifier")?;

        let registry = match &config.registry.path {
            Some(path) => load_registry(path, config.registry.synthesized_boost)
                .with_context(|| format!("Failed to load registry {:?}", path))?,
            None => ProductRegistry::builtin(config.registry.synthesized_boost)?,
        };
        let identifier = ProductIdentifier::new(Arc::new(registry), config.filter.resolve());

        let extractor = TextExtractor::from_settings(&config.ocr);

        Ok(Self::new(classifier, extractor, identifier, config.fusion.clone()))
    }

    /// Recognize a product from raw image bytes
    pub fn predict(&self, bytes: &[u8]) -> Result<PredictionList, RecognitionError> {
        let start = Instant::now();
        let image = decode_image(bytes)?;
        let result = self.predict_image(&image);
        debug!("Prediction finished in {:?}", start.elapsed());
        result
    }

    /// Recognize a product from a decoded image
    pub fn predict_image(&self, image: &DynamicImage) -> Result<PredictionList, RecognitionError> {
        let visual = self.classifier.predict(image)?;
        let top_confidence = visual.first().map_or(0.0, |c| c.confidence);

        let (text, product) = if top_confidence > self.settings.high_confidence {
            info!(
                "Image recognition has very high confidence ({:.2}), skipping text recognition",
                top_confidence
            );
            (String::new(), None)
        } else {
            let text = self.extractor.extract_text(image);
            let product = self.identify(&text, top_confidence);
            (text, product)
        };

        let mut entries = Vec::with_capacity(visual.len() + 1);
        if let Some(product) = &product {
            info!("Text-based product identified: {}", product.description);
            entries.push(PredictionEntry::from_text(
                product,
                &text,
                self.settings.text_confidence_scale,
            ));
        }

        for (i, classification) in visual.iter().enumerate() {
            let mut entry = PredictionEntry::from_visual(classification);
            if i == 0 && product.is_none() && !text.is_empty() {
                entry.extracted_text = Some(text.clone());
            }
            entries.push(entry);
        }

        // Only trailing visual entries can fall off
        entries.truncate(self.settings.max_predictions.max(1));

        Ok(PredictionList(entries))
    }

    /// Meaningfulness filter, identification and the specificity gate
    fn identify(&self, text: &str, top_confidence: f32) -> Option<IdentifiedProduct> {
        if !is_meaningful(text, self.identifier.filter()) {
            return None;
        }

        let product = self.identifier.identify(text)?;

        if top_confidence > self.settings.moderate_confidence
            && product.confidence_boost < self.settings.min_specific_boost
        {
            info!(
                "Image recognition confidence is reasonable ({:.2}), text not specific enough",
                top_confidence
            );
            return None;
        }

        Some(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FilterProfile;
    use crate::config::OcrSettings;
    use crate::error::{ModelError, OcrError};
    use crate::storage::KnownProduct;
    use crate::vision::{ClassifierBackend, OcrBackend, RecognitionMode};
    use image::{GrayImage, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LABELS: [&str; 6] = [
        "water bottle",
        "pop bottle, soda bottle",
        "grocery store",
        "carton",
        "jack-o'-lantern",
        "Granny Smith",
    ];

    /// Probabilities handed out as-is (softmax disabled)
    struct FixedProbs(Vec<f32>);

    impl ClassifierBackend for FixedProbs {
        fn scores(&self, _image: &DynamicImage) -> Result<Vec<f32>, ModelError> {
            Ok(self.0.clone())
        }
    }

    struct FailingClassifier;

    impl ClassifierBackend for FailingClassifier {
        fn scores(&self, _image: &DynamicImage) -> Result<Vec<f32>, ModelError> {
            Err(ModelError::Inference("weights corrupted".to_string()))
        }
    }

    /// Returns the same text from the general pass, nothing from the others
    struct FixedText {
        text: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl OcrBackend for FixedText {
        fn recognize(&self, _image: &GrayImage, mode: RecognitionMode) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match mode {
                RecognitionMode::SparseText => Ok(self.text.to_string()),
                _ => Ok(String::new()),
            }
        }
    }

    /// Top confidence first, the rest spread below it
    fn probs(top: f32) -> Vec<f32> {
        let rest = (1.0 - top) / 5.0;
        let mut p = vec![top];
        p.extend((1..6).map(|i| rest * (1.0 - i as f32 * 0.1)));
        p
    }

    fn registry() -> ProductRegistry {
        ProductRegistry::builtin(0.85).unwrap()
    }

    fn engine_with(
        backend: Box<dyn ClassifierBackend>,
        text: &'static str,
        registry: ProductRegistry,
    ) -> (FusionEngine, Arc<AtomicUsize>) {
        let labels = LABELS.iter().map(|l| l.to_string()).collect();
        let classifier = VisualClassifier::new(backend, labels, 5, false).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let ocr = FixedText {
            text,
            calls: calls.clone(),
        };
        let extractor = TextExtractor::new(Box::new(ocr), OcrSettings::default());
        let identifier = ProductIdentifier::new(Arc::new(registry), FilterProfile::strict());
        let engine = FusionEngine::new(classifier, extractor, identifier, FusionSettings::default());
        (engine, calls)
    }

    fn engine(top: f32, text: &'static str) -> (FusionEngine, Arc<AtomicUsize>) {
        engine_with(Box::new(FixedProbs(probs(top))), text, registry())
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(120, 120))
    }

    fn assert_invariants(list: &PredictionList) {
        assert!(!list.is_empty() && list.len() <= 5);
        for (i, entry) in list.entries().iter().enumerate() {
            if entry.source == SourceKind::Text {
                assert_eq!(i, 0);
                assert_eq!(entry.class_id, TEXT_CLASS_ID);
                assert!(entry.identified_by_text);
            }
        }
    }

    #[test]
    fn test_high_confidence_skips_text() {
        let (engine, calls) = engine(0.9, "Weizenmehl Type 405");
        let list = engine.predict_image(&image()).unwrap();

        assert_invariants(&list);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(list.entries().iter().all(|e| e.source == SourceKind::Visual));
        assert!(list.entries().iter().all(|e| e.extracted_text.is_none()));
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn test_confidence_at_high_threshold_considers_text() {
        let (engine, calls) = engine(0.75, "Weizenmehl Type 405");
        let list = engine.predict_image(&image()).unwrap();

        assert_invariants(&list);
        assert!(calls.load(Ordering::SeqCst) > 0);
        let first = &list.entries()[0];
        assert_eq!(first.source, SourceKind::Text);
        assert_eq!(first.class_name, "Weizenmehl");
        assert!((first.confidence - 0.95 * 1.5).abs() < 1e-5);
        assert_eq!(first.extracted_text.as_deref(), Some("Weizenmehl Type 405"));
    }

    #[test]
    fn test_text_entry_survives_truncation() {
        let (engine, _) = engine(0.3, "Weizenmehl Type 405");
        let list = engine.predict_image(&image()).unwrap();

        assert_invariants(&list);
        assert_eq!(list.len(), 5);
        assert_eq!(list.entries()[0].source, SourceKind::Text);
        // Four visual entries remain, in rank order, without duplicated text
        let visual: Vec<i64> = list.entries()[1..].iter().map(|e| e.class_id).collect();
        assert_eq!(visual, vec![0, 1, 2, 3]);
        assert!(list.entries()[1..].iter().all(|e| e.extracted_text.is_none()));
    }

    #[test]
    fn test_unspecific_text_dropped_at_moderate_confidence() {
        // Synthesized identity, boost 0.85
        let (engine, _) = engine(0.5, "Frische Erdbeere Himbeere");
        let list = engine.predict_image(&image()).unwrap();

        assert_invariants(&list);
        assert!(list.entries().iter().all(|e| e.source == SourceKind::Visual));
        // Text rides along on the top visual entry instead
        assert_eq!(list.entries()[0].extracted_text.as_deref(), Some("Frische Erdbeere Himbeere"));
        assert!(list.entries()[1..].iter().all(|e| e.extracted_text.is_none()));
    }

    #[test]
    fn test_unspecific_text_kept_at_moderate_threshold() {
        let (engine, _) = engine(0.4, "Frische Erdbeere Himbeere");
        let list = engine.predict_image(&image()).unwrap();

        let first = &list.entries()[0];
        assert_eq!(first.source, SourceKind::Text);
        assert!((first.confidence - 0.95 * 0.85).abs() < 1e-5);
    }

    #[test]
    fn test_specific_boost_boundary() {
        let at_boundary = ProductRegistry::new(vec![KnownProduct::new("Erdbeere", "Erdbeere", "Erdbeeren", 1.2)], 0.85)
            .unwrap();
        let (engine, _) = engine_with(Box::new(FixedProbs(probs(0.6))), "Frische Erdbeere Himbeere", at_boundary);
        let list = engine.predict_image(&image()).unwrap();
        assert_eq!(list.entries()[0].class_name, "Erdbeere");

        let below = ProductRegistry::new(vec![KnownProduct::new("Erdbeere", "Erdbeere", "Erdbeeren", 1.19)], 0.85)
            .unwrap();
        let (engine, _) = engine_with(Box::new(FixedProbs(probs(0.6))), "Frische Erdbeere Himbeere", below);
        let list = engine.predict_image(&image()).unwrap();
        assert_eq!(list.entries()[0].source, SourceKind::Visual);
    }

    #[test]
    fn test_noise_text_is_ignored() {
        let (engine, _) = engine(0.2, "x7#q !! zz");
        let list = engine.predict_image(&image()).unwrap();

        assert_invariants(&list);
        assert_eq!(list.len(), 5);
        assert!(list.entries().iter().all(|e| e.source == SourceKind::Visual));
        // Noise is still reported on the top visual entry
        assert_eq!(list.entries()[0].extracted_text.as_deref(), Some("x7#q !! zz"));
    }

    #[test]
    fn test_empty_text_attaches_nothing() {
        let (engine, _) = engine(0.2, "");
        let list = engine.predict_image(&image()).unwrap();
        assert!(list.entries().iter().all(|e| e.extracted_text.is_none()));
    }

    #[test]
    fn test_visual_entries_use_slugs() {
        let (engine, _) = engine(0.9, "");
        let list = engine.predict_image(&image()).unwrap();

        let second = &list.entries()[1];
        assert_eq!(second.class_name, "pop_bottle_soda_bottle");
        assert_eq!(second.class_description, "pop bottle, soda bottle");
        assert_eq!(label_slug("jack-o'-lantern"), "jack-o-lantern");
        assert_eq!(label_slug("Granny Smith"), "granny_smith");
    }

    #[test]
    fn test_prediction_is_idempotent() {
        let (engine, _) = engine(0.5, "Weizenmehl Type 405");
        let img = image();
        assert_eq!(engine.predict_image(&img).unwrap(), engine.predict_image(&img).unwrap());
    }

    #[test]
    fn test_concurrent_predictions_match_sequential() {
        let (engine, _) = engine(0.5, "Weizenmehl Type 405");
        let img = image();
        let expected = engine.predict_image(&img).unwrap();

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(|| engine.predict_image(&img).unwrap())).collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }

    #[test]
    fn test_classifier_failure_aborts() {
        let (engine, calls) = engine_with(Box::new(FailingClassifier), "Weizenmehl Type 405", registry());
        assert!(matches!(engine.predict_image(&image()), Err(RecognitionError::Model(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_undecodable_bytes() {
        let (engine, _) = engine(0.5, "");
        assert!(matches!(engine.predict(b"not an image"), Err(RecognitionError::Decode(_))));
    }

    #[test]
    fn test_predict_from_encoded_bytes() {
        let (engine, _) = engine(0.3, "Weizenmehl Type 405");
        let mut buf = std::io::Cursor::new(Vec::new());
        image().write_to(&mut buf, image::ImageFormat::Png).unwrap();

        let list = engine.predict(buf.get_ref()).unwrap();
        assert_eq!(list.top_description(), Some("Weizenmehl"));
    }

    #[test]
    fn test_serialized_field_names() {
        let (engine, _) = engine(0.3, "Weizenmehl Type 405");
        let list = engine.predict_image(&image()).unwrap();
        let json = serde_json::to_value(&list).unwrap();

        let text = &json[0];
        assert_eq!(text["class_id"], -1);
        assert_eq!(text["source"], "text");
        assert_eq!(text["identified_by_text"], true);
        assert_eq!(text["extracted_text"], "Weizenmehl Type 405");

        let visual = json[1].as_object().unwrap();
        assert_eq!(visual["source"], "visual");
        assert!(!visual.contains_key("extracted_text"));
        assert!(!visual.contains_key("identified_by_text"));
    }
}
