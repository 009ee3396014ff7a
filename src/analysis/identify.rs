//! Product identification from extracted text

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::meaningful::{is_meaningful, FilterProfile};
use super::title::title_from;
use crate::storage::registry::{KnownProduct, ProductRegistry};

/// Product identity derived from text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifiedProduct {
    pub name: String,
    pub description: String,
    pub confidence_boost: f32,
    /// Whether the identity came from the registry rather than free text
    pub from_registry: bool,
}

impl From<&KnownProduct> for IdentifiedProduct {
    fn from(product: &KnownProduct) -> Self {
        Self {
            name: product.name.clone(),
            description: product.description.clone(),
            confidence_boost: product.confidence_boost,
            from_registry: true,
        }
    }
}

/// Maps text to a registry entry, or synthesizes an identity from meaningful text
#[derive(Debug, Clone)]
pub struct ProductIdentifier {
    registry: Arc<ProductRegistry>,
    filter: FilterProfile,
}

impl ProductIdentifier {
    pub fn new(registry: Arc<ProductRegistry>, filter: FilterProfile) -> Self {
        Self { registry, filter }
    }

    pub fn registry(&self) -> &ProductRegistry {
        &self.registry
    }

    pub fn filter(&self) -> &FilterProfile {
        &self.filter
    }

    /// Identify a product from text; `None` when the text carries no usable signal
    pub fn identify(&self, text: &str) -> Option<IdentifiedProduct> {
        if text.trim().is_empty() {
            return None;
        }

        if let Some(product) = self.best_registry_match(text) {
            debug!("Registry match '{}' for text", product.keyword);
            return Some(product.into());
        }

        if !is_meaningful(text, &self.filter) {
            return None;
        }

        let title = title_from(text);
        info!("Meaningful text detected, using as product name: '{}'", title);
        Some(IdentifiedProduct {
            name: title.clone(),
            description: title,
            confidence_boost: self.registry.synthesized_boost(),
            from_registry: false,
        })
    }

    /// Highest `len(keyword) x boost` among contained keywords; earlier entries win ties
    fn best_registry_match(&self, text: &str) -> Option<&KnownProduct> {
        let lower = text.to_lowercase();
        let mut best: Option<(&KnownProduct, f32)> = None;

        for product in self.registry.products() {
            if !lower.contains(&product.keyword.to_lowercase()) {
                continue;
            }
            let score = product.keyword.chars().count() as f32 * product.confidence_boost;
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((product, score));
            }
        }

        best.map(|(product, _)| product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identifier() -> ProductIdentifier {
        let registry = ProductRegistry::builtin(0.85).unwrap();
        ProductIdentifier::new(Arc::new(registry), FilterProfile::strict())
    }

    #[test]
    fn test_more_specific_keyword_wins() {
        let product = identifier().identify("Bio Vollmilch 3.5%").unwrap();
        assert_eq!(product.name, "Vollmilch");
        assert!(product.from_registry);
        assert!((product.confidence_boost - 1.5).abs() < 0.001);
    }

    #[test]
    fn test_case_insensitive_match() {
        let product = identifier().identify("WEIZENMEHL").unwrap();
        assert_eq!(product.name, "Weizenmehl");
    }

    #[test]
    fn test_synthesized_from_meaningful_text() {
        let product = identifier().identify("Frische Erdbeere Himbeere").unwrap();
        assert!(!product.from_registry);
        assert_eq!(product.name, product.description);
        assert!((product.confidence_boost - 0.85).abs() < 0.001);
    }

    #[test]
    fn test_synthesized_boost_below_registry() {
        let id = identifier();
        let min_boost = id
            .registry()
            .products()
            .iter()
            .map(|p| p.confidence_boost)
            .fold(f32::INFINITY, f32::min);
        let product = id.identify("Frische Erdbeere Himbeere").unwrap();
        assert!(product.confidence_boost < min_boost);
    }

    #[test]
    fn test_noise_is_not_identified() {
        assert!(identifier().identify("x7#q !! zz").is_none());
        assert!(identifier().identify("").is_none());
        assert!(identifier().identify("   ").is_none());
    }

    #[test]
    fn test_tie_keeps_earlier_entry() {
        let registry = ProductRegistry::new(
            vec![
                KnownProduct::new("Cola", "First", "First", 1.5),
                KnownProduct::new("Wasser", "Second", "Second", 1.0),
            ],
            0.85,
        )
        .unwrap();
        let id = ProductIdentifier::new(Arc::new(registry), FilterProfile::strict());
        // 4 x 1.5 == 6 x 1.0
        assert_eq!(id.identify("cola wasser").unwrap().name, "First");
    }
}
