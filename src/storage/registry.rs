//! Known-product registry storage and loading

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::error::RegistryError;

/// A product that can be recognized from a keyword on its packaging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownProduct {
    /// Text fragment searched for (case-insensitive substring)
    pub keyword: String,
    /// Canonical product name
    pub name: String,
    /// Display description
    pub description: String,
    /// Specificity multiplier; longer, more specific keywords get more
    pub confidence_boost: f32,
}

impl KnownProduct {
    pub fn new(keyword: &str, name: &str, description: &str, confidence_boost: f32) -> Self {
        Self {
            keyword: keyword.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            confidence_boost,
        }
    }
}

/// On-disk registry file shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryFile {
    pub products: Vec<KnownProduct>,
}

/// Validated, read-only set of known products
#[derive(Debug, Clone)]
pub struct ProductRegistry {
    products: Vec<KnownProduct>,
    synthesized_boost: f32,
}

impl ProductRegistry {
    /// Build a registry, rejecting entries that could lose to synthesized text identities
    pub fn new(products: Vec<KnownProduct>, synthesized_boost: f32) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();

        for (index, product) in products.iter().enumerate() {
            if product.keyword.trim().is_empty() {
                return Err(RegistryError::InvalidEntry {
                    index,
                    reason: "keyword is empty".to_string(),
                });
            }
            if !product.confidence_boost.is_finite() || product.confidence_boost <= 0.0 {
                return Err(RegistryError::InvalidEntry {
                    index,
                    reason: format!("confidence_boost {} is not positive", product.confidence_boost),
                });
            }
            if product.confidence_boost <= synthesized_boost {
                return Err(RegistryError::InvalidEntry {
                    index,
                    reason: format!(
                        "confidence_boost {} must exceed the synthesized boost {}",
                        product.confidence_boost, synthesized_boost
                    ),
                });
            }
            if !seen.insert(product.keyword.to_lowercase()) {
                return Err(RegistryError::DuplicateKeyword(product.keyword.clone()));
            }
        }

        Ok(Self {
            products,
            synthesized_boost,
        })
    }

    /// Built-in grocery, book and beverage keywords
    pub fn builtin(synthesized_boost: f32) -> Result<Self, RegistryError> {
        Self::new(builtin_products(), synthesized_boost)
    }

    pub fn products(&self) -> &[KnownProduct] {
        &self.products
    }

    /// Boost assigned to identities synthesized from free text
    pub fn synthesized_boost(&self) -> f32 {
        self.synthesized_boost
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Load a registry from a JSON file
pub fn load_registry(path: &Path, synthesized_boost: f32) -> Result<ProductRegistry, RegistryError> {
    let content = std::fs::read_to_string(path)?;
    let file: RegistryFile = serde_json::from_str(&content)?;
    let registry = ProductRegistry::new(file.products, synthesized_boost)?;
    info!("Loaded {} known products from {:?}", registry.len(), path);
    Ok(registry)
}

/// Save a registry to a JSON file
pub fn save_registry(registry: &ProductRegistry, path: &Path) -> Result<(), RegistryError> {
    let file = RegistryFile {
        products: registry.products.clone(),
    };
    let content = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn builtin_products() -> Vec<KnownProduct> {
    vec![
        // Flour
        KnownProduct::new("Mehl", "Mehl", "Weizenmehl", 1.2),
        KnownProduct::new("Weizenmehl", "Weizenmehl", "Weizenmehl", 1.5),
        KnownProduct::new("Typ 405", "Weizenmehl_405", "Weizenmehl Type 405", 1.5),
        // Sugar and salt
        KnownProduct::new("Zucker", "Zucker", "Zucker", 1.2),
        KnownProduct::new("Raffinadezucker", "Raffinadezucker", "Feiner Zucker", 1.5),
        KnownProduct::new("Salz", "Salz", "Salz", 1.2),
        // Dairy
        KnownProduct::new("Milch", "Milch", "Frische Milch", 1.2),
        KnownProduct::new("Vollmilch", "Vollmilch", "Vollmilch", 1.5),
        KnownProduct::new("Joghurt", "Joghurt", "Joghurt", 1.3),
        KnownProduct::new("Butter", "Butter", "Butter", 1.5),
        KnownProduct::new("Käse", "Käse", "Käse", 1.2),
        KnownProduct::new("Gouda", "Gouda", "Gouda Käse", 1.5),
        // Bread
        KnownProduct::new("Brot", "Brot", "Brot", 1.2),
        KnownProduct::new("Vollkornbrot", "Vollkornbrot", "Vollkornbrot", 1.5),
        // Beverages
        KnownProduct::new("Wasser", "Wasser", "Mineralwasser", 1.2),
        KnownProduct::new("Mineralwasser", "Mineralwasser", "Mineralwasser", 1.5),
        KnownProduct::new("Cola", "Cola", "Cola", 1.3),
        KnownProduct::new("Fanta", "Fanta", "Fanta", 1.3),
        KnownProduct::new("Kaffee", "Kaffee", "Kaffee", 1.3),
        KnownProduct::new("Tee", "Tee", "Tee", 1.3),
        KnownProduct::new("Wein", "Wein", "Weinflasche", 1.3),
        KnownProduct::new("Rotwein", "Rotwein", "Rotwein", 1.5),
        KnownProduct::new("Weißwein", "Weißwein", "Weißwein", 1.5),
        // Snacks and canned goods
        KnownProduct::new("Schokolade", "Schokolade", "Schokolade", 1.3),
        KnownProduct::new("Chips", "Chips", "Chips", 1.3),
        KnownProduct::new("Tomaten", "Tomaten", "Tomaten", 1.2),
        KnownProduct::new("Mais", "Mais", "Mais", 1.2),
        // Print
        KnownProduct::new("Buch", "Buch", "Buch", 1.2),
        KnownProduct::new("ISBN", "Buch", "Buch mit ISBN", 1.5),
        KnownProduct::new("Roman", "Roman", "Romanwerk", 1.3),
        KnownProduct::new("Zeitung", "Zeitung", "Tageszeitung", 1.3),
        KnownProduct::new("Magazin", "Magazin", "Zeitschrift", 1.3),
        // Generic organic marker, least specific
        KnownProduct::new("Bio", "Bio_Produkt", "Bio-Produkt", 1.2),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_registry_is_valid() {
        let registry = ProductRegistry::builtin(0.85).unwrap();
        assert!(!registry.is_empty());
        let min_boost = registry
            .products()
            .iter()
            .map(|p| p.confidence_boost)
            .fold(f32::INFINITY, f32::min);
        assert!(registry.synthesized_boost() < min_boost);
    }

    #[test]
    fn test_builtin_rejects_high_synthesized_boost() {
        assert!(ProductRegistry::builtin(1.2).is_err());
    }

    #[test]
    fn test_empty_keyword_rejected() {
        let result = ProductRegistry::new(vec![KnownProduct::new("  ", "X", "X", 1.3)], 0.85);
        assert!(matches!(result, Err(RegistryError::InvalidEntry { index: 0, .. })));
    }

    #[test]
    fn test_non_positive_boost_rejected() {
        let result = ProductRegistry::new(vec![KnownProduct::new("Salz", "Salz", "Salz", f32::NAN)], 0.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_keyword_rejected() {
        let result = ProductRegistry::new(
            vec![
                KnownProduct::new("Milch", "Milch", "Milch", 1.2),
                KnownProduct::new("MILCH", "Milch", "Milch", 1.3),
            ],
            0.85,
        );
        assert!(matches!(result, Err(RegistryError::DuplicateKeyword(_))));
    }

    #[test]
    fn test_save_and_load_registry() {
        let registry = ProductRegistry::builtin(0.85).unwrap();
        let temp_file = NamedTempFile::new().unwrap();

        save_registry(&registry, temp_file.path()).unwrap();
        let loaded = load_registry(temp_file.path(), 0.85).unwrap();

        assert_eq!(loaded.products(), registry.products());
    }

    #[test]
    fn test_load_registry_invalid_json() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "{{ not json").unwrap();

        let result = load_registry(temp_file.path(), 0.85);
        assert!(matches!(result, Err(RegistryError::Parse(_))));
    }

    #[test]
    fn test_load_registry_missing_file() {
        let result = load_registry(Path::new("/nonexistent/registry.json"), 0.85);
        assert!(matches!(result, Err(RegistryError::Io(_))));
    }
}
