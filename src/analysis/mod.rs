//! Text Analysis Layer
//!
//! Judges OCR output and resolves it to a product identity:
//! - Meaningfulness filter (real text vs. OCR noise)
//! - Title extraction for display names
//! - Registry-backed product identification

pub mod identify;
pub mod meaningful;
pub mod title;

pub use identify::{IdentifiedProduct, ProductIdentifier};
pub use meaningful::{is_meaningful, FilterProfile, Strictness};
pub use title::title_from;
