//! Product title extraction
//!
//! Turns arbitrary OCR text into a short display name.

use regex::Regex;
use std::sync::LazyLock;

/// Placeholder when no usable text remains
pub const PLACEHOLDER_TITLE: &str = "Text";

/// Maximum title width in characters, including the ellipsis
pub const MAX_TITLE_CHARS: usize = 20;

const ELLIPSIS: &str = "...";

/// Words that never make a product name on their own (units, code labels, fillers)
const STOP_WORDS: &[&str] = &["typ", "type", "ml", "l", "g", "kg", "m", "cm", "mm", "the", "und"];

/// Product words returned verbatim when they appear anywhere in the text
const COMMON_PRODUCT_WORDS: &[&str] = &[
    "Mehl", "Weizenmehl", "Zucker", "Salz", "Milch", "Brot", "Wasser",
    "Butter", "Käse", "Buch", "ISBN", "Roman", "Kaffee", "Tee", "Wein",
];

static TYPE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:typ|type)\s*\d+").expect("valid regex"));

/// Derive a display name from extracted text
pub fn title_from(text: &str) -> String {
    let cleaned = clean(text);
    let cleaned_len = cleaned.chars().count();
    if cleaned_len < 3 {
        return PLACEHOLDER_TITLE.to_string();
    }

    let words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| qualifies(w))
        .collect();

    if words.is_empty() {
        return TYPE_CODE
            .find(&cleaned)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string());
    }

    if let Some(product) = common_product_word(&cleaned) {
        return product.to_string();
    }

    // First longest word wins ties
    let longest = words
        .iter()
        .copied()
        .reduce(|best, w| if w.chars().count() > best.chars().count() { w } else { best })
        .unwrap_or(words[0]);
    let longest_len = longest.chars().count();
    if longest_len >= 5 && longest_len as f32 >= cleaned_len as f32 * 0.3 {
        return capitalize(longest);
    }

    let joined = words.iter().take(3).copied().collect::<Vec<_>>().join(" ");
    capitalize(&truncate(&joined))
}

/// Replace anything but word characters with spaces and collapse whitespace
fn clean(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A word survives if it is long enough, not a stop word, and mostly letters
fn qualifies(word: &str) -> bool {
    let len = word.chars().count();
    if len < 3 || STOP_WORDS.contains(&word.to_lowercase().as_str()) {
        return false;
    }
    let letters = word.chars().filter(|c| c.is_alphabetic()).count();
    letters as f32 / len as f32 > 0.5
}

/// Longest product word contained in the text, so "Weizenmehl" beats "Mehl"
fn common_product_word(cleaned: &str) -> Option<&'static str> {
    let lower = cleaned.to_lowercase();
    COMMON_PRODUCT_WORDS
        .iter()
        .copied()
        .filter(|word| lower.contains(&word.to_lowercase()))
        .reduce(|best, w| if w.chars().count() > best.chars().count() { w } else { best })
}

fn truncate(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let keep = MAX_TITLE_CHARS - ELLIPSIS.len();
    let mut truncated: String = title.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Uppercase the first character, lowercase the rest
fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
