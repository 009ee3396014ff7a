//! Meaningfulness filter
//!
//! Decides whether OCR output is real packaging text or recognition noise.
//! One pipeline serves both strictness levels; only the thresholds differ.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

/// Everyday and grocery vocabulary used to confirm that tokens are words
const COMMON_WORDS: &[&str] = &[
    "und", "der", "die", "das", "mit", "für", "von", "bei", "aus", "buch",
    "text", "wort", "preis", "euro", "kauf", "geld", "zeit", "jahr", "leben",
    "mensch", "mann", "frau", "kind", "stadt", "land", "haus", "auto", "wasser",
    "essen", "milch", "brot", "zucker", "salz", "butter", "käse", "fleisch",
    "obst", "gemüse", "wein", "bier", "hotel", "restaurant", "schule", "arbeit",
    "schrift", "brief", "post", "zeitung", "markt", "straße", "zimmer", "tisch",
    "stuhl", "bett", "küche", "bad", "wohnung", "fenster", "tür", "dach", "wand",
    "mehl", "weizen", "weißmehl", "weizenmehl", "vollkorn", "vollkornmehl", "teig",
    "teigwaren", "pasta", "spaghetti", "nudel", "nudeln", "reis", "kartoffel",
    "kartoffeln", "getränk", "getränke", "cola", "limonade", "saft", "apfel",
    "banane", "orange", "birne", "erdbeere", "himbeere", "brombeere", "heidelbeere",
];

static DICTIONARY: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| COMMON_WORDS.iter().copied().collect());

/// Flour or grain keyword followed by a "Typ 405" / "Type 1050" code
static GRAIN_TYPE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(weizen|mehl|vollkorn|roggen|dinkel).*?\btype?\s*\d+").expect("valid regex")
});

/// Web address with a country code TLD (www.example.de); the host label needs a letter
static COUNTRY_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bwww\.[a-z0-9-]*[a-z][a-z0-9-]*(?:\.[a-z0-9-]+)*\.(?:de|at|ch|nl|fr|it|es|pl|eu|uk)\b")
        .expect("valid regex")
});

/// Price with decimals and currency symbol (2,49 €)
static PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+[.,]\d+\s*€").expect("valid regex"));

/// ISBN-like identifier
static ISBN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"isbn.*?\d[-\s]?\d").expect("valid regex"));

/// Strictness level of the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Dictionary-backed rules that reject most OCR noise
    #[default]
    Strict,
    /// Length and letter-ratio checks only
    Legacy,
}

/// Thresholds of the filter pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct FilterProfile {
    /// Minimum character count of the trimmed text and of the letters-only text
    pub min_length: usize,
    /// Maximum share of characters that are neither alphanumeric nor whitespace
    pub max_noise_ratio: f32,
    /// Minimum length of a candidate word
    pub min_word_length: usize,
    /// Letters / characters of the cleaned text must exceed this
    pub min_letter_ratio: f32,
    /// Require dictionary hits (known words) to accept
    pub require_known_words: bool,
    /// Require adjacent words or one long known word to accept
    pub require_word_structure: bool,
}

impl FilterProfile {
    /// Stricter rules: dictionary confirmation and word structure
    pub fn strict() -> Self {
        Self {
            min_length: 6,
            max_noise_ratio: 0.3,
            min_word_length: 5,
            min_letter_ratio: 0.7,
            require_known_words: true,
            require_word_structure: true,
        }
    }

    /// Permissive rules: any word of three letters in mostly-letter text
    pub fn legacy() -> Self {
        Self {
            min_length: 3,
            max_noise_ratio: 1.0,
            min_word_length: 3,
            min_letter_ratio: 0.5,
            require_known_words: false,
            require_word_structure: false,
        }
    }

    pub fn for_strictness(strictness: Strictness) -> Self {
        match strictness {
            Strictness::Strict => Self::strict(),
            Strictness::Legacy => Self::legacy(),
        }
    }
}

impl Default for FilterProfile {
    fn default() -> Self {
        Self::strict()
    }
}

/// Decide whether `text` looks like real text under the given profile
pub fn is_meaningful(text: &str, profile: &FilterProfile) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < profile.min_length {
        return false;
    }

    let total = text.chars().count();
    let noise = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    if noise as f32 / total as f32 > profile.max_noise_ratio {
        debug!("Rejected text with too many special characters: {}", trimmed);
        return false;
    }

    let letters_only = collapse(trimmed, |c| c.is_alphabetic());
    if letters_only.chars().count() < profile.min_length {
        return false;
    }

    // Digits survive here so that letter ratio and word adjacency see them
    let cleaned = collapse(trimmed, |c| c.is_alphanumeric());
    let words: Vec<&str> = cleaned.split_whitespace().collect();

    let candidates: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| is_alphabetic_word(w) && w.chars().count() >= profile.min_word_length)
        .collect();
    if candidates.is_empty() {
        return false;
    }

    if passes_word_rules(&cleaned, &words, candidates.len(), profile) {
        debug!("Meaningful text validation passed with words: {}", candidates.join(", "));
        return true;
    }

    matches_structural_pattern(trimmed)
}

/// Dictionary, letter ratio and word structure rules
fn passes_word_rules(cleaned: &str, words: &[&str], candidate_count: usize, profile: &FilterProfile) -> bool {
    let known: Vec<String> = words
        .iter()
        .map(|w| w.to_lowercase())
        .filter(|w| DICTIONARY.contains(w.as_str()))
        .collect();

    if profile.require_known_words && !(known.len() >= 2 || (!known.is_empty() && candidate_count >= 2)) {
        return false;
    }

    let total = cleaned.chars().count();
    let letters = cleaned.chars().filter(|c| c.is_alphabetic()).count();
    if letters as f32 / total as f32 <= profile.min_letter_ratio {
        return false;
    }

    if !profile.require_word_structure {
        return true;
    }

    let adjacent = words
        .windows(2)
        .any(|pair| is_alphabetic_word(pair[0]) && is_alphabetic_word(pair[1]));
    if adjacent {
        return true;
    }

    known.iter().any(|w| w.chars().count() >= 6)
}

/// Product codes, shop domains, prices and book numbers count as text
/// even when no dictionary word is present
pub fn matches_structural_pattern(text: &str) -> bool {
    let lower = text.to_lowercase();

    if GRAIN_TYPE_CODE.is_match(&lower) {
        debug!("Found product pattern: grain + type code");
        return true;
    }
    if COUNTRY_DOMAIN.is_match(&lower) {
        debug!("Found website domain");
        return true;
    }
    if PRICE.is_match(&lower) {
        debug!("Found price information");
        return true;
    }
    if ISBN.is_match(&lower) {
        debug!("Found ISBN number");
        return true;
    }
    false
}

fn is_alphabetic_word(word: &str) -> bool {
    !word.is_empty() && word.chars().all(char::is_alphabetic)
}

/// Keep characters accepted by `keep` plus whitespace, collapse runs of whitespace
fn collapse(text: &str, keep: impl Fn(char) -> bool) -> String {
    let filtered: String = text
        .chars()
        .filter(|&c| keep(c) || c.is_whitespace())
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}
