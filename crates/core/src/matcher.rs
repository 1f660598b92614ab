//! Fuzzy product-mention extraction from free text.
//!
//! A product is mentioned when every word of its name is close (bigram Dice
//! similarity above the threshold) to some word of the message. Quantities are
//! read from `<digits> [unit] [connector] <name>` first, then from the first
//! generic `<digits> <unit>` in the message, and default to 1.
//!
//! The generic fallback is not tied to a product, so a message such as
//! "2kg de arroz e feijao" attaches the same quantity to both mentions.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::product::Product;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

const DEFAULT_UNIT_WORDS: &[&str] = &[
    "un", "unidade", "unidades", "kg", "kilo", "kilos", "quilo", "quilos", "litro", "litros",
    "l", "g", "grama", "gramas", "pacote", "pacotes", "caixa", "caixas", "garrafa", "garrafas",
];

const DEFAULT_CONNECTORS: &[&str] = &["de", "do", "da", "dos", "das"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub threshold: f64,
    pub unit_words: Vec<String>,
    pub connectors: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            unit_words: DEFAULT_UNIT_WORDS.iter().map(|word| word.to_string()).collect(),
            connectors: DEFAULT_CONNECTORS.iter().map(|word| word.to_string()).collect(),
        }
    }
}

impl MatcherConfig {
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold, ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub product: Product,
    pub quantity: u32,
    pub confidence: f64,
}

#[derive(Clone, Debug)]
pub struct ProductMatcher {
    threshold: f64,
    unit_alternation: String,
    connector_alternation: String,
    generic_quantity: Regex,
}

impl Default for ProductMatcher {
    fn default() -> Self {
        // Built from escaped literals only, so compilation cannot fail.
        Self::new(MatcherConfig::default()).unwrap_or_else(|_| unreachable!())
    }
}

impl ProductMatcher {
    pub fn new(config: MatcherConfig) -> Result<Self, regex::Error> {
        let unit_alternation = alternation(&config.unit_words);
        let connector_alternation = alternation(&config.connectors);
        let generic_quantity = Regex::new(&format!(r"(?i)([0-9]+)\s*(?:{unit_alternation})\b"))?;

        Ok(Self { threshold: config.threshold, unit_alternation, connector_alternation, generic_quantity })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Candidates in catalog order; one per mentioned product.
    pub fn match_products(&self, text: &str, catalog: &[Product]) -> Vec<MatchCandidate> {
        let lowered = text.to_lowercase();
        let words = lowered.split_whitespace().collect::<Vec<_>>();
        if words.is_empty() {
            return Vec::new();
        }

        catalog
            .iter()
            .filter_map(|product| {
                let confidence = self.mention_confidence(&words, &product.name)?;
                Some(MatchCandidate {
                    product: product.clone(),
                    quantity: self.extract_quantity(text, &product.name),
                    confidence,
                })
            })
            .collect()
    }

    fn mention_confidence(&self, words: &[&str], product_name: &str) -> Option<f64> {
        let lowered_name = product_name.to_lowercase();
        let name_tokens = lowered_name.split_whitespace().collect::<Vec<_>>();
        if name_tokens.is_empty() {
            return None;
        }

        let mut confidence = 1.0_f64;
        for name_token in name_tokens {
            let best = words
                .iter()
                .map(|word| similarity(word, name_token))
                .fold(0.0_f64, f64::max);
            if best <= self.threshold {
                return None;
            }
            confidence = confidence.min(best);
        }
        Some(confidence)
    }

    fn extract_quantity(&self, text: &str, product_name: &str) -> u32 {
        let named = self
            .named_quantity_pattern(product_name)
            .and_then(|pattern| capture_quantity(&pattern, text));
        let quantity = named
            .or_else(|| capture_quantity(&self.generic_quantity, text))
            .unwrap_or(1);
        quantity.max(1)
    }

    fn named_quantity_pattern(&self, product_name: &str) -> Option<Regex> {
        let name_pattern = product_name
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");
        if name_pattern.is_empty() {
            return None;
        }

        Regex::new(&format!(
            r"(?i)([0-9]+)\s*(?:(?:{units})\b)?\s*(?:(?:{connectors})\s+)?{name_pattern}",
            units = self.unit_alternation,
            connectors = self.connector_alternation,
        ))
        .ok()
    }
}

fn alternation(words: &[String]) -> String {
    let mut sorted = words
        .iter()
        .map(|word| word.trim())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();
    // Longest first so "unidades" wins over "un".
    sorted.sort_by(|left, right| right.len().cmp(&left.len()).then_with(|| left.cmp(right)));
    sorted.dedup();
    sorted.into_iter().map(regex::escape).collect::<Vec<_>>().join("|")
}

fn capture_quantity(pattern: &Regex, text: &str) -> Option<u32> {
    pattern.captures(text)?.get(1)?.as_str().parse::<u32>().ok()
}

/// Sørensen–Dice coefficient over character bigrams, whitespace ignored.
pub fn similarity(left: &str, right: &str) -> f64 {
    let left = left.chars().filter(|ch| !ch.is_whitespace()).collect::<Vec<_>>();
    let right = right.chars().filter(|ch| !ch.is_whitespace()).collect::<Vec<_>>();

    if left == right {
        return 1.0;
    }
    if left.len() < 2 || right.len() < 2 {
        return 0.0;
    }

    let mut left_bigrams: HashMap<(char, char), usize> = HashMap::new();
    for pair in left.windows(2) {
        *left_bigrams.entry((pair[0], pair[1])).or_insert(0) += 1;
    }

    let mut intersection = 0usize;
    for pair in right.windows(2) {
        if let Some(count) = left_bigrams.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                intersection += 1;
            }
        }
    }

    (2.0 * intersection as f64) / ((left.len() + right.len() - 2) as f64)
}
