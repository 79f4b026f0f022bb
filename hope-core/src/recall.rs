//! Recall across layers.

use serde::Serialize;

use crate::error::Result;
use crate::types::{ItemId, Layer};

/// External semantic/vector index consulted for long-term recall
pub trait SemanticIndex: Send + Sync {
    /// Up to `k` item ids most similar to `text`, best first
    fn query(&self, text: &str, k: usize) -> Result<Vec<(String, f32)>>;
}

/// Where a recollection came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Layer(Layer),
    Semantic,
    Association,
}

/// One recalled memory with its current salience
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recollection {
    pub id: Option<ItemId>,
    pub text: String,
    pub score: f64,
    pub source: Source,
}

/// Case-insensitive containment of every query word
pub(crate) fn matches(query_words: &[String], text: &str) -> bool {
    let lower = text.to_lowercase();
    !query_words.is_empty() && query_words.iter().all(|w| lower.contains(w.as_str()))
}

pub(crate) fn query_words(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_lowercase).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_all_words() {
        let words = query_words("Password SPONGE");
        assert!(matches(&words, "The password is Sponge"));
        assert!(!matches(&words, "The password is Squid"));
        assert!(!matches(&query_words("   "), "anything"));
    }
}
