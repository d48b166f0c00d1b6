//! Response aggregation
//!
//! Merges the answers of several nodes into one. The longest answer is taken as
//! the base; every other answer is appended as a supplementary block only if it
//! contributes enough words the base does not already contain.

use std::collections::HashSet;

/// Header placed before each supplementary block
pub const SUPPLEMENT_HEADER: &str = "--- Additional information from another node ---";

/// Merges successful node responses
#[derive(Debug, Clone)]
pub struct ResponseAggregator {
    /// An alternate answer is kept only if it adds more than this many new words
    min_new_words: usize,
}

impl Default for ResponseAggregator {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ResponseAggregator {
    pub fn new(min_new_words: usize) -> Self {
        Self { min_new_words }
    }

    /// Merge texts into a single answer
    pub fn merge<S: AsRef<str>>(&self, texts: &[S]) -> String {
        match texts {
            [] => return String::new(),
            [only] => return only.as_ref().to_string(),
            _ => {}
        }

        let first = texts[0].as_ref();
        if texts.iter().all(|t| t.as_ref() == first) {
            return first.to_string();
        }

        // Longest first by characters; ties keep input order
        let mut ordered: Vec<&str> = texts.iter().map(AsRef::as_ref).collect();
        ordered.sort_by_key(|text| std::cmp::Reverse(text.chars().count()));

        let base = ordered[0];
        let base_words = word_set(base);
        let mut merged = base.to_string();

        for alternate in &ordered[1..] {
            let new_words = word_set(alternate)
                .into_iter()
                .filter(|w| !base_words.contains(w))
                .count();

            if new_words > self.min_new_words {
                merged.push_str("\n\n");
                merged.push_str(SUPPLEMENT_HEADER);
                merged.push_str("\n\n");
                merged.push_str(alternate);
            }
        }

        merged
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}
