use crate::ontology::FieldDef;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "because",
    "been", "but", "by", "can", "could", "for", "from", "had", "has", "have", "her", "his", "how",
    "if", "in", "into", "is", "it", "its", "may", "more", "not", "of", "on", "or", "our", "she",
    "should", "so", "than", "that", "the", "their", "them", "then", "there", "these", "they",
    "this", "those", "to", "too", "was", "were", "what", "when", "which", "who", "will", "with",
    "would", "you", "your",
];

/// Turns field values into index terms
#[derive(Debug, Clone)]
pub struct TermParser {
    min_word_length: usize,
    max_word_length: usize,
    stop_words: HashSet<&'static str>,
}

impl TermParser {
    pub fn new(min_word_length: usize, max_word_length: usize) -> Self {
        Self {
            min_word_length,
            max_word_length,
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    /// Lowercased, de-duplicated terms of `value`, in order of first appearance
    pub fn parse(&self, value: &str, field: &FieldDef) -> Vec<String> {
        let lowered = value.to_lowercase();
        let candidates: Vec<&str> = if field.delimited {
            lowered.unicode_words().collect()
        } else {
            lowered.split_whitespace().collect()
        };

        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for word in candidates {
            if field.filtered && !self.keep(word) {
                continue;
            }
            if seen.insert(word) {
                terms.push(word.to_string());
            }
        }
        terms
    }

    fn keep(&self, word: &str) -> bool {
        let len = word.chars().count();
        len >= self.min_word_length
            && len <= self.max_word_length
            && !self.stop_words.contains(word)
    }
}
