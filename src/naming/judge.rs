//! Typed-name moderation judge.

use aho_corasick::AhoCorasick;
use std::collections::HashMap;
use tracing::warn;

/// Rejects empty names and names containing a banned substring.
///
/// Banned substrings are bucketed by their first character; each word of a
/// name is only checked against the bucket of its own first character.
/// Matching is case-insensitive.
#[derive(Debug, Default)]
pub struct NameJudge {
    buckets: HashMap<char, AhoCorasick>,
}

impl NameJudge {
    pub fn new<S: AsRef<str>>(banned: &[S]) -> Self {
        let mut grouped: HashMap<char, Vec<String>> = HashMap::new();
        for word in banned {
            let word = word.as_ref().trim().to_lowercase();
            if let Some(first) = word.chars().next() {
                grouped.entry(first).or_default().push(word);
            }
        }

        let mut buckets = HashMap::with_capacity(grouped.len());
        for (first, patterns) in grouped {
            match AhoCorasick::new(&patterns) {
                Ok(matcher) => {
                    buckets.insert(first, matcher);
                }
                Err(e) => {
                    warn!(bucket = %first, error = %e, "Failed to build banned-name matcher");
                }
            }
        }
        Self { buckets }
    }

    /// Whether `name` may be submitted for moderation.
    pub fn judge(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        if self.buckets.is_empty() {
            return true;
        }
        for word in name.split(' ') {
            let word = word.to_lowercase();
            let Some(first) = word.chars().next() else {
                return false;
            };
            if let Some(matcher) = self.buckets.get(&first)
                && matcher.is_match(&word)
            {
                return false;
            }
        }
        true
    }
}
