//! Name dictionary and pattern-name rendering.
//!
//! Dictionary files hold one `id*category*word` entry per line; blank lines
//! and lines starting with `#` are skipped.

use crate::protocol::NamePart;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("failed to read dictionary: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Built-in entries: `(id, category, word)`.
const BUILTIN: &[(i16, &str, &str)] = &[
    (0, "title", "Mr"),
    (1, "title", "Miss"),
    (2, "title", "Captain"),
    (3, "title", "Doctor"),
    (4, "title", "Professor"),
    (5, "title", "Lady"),
    (6, "title", "Sir"),
    (20, "first", "True"),
    (21, "first", "Bonzo"),
    (22, "first", "Dizzy"),
    (23, "first", "Lucky"),
    (24, "first", "Penny"),
    (25, "first", "Sparky"),
    (26, "first", "Zippy"),
    (40, "last_prefix", "Fuzzy"),
    (41, "last_prefix", "Bumble"),
    (42, "last_prefix", "Giggle"),
    (43, "last_prefix", "Mc"),
    (44, "last_prefix", "Sour"),
    (45, "last_prefix", "Wiggle"),
    (60, "last_suffix", "Wuzzy"),
    (61, "last_suffix", "Berry"),
    (62, "last_suffix", "Bee"),
    (63, "last_suffix", "Fish"),
    (64, "last_suffix", "Pants"),
    (65, "last_suffix", "Snoot"),
];

/// Pattern-name dictionary: id to (category, word).
#[derive(Debug, Clone)]
pub struct NameDictionary {
    entries: HashMap<i16, (String, String)>,
}

impl NameDictionary {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|&(id, category, word)| (id, (category.to_string(), word.to_string())))
                .collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, DictionaryError> {
        let mut entries = HashMap::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.splitn(3, '*');
            let (Some(id), Some(category), Some(word)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(DictionaryError::Parse {
                    line: n + 1,
                    reason: "expected id*category*word".to_string(),
                });
            };
            let id: i16 = id.trim().parse().map_err(|_| DictionaryError::Parse {
                line: n + 1,
                reason: format!("invalid id {id:?}"),
            })?;
            entries.insert(id, (category.trim().to_string(), word.trim().to_string()));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn word(&self, id: i16) -> Option<&str> {
        self.entries.get(&id).map(|(_, word)| word.as_str())
    }

    /// Render a four-part pattern.
    ///
    /// Unknown ids render empty. A set capitalization flag uppercases the
    /// first letter, otherwise the word is lowercased. Parts 3 and 4 form
    /// one surname with no space between them; empty parts are dropped.
    pub fn render(&self, parts: &[NamePart; 4]) -> String {
        let mut words: Vec<String> = parts
            .iter()
            .map(|part| {
                let word = self.word(part.index).unwrap_or("");
                if part.capitalize {
                    capitalize_first(word)
                } else {
                    word.to_lowercase()
                }
            })
            .collect();

        let last = words.pop().unwrap_or_default();
        if let Some(surname) = words.last_mut() {
            surname.push_str(&last);
        }
        words.retain(|w| !w.is_empty());
        words.join(" ")
    }
}

impl Default for NameDictionary {
    fn default() -> Self {
        Self::builtin()
    }
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
