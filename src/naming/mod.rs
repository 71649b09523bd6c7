//! Avatar naming: moderation of typed names and rendering of pattern names.

mod judge;
mod pattern;

pub use judge::NameJudge;
pub use pattern::{DictionaryError, NameDictionary};
