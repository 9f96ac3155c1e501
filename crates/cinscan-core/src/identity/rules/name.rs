//! Holder name extraction.

use serde::{Deserialize, Serialize};

use super::patterns::{DIGIT, NAME_NOISE};
use super::{ExtractionMatch, FieldExtractor};
use crate::identity::NormalizedText;

/// A name split into its two printed parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub given_name: String,
    pub surname: String,
}

impl PersonName {
    /// Split an accepted line: the first token is the given name, the rest the surname.
    fn from_tokens(tokens: &[&str]) -> Option<Self> {
        let (first, rest) = tokens.split_first()?;
        if rest.is_empty() {
            return None;
        }
        Some(Self {
            given_name: first.to_string(),
            surname: rest.join(" "),
        })
    }
}

/// Name field extractor.
///
/// First qualifying line wins, so labels printed above the name must carry
/// punctuation or digits for this to pick the right line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameExtractor;

impl NameExtractor {
    pub fn new() -> Self {
        Self
    }

    fn candidate(line: &str) -> Option<PersonName> {
        let line = line.trim();
        if line.chars().count() < 2 || DIGIT.is_match(line) {
            return None;
        }

        let cleaned = NAME_NOISE.replace_all(line, "");
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        if tokens.len() < 2 || !tokens.iter().all(|t| t.chars().all(char::is_alphabetic)) {
            return None;
        }

        PersonName::from_tokens(&tokens)
    }
}

impl FieldExtractor for NameExtractor {
    type Output = ExtractionMatch<PersonName>;

    fn extract(&self, text: &NormalizedText) -> Option<Self::Output> {
        text.lines().iter().enumerate().find_map(|(idx, line)| {
            Self::candidate(line).map(|name| ExtractionMatch::new(name, "name_line", line.as_str()).on_line(idx))
        })
    }

    fn extract_all(&self, text: &NormalizedText) -> Vec<Self::Output> {
        text.lines()
            .iter()
            .enumerate()
            .filter_map(|(idx, line)| {
                Self::candidate(line)
                    .map(|name| ExtractionMatch::new(name, "name_line", line.as_str()).on_line(idx))
            })
            .collect()
    }
}

/// Extract `(surname, given_name)` from normalized text.
pub fn extract_name(text: &NormalizedText) -> (Option<String>, Option<String>) {
    match NameExtractor.extract(text) {
        Some(m) => (Some(m.value.surname), Some(m.value.given_name)),
        None => (None, None),
    }
}
