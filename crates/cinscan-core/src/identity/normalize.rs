//! Merging of OCR passes into one clean line sequence.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ocr::RecognizedText;

/// Trimmed, non-blank, duplicate-free lines in first-seen order.
///
/// Order is kept (not sorted): extractors rely on line proximity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedText {
    lines: Vec<String>,
}

impl NormalizedText {
    /// Normalize a single block of text.
    pub fn from_text(text: &str) -> Self {
        normalize(&[RecognizedText::from(text)])
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Total characters over all lines, separators excluded.
    pub fn char_count(&self) -> usize {
        self.lines.iter().map(|l| l.chars().count()).sum()
    }
}

/// Concatenate passes in order, trim lines, drop blanks and repeats.
pub fn normalize(passes: &[RecognizedText]) -> NormalizedText {
    let mut seen = HashSet::new();
    let mut lines = Vec::new();

    for line in passes.iter().flat_map(|pass| pass.lines()) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if seen.insert(line) {
            lines.push(line.to_string());
        }
    }

    NormalizedText { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merges_passes_in_order() {
        let raw = RecognizedText::from("ROYAUME DU MAROC\nCARTE NATIONALE\n\nAB123456");
        let processed = RecognizedText::from("CARTE NATIONALE\n  Dupont Marie  \nAB123456\n");

        let merged = normalize(&[raw, processed]);
        assert_eq!(
            merged.lines(),
            &["ROYAUME DU MAROC", "CARTE NATIONALE", "AB123456", "Dupont Marie"]
        );
    }

    #[test]
    fn test_drops_blank_and_whitespace_lines() {
        let text = NormalizedText::from_text("\n   \n\t\nA\n \nB\n");
        assert_eq!(text.lines(), &["A", "B"]);
    }

    #[test]
    fn test_each_distinct_line_once() {
        let input = "x\ny\n\nx\nz\ny\n  x  \nz";
        let text = NormalizedText::from_text(input);
        assert_eq!(text.lines(), &["x", "y", "z"]);
    }

    #[test]
    fn test_case_sensitive_dedup() {
        let text = NormalizedText::from_text("Nom\nNOM\nNom");
        assert_eq!(text.lines(), &["Nom", "NOM"]);
    }

    #[test]
    fn test_empty_input() {
        let text = normalize(&[]);
        assert!(text.is_empty());
        assert_eq!(text.text(), "");
        assert_eq!(text.char_count(), 0);
    }

    #[test]
    fn test_char_count() {
        let text = NormalizedText::from_text("né le\nAB1");
        assert_eq!(text.char_count(), 8);
    }
}
