//! National ID card number (CIN) extraction.

use tracing::debug;

use super::{ExtractionMatch, FieldExtractor, RuleBook};
use crate::identity::NormalizedText;

/// ID-number field extractor.
///
/// Rules are tried against the whole text, highest precedence first; within
/// a rule, candidates are tried in text order.
pub struct IdNumberExtractor<'a> {
    book: &'a RuleBook,
}

impl<'a> IdNumberExtractor<'a> {
    pub fn new(book: &'a RuleBook) -> Self {
        Self { book }
    }
}

impl FieldExtractor for IdNumberExtractor<'_> {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &NormalizedText) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &NormalizedText) -> Vec<Self::Output> {
        let full_text = text.text();
        let mut results = Vec::new();

        for rule in self.book.id_rules() {
            for caps in rule.matches(&full_text) {
                let Some(token) = caps.name("id").or_else(|| caps.get(0)) else {
                    continue;
                };

                let id = canonicalize_id(token.as_str());
                if !self.book.is_canonical_id(&id) {
                    debug!("Rule {} candidate {:?} rejected", rule.name(), token.as_str());
                    continue;
                }

                // Skip if already found by a higher-precedence rule
                if results.iter().any(|r: &ExtractionMatch<String>| r.value == id) {
                    continue;
                }

                results.push(ExtractionMatch::new(id, rule.name(), token.as_str()));
            }
        }

        results
    }
}

/// Remove all whitespace and uppercase.
pub fn canonicalize_id(token: &str) -> String {
    token
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Extract the ID number from normalized text.
pub fn extract_id(text: &NormalizedText, book: &RuleBook) -> Option<String> {
    IdNumberExtractor::new(book).extract(text).map(|m| m.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::ExtractionConfig;

    fn id_of(text: &str) -> Option<String> {
        extract_id(&NormalizedText::from_text(text), &RuleBook::default())
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize_id("ab 123456"), "AB123456");
        assert_eq!(canonicalize_id(" k\t40512 "), "K40512");
    }

    #[test]
    fn test_compact_token() {
        assert_eq!(id_of("ROYAUME DU MAROC\nAB123456"), Some("AB123456".to_string()));
    }

    #[test]
    fn test_mixed_case_and_interior_space() {
        assert_eq!(id_of("noise ... bk 654321 ###"), Some("BK654321".to_string()));
        assert_eq!(id_of("## Jh98765 !!"), Some("JH98765".to_string()));
    }

    #[test]
    fn test_compact_token_takes_precedence_over_label() {
        let text = "Valable jusqu'au AZ99999\nCIN: ee 123456";
        assert_eq!(id_of(text), Some("AZ99999".to_string()));

        let text = "X12345 quelque part\nCARTE NATIONALE D123456";
        assert_eq!(id_of(text), Some("X12345".to_string()));
    }

    #[test]
    fn test_label_finds_split_token() {
        assert_eq!(id_of("CIN: ee 123456"), Some("EE123456".to_string()));
        assert_eq!(id_of("CARTE NATIONALE d 12345"), Some("D12345".to_string()));
    }

    #[test]
    fn test_tokens_in_noise_across_shapes() {
        for letters in ["K", "BK"] {
            for digits in ["40512", "405127"] {
                let expected = format!("{}{}", letters, digits);
                let casings = [
                    letters.to_string(),
                    letters.to_lowercase(),
                    letters
                        .chars()
                        .enumerate()
                        .map(|(i, c)| if i == 0 { c.to_ascii_lowercase() } else { c })
                        .collect::<String>(),
                ];

                for cased in &casings {
                    for sep in ["", " "] {
                        let text = format!("### royaume: {}{}{} !! fin", cased, sep, digits);
                        assert_eq!(id_of(&text), Some(expected.clone()), "input {:?}", text);
                    }
                }
            }
        }
    }

    #[test]
    fn test_label_without_valid_token_falls_through() {
        // The labelled rule only sees "CIN" followed by junk; the compact rule
        // then finds the real token.
        let text = "CIN ---\nM765432";
        assert_eq!(id_of(text), Some("M765432".to_string()));
    }

    #[test]
    fn test_no_token() {
        assert_eq!(id_of("ROYAUME DU MAROC\nNé le 05.03.1990"), None);
        assert_eq!(id_of(""), None);
    }

    #[test]
    fn test_extract_all_reports_rules_in_precedence_order() {
        let book = RuleBook::default();
        let text = NormalizedText::from_text("CIN: cd 654321\nAB123456");
        let all = IdNumberExtractor::new(&book).extract_all(&text);

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].value, "AB123456");
        assert_eq!(all[0].rule, "compact");
        assert_eq!(all[1].value, "CD654321");
        assert_eq!(all[1].rule, "cin_label");
    }

    #[test]
    fn test_three_letter_variant() {
        let book = RuleBook::compile(&ExtractionConfig::three_letter_variant()).unwrap();

        let text = NormalizedText::from_text("Numero: ABC 123456");
        assert_eq!(extract_id(&text, &book), Some("ABC123456".to_string()));

        let text = NormalizedText::from_text("AB123456");
        assert_eq!(extract_id(&text, &book), None);
    }
}
