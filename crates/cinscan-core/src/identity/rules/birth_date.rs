//! Birth date extraction.
//!
//! Lines are scanned one at a time so a stray number on one line cannot pair
//! up with digits on the next.

use tracing::debug;

use super::patterns::DIGIT_RUN;
use super::{ExtractionMatch, FieldExtractor, RuleBook};
use crate::identity::NormalizedText;
use crate::models::DateTriple;

/// Rule name reported for dates found by the digit-run fallback.
const FALLBACK_RULE: &str = "digit_runs";

/// Birth-date field extractor.
pub struct BirthDateExtractor<'a> {
    book: &'a RuleBook,
}

impl<'a> BirthDateExtractor<'a> {
    pub fn new(book: &'a RuleBook) -> Self {
        Self { book }
    }

    fn accept(&self, day: &str, month: &str, year: &str) -> Option<DateTriple> {
        let day: u32 = day.parse().ok()?;
        let month: u32 = month.parse().ok()?;
        let year: u32 = year.parse().ok()?;
        let (min_year, max_year) = self.book.year_range();

        if !is_valid_date(day, month, year, min_year, max_year) {
            debug!("Rejected implausible date {}/{}/{}", day, month, year);
            return None;
        }

        Some(DateTriple::new(day as u8, month as u8, year as u16))
    }

    /// Grammar matches, lines in order and rules in precedence within a line.
    fn grammar_matches(&self, text: &NormalizedText) -> Vec<ExtractionMatch<DateTriple>> {
        let mut results = Vec::new();

        for (idx, line) in text.lines().iter().enumerate() {
            let line = collapse_whitespace(line).to_lowercase();

            for rule in self.book.date_rules() {
                for caps in rule.matches(&line) {
                    let (Some(day), Some(month), Some(year)) =
                        (caps.name("day"), caps.name("month"), caps.name("year"))
                    else {
                        continue;
                    };

                    if let Some(date) = self.accept(day.as_str(), month.as_str(), year.as_str()) {
                        results.push(ExtractionMatch::new(date, rule.name(), &caps[0]).on_line(idx));
                    }
                }
            }
        }

        results
    }

    /// Consecutive digit runs read as day, month and four-digit year.
    fn fallback_matches(&self, text: &NormalizedText) -> Vec<ExtractionMatch<DateTriple>> {
        let mut results = Vec::new();

        for (idx, line) in text.lines().iter().enumerate() {
            let runs: Vec<&str> = DIGIT_RUN.find_iter(line).map(|m| m.as_str()).collect();

            for window in runs.windows(3) {
                if window[2].chars().count() != 4 {
                    continue;
                }
                if let Some(date) = self.accept(window[0], window[1], window[2]) {
                    let source = window.join(" ");
                    results.push(ExtractionMatch::new(date, FALLBACK_RULE, source).on_line(idx));
                }
            }
        }

        results
    }
}

impl FieldExtractor for BirthDateExtractor<'_> {
    type Output = ExtractionMatch<DateTriple>;

    fn extract(&self, text: &NormalizedText) -> Option<Self::Output> {
        if let Some(found) = self.grammar_matches(text).into_iter().next() {
            return Some(found);
        }

        let found = self.fallback_matches(text).into_iter().next();
        if found.is_some() {
            debug!("Birth date recovered from loose digit runs");
        }
        found
    }

    fn extract_all(&self, text: &NormalizedText) -> Vec<Self::Output> {
        let mut results = self.grammar_matches(text);
        results.extend(self.fallback_matches(text));
        results
    }
}

/// Plausibility bounds for a birth date.
///
/// Day is checked against `1..=31` for every month; calendar validity is
/// only surfaced as a warning on the final record.
pub fn is_valid_date(day: u32, month: u32, year: u32, min_year: u16, max_year: u16) -> bool {
    (u32::from(min_year)..=u32::from(max_year)).contains(&year)
        && (1..=12).contains(&month)
        && (1..=31).contains(&day)
}

/// Extract the birth date from normalized text.
pub fn extract_birth_date(text: &NormalizedText, book: &RuleBook) -> Option<DateTriple> {
    BirthDateExtractor::new(book).extract(text).map(|m| m.value)
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date_of(text: &str) -> Option<String> {
        extract_birth_date(&NormalizedText::from_text(text), &RuleBook::default()).map(|d| d.to_string())
    }

    #[test]
    fn test_all_separators_and_widths() {
        let book = RuleBook::default();
        let extractor = BirthDateExtractor::new(&book);

        for year in [1900u32, 1957, 1999, 2024] {
            for month in 1..=12u32 {
                for day in 1..=31u32 {
                    let expected = format!("{:02}/{:02}/{:04}", day, month, year);
                    for line in [
                        format!("{}.{}.{}", day, month, year),
                        format!("{}-{}-{}", day, month, year),
                        format!("{} {} {}", day, month, year),
                        format!("{:02}.{:02}.{}", day, month, year),
                    ] {
                        let text = NormalizedText::from_text(&line);
                        let found = extractor.extract(&text).map(|m| m.value.to_string());
                        assert_eq!(found.as_deref(), Some(expected.as_str()), "input {:?}", line);
                    }
                }
            }
        }
    }

    #[test]
    fn test_keyword_forms() {
        assert_eq!(date_of("Née le 5.3.1990"), Some("05/03/1990".to_string()));
        assert_eq!(date_of("NE LE : 12-11-1984"), Some("12/11/1984".to_string()));
        assert_eq!(date_of("nele 01 02 1970"), Some("01/02/1970".to_string()));
        assert_eq!(date_of("تاريخ الازدياد 09.10.1995"), Some("09/10/1995".to_string()));
    }

    #[test]
    fn test_collapses_whitespace_inside_date() {
        let book = RuleBook::default();
        let text = NormalizedText::from_text("né le   07   08\t1961");
        let m = BirthDateExtractor::new(&book).extract(&text).unwrap();
        assert_eq!(m.value, DateTriple::new(7, 8, 1961));
        assert_eq!(m.rule, "numeric");
        assert_eq!(m.source, "07 08 1961");
    }

    #[test]
    fn test_out_of_range_year_rejected() {
        assert_eq!(date_of("01.01.2999"), None);
        assert_eq!(date_of("01.01.1899"), None);
    }

    #[test]
    fn test_out_of_range_day_or_month_rejected() {
        assert_eq!(date_of("32.01.1990"), None);
        assert_eq!(date_of("10.13.1990"), None);
        assert_eq!(date_of("00.05.1990"), None);
    }

    #[test]
    fn test_day_not_checked_per_month() {
        assert_eq!(date_of("31.04.1990"), Some("31/04/1990".to_string()));
    }

    #[test]
    fn test_first_line_wins() {
        let text = "Valable 01.01.2020\nNé le 05.03.1990";
        assert_eq!(date_of(text), Some("01/01/2020".to_string()));
    }

    #[test]
    fn test_skips_implausible_candidate_on_same_line() {
        assert_eq!(date_of("45.19.1990 puis 05.03.1990"), Some("05/03/1990".to_string()));
    }

    #[test]
    fn test_fallback_digit_runs() {
        assert_eq!(date_of("date 5 / 3 / 1990"), Some("05/03/1990".to_string()));
        assert_eq!(date_of("ref 77 5 3 19900"), None);
    }

    #[test]
    fn test_fallback_windows_skip_leading_noise() {
        assert_eq!(date_of("n 40 12/06/1988"), Some("12/06/1988".to_string()));
    }

    #[test]
    fn test_grammar_beats_fallback_on_later_line() {
        let book = RuleBook::default();
        let text = NormalizedText::from_text("4 / 4 / 1944\n06.06.1966");
        let m = BirthDateExtractor::new(&book).extract(&text).unwrap();
        assert_eq!(m.value, DateTriple::new(6, 6, 1966));
        assert_eq!(m.rule, "numeric");
        assert_eq!(m.line, Some(1));
    }

    #[test]
    fn test_is_valid_date_bounds() {
        assert!(is_valid_date(1, 1, 1900, 1900, 2024));
        assert!(is_valid_date(31, 12, 2024, 1900, 2024));
        assert!(!is_valid_date(0, 1, 2000, 1900, 2024));
        assert!(!is_valid_date(1, 0, 2000, 1900, 2024));
        assert!(!is_valid_date(1, 1, 2025, 1900, 2024));
    }

    #[test]
    fn test_no_date() {
        assert_eq!(date_of("ROYAUME DU MAROC\nAB123456"), None);
    }
}
