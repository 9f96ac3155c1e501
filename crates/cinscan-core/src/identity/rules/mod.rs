//! Rule-based field extractors for national ID cards.
//!
//! Every extractor walks an ordered list of precompiled [`GrammarRule`]s;
//! the first accepted candidate wins.

pub mod birth_date;
pub mod id_number;
pub mod name;
pub mod patterns;

pub use birth_date::{BirthDateExtractor, extract_birth_date, is_valid_date};
pub use id_number::{IdNumberExtractor, canonicalize_id, extract_id};
pub use name::{NameExtractor, PersonName, extract_name};

use regex::{Captures, Regex};

use crate::error::ScanError;
use crate::identity::NormalizedText;
use crate::models::config::{ExtractionConfig, RuleSpec};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from normalized text.
    fn extract(&self, text: &NormalizedText) -> Option<Self::Output>;

    /// Every accepted candidate, in precedence order.
    fn extract_all(&self, text: &NormalizedText) -> Vec<Self::Output>;
}

/// An accepted candidate together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Name of the rule that produced it.
    pub rule: String,
    /// Source text that was matched.
    pub source: String,
    /// Line index in the normalized text, for line-scoped extractors.
    pub line: Option<usize>,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, rule: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            value,
            rule: rule.into(),
            source: source.into(),
            line: None,
        }
    }

    pub fn on_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// A named, precompiled pattern.
#[derive(Debug, Clone)]
pub struct GrammarRule {
    name: String,
    regex: Regex,
    digit_isolated: bool,
}

impl GrammarRule {
    /// Compile a rule from its configuration form.
    pub fn compile(spec: &RuleSpec) -> Result<Self, ScanError> {
        let regex = Regex::new(&spec.pattern).map_err(|e| {
            ScanError::Config(format!("rule {:?} has an invalid pattern: {}", spec.name, e))
        })?;

        Ok(Self {
            name: spec.name.clone(),
            regex,
            digit_isolated: spec.digit_isolated,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.regex.capture_names().flatten().any(|n| n == group)
    }

    /// Candidate matches in text order.
    ///
    /// For digit-isolated rules a match touching another digit is discarded
    /// and the search resumes one character after its start, so an
    /// overlapping isolated candidate is still found.
    pub fn matches<'r, 't>(&'r self, text: &'t str) -> RuleMatches<'r, 't> {
        RuleMatches {
            rule: self,
            text,
            pos: 0,
        }
    }
}

/// Iterator returned by [`GrammarRule::matches`].
pub struct RuleMatches<'r, 't> {
    rule: &'r GrammarRule,
    text: &'t str,
    pos: usize,
}

impl<'t> Iterator for RuleMatches<'_, 't> {
    type Item = Captures<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos <= self.text.len() {
            let caps = self.rule.regex.captures_at(self.text, self.pos)?;
            let whole = caps.get(0)?;

            if !self.rule.digit_isolated || is_digit_isolated(self.text, whole.start(), whole.end()) {
                self.pos = if whole.end() > whole.start() {
                    whole.end()
                } else {
                    next_boundary(self.text, whole.end())
                };
                return Some(caps);
            }

            self.pos = next_boundary(self.text, whole.start());
        }
        None
    }
}

fn is_digit_isolated(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_numeric) && !after.is_some_and(char::is_numeric)
}

fn next_boundary(text: &str, pos: usize) -> usize {
    pos + text[pos..].chars().next().map_or(1, char::len_utf8)
}

/// All extraction rules, compiled once at startup.
#[derive(Debug, Clone)]
pub struct RuleBook {
    pub(crate) id_rules: Vec<GrammarRule>,
    pub(crate) id_canonical: Regex,
    pub(crate) date_rules: Vec<GrammarRule>,
    pub(crate) min_year: u16,
    pub(crate) max_year: u16,
}

impl RuleBook {
    /// Compile every pattern in the extraction configuration.
    pub fn compile(config: &ExtractionConfig) -> Result<Self, ScanError> {
        let id_rules = config
            .id_rules
            .iter()
            .map(GrammarRule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        let id_canonical = Regex::new(&format!("^(?:{})$", config.id_canonical))
            .map_err(|e| ScanError::Config(format!("invalid canonical ID grammar: {}", e)))?;

        let date_rules = config
            .date_rules
            .iter()
            .map(GrammarRule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        for rule in &date_rules {
            for group in ["day", "month", "year"] {
                if !rule.has_group(group) {
                    return Err(ScanError::Config(format!(
                        "date rule {:?} has no `{}` group",
                        rule.name(),
                        group
                    )));
                }
            }
        }

        if config.min_year > config.max_year {
            return Err(ScanError::Config(format!(
                "year range is empty: {}..={}",
                config.min_year, config.max_year
            )));
        }

        Ok(Self {
            id_rules,
            id_canonical,
            date_rules,
            min_year: config.min_year,
            max_year: config.max_year,
        })
    }

    pub fn id_rules(&self) -> &[GrammarRule] {
        &self.id_rules
    }

    pub fn date_rules(&self) -> &[GrammarRule] {
        &self.date_rules
    }

    pub fn year_range(&self) -> (u16, u16) {
        (self.min_year, self.max_year)
    }

    /// Whether a canonical ID number satisfies the strict grammar.
    pub fn is_canonical_id(&self, id: &str) -> bool {
        self.id_canonical.is_match(id)
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        // The built-in patterns are covered by tests.
        Self::compile(&ExtractionConfig::default()).expect("default extraction rules compile")
    }
}
