//! Fixed helper patterns shared by the extractors.
//!
//! Locale grammars live in the configuration; these only describe
//! character classes.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Any decimal digit, Unicode-aware.
    pub static ref DIGIT: Regex = Regex::new(r"\d").unwrap();

    // Maximal runs of digits.
    pub static ref DIGIT_RUN: Regex = Regex::new(r"\d+").unwrap();

    // Characters stripped from candidate name lines: everything except word
    // characters, whitespace and the Arabic block.
    pub static ref NAME_NOISE: Regex = Regex::new(r"[^\w\s\x{0600}-\x{06FF}]").unwrap();
}
