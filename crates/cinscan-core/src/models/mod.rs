//! Data models: configuration and identity records.

pub mod config;
pub mod identity;

pub use config::{ExtractionConfig, InputConfig, OcrConfig, PreprocessConfig, RuleSpec, ScanConfig};
pub use identity::{
    DateTriple, ExtractedFields, ExtractionOutcome, FailureRecord, IdentityRecord, MandatoryField,
};
