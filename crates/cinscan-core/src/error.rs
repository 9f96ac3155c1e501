//! Error types for the cinscan-core library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::identity::MandatoryField;

/// Main error type for the cinscan library.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Unsupported MIME type, undecodable image or unusable pixel layout.
    #[error("invalid input format: {0}")]
    InvalidInput(String),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Mandatory identity fields could not be extracted.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Rejection reported by the downstream registration service.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The engine could not be initialized.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// The image could not be handed to the engine.
    #[error("failed to decode image for recognition: {0}")]
    Decode(String),

    /// Recognition produced too little text to extract anything from.
    #[error("no usable text: recognized {found} characters, need at least {required}")]
    NoUsableText { found: usize, required: usize },

    /// The caller-supplied deadline passed around an engine invocation.
    #[error("deadline exceeded during {0} pass")]
    DeadlineExceeded(&'static str),
}

/// Errors related to identity field extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// One or more mandatory fields are absent.
    #[error("missing mandatory field(s): {}", format_fields(.0))]
    MissingFields(Vec<MandatoryField>),
}

fn format_fields(fields: &[MandatoryField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure category reported in failure records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    InvalidInputFormat,
    #[serde(rename = "OCRFailure")]
    OcrFailure,
    ExtractionFailure,
    ValidationFailure,
    ConfigurationError,
}

impl ErrorCategory {
    /// Name as it appears in serialized failure records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidInputFormat => "InvalidInputFormat",
            ErrorCategory::OcrFailure => "OCRFailure",
            ErrorCategory::ExtractionFailure => "ExtractionFailure",
            ErrorCategory::ValidationFailure => "ValidationFailure",
            ErrorCategory::ConfigurationError => "ConfigurationError",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ScanError {
    /// Category used when this error is reported to a caller.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ScanError::InvalidInput(_) => ErrorCategory::InvalidInputFormat,
            ScanError::Ocr(_) => ErrorCategory::OcrFailure,
            ScanError::Extraction(_) => ErrorCategory::ExtractionFailure,
            ScanError::Validation(_) => ErrorCategory::ValidationFailure,
            ScanError::Config(_) | ScanError::Io(_) => ErrorCategory::ConfigurationError,
        }
    }

    /// Missing mandatory fields are an expected outcome, not an engine fault.
    pub fn is_soft(&self) -> bool {
        matches!(self, ScanError::Extraction(_))
    }

    /// Mandatory fields named by an extraction failure.
    pub fn missing_fields(&self) -> &[MandatoryField] {
        match self {
            ScanError::Extraction(ExtractionError::MissingFields(fields)) => fields,
            _ => &[],
        }
    }
}

/// Result type for the cinscan library.
pub type Result<T> = std::result::Result<T, ScanError>;
