//! Core library for national ID card scanning.
//!
//! This crate provides:
//! - Image enhancement for OCR (CLAHE, denoising, adaptive threshold, closing)
//! - A pluggable OCR boundary with optional Tesseract and ONNX backends
//! - Normalization of OCR passes and rule-based identity field extraction
//! - A pipeline turning image bytes into an identity record or typed failure

pub mod error;
pub mod identity;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod registration;

pub use error::{ErrorCategory, ExtractionError, OcrError, Result, ScanError};
pub use identity::rules::{FieldExtractor, GrammarRule, RuleBook};
pub use identity::{NormalizedText, extract_fields, normalize};
pub use models::{
    DateTriple, ExtractedFields, ExtractionOutcome, FailureRecord, IdentityRecord, MandatoryField,
    ScanConfig,
};
pub use ocr::{ImagePreprocessor, LanguageHint, RecognizedText, TextRecognizer};
#[cfg(feature = "onnx")]
pub use ocr::PureOcrRecognizer;
#[cfg(feature = "tesseract")]
pub use ocr::TesseractRecognizer;
pub use pipeline::{IdCardScanner, IdCardScannerBuilder, extract_from_passes};
pub use registration::{
    FormatValidator, RegistrationOutcome, RegistrationRequest, RegistrationService,
    forward_registration,
};
