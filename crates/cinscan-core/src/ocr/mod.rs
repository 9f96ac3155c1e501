//! OCR boundary: image enhancement and the recognizer capability.
//!
//! Character recognition itself is an external collaborator reached through
//! [`TextRecognizer`]. Concrete engines are compiled in with the `tesseract`
//! and `onnx` features.

mod preprocessing;
#[cfg(feature = "onnx")]
mod pure_engine;
#[cfg(feature = "tesseract")]
mod tesseract;

pub use preprocessing::ImagePreprocessor;
#[cfg(feature = "onnx")]
pub use pure_engine::PureOcrRecognizer;
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractRecognizer;

use std::fmt;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::OcrError;

/// Script/language hint handed to the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageHint {
    French,
    Arabic,
    English,
}

impl LanguageHint {
    /// ISO 639-2 code, as used by Tesseract traineddata files.
    pub fn code(&self) -> &'static str {
        match self {
            LanguageHint::French => "fra",
            LanguageHint::Arabic => "ara",
            LanguageHint::English => "eng",
        }
    }

    /// Join hints into a `fra+ara+eng` style language string.
    pub fn join(hints: &[LanguageHint]) -> String {
        hints.iter().map(|h| h.code()).collect::<Vec<_>>().join("+")
    }
}

impl fmt::Display for LanguageHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Text produced by one recognition pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedText {
    text: String,
}

impl RecognizedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The pass output exactly as the engine returned it.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Lines in engine order, untrimmed.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl From<String> for RecognizedText {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<&str> for RecognizedText {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// External character recognition capability.
///
/// Implementations may block; callers needing bounded latency pass a
/// deadline to the pipeline.
pub trait TextRecognizer: Send + Sync {
    /// Recognize text on an image using the given language hints.
    fn recognize(
        &self,
        image: &DynamicImage,
        languages: &[LanguageHint],
    ) -> Result<RecognizedText, OcrError>;

    /// Short engine name for logs.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<R: TextRecognizer + ?Sized> TextRecognizer for Box<R> {
    fn recognize(
        &self,
        image: &DynamicImage,
        languages: &[LanguageHint],
    ) -> Result<RecognizedText, OcrError> {
        (**self).recognize(image, languages)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<R: TextRecognizer + ?Sized> TextRecognizer for std::sync::Arc<R> {
    fn recognize(
        &self,
        image: &DynamicImage,
        languages: &[LanguageHint],
    ) -> Result<RecognizedText, OcrError> {
        (**self).recognize(image, languages)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_string() {
        let hints = [LanguageHint::French, LanguageHint::Arabic, LanguageHint::English];
        assert_eq!(LanguageHint::join(&hints), "fra+ara+eng");
        assert_eq!(LanguageHint::join(&[]), "");
    }

    #[test]
    fn test_recognized_lines() {
        let text = RecognizedText::from("ROYAUME DU MAROC\n\n  AB123456 \n");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["ROYAUME DU MAROC", "", "  AB123456 ", ""]);
        assert_eq!(text.as_str(), "ROYAUME DU MAROC\n\n  AB123456 \n");
    }
}
