//! Tesseract-backed recognizer.

use std::path::PathBuf;
use std::time::Instant;

use image::{DynamicImage, ImageFormat};
use tesseract::Tesseract;
use tracing::{debug, info};

use super::{LanguageHint, RecognizedText, TextRecognizer};
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Recognizer running the system Tesseract library.
///
/// A fresh engine is initialized per call; the handle is not thread-safe.
pub struct TesseractRecognizer {
    tessdata_dir: Option<PathBuf>,
    dpi: u32,
}

impl TesseractRecognizer {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            tessdata_dir: config.tessdata_dir.clone(),
            dpi: config.dpi,
        }
    }

    /// Check that the engine starts with the given languages.
    pub fn probe(&self, languages: &[LanguageHint]) -> Result<(), OcrError> {
        self.engine(&LanguageHint::join(languages)).map(|_| ())
    }

    fn engine(&self, languages: &str) -> Result<Tesseract, OcrError> {
        let datapath = match &self.tessdata_dir {
            Some(dir) => Some(dir.to_str().ok_or_else(|| {
                OcrError::EngineUnavailable(format!("tessdata path is not UTF-8: {}", dir.display()))
            })?),
            None => None,
        };
        let languages = (!languages.is_empty()).then_some(languages);

        Tesseract::new(datapath, languages)
            .map_err(|e| OcrError::EngineUnavailable(format!("Tesseract init error: {}", e)))
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(
        &self,
        image: &DynamicImage,
        languages: &[LanguageHint],
    ) -> Result<RecognizedText, OcrError> {
        let start = Instant::now();
        let langs = LanguageHint::join(languages);

        // The engine reads from a path, so the image goes through a PNG file
        let temp_file = tempfile::Builder::new()
            .prefix("cinscan-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Decode(format!("failed to create temp file: {}", e)))?;
        image
            .save_with_format(temp_file.path(), ImageFormat::Png)
            .map_err(|e| OcrError::Decode(format!("failed to write temp image: {}", e)))?;

        let path = temp_file
            .path()
            .to_str()
            .ok_or_else(|| OcrError::Decode("temp path is not UTF-8".to_string()))?;

        let text = self
            .engine(&langs)?
            .set_variable("user_defined_dpi", &self.dpi.to_string())
            .map_err(|e| OcrError::Recognition(format!("Tesseract set variable error: {}", e)))?
            .set_image(path)
            .map_err(|e| OcrError::Decode(format!("Tesseract set image error: {}", e)))?
            .get_text()
            .map_err(|e| OcrError::Recognition(format!("Tesseract error: {}", e)))?;

        debug!("Tesseract ({}) returned {} lines", langs, text.lines().count());
        info!("Tesseract pass done in {} ms", start.elapsed().as_millis());

        Ok(RecognizedText::new(text))
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}
