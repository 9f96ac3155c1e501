//! End-to-end scanning: image bytes in, identity record out.

use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::{debug, info, warn};

use crate::error::{ExtractionError, OcrError, Result, ScanError};
use crate::identity::rules::RuleBook;
use crate::identity::{extract_fields, normalize};
use crate::models::{ExtractionOutcome, IdentityRecord, InputConfig, ScanConfig};
use crate::ocr::{ImagePreprocessor, RecognizedText, TextRecognizer};

/// ID card scanner.
///
/// Holds only read-only state, so one instance can serve concurrent requests
/// when its recognizer is `Sync`.
pub struct IdCardScanner<R: TextRecognizer> {
    recognizer: R,
    preprocessor: ImagePreprocessor,
    config: Arc<ScanConfig>,
    rules: Arc<RuleBook>,
}

/// Builder for [`IdCardScanner`]; `IdCardScannerBuilder::new()` is the entry point.
pub struct IdCardScannerBuilder {
    config: Arc<ScanConfig>,
    rules: Option<Arc<RuleBook>>,
}

impl IdCardScannerBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(ScanConfig::default()),
            rules: None,
        }
    }

    /// Set configuration.
    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Share a configuration already loaded elsewhere.
    pub fn with_shared_config(mut self, config: Arc<ScanConfig>) -> Self {
        self.config = config;
        self
    }

    /// Reuse a compiled rule book instead of compiling the configured rules.
    pub fn with_rules(mut self, rules: Arc<RuleBook>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Validate the configuration, compile its rules and attach a recognizer.
    pub fn build<R: TextRecognizer>(self, recognizer: R) -> Result<IdCardScanner<R>> {
        self.config.validate()?;

        let rules = match self.rules {
            Some(rules) => rules,
            None => Arc::new(RuleBook::compile(&self.config.extraction)?),
        };

        info!(
            "Scanner ready: engine={}, {} ID rules, {} date rules",
            recognizer.name(),
            rules.id_rules().len(),
            rules.date_rules().len()
        );

        Ok(IdCardScanner {
            recognizer,
            preprocessor: ImagePreprocessor::new().with_config(self.config.preprocess.clone()),
            config: self.config,
            rules,
        })
    }
}

impl Default for IdCardScannerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: TextRecognizer> IdCardScanner<R> {
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    /// Scan an encoded image.
    pub fn process(&self, bytes: &[u8], mime_type: &str) -> Result<IdentityRecord> {
        self.process_with_deadline(bytes, mime_type, None)
    }

    /// Scan an encoded image, giving up once `deadline` has passed.
    ///
    /// The deadline is checked around each engine call; a call already in
    /// progress is not interrupted.
    pub fn process_with_deadline(
        &self,
        bytes: &[u8],
        mime_type: &str,
        deadline: Option<Instant>,
    ) -> Result<IdentityRecord> {
        if !self.config.input.accepts(mime_type) {
            return Err(ScanError::InvalidInput(format!(
                "unsupported MIME type: {}",
                mime_type
            )));
        }

        let image = decode(bytes, mime_type, &self.config.input)?;
        self.process_image_with_deadline(&image, deadline)
    }

    /// Scan an already decoded image.
    pub fn process_image(&self, image: &DynamicImage) -> Result<IdentityRecord> {
        self.process_image_with_deadline(image, None)
    }

    pub fn process_image_with_deadline(
        &self,
        image: &DynamicImage,
        deadline: Option<Instant>,
    ) -> Result<IdentityRecord> {
        let start = Instant::now();
        let (width, height) = image.dimensions();
        info!("Processing image: {}x{}", width, height);

        let raw = self.recognize(image, "raw", deadline)?;

        let enhanced = DynamicImage::ImageLuma8(self.preprocessor.enhance(image)?);
        let processed = self.recognize(&enhanced, "processed", deadline)?;

        let record = extract_from_passes(
            &[raw, processed],
            &self.rules,
            self.config.extraction.min_text_length,
        )?;

        info!("Scan succeeded in {} ms", start.elapsed().as_millis());
        Ok(record)
    }

    /// Like [`process`](Self::process), with failures turned into records.
    pub fn scan(&self, bytes: &[u8], mime_type: &str) -> ExtractionOutcome {
        let result = self.process(bytes, mime_type);
        if let Err(ref e) = result {
            if e.is_soft() {
                info!("Scan incomplete: {}", e);
            } else {
                warn!("Scan failed: {}", e);
            }
        }
        ExtractionOutcome::from(result)
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        pass: &'static str,
        deadline: Option<Instant>,
    ) -> Result<RecognizedText> {
        check_deadline(deadline, pass)?;

        let start = Instant::now();
        let text = self.recognizer.recognize(image, &self.config.ocr.languages)?;
        debug!(
            "{} pass: {} chars in {} ms",
            pass,
            text.as_str().chars().count(),
            start.elapsed().as_millis()
        );

        check_deadline(deadline, pass)?;
        Ok(text)
    }
}

/// Merge recognition passes, extract fields and enforce mandatory ones.
///
/// The first pass is reported as `raw_text`, the remaining passes joined as
/// `processed_text`.
pub fn extract_from_passes(
    passes: &[RecognizedText],
    rules: &RuleBook,
    min_text_length: usize,
) -> Result<IdentityRecord> {
    let merged = normalize(passes);
    debug!("Merged {} passes into {} lines", passes.len(), merged.lines().len());

    let found = merged.char_count();
    if found < min_text_length {
        return Err(OcrError::NoUsableText {
            found,
            required: min_text_length,
        }
        .into());
    }

    let fields = extract_fields(&merged, rules);
    let warnings = fields.warnings();

    let (id_number, birth_date) = match (&fields.id_number, fields.birth_date) {
        (Some(id_number), Some(birth_date)) => (id_number.clone(), birth_date),
        _ => return Err(ExtractionError::MissingFields(fields.missing_mandatory()).into()),
    };

    for warning in &warnings {
        debug!("Warning: {}", warning);
    }

    let raw_text = passes.first().map(|p| p.as_str().to_string()).unwrap_or_default();
    let processed_text = passes
        .iter()
        .skip(1)
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(IdentityRecord {
        success: true,
        id_number,
        surname: fields.surname,
        given_name: fields.given_name,
        birth_date,
        raw_text,
        processed_text,
        warnings,
    })
}

/// Decode by content, falling back to the declared type when the bytes carry
/// no recognizable signature. A sniffed format must itself be accepted.
fn decode(bytes: &[u8], mime_type: &str, input: &InputConfig) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(ScanError::InvalidInput("empty image buffer".to_string()));
    }

    let decoded = match image::guess_format(bytes) {
        Ok(format) => {
            if !input.accepts(format.to_mime_type()) {
                return Err(ScanError::InvalidInput(format!(
                    "declared {} but content is {}",
                    mime_type,
                    format.to_mime_type()
                )));
            }
            if !format.to_mime_type().eq_ignore_ascii_case(mime_type.trim()) {
                debug!("Declared {} but content is {}", mime_type, format.to_mime_type());
            }
            image::load_from_memory_with_format(bytes, format)
        }
        Err(_) => match ImageFormat::from_mime_type(mime_type.trim().to_ascii_lowercase()) {
            Some(format) => image::load_from_memory_with_format(bytes, format),
            None => image::load_from_memory(bytes),
        },
    };

    decoded.map_err(|e| ScanError::InvalidInput(format!("cannot decode {} image: {}", mime_type, e)))
}

fn check_deadline(deadline: Option<Instant>, pass: &'static str) -> Result<()> {
    if deadline.is_some_and(|d| Instant::now() >= d) {
        return Err(OcrError::DeadlineExceeded(pass).into());
    }
    Ok(())
}
