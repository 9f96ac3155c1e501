//! Configuration structures for the ID card scanning pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::ocr::LanguageHint;

/// Main configuration for the cinscan pipeline.
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Input boundary configuration.
    pub input: InputConfig,

    /// OCR engine configuration.
    pub ocr: OcrConfig,

    /// Image enhancement configuration.
    pub preprocess: PreprocessConfig,

    /// Identity field extraction configuration.
    pub extraction: ExtractionConfig,
}

/// Accepted payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// MIME types accepted by the pipeline; everything else is rejected
    /// before decoding.
    pub allowed_mime_types: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            allowed_mime_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
        }
    }
}

impl InputConfig {
    pub fn accepts(&self, mime_type: &str) -> bool {
        let mime_type = mime_type.trim();
        self.allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime_type))
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Language hints passed to the engine on every pass.
    pub languages: Vec<LanguageHint>,

    /// Tesseract tessdata directory (engine default when unset).
    pub tessdata_dir: Option<PathBuf>,

    /// Resolution hint handed to engines that accept one.
    pub dpi: u32,

    /// Directory containing ONNX detection/recognition models.
    pub model_dir: PathBuf,

    /// Keep `[UNK]` markers emitted by the ONNX recognizer.
    pub keep_unk: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: vec![LanguageHint::French, LanguageHint::Arabic, LanguageHint::English],
            tessdata_dir: None,
            dpi: 300,
            model_dir: PathBuf::from("models"),
            keep_unk: false,
        }
    }
}

/// Image enhancement parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// CLAHE tile grid (columns, rows).
    pub clahe_tile_grid: (u32, u32),

    /// CLAHE clip limit, relative to a uniform histogram.
    pub clahe_clip_limit: f32,

    /// Non-local-means filter strength.
    pub denoise_strength: f32,

    /// Radius of the patch compared by the denoiser.
    pub denoise_patch_radius: u32,

    /// Radius of the window searched for similar patches.
    pub denoise_search_radius: u32,

    /// Side of the Gaussian threshold window (odd, >= 3).
    pub threshold_block_size: u32,

    /// Offset subtracted from the local Gaussian mean.
    pub threshold_offset: i32,

    /// Side of the square closing element.
    pub closing_kernel_size: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            clahe_tile_grid: (8, 8),
            clahe_clip_limit: 2.0,
            denoise_strength: 3.0,
            denoise_patch_radius: 1,
            denoise_search_radius: 5,
            threshold_block_size: 11,
            threshold_offset: 2,
            closing_kernel_size: 2,
        }
    }
}

/// One grammar rule as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Name reported with every match.
    pub name: String,

    /// Regular expression (Rust `regex` syntax).
    pub pattern: String,

    /// Reject matches directly preceded or followed by a digit.
    #[serde(default)]
    pub digit_isolated: bool,
}

impl RuleSpec {
    pub fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            digit_isolated: false,
        }
    }

    pub fn isolated(mut self) -> Self {
        self.digit_isolated = true;
        self
    }
}

/// Identity field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// ID-number grammars, highest precedence first. A named `id` group
    /// selects the token; otherwise the whole match is used.
    pub id_rules: Vec<RuleSpec>,

    /// Grammar a canonicalized ID number must match in full.
    pub id_canonical: String,

    /// Birth-date grammars, highest precedence first. Each must define
    /// `day`, `month` and `year` named groups. Applied to lowercased lines.
    pub date_rules: Vec<RuleSpec>,

    /// Earliest accepted birth year.
    pub min_year: u16,

    /// Latest accepted birth year.
    pub max_year: u16,

    /// Minimum number of characters in the merged OCR text.
    pub min_text_length: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            id_rules: vec![
                RuleSpec::new("compact", r"(?i)[A-Z]{1,2}\d{5,6}"),
                RuleSpec::new("cin_label", r"(?i)\bCIN\s*[:.]?\s*(?P<id>[A-Z]{1,2}\s*\d{5,6})"),
                RuleSpec::new(
                    "national_card_label",
                    r"(?i)CARTE\s+NATIONALE[:\s]+(?P<id>[A-Z]{1,2}\s*\d{5,6})",
                ),
                RuleSpec::new("spaced", r"(?i)[A-Z]{1,2}\s*\d{5,6}"),
            ],
            id_canonical: r"[A-Z]{1,2}\d{5,6}".to_string(),
            date_rules: default_date_rules(),
            min_year: 1900,
            max_year: 2024,
            min_text_length: 10,
        }
    }
}

const NUMERIC_DATE: &str = r"(?P<day>\d{1,2})[.\s-](?P<month>\d{1,2})[.\s-](?P<year>\d{4})";

fn default_date_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec::new("numeric", NUMERIC_DATE).isolated(),
        RuleSpec::new("born_on_fr", &format!(r"née?\s?le\s*:?\s*{}", NUMERIC_DATE)),
        RuleSpec::new("born_on_fr_joined", &format!(r"nele\s*:?\s*{}", NUMERIC_DATE)),
        RuleSpec::new(
            "born_on_ar",
            &format!(r"(?:تاريخ الازدياد|تاريخ الميلاد)\s*:?\s*{}", NUMERIC_DATE),
        ),
    ]
}

impl ExtractionConfig {
    /// Deployment variant whose card numbers are three letters and six digits,
    /// printed with or without a separating space.
    pub fn three_letter_variant() -> Self {
        Self {
            id_rules: vec![
                RuleSpec::new("three_letter", r"(?i)[A-Z]{3}\s?\d{6}"),
                RuleSpec::new("cin_label", r"(?i)\bCIN\s*[:.]?\s*(?P<id>[A-Z]{3}\s?\d{6})"),
            ],
            id_canonical: r"[A-Z]{3}\d{6}".to_string(),
            ..Self::default()
        }
    }
}

impl ScanConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ScanError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ScanError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), ScanError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ScanError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.input.allowed_mime_types.is_empty() {
            return Err(ScanError::Config("no allowed MIME types".to_string()));
        }

        let p = &self.preprocess;
        if p.clahe_tile_grid.0 == 0 || p.clahe_tile_grid.1 == 0 {
            return Err(ScanError::Config("CLAHE tile grid must be non-zero".to_string()));
        }
        if !(p.clahe_clip_limit > 0.0) {
            return Err(ScanError::Config("CLAHE clip limit must be positive".to_string()));
        }
        if !(p.denoise_strength > 0.0) {
            return Err(ScanError::Config("denoise strength must be positive".to_string()));
        }
        if p.threshold_block_size < 3 || p.threshold_block_size % 2 == 0 {
            return Err(ScanError::Config(format!(
                "threshold block size must be odd and >= 3, got {}",
                p.threshold_block_size
            )));
        }
        if p.closing_kernel_size == 0 {
            return Err(ScanError::Config("closing kernel size must be non-zero".to_string()));
        }

        let e = &self.extraction;
        if e.min_year > e.max_year {
            return Err(ScanError::Config(format!(
                "year range is empty: {}..={}",
                e.min_year, e.max_year
            )));
        }
        if e.id_rules.is_empty() {
            return Err(ScanError::Config("no ID-number rules configured".to_string()));
        }

        Ok(())
    }
}
