//! Pure Rust recognizer using `pure-onnx-ocr`.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use super::{LanguageHint, RecognizedText, TextRecognizer};
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Boxes whose top edges fall in the same band are read as one line.
const ROW_HEIGHT: f64 = 20.0;

/// Recognizer backed by `pure-onnx-ocr` (no external ONNX Runtime).
///
/// Language hints are ignored: the script is fixed by the loaded
/// recognition model and dictionary.
pub struct PureOcrRecognizer {
    engine: Mutex<pure_onnx_ocr::engine::OcrEngine>,
    keep_unk: bool,
}

/// One recognized region, positioned by its top-left corner.
struct Region {
    x: f64,
    y: f64,
    text: String,
}

impl PureOcrRecognizer {
    /// Load `det.onnx`, `rec.onnx` and `dict.txt` from the configured model directory.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        Self::from_dir(&config.model_dir, config.keep_unk)
    }

    pub fn from_dir(model_dir: &Path, keep_unk: bool) -> Result<Self, OcrError> {
        let det_path = model_dir.join("det.onnx");
        let rec_path = model_dir.join("rec.onnx");
        let dict_path = model_dir.join("dict.txt");

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::EngineUnavailable(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded pure-onnx-ocr engine from {}", model_dir.display());

        Ok(Self {
            engine: Mutex::new(engine),
            keep_unk,
        })
    }
}

impl TextRecognizer for PureOcrRecognizer {
    fn recognize(
        &self,
        image: &DynamicImage,
        _languages: &[LanguageHint],
    ) -> Result<RecognizedText, OcrError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();

        let results = {
            let engine = self
                .engine
                .lock()
                .map_err(|_| OcrError::EngineUnavailable("engine lock poisoned".to_string()))?;
            engine
                .run_from_image(image)
                .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?
        };

        debug!("pure-onnx-ocr returned {} regions for {}x{}", results.len(), width, height);

        let regions: Vec<Region> = results
            .iter()
            .map(|r| {
                let (x, y) = top_left(&r.bounding_box);
                let text = if self.keep_unk {
                    r.text.clone()
                } else {
                    r.text.replace("[UNK]", " ")
                };
                Region { x, y, text }
            })
            .collect();

        let text = reading_order(regions);
        info!("ONNX pass done in {} ms", start.elapsed().as_millis());

        Ok(RecognizedText::new(text))
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

fn top_left(polygon: &pure_onnx_ocr::Polygon<f64>) -> (f64, f64) {
    polygon
        .exterior()
        .coords()
        .take(4)
        .fold((f64::MAX, f64::MAX), |(x, y), c| (x.min(c.x), y.min(c.y)))
}

/// Sort regions into rows, left to right, and join them into lines.
fn reading_order(mut regions: Vec<Region>) -> String {
    let row = |r: &Region| (r.y / ROW_HEIGHT) as i64;
    regions.sort_by(|a, b| {
        row(a)
            .cmp(&row(b))
            .then_with(|| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines: Vec<String> = Vec::new();
    let mut current_row = None;
    for region in &regions {
        let text = region.text.trim();
        if text.is_empty() {
            continue;
        }
        match (current_row, lines.last_mut()) {
            (Some(r), Some(line)) if r == row(region) => {
                line.push(' ');
                line.push_str(text);
            }
            _ => lines.push(text.to_string()),
        }
        current_row = Some(row(region));
    }

    lines.join("\n")
}
