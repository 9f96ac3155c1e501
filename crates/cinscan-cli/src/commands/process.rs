//! Process command - scan a single card image.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use cinscan_core::models::{ExtractionOutcome, IdentityRecord, OcrConfig};
use cinscan_core::{
    FormatValidator, IdCardScannerBuilder, RuleBook, ScanError, TextRecognizer,
    forward_registration,
};

use super::config::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input image (JPEG or PNG)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// OCR engine
    #[arg(short, long, value_enum, default_value = "onnx")]
    engine: EngineKind,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Check the extracted ID number with the local format validator
    #[arg(long)]
    register: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Text => "txt",
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EngineKind {
    /// System Tesseract with fra+ara+eng traineddata
    Tesseract,
    /// Pure Rust ONNX models from the configured model directory
    Onnx,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    // Check input file exists
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Loading OCR engine...");

    let rules = Arc::new(RuleBook::compile(&config.extraction)?);
    let recognizer = build_recognizer(args.engine, &config.ocr)?;
    let scanner = IdCardScannerBuilder::new()
        .with_config(config)
        .with_rules(Arc::clone(&rules))
        .build(recognizer)?;

    pb.set_message("Scanning...");

    let bytes = fs::read(&args.input)?;
    let mime_type = mime_type_for(&args.input);
    let deadline = args.timeout.map(|secs| Instant::now() + Duration::from_secs(secs));
    let register = args.register;

    // OCR blocks; keep it off the async workers
    let outcome = tokio::task::spawn_blocking(move || {
        let result = scanner
            .process_with_deadline(&bytes, mime_type, deadline)
            .and_then(|record| {
                if register {
                    register_record(&FormatValidator::new(rules), &record)?;
                }
                Ok(record)
            });
        ExtractionOutcome::from(result)
    })
    .await?;

    pb.finish_and_clear();

    let output = format_outcome(&outcome, args.format)?;

    // Write output
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    if let ExtractionOutcome::Failure(failure) = &outcome {
        anyhow::bail!("{}: {}", failure.error, failure.message);
    }

    Ok(())
}

fn register_record(validator: &FormatValidator, record: &IdentityRecord) -> Result<(), ScanError> {
    let message = forward_registration(validator, record)?;
    info!("{}", message);
    Ok(())
}

/// Declared MIME type for a file, from its extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Construct the selected OCR engine.
pub fn build_recognizer(
    engine: EngineKind,
    config: &OcrConfig,
) -> anyhow::Result<Box<dyn TextRecognizer>> {
    match engine {
        #[cfg(feature = "tesseract")]
        EngineKind::Tesseract => {
            let recognizer = cinscan_core::TesseractRecognizer::new(config);
            recognizer.probe(&config.languages)?;
            Ok(Box::new(recognizer))
        }
        #[cfg(feature = "onnx")]
        EngineKind::Onnx => Ok(Box::new(cinscan_core::PureOcrRecognizer::from_config(config)?)),
        #[allow(unreachable_patterns)]
        other => {
            let _ = config;
            anyhow::bail!(
                "this binary was built without the {:?} OCR engine; rebuild with `--features {}`",
                other,
                format!("{:?}", other).to_lowercase()
            )
        }
    }
}

pub fn format_outcome(outcome: &ExtractionOutcome, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text => Ok(format_text(outcome)),
    }
}

fn format_text(outcome: &ExtractionOutcome) -> String {
    let mut output = String::new();

    match outcome {
        ExtractionOutcome::Success(record) => {
            output.push_str(&format!("ID number:  {}\n", record.id_number));
            output.push_str(&format!(
                "Surname:    {}\n",
                record.surname.as_deref().unwrap_or("-")
            ));
            output.push_str(&format!(
                "Given name: {}\n",
                record.given_name.as_deref().unwrap_or("-")
            ));
            output.push_str(&format!("Birth date: {}\n", record.birth_date));

            if !record.warnings.is_empty() {
                output.push_str("\nWarnings:\n");
                for warning in &record.warnings {
                    output.push_str(&format!("  - {}\n", warning));
                }
            }
        }
        ExtractionOutcome::Failure(failure) => {
            output.push_str(&format!("Error ({}): {}\n", failure.error, failure.message));
            if !failure.missing_fields.is_empty() {
                let names: Vec<&str> = failure.missing_fields.iter().map(|f| f.as_str()).collect();
                output.push_str(&format!("Missing: {}\n", names.join(", ")));
            }
        }
    }

    output
}
