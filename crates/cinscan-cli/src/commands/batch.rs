//! Batch processing command for multiple card images.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use cinscan_core::models::{ExtractionOutcome, IdentityRecord};
use cinscan_core::{IdCardScanner, IdCardScannerBuilder, ScanError, TextRecognizer};

use super::config::load_config;
use super::process::{EngineKind, OutputFormat, build_recognizer, format_outcome, mime_type_for};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// OCR engine
    #[arg(short, long, value_enum, default_value = "onnx")]
    engine: EngineKind,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Exit successfully even when some cards fail
    #[arg(long)]
    continue_on_error: bool,
}

/// Result of processing a single file.
struct ProcessResult {
    path: PathBuf,
    outcome: ExtractionOutcome,
    processing_time_ms: u64,
}

type SharedScanner = Arc<IdCardScanner<Box<dyn TextRecognizer>>>;

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    // Expand glob pattern
    let mut files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    // Create output directory if specified
    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let recognizer = build_recognizer(args.engine, &config.ocr)?;
    let scanner: SharedScanner = Arc::new(
        IdCardScannerBuilder::new()
            .with_config(config)
            .build(recognizer)?,
    );

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let results = scan_all(files, scanner, args.jobs.max(1), &overall_pb).await?;
    overall_pb.finish_with_message("Complete");

    // Write outputs
    if let Some(output_dir) = &args.output_dir {
        let paths: Vec<&Path> = results.iter().map(|r| r.path.as_path()).collect();
        for (result, output_name) in results.iter().zip(output_names(&paths)) {
            let output_path = output_dir.join(format!("{}.{}", output_name, args.format.extension()));

            fs::write(&output_path, format_outcome(&result.outcome, args.format)?)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    // Generate summary if requested
    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed: Vec<&ProcessResult> = results.iter().filter(|r| !r.outcome.is_success()).collect();

    // Print summary
    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(results.len() - failed.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            if let ExtractionOutcome::Failure(failure) = &result.outcome {
                println!(
                    "  - {}: {} ({})",
                    result.path.display(),
                    failure.message,
                    failure.error
                );
            }
        }

        if !args.continue_on_error {
            anyhow::bail!("{} of {} files failed", failed.len(), results.len());
        }
    }

    Ok(())
}

/// Scan every file on the blocking pool, at most `jobs` at a time.
async fn scan_all(
    files: Vec<PathBuf>,
    scanner: SharedScanner,
    jobs: usize,
    pb: &ProgressBar,
) -> anyhow::Result<Vec<ProcessResult>> {
    let permits = Arc::new(Semaphore::new(jobs));
    let mut tasks = JoinSet::new();
    let mut results = Vec::new();

    for path in files {
        let permit = Arc::clone(&permits).acquire_owned().await?;
        let scanner = Arc::clone(&scanner);

        tasks.spawn_blocking(move || {
            let result = scan_file(&scanner, path);
            drop(permit);
            result
        });

        // Drain finished work so the bar moves while we are still queueing
        while let Some(done) = tasks.try_join_next() {
            results.push(done?);
            pb.inc(1);
        }
    }

    while let Some(done) = tasks.join_next().await {
        results.push(done?);
        pb.inc(1);
    }

    results.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(results)
}

fn scan_file(scanner: &IdCardScanner<Box<dyn TextRecognizer>>, path: PathBuf) -> ProcessResult {
    let file_start = Instant::now();

    let outcome = match fs::read(&path) {
        Ok(bytes) => scanner.scan(&bytes, mime_type_for(&path)),
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            let err = ScanError::InvalidInput(format!("cannot read {}: {}", path.display(), e));
            ExtractionOutcome::from(Err::<IdentityRecord, _>(err))
        }
    };

    ProcessResult {
        path,
        outcome,
        processing_time_ms: file_start.elapsed().as_millis() as u64,
    }
}

/// Output file stems: the input stem when unique, otherwise the flattened
/// input path, with a numeric suffix as a last resort.
fn output_names(paths: &[&Path]) -> Vec<String> {
    let stem = |p: &Path| -> String {
        p.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("card")
            .to_string()
    };

    let mut stem_counts: HashMap<String, usize> = HashMap::new();
    for path in paths {
        *stem_counts.entry(stem(path)).or_default() += 1;
    }

    let mut taken = HashSet::new();
    paths
        .iter()
        .map(|path| {
            let base = stem(path);
            let candidate = if stem_counts[&base] == 1 {
                base
            } else {
                flatten_path(path)
            };

            let mut name = candidate.clone();
            let mut n = 1;
            while !taken.insert(name.clone()) {
                n += 1;
                name = format!("{}_{}", candidate, n);
            }
            name
        })
        .collect()
}

fn flatten_path(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

fn write_summary(path: &Path, results: &[ProcessResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "id_number",
        "surname",
        "given_name",
        "birth_date",
        "warnings",
        "error",
        "message",
        "processing_time_ms",
    ])?;

    for result in results {
        let filename = result.path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        let time = result.processing_time_ms.to_string();

        match &result.outcome {
            ExtractionOutcome::Success(record) => {
                wtr.write_record([
                    filename,
                    "success",
                    &record.id_number,
                    record.surname.as_deref().unwrap_or(""),
                    record.given_name.as_deref().unwrap_or(""),
                    &record.birth_date.to_string(),
                    &record.warnings.join("; "),
                    "",
                    "",
                    &time,
                ])?;
            }
            ExtractionOutcome::Failure(failure) => {
                wtr.write_record([
                    filename,
                    "failed",
                    "",
                    "",
                    "",
                    "",
                    "",
                    failure.error.as_str(),
                    &failure.message,
                    &time,
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinscan_core::models::{DateTriple, FailureRecord};
    use cinscan_core::{ExtractionError, MandatoryField};

    #[test]
    fn test_output_names_disambiguate_shared_stems() {
        let paths = [
            Path::new("scans/a/x.png"),
            Path::new("scans/b/x.jpg"),
            Path::new("scans/y.png"),
        ];
        assert_eq!(output_names(&paths), vec!["scans_a_x_png", "scans_b_x_jpg", "y"]);

        let paths = [Path::new("a/x.png"), Path::new("a_x_png"), Path::new("b/x.png")];
        assert_eq!(output_names(&paths), vec!["a_x_png", "a_x_png_2", "b_x_png"]);
    }

    #[test]
    fn test_summary_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");

        let missing = ScanError::from(ExtractionError::MissingFields(vec![MandatoryField::BirthDate]));
        let results = vec![
            ProcessResult {
                path: PathBuf::from("cards/a.png"),
                outcome: ExtractionOutcome::Success(IdentityRecord {
                    success: true,
                    id_number: "AB123456".to_string(),
                    surname: Some("Marie".to_string()),
                    given_name: Some("Dupont".to_string()),
                    birth_date: DateTriple::new(5, 3, 1990),
                    raw_text: String::new(),
                    processed_text: String::new(),
                    warnings: Vec::new(),
                }),
                processing_time_ms: 12,
            },
            ProcessResult {
                path: PathBuf::from("cards/b.jpg"),
                outcome: ExtractionOutcome::Failure(FailureRecord::from(&missing)),
                processing_time_ms: 7,
            },
        ];

        write_summary(&path, &results).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "a.png,success,AB123456,Marie,Dupont,05/03/1990,,,,12");
        assert!(lines[2].starts_with("b.jpg,failed,,,,,,ExtractionFailure,"));
        assert!(lines[2].ends_with(",7"));
    }
}
