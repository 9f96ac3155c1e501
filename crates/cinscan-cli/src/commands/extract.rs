//! Extract command - run field extraction over already recognized text.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use cinscan_core::identity::rules::{BirthDateExtractor, IdNumberExtractor, NameExtractor};
use cinscan_core::models::ExtractionOutcome;
use cinscan_core::{FieldExtractor, NormalizedText, RecognizedText, RuleBook, extract_from_passes, normalize};

use super::config::load_config;
use super::process::{OutputFormat, format_outcome};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Text files, one per recognition pass (raw pass first)
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// List every candidate each extractor accepted, with the rule that found it
    #[arg(long)]
    explain: bool,
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let rules = RuleBook::compile(&config.extraction)?;

    let mut passes = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        let text = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        passes.push(RecognizedText::new(text));
    }
    info!("Loaded {} passes", passes.len());

    if args.explain {
        println!("{}", explain(&normalize(&passes), &rules));
    }

    let outcome = ExtractionOutcome::from(extract_from_passes(
        &passes,
        &rules,
        config.extraction.min_text_length,
    ));
    println!("{}", format_outcome(&outcome, args.format)?);

    if let ExtractionOutcome::Failure(failure) = &outcome {
        anyhow::bail!("{}: {}", failure.error, failure.message);
    }

    Ok(())
}

fn explain(text: &NormalizedText, rules: &RuleBook) -> String {
    let mut output = String::new();

    output.push_str(&format!("{}\n", style("Normalized lines:").bold()));
    for (i, line) in text.lines().iter().enumerate() {
        output.push_str(&format!("  {:>3}  {}\n", i, line));
    }

    output.push_str(&format!("\n{}\n", style("ID number candidates:").bold()));
    for m in IdNumberExtractor::new(rules).extract_all(text) {
        output.push_str(&format!("  {} [{}] from {:?}\n", m.value, m.rule, m.source));
    }

    output.push_str(&format!("\n{}\n", style("Name candidates:").bold()));
    for m in NameExtractor::new().extract_all(text) {
        output.push_str(&format!(
            "  given={} surname={} (line {})\n",
            m.value.given_name,
            m.value.surname,
            m.line.unwrap_or_default()
        ));
    }

    output.push_str(&format!("\n{}\n", style("Birth date candidates:").bold()));
    for m in BirthDateExtractor::new(rules).extract_all(text) {
        output.push_str(&format!(
            "  {} [{}] from {:?} (line {})\n",
            m.value,
            m.rule,
            m.source,
            m.line.unwrap_or_default()
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_lists_candidates_in_precedence_order() {
        console::set_colors_enabled(false);
        let text = NormalizedText::from_text("CIN: cd 654321\nAB123456\nDupont Marie\nnée le 5.3.1990");
        let report = explain(&text, &RuleBook::default());

        let compact = report.find("AB123456 [compact]").unwrap();
        let cin = report.find("CD654321 [cin_label]").unwrap();
        assert!(compact < cin);
        assert!(report.contains("given=Dupont surname=Marie (line 2)"));
        assert!(report.contains("05/03/1990 [numeric] from \"5.3.1990\" (line 3)"));
    }
}
