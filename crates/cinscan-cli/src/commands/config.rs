//! Configuration management command.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand, ValueEnum};
use console::style;
use tracing::debug;

use cinscan_core::models::{ExtractionConfig, ScanConfig};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Initialize a new configuration file
    Init(InitArgs),

    /// Get a specific configuration value
    Get {
        /// Configuration key (e.g., "extraction.max_year")
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// New value (JSON, or a bare string)
        value: String,
    },

    /// Show configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,

    /// ID-number grammar to start from
    #[arg(long, value_enum, default_value = "standard")]
    preset: Preset,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Preset {
    /// One or two letters followed by five or six digits
    Standard,
    /// Three letters followed by six digits
    ThreeLetter,
}

pub async fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(),
        ConfigCommand::Init(init_args) => init_config(init_args),
        ConfigCommand::Get { key } => get_config(&key),
        ConfigCommand::Set { key, value } => set_config(&key, &value),
        ConfigCommand::Path => show_path(),
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cinscan")
        .join("config.json")
}

/// Load the configuration for a scanning command.
///
/// An explicit path must exist; otherwise the default file is used when
/// present, built-in defaults when not.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<ScanConfig> {
    if let Some(path) = config_path {
        debug!("Loading configuration from {}", path);
        return Ok(ScanConfig::from_file(Path::new(path))?);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Loading configuration from {}", default_path.display());
        Ok(ScanConfig::from_file(&default_path)?)
    } else {
        Ok(ScanConfig::default())
    }
}

fn show_config() -> anyhow::Result<()> {
    let config_path = default_config_path();

    let config = if config_path.exists() {
        ScanConfig::from_file(&config_path)?
    } else {
        println!(
            "{} No config file found, showing defaults.",
            style("ℹ").blue()
        );
        ScanConfig::default()
    };

    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}

fn init_config(args: InitArgs) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or_else(default_config_path);

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    // Create parent directory if needed
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config = preset_config(args.preset);
    config.save(&output_path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );

    Ok(())
}

fn preset_config(preset: Preset) -> ScanConfig {
    let extraction = match preset {
        Preset::Standard => ExtractionConfig::default(),
        Preset::ThreeLetter => ExtractionConfig::three_letter_variant(),
    };
    ScanConfig {
        extraction,
        ..ScanConfig::default()
    }
}

fn get_config(key: &str) -> anyhow::Result<()> {
    let config = load_config(None)?;
    let value = lookup(&serde_json::to_value(&config)?, key)?.clone();
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn set_config(key: &str, value: &str) -> anyhow::Result<()> {
    let config_path = default_config_path();
    let config = load_config(None)?;

    // Parse the value
    let parsed_value: serde_json::Value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    let updated = with_value(&config, key, parsed_value.clone())?;
    updated.validate()?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    updated.save(&config_path)?;

    println!(
        "{} Set {} = {}",
        style("✓").green(),
        key,
        serde_json::to_string(&parsed_value)?
    );

    Ok(())
}

/// Navigate a dotted key path.
fn lookup<'a>(json: &'a serde_json::Value, key: &str) -> anyhow::Result<&'a serde_json::Value> {
    let mut current = json;
    for part in key.split('.') {
        current = current
            .get(part)
            .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
    }
    Ok(current)
}

/// Copy of `config` with the value at a dotted key path replaced.
fn with_value(config: &ScanConfig, key: &str, value: serde_json::Value) -> anyhow::Result<ScanConfig> {
    let mut json = serde_json::to_value(config)?;

    let parts: Vec<&str> = key.split('.').collect();
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| anyhow::anyhow!("Empty configuration key"))?;

    let mut current = &mut json;
    for part in parents {
        current = current
            .get_mut(*part)
            .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
    }

    let obj = current
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("Cannot set value at non-object path"))?;
    if !obj.contains_key(*last) {
        anyhow::bail!("Configuration key not found: {}", key);
    }
    obj.insert((*last).to_string(), value);

    Ok(serde_json::from_value(json)?)
}

fn show_path() -> anyhow::Result<()> {
    let config_path = default_config_path();

    println!("Configuration file: {}", config_path.display());

    if config_path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'cinscan config init' to create a configuration file.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_nested_key() {
        let json = serde_json::to_value(ScanConfig::default()).unwrap();
        assert_eq!(lookup(&json, "extraction.max_year").unwrap(), &serde_json::json!(2024));
        assert!(lookup(&json, "extraction.nope").is_err());
    }

    #[test]
    fn test_with_value_updates_config() {
        let config = ScanConfig::default();
        let updated = with_value(&config, "extraction.min_text_length", serde_json::json!(25)).unwrap();
        assert_eq!(updated.extraction.min_text_length, 25);

        let updated = with_value(&config, "ocr.languages", serde_json::json!(["french"])).unwrap();
        assert_eq!(updated.ocr.languages.len(), 1);
    }

    #[test]
    fn test_with_value_rejects_unknown_or_mistyped_keys() {
        let config = ScanConfig::default();
        assert!(with_value(&config, "extraction.typo", serde_json::json!(1)).is_err());
        assert!(with_value(&config, "extraction.max_year", serde_json::json!("soon")).is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        preset_config(Preset::ThreeLetter).save(&path).unwrap();

        let loaded = load_config(path.to_str()).unwrap();
        assert_eq!(loaded.extraction.id_canonical, r"[A-Z]{3}\d{6}");

        assert!(load_config(Some("/definitely/not/here.json")).is_err());
    }
}
