//! `dephealth config` command handler

use std::io::Write;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use tracing::info;

use dephealth_core::config::DephealthConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const REDACTED: &str = "***REDACTED***";

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Load the file strictly (it must exist) and report whether it is valid.
///
/// # Errors
///
/// Returns `CliError::Config` if the file is missing, malformed or out of range.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = validation_report(config_path).await;
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

async fn validation_report(config_path: &Path) -> ConfigValidationReport {
    let errors = match DephealthConfig::load(config_path).await {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.to_string()],
    };
    ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    }
}

/// Show the effective configuration (file + env overrides + defaults).
///
/// The API key is redacted.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = DephealthConfig::load_or_default(config_path).await?;
    let report = show_report(config, config_path, section)?;
    writer.render(&report)
}

fn show_report(
    mut config: DephealthConfig,
    config_path: &Path,
    section: Option<String>,
) -> Result<ConfigReport, CliError> {
    if config.source.has_api_key() {
        config.source.api_key = REDACTED.to_owned();
    }

    let (config_toml, config_json) = match section.as_deref() {
        None => (to_toml(&config), serde_json::to_value(&config)?),
        Some("general") => (to_toml(&config.general), serde_json::to_value(&config.general)?),
        Some("source") => (to_toml(&config.source), serde_json::to_value(&config.source)?),
        Some("scan") => (to_toml(&config.scan), serde_json::to_value(&config.scan)?),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, source, scan)"
            )));
        }
    };

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section,
        config: config_json,
        config_toml,
    })
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {e})"))
}

/// Configuration display report.
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Effective configuration values
    pub config: serde_json::Value,
    /// Same values as TOML, for text rendering
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if let Some(ref section) = self.section {
            let section_label = format!("[{section}]");
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;
        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Config Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_validation_report_valid_file() {
        let dir = TempDir::new().expect("should create temp dir");
        let path = dir.path().join("dephealth.toml");
        fs::write(&path, "[scan]\nconcurrency = 4\n").expect("should write config");

        let report = validation_report(&path).await;
        assert!(report.valid, "errors: {:?}", report.errors);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_validation_report_missing_file() {
        let report = validation_report(Path::new("/nonexistent/dephealth.toml")).await;
        assert!(!report.valid);
        assert!(report.errors[0].contains("not found"));
    }

    #[tokio::test]
    async fn test_validation_report_out_of_range_value() {
        let dir = TempDir::new().expect("should create temp dir");
        let path = dir.path().join("dephealth.toml");
        fs::write(&path, "[scan]\nconcurrency = 0\n").expect("should write config");

        let report = validation_report(&path).await;
        assert!(!report.valid);
        assert!(report.errors[0].contains("concurrency"));
    }

    #[test]
    fn test_show_redacts_api_key() {
        let mut config = DephealthConfig::default();
        config.source.api_key = "super-secret".to_owned();

        let report = show_report(config, Path::new("dephealth.toml"), None).expect("known section");
        assert!(!report.config_toml.contains("super-secret"));
        assert!(report.config_toml.contains(REDACTED));
        assert_eq!(report.config["source"]["api_key"], REDACTED);
    }

    #[test]
    fn test_show_empty_api_key_stays_empty() {
        let report = show_report(
            DephealthConfig::default(),
            Path::new("dephealth.toml"),
            Some("source".to_owned()),
        )
        .expect("known section");
        assert_eq!(report.config["api_key"], "");
    }

    #[test]
    fn test_show_single_section() {
        let report = show_report(
            DephealthConfig::default(),
            Path::new("dephealth.toml"),
            Some("scan".to_owned()),
        )
        .expect("known section");
        assert_eq!(report.config["concurrency"], 8);
        assert!(report.config_toml.contains("concurrency = 8"));
        assert!(!report.config_toml.contains("log_level"));
    }

    #[test]
    fn test_show_unknown_section_fails() {
        let err = show_report(
            DephealthConfig::default(),
            Path::new("dephealth.toml"),
            Some("ebpf".to_owned()),
        )
        .err()
        .expect("unknown section should fail");
        assert!(err.to_string().contains("unknown section"));
    }

    #[test]
    fn test_validation_report_render() {
        colored::control::set_override(false);
        let report = ConfigValidationReport {
            source: "dephealth.toml".to_owned(),
            valid: false,
            errors: vec!["invalid config value for 'concurrency'".to_owned()],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(text.contains("INVALID"));
        assert!(text.contains("concurrency"));
    }
}
