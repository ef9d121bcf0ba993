//! `dephealth scan` command handler

use std::path::Path;

use tokio::io::AsyncReadExt;
use tracing::info;

use dephealth_core::config::DephealthConfig;
use dephealth_core::types::RiskLevel;
use dephealth_scanner::{ManifestFormat, ScanReport};

use crate::cli::{FormatArg, ScanArgs};
use crate::commands::{ReportView, build_scanner};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Path argument meaning "read the manifest from stdin".
const STDIN_PATH: &str = "-";

/// Execute the `scan` command.
pub async fn execute(
    args: ScanArgs,
    config: &DephealthConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let threshold = args.fail_on.as_deref().map(parse_threshold).transpose()?;
    let format = resolve_format(&args.path, args.format);
    let content = read_manifest(&args.path).await?;

    let scanner = build_scanner(config, &args.source)?;
    info!(
        path = %args.path.display(),
        format = ?format,
        bytes = content.len(),
        "starting manifest scan"
    );

    let report = scanner.scan_manifest(&content, format).await?;
    writer.render(&ReportView(&report))?;

    check_threshold(&report, threshold)
}

/// Explicit `--format` wins; otherwise stdin is raw and files go by name.
pub fn resolve_format(path: &Path, explicit: Option<FormatArg>) -> ManifestFormat {
    if let Some(format) = explicit {
        return format.into();
    }
    if path.as_os_str() == STDIN_PATH {
        return ManifestFormat::RawText;
    }
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ManifestFormat::from_file_name)
        .unwrap_or(ManifestFormat::RawText)
}

async fn read_manifest(path: &Path) -> Result<Vec<u8>, CliError> {
    if path.as_os_str() == STDIN_PATH {
        let mut content = Vec::new();
        tokio::io::stdin().read_to_end(&mut content).await?;
        return Ok(content);
    }
    Ok(tokio::fs::read(path).await?)
}

fn parse_threshold(s: &str) -> Result<RiskLevel, CliError> {
    match RiskLevel::from_str_loose(s) {
        Some(RiskLevel::None) | None => Err(CliError::Command(format!(
            "invalid --fail-on level: {s} (expected: critical, high, medium, low, unknown)"
        ))),
        Some(level) => Ok(level),
    }
}

/// Fail with exit code 4 when any dependency reaches the threshold.
fn check_threshold(report: &ScanReport, threshold: Option<RiskLevel>) -> Result<(), CliError> {
    let Some(threshold) = threshold else {
        return Ok(());
    };
    let offending = report
        .results
        .iter()
        .filter(|r| r.risk_level >= threshold)
        .count();
    if offending > 0 {
        return Err(CliError::VulnerabilitiesFound(format!(
            "{offending} dependencies at or above {} risk",
            threshold.as_str()
        )));
    }
    Ok(())
}
