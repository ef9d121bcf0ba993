//! Command handlers -- one module per subcommand

pub mod config;
pub mod package;
pub mod scan;

use std::io::Write;

use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use dephealth_core::config::DephealthConfig;
use dephealth_scanner::{NvdSource, ScanReport, Scanner, ScannerBuilder, ScannerConfig, ScannerConfigBuilder};

use crate::cli::SourceArgs;
use crate::error::CliError;
use crate::output::{DESCRIPTION_LIMIT, Render, risk_label, severity_icon, severity_label, truncate};

/// Build an NVD-backed scanner from the loaded config plus command-line overrides.
pub fn build_scanner(
    config: &DephealthConfig,
    args: &SourceArgs,
) -> Result<Scanner<NvdSource>, CliError> {
    let scanner_config = scanner_config(config, args)?;
    let source = NvdSource::new(&scanner_config)?;
    debug!(
        base_url = source.base_url(),
        has_api_key = source.has_api_key(),
        concurrency = scanner_config.concurrency,
        "vulnerability source ready"
    );
    Ok(ScannerBuilder::new()
        .source(source)
        .config(scanner_config)
        .build()?)
}

/// Apply `--api-key`, `--timeout` and `--concurrency` on top of the file config.
fn scanner_config(config: &DephealthConfig, args: &SourceArgs) -> Result<ScannerConfig, CliError> {
    let mut builder = ScannerConfigBuilder::from_config(ScannerConfig::from_core(config));
    if let Some(key) = args.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        builder = builder.api_key(key);
    }
    if let Some(secs) = args.timeout {
        builder = builder.scan_timeout_secs(secs);
    }
    if let Some(n) = args.concurrency {
        builder = builder.concurrency(n);
    }
    Ok(builder.build()?)
}

/// Text/JSON view of a finished scan.
#[derive(Serialize)]
#[serde(transparent)]
pub struct ReportView<'a>(pub &'a ScanReport);

impl Render for ReportView<'_> {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let report = self.0;

        writeln!(w, "Scan: {}", report.scan_id.bold())?;
        writeln!(w, "Dependencies scanned: {}", report.total_dependencies)?;
        writeln!(w, "Vulnerable dependencies: {}", report.vulnerable_dependencies)?;

        let breakdown = report.severity_breakdown();
        if report.vulnerabilities_found > 0 {
            let parts: Vec<String> = breakdown
                .iter()
                .rev()
                .map(|(severity, count)| format!("{count} {}", severity.as_str().to_lowercase()))
                .collect();
            let line = format!(
                "{} vulnerabilities found: {}",
                report.vulnerabilities_found,
                parts.join(", ")
            );
            writeln!(w, "{}", line.red().bold())?;
        } else {
            writeln!(w, "{}", "No vulnerabilities found.".green().bold())?;
        }

        let failed = report.failed_dependencies();
        if failed > 0 {
            writeln!(
                w,
                "{}",
                format!("{failed} dependencies could not be checked").yellow()
            )?;
        }

        writeln!(w)?;
        writeln!(w, "Risk summary:")?;
        for level in dephealth_core::types::RiskLevel::DESCENDING {
            writeln!(
                w,
                "  {:<9} {}",
                risk_label(level),
                report.risk_summary.get(level)
            )?;
        }

        for result in &report.results {
            if !result.is_vulnerable && result.query_error.is_none() {
                continue;
            }
            let version = if result.dependency.version == dephealth_scanner::report::ANY_VERSION {
                "any version"
            } else {
                result.dependency.version.as_str()
            };
            writeln!(w)?;
            writeln!(
                w,
                "📦 {} ({version}) [{}]",
                result.dependency.name.bold(),
                risk_label(result.risk_level)
            )?;

            if let Some(ref error) = result.query_error {
                writeln!(w, "   {} {}", "lookup failed:".yellow(), error)?;
                continue;
            }

            writeln!(
                w,
                "   Found {} vulnerabilities:",
                result.vulnerabilities.len()
            )?;
            for vuln in &result.vulnerabilities {
                writeln!(
                    w,
                    "   {} {} - {}",
                    severity_icon(vuln.severity),
                    vuln.cve_id,
                    severity_label(vuln.severity)
                )?;
                if let Some(score) = vuln.cvss_score {
                    writeln!(w, "      CVSS Score: {score:.1}")?;
                }
                if !vuln.description.is_empty() {
                    writeln!(w, "      {}", truncate(&vuln.description, DESCRIPTION_LIMIT))?;
                }
            }
        }

        if !report.parse_warnings.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", "Skipped manifest lines:".yellow())?;
            for warning in &report.parse_warnings {
                writeln!(
                    w,
                    "  line {}: {} ({})",
                    warning.line_number,
                    warning.reason,
                    warning.line.trim()
                )?;
            }
        }

        Ok(())
    }
}
