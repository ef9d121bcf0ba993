//! Output formatting abstraction for text vs JSON rendering
//!
//! All subcommand output flows through [`OutputWriter`], which handles format
//! switching so command handlers never branch on the format themselves.

use std::io::Write;

use colored::{ColoredString, Colorize};
use serde::Serialize;

use dephealth_core::types::{RiskLevel, Severity};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Descriptions longer than this are cut in text output.
pub const DESCRIPTION_LIMIT: usize = 100;

/// Writes CLI payloads to stdout in the selected format.
///
/// Handlers call `writer.render(&payload)` where `payload` implements both
/// `Serialize` (for JSON) and `Render` (for text).
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    /// Create a new output writer with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(payload, &mut handle)
    }

    /// Render a payload to an arbitrary writer.
    pub fn render_to<T: Render + Serialize>(
        &self,
        payload: &T,
        w: &mut dyn Write,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => payload.render_text(w)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Human-readable text rendering.
///
/// Implemented by every CLI output payload alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Icon shown in front of a vulnerability line.
pub fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔴",
        Severity::High => "🟠",
        Severity::Medium => "🟡",
        Severity::Low => "🟢",
        Severity::Unknown => "⚪",
    }
}

/// Colored risk level label.
pub fn risk_label(level: RiskLevel) -> ColoredString {
    let label = level.as_str();
    match level {
        RiskLevel::Critical => label.red().bold(),
        RiskLevel::High => label.red(),
        RiskLevel::Medium => label.yellow(),
        RiskLevel::Low => label.normal(),
        RiskLevel::Unknown => label.dimmed(),
        RiskLevel::None => label.green(),
    }
}

/// Colored severity label.
pub fn severity_label(severity: Severity) -> ColoredString {
    risk_label(RiskLevel::from(severity))
}

/// Cut `text` to at most `limit` characters, appending `...` when cut.
pub fn truncate(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
