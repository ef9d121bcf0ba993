//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no I/O happens here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use dephealth_scanner::{Ecosystem, ManifestFormat};

/// dephealth -- dependency vulnerability scanner.
///
/// Use `dephealth <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "dephealth", version, about, long_about = None)]
pub struct Cli {
    /// Path to the dephealth.toml configuration file (optional).
    #[arg(short, long, default_value = "dephealth.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a manifest file (or stdin) for known vulnerabilities.
    Scan(ScanArgs),

    /// Look up a single package.
    Package(PackageArgs),

    /// Look up a list of packages from a JSON file.
    Packages(PackagesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

/// Options shared by every command that talks to the vulnerability source.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// NVD API key (raises the rate limit from 5 to 50 requests per 30s).
    /// Also read from `NVD_API_KEY`.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Overall scan timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum number of concurrent lookups.
    #[arg(long)]
    pub concurrency: Option<usize>,
}

// ---- scan ----

/// Scan a manifest file.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Manifest path, or `-` to read from stdin.
    pub path: PathBuf,

    /// Manifest format (default: detected from the file name, raw for stdin).
    #[arg(long)]
    pub format: Option<FormatArg>,

    /// Exit with code 4 when any dependency is at or above this risk level
    /// (critical, high, medium, low, unknown).
    #[arg(long)]
    pub fail_on: Option<String>,

    #[command(flatten)]
    pub source: SourceArgs,
}

/// Manifest formats accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Python requirements.txt
    Requirements,
    /// Node package.json
    PackageJson,
    /// Unknown format, parsed line by line
    Raw,
}

impl From<FormatArg> for ManifestFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Requirements => Self::RequirementsTxt,
            FormatArg::PackageJson => Self::PackageJson,
            FormatArg::Raw => Self::RawText,
        }
    }
}

// ---- package ----

/// Look up a single package by name.
#[derive(Args, Debug)]
pub struct PackageArgs {
    /// Package name.
    pub name: String,

    /// Package version (optional).
    #[arg(long = "version", value_name = "VERSION")]
    pub pinned: Option<String>,

    /// Package ecosystem.
    #[arg(long, default_value = "python")]
    pub ecosystem: EcosystemArg,

    #[command(flatten)]
    pub source: SourceArgs,
}

/// Ecosystems accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EcosystemArg {
    Python,
    Node,
}

impl From<EcosystemArg> for Ecosystem {
    fn from(arg: EcosystemArg) -> Self {
        match arg {
            EcosystemArg::Python => Self::Python,
            EcosystemArg::Node => Self::Node,
        }
    }
}

// ---- packages ----

/// Look up several packages listed in a JSON file.
///
/// The file holds either an array of `{"name", "version"?, "type"?}` objects
/// or an object with such an array under `"packages"`.
#[derive(Args, Debug)]
pub struct PackagesArgs {
    /// JSON file listing the packages.
    pub file: PathBuf,

    #[command(flatten)]
    pub source: SourceArgs,
}

// ---- config ----

/// Manage dephealth configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, source, scan).
        #[arg(long)]
        section: Option<String>,
    },
}
