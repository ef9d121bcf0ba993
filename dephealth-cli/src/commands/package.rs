//! `dephealth package` / `dephealth packages` command handlers

use serde::Deserialize;
use tracing::info;

use dephealth_core::config::DephealthConfig;
use dephealth_scanner::{Ecosystem, PackageQuery};

use crate::cli::{PackageArgs, PackagesArgs};
use crate::commands::{ReportView, build_scanner};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Execute the `package` command.
pub async fn execute_single(
    args: PackageArgs,
    config: &DephealthConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let query = PackageQuery::new(args.name, args.pinned, args.ecosystem.into());
    run(vec![query], &args.source, config, writer).await
}

/// Execute the `packages` command.
pub async fn execute_many(
    args: PackagesArgs,
    config: &DephealthConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let content = tokio::fs::read_to_string(&args.file).await?;
    let queries = parse_package_list(&content)?;
    run(queries, &args.source, config, writer).await
}

async fn run(
    queries: Vec<PackageQuery>,
    source: &crate::cli::SourceArgs,
    config: &DephealthConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let scanner = build_scanner(config, source)?;
    info!(packages = queries.len(), "starting package lookup");
    let report = scanner.check_packages(&queries).await?;
    writer.render(&ReportView(&report))
}

/// Accepted shapes of the package list file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PackageList {
    Bare(Vec<PackageEntry>),
    Wrapped { packages: Vec<PackageEntry> },
}

#[derive(Debug, Deserialize)]
struct PackageEntry {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default, alias = "type")]
    ecosystem: Option<String>,
}

/// Parse a package list file into queries. Missing ecosystems default to Python.
pub fn parse_package_list(content: &str) -> Result<Vec<PackageQuery>, CliError> {
    let entries = match serde_json::from_str::<PackageList>(content)? {
        PackageList::Bare(entries) | PackageList::Wrapped { packages: entries } => entries,
    };

    entries
        .into_iter()
        .map(|entry| {
            let ecosystem = match entry.ecosystem.as_deref() {
                None => Ecosystem::default(),
                Some(raw) => Ecosystem::from_str_loose(raw).ok_or_else(|| {
                    CliError::Command(format!(
                        "unknown ecosystem '{raw}' for package '{}' (expected: python, node)",
                        entry.name
                    ))
                })?,
            };
            Ok(PackageQuery::new(entry.name, entry.version, ecosystem))
        })
        .collect()
}
