//! dephealth command-line entry point

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use dephealth_core::config::{DephealthConfig, GeneralConfig};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Scan(args) => {
            let config = prepare(&cli.config, log_level).await?;
            commands::scan::execute(args, &config, &writer).await
        }
        Commands::Package(args) => {
            let config = prepare(&cli.config, log_level).await?;
            commands::package::execute_single(args, &config, &writer).await
        }
        Commands::Packages(args) => {
            let config = prepare(&cli.config, log_level).await?;
            commands::package::execute_many(args, &config, &writer).await
        }
        Commands::Config(args) => {
            // the file under inspection may itself be broken
            init_logging(&GeneralConfig::default(), log_level)?;
            commands::config::execute(args, &cli.config, &writer).await
        }
    }
}

/// Load the optional config file, then install logging from its `[general]` section.
async fn prepare(config_path: &Path, log_level: Option<&str>) -> Result<DephealthConfig, CliError> {
    let config = DephealthConfig::load_or_default(config_path).await?;
    init_logging(&config.general, log_level)?;
    dephealth_core::metrics::describe_all();
    tracing::debug!(config = %config_path.display(), "dephealth starting");
    Ok(config)
}

fn init_logging(general: &GeneralConfig, log_level: Option<&str>) -> Result<(), CliError> {
    logging::init_tracing(general, log_level).map_err(|e| CliError::Config(e.to_string()))
}
