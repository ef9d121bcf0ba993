//! CLI-specific error types and exit code mapping

use dephealth_core::error::DephealthError;
use dephealth_scanner::ScannerError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The manifest could not be scanned at all (too large, nothing parseable).
    #[error("manifest error: {0}")]
    Manifest(String),

    /// The scan succeeded and found risk at or above the `--fail-on` threshold.
    #[error("{0}")]
    VulnerabilitiesFound(String),

    /// JSON serialisation or input parsing failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from dephealth-core.
    #[error("{0}")]
    Core(#[from] DephealthError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Success                                   |
    /// | 1    | General / command error                   |
    /// | 2    | Configuration error                       |
    /// | 4    | Risk at or above the `--fail-on` level    |
    /// | 5    | Manifest unusable                         |
    /// | 10   | IO error                                  |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::VulnerabilitiesFound(_) => 4,
            Self::Manifest(_) => 5,
            Self::Io(_) => 10,
            Self::Core(DephealthError::Config(_)) => 2,
            Self::Core(DephealthError::Io(_)) => 10,
            Self::Core(DephealthError::Scan(_)) | Self::Json(_) | Self::Command(_) => 1,
        }
    }
}

impl From<ScannerError> for CliError {
    fn from(e: ScannerError) -> Self {
        match e {
            ScannerError::ManifestTooLarge { .. } | ScannerError::ManifestUnparseable(_) => {
                Self::Manifest(e.to_string())
            }
            ScannerError::Config { .. } => Self::Config(e.to_string()),
            other => Self::Command(other.to_string()),
        }
    }
}
