#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`ScannerError`)
//! - [`config`]: Scanner configuration (`ScannerConfig`, builder, `RateLimitPolicy`)
//! - [`types`]: Domain types (`DependencyRecord`, `Vulnerability`, `PackageQuery`, `Ecosystem`)
//! - [`manifest`]: Manifest parsers (`ManifestParser`, requirements.txt, package.json)
//! - [`ratelimit`]: Shared sliding-window `RateLimiter`
//! - [`source`]: Vulnerability source trait, retrying client, NVD implementation
//! - [`classify`]: Severity and risk classification (`RiskClassifier`)
//! - [`report`]: Per-dependency results and aggregation (`ScanReport`, `ResultAggregator`)
//! - [`scanner`]: Main orchestrator (`Scanner`, `ScannerBuilder`)
//!
//! # Architecture
//!
//! ```text
//! manifest bytes --> ManifestParser --> Vec<DependencyRecord>
//!                                              |
//!                                    Scanner (bounded fan-out)
//!                                              |
//!                     RateLimiter --> VulnerabilityClient --> NvdSource
//!                                              |
//!                                       RiskClassifier
//!                                              |
//!                                      ResultAggregator --> ScanReport
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod manifest;
pub mod ratelimit;
pub mod report;
pub mod scanner;
pub mod source;
pub mod types;

// --- Public API Re-exports ---

// Scanner (main orchestrator)
pub use scanner::{Scanner, ScannerBuilder};

// Configuration
pub use config::{RateLimitPolicy, ScannerConfig, ScannerConfigBuilder};

// Error
pub use error::ScannerError;

// Types
pub use types::{
    DependencyRecord, Ecosystem, Operator, PackageQuery, Reference, SourceLine, VersionConstraint,
    VersionRange, Vulnerability,
};

// Manifest
pub use manifest::{
    ManifestFormat, ManifestGrammar, ManifestParser, PackageJsonParser, ParseWarning,
    ParsedManifest, RequirementsParser,
};

// Rate limiting
pub use ratelimit::RateLimiter;

// Vulnerability source
pub use source::{NvdSource, RetryPolicy, VulnerabilityClient, VulnerabilitySource};

// Classification & report
pub use classify::RiskClassifier;
pub use report::{DependencyResult, DependencySummary, ResultAggregator, RiskSummary, ScanReport};
