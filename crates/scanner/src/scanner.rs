//! 스캔 오케스트레이터 -- 의존성 조회 fan-out과 결과 수집
//!
//! [`Scanner`]는 의존성 목록을 받아 제한된 동시성으로 조회를 실행하고,
//! 모든 작업이 끝난 뒤 [`ResultAggregator`]로 리포트를 만듭니다.
//!
//! # 내부 아키텍처
//!
//! ```text
//! bytes --> ManifestParser --> Vec<DependencyRecord>
//!                                     |
//!                      +--------------+--------------+
//!                      |  JoinSet (task per record)  |
//!                      |  Semaphore (concurrency)    |
//!                      |  CancellationToken (timeout)|
//!                      +--------------+--------------+
//!                                     |
//!             RateLimiter --> VulnerabilityClient --> RiskClassifier
//!                                     |
//!                          slots[index] (입력 순서)
//!                                     |
//!                             ResultAggregator --> ScanReport
//! ```
//!
//! # 실패 처리
//!
//! - 의존성 하나의 조회 실패는 그 결과의 `query_error`로 기록되고 스캔은 계속됩니다.
//! - 전체 타임아웃이 지나면 남은 작업을 취소하고 `"timed out"`으로 표시합니다.
//!   이미 받은 결과는 유지됩니다.
//! - 사용 가능한 의존성이 하나도 없을 때만 스캔 전체가 실패합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dephealth_core::metrics as m;

use crate::config::ScannerConfig;
use crate::error::ScannerError;
use crate::manifest::{ManifestFormat, ManifestParser, ParseWarning};
use crate::ratelimit::{RateLimiter, deadline_after};
use crate::report::{DependencyResult, DependencySummary, ResultAggregator, ScanReport};
use crate::source::{VulnerabilityClient, VulnerabilitySource};
use crate::types::{DependencyRecord, PackageQuery};

/// 스캔 오케스트레이터
pub struct Scanner<S: VulnerabilitySource> {
    config: ScannerConfig,
    parser: ManifestParser,
    client: VulnerabilityClient<S>,
    /// 완료된 스캔 수
    scans_completed: Arc<AtomicU64>,
    /// 발견된 취약점 수 (누적)
    vulns_found: Arc<AtomicU64>,
}

impl<S: VulnerabilitySource> Scanner<S> {
    /// 스캐너 설정
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// 공유 rate limiter
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.client.limiter()
    }

    /// manifest 파서
    pub fn parser(&self) -> &ManifestParser {
        &self.parser
    }

    /// 완료된 스캔 수를 반환합니다.
    pub fn scans_completed(&self) -> u64 {
        self.scans_completed.load(Ordering::Relaxed)
    }

    /// 지금까지 발견된 취약점 수를 반환합니다.
    pub fn vulns_found(&self) -> u64 {
        self.vulns_found.load(Ordering::Relaxed)
    }

    /// manifest를 파싱하고 스캔합니다.
    ///
    /// # Errors
    ///
    /// - `ManifestTooLarge`: 크기 제한 초과
    /// - `ManifestUnparseable`: 사용 가능한 의존성이 없음
    pub async fn scan_manifest(
        &self,
        content: &[u8],
        format: ManifestFormat,
    ) -> Result<ScanReport, ScannerError> {
        let parsed = self.parser.parse(content, format)?;
        for warning in &parsed.warnings {
            debug!(line = warning.line_number, reason = %warning.reason, "manifest line skipped");
        }
        if parsed.is_empty() {
            return Err(ScannerError::ManifestUnparseable(format!(
                "no usable dependencies found ({} lines skipped)",
                parsed.warnings.len()
            )));
        }
        let items = parsed.records.iter().map(item_from_record).collect();
        Ok(self
            .run(items, self.config.scan_timeout(), parsed.warnings)
            .await)
    }

    /// 파싱된 의존성 목록을 설정된 타임아웃으로 스캔합니다.
    ///
    /// # Errors
    ///
    /// 목록이 비어 있으면 `ManifestUnparseable`을 반환합니다.
    pub async fn scan(&self, records: &[DependencyRecord]) -> Result<ScanReport, ScannerError> {
        self.scan_with_timeout(records, self.config.scan_timeout())
            .await
    }

    /// 파싱된 의존성 목록을 주어진 타임아웃으로 스캔합니다.
    pub async fn scan_with_timeout(
        &self,
        records: &[DependencyRecord],
        timeout: Duration,
    ) -> Result<ScanReport, ScannerError> {
        if records.is_empty() {
            return Err(ScannerError::ManifestUnparseable(
                "no dependencies to scan".to_owned(),
            ));
        }
        let items = records.iter().map(item_from_record).collect();
        Ok(self.run(items, timeout, Vec::new()).await)
    }

    /// manifest 없이 패키지 목록을 직접 조회합니다.
    ///
    /// 이름이 비어 있는 항목은 건너뜁니다.
    pub async fn check_packages(
        &self,
        packages: &[PackageQuery],
    ) -> Result<ScanReport, ScannerError> {
        let items: Vec<_> = packages
            .iter()
            .filter(|p| !p.name.trim().is_empty())
            .map(|p| {
                let query = PackageQuery {
                    name: p.ecosystem.normalize_name(p.name.trim()),
                    version: p.version.clone().filter(|v| !v.trim().is_empty()),
                    ecosystem: p.ecosystem,
                };
                (DependencySummary::from_query(&query), query)
            })
            .collect();
        if items.is_empty() {
            return Err(ScannerError::ManifestUnparseable(
                "no packages to check".to_owned(),
            ));
        }
        Ok(self.run(items, self.config.scan_timeout(), Vec::new()).await)
    }

    async fn run(
        &self,
        items: Vec<(DependencySummary, PackageQuery)>,
        timeout: Duration,
        parse_warnings: Vec<ParseWarning>,
    ) -> ScanReport {
        let started = Instant::now();
        let deadline = deadline_after(started, timeout);
        let total = items.len();

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut summaries = Vec::with_capacity(total);

        for (index, (summary, query)) in items.into_iter().enumerate() {
            summaries.push(summary.clone());
            let client = self.client.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(ScannerError::ScanTimedOut),
                    res = async {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|_| ScannerError::ScanTimedOut)?;
                        client.query(&query).await
                    } => res,
                };
                let result = match outcome {
                    Ok(vulns) => DependencyResult::completed(summary, vulns),
                    Err(e) => DependencyResult::failed(summary, e.to_string()),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<DependencyResult>> = vec![None; total];
        let mut timed_out = false;

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((index, result)))) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(result);
                    }
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "scan worker failed");
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    warn!(
                        timeout_secs = timeout.as_secs(),
                        pending = tasks.len(),
                        "scan timed out, cancelling outstanding queries"
                    );
                    cancel.cancel();
                    semaphore.close();
                    while let Some(joined) = tasks.join_next().await {
                        if let Ok((index, result)) = joined
                            && let Some(slot) = slots.get_mut(index)
                        {
                            *slot = Some(result);
                        }
                    }
                    break;
                }
            }
        }

        let results: Vec<DependencyResult> = slots
            .into_iter()
            .zip(summaries)
            .map(|(slot, summary)| {
                slot.unwrap_or_else(|| {
                    let reason = if timed_out {
                        ScannerError::ScanTimedOut.to_string()
                    } else {
                        "scan worker failed".to_owned()
                    };
                    DependencyResult::failed(summary, reason)
                })
            })
            .collect();

        let report = ResultAggregator::aggregate_with_warnings(results, parse_warnings);
        self.record(&report, started.elapsed());
        report
    }

    fn record(&self, report: &ScanReport, elapsed: Duration) {
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
        self.vulns_found
            .fetch_add(report.vulnerabilities_found as u64, Ordering::Relaxed);

        counter!(m::SCANNER_SCANS_COMPLETED_TOTAL).increment(1);
        counter!(m::SCANNER_DEPENDENCIES_SCANNED_TOTAL)
            .increment(report.total_dependencies as u64);
        for (severity, count) in report.severity_breakdown() {
            if count > 0 {
                counter!(m::SCANNER_VULNERABILITIES_FOUND_TOTAL, m::LABEL_SEVERITY => severity.as_str())
                    .increment(count as u64);
            }
        }
        histogram!(m::SCANNER_SCAN_DURATION_SECONDS).record(elapsed.as_secs_f64());

        info!(
            scan_id = %report.scan_id,
            total = report.total_dependencies,
            vulnerable = report.vulnerable_dependencies,
            vulnerabilities = report.vulnerabilities_found,
            failed = report.failed_dependencies(),
            duration_ms = elapsed.as_millis() as u64,
            "scan completed"
        );
    }
}

fn item_from_record(record: &DependencyRecord) -> (DependencySummary, PackageQuery) {
    (
        DependencySummary::from_record(record),
        PackageQuery::from_record(record),
    )
}

/// 스캐너 빌더
///
/// rate limiter를 지정하지 않으면 설정의 정책으로 새로 만듭니다.
/// 여러 스캐너가 한도를 공유하려면 같은 `Arc<RateLimiter>`를 넘기세요.
pub struct ScannerBuilder<S> {
    config: ScannerConfig,
    source: Option<S>,
    limiter: Option<Arc<RateLimiter>>,
}

impl<S: VulnerabilitySource> ScannerBuilder<S> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: ScannerConfig::default(),
            source: None,
            limiter: None,
        }
    }

    /// 스캐너 설정을 지정합니다.
    pub fn config(mut self, config: ScannerConfig) -> Self {
        self.config = config;
        self
    }

    /// 취약점 소스를 지정합니다.
    pub fn source(mut self, source: S) -> Self {
        self.source = Some(source);
        self
    }

    /// 공유 rate limiter를 지정합니다.
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// 스캐너를 빌드합니다.
    ///
    /// # Errors
    ///
    /// 설정이 유효하지 않거나 소스가 없으면 `Config` 에러를 반환합니다.
    pub fn build(self) -> Result<Scanner<S>, ScannerError> {
        self.config.validate()?;

        let source = self.source.ok_or_else(|| ScannerError::Config {
            field: "source".to_owned(),
            reason: "vulnerability source is required".to_owned(),
        })?;

        let limiter = self.limiter.unwrap_or_else(|| {
            Arc::new(RateLimiter::new(
                self.config.rate_limit_policy(),
                self.config.rate_limit_max_wait(),
            ))
        });

        let client =
            VulnerabilityClient::new(Arc::new(source), limiter, self.config.retry_policy())
                .with_version_filter(self.config.version_filter);

        Ok(Scanner {
            parser: ManifestParser::new(self.config.max_manifest_size),
            config: self.config,
            client,
            scans_completed: Arc::new(AtomicU64::new(0)),
            vulns_found: Arc::new(AtomicU64::new(0)),
        })
    }
}

impl<S: VulnerabilitySource> Default for ScannerBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use dephealth_core::types::{RiskLevel, Severity};

    use super::*;
    use crate::config::ScannerConfigBuilder;
    use crate::source::{MockFailure, MockSource};
    use crate::types::{Ecosystem, Vulnerability};

    fn config() -> ScannerConfig {
        ScannerConfigBuilder::new()
            .api_key("test-key")
            .retry_jitter(false)
            .build()
            .unwrap()
    }

    fn scanner(source: MockSource) -> Scanner<MockSource> {
        ScannerBuilder::new()
            .config(config())
            .source(source)
            .build()
            .unwrap()
    }

    #[test]
    fn build_requires_source() {
        let result = ScannerBuilder::<MockSource>::new().config(config()).build();
        assert!(matches!(result, Err(ScannerError::Config { .. })));
    }

    #[test]
    fn build_rejects_invalid_config() {
        let mut cfg = config();
        cfg.concurrency = 0;
        let result = ScannerBuilder::new()
            .config(cfg)
            .source(MockSource::new())
            .build();
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn flask_and_requests_scenario() {
        let source = MockSource::new().with_vulns(
            "flask",
            vec![Vulnerability::new("CVE-2023-30861", Severity::High)],
        );
        let scanner = scanner(source);
        let report = scanner
            .scan_manifest(
                b"flask==2.3.3\nrequests==2.31.0",
                ManifestFormat::RequirementsTxt,
            )
            .await
            .unwrap();

        assert_eq!(report.total_dependencies, 2);
        assert_eq!(report.vulnerable_dependencies, 1);
        assert_eq!(report.vulnerabilities_found, 1);
        assert_eq!(report.risk_summary.high, 1);
        assert_eq!(report.risk_summary.none, 1);
        assert_eq!(report.risk_summary.total(), 2);
        assert_eq!(report.results[0].dependency.name, "flask");
        assert_eq!(report.results[0].dependency.version, "2.3.3");
        assert_eq!(scanner.scans_completed(), 1);
        assert_eq!(scanner.vulns_found(), 1);
    }

    #[test]
    fn build_rejects_oversized_scan_timeout() {
        let result = ScannerConfigBuilder::new().scan_timeout_secs(u64::MAX).build();
        assert!(matches!(
            result,
            Err(ScannerError::Config { ref field, .. }) if field == "scan_timeout_secs"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_completes_scan() {
        let scanner = scanner(MockSource::new());
        let records = ManifestParser::default()
            .parse(b"flask==2.0\n", ManifestFormat::RequirementsTxt)
            .unwrap()
            .records;
        let report = scanner
            .scan_with_timeout(&records, Duration::MAX)
            .await
            .unwrap();
        assert_eq!(report.total_dependencies, 1);
        assert!(report.results[0].query_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_manifest_is_fatal() {
        let scanner = scanner(MockSource::new());
        let err = scanner
            .scan_manifest(b"# nothing\n\n", ManifestFormat::RequirementsTxt)
            .await
            .unwrap_err();
        assert!(matches!(err, ScannerError::ManifestUnparseable(_)));
        assert!(scanner.scan(&[]).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_line_becomes_warning() {
        let scanner = scanner(MockSource::new());
        let report = scanner
            .scan_manifest(b"@@@not-a-package\nflask==2.3.3", ManifestFormat::RequirementsTxt)
            .await
            .unwrap();
        assert_eq!(report.total_dependencies, 1);
        assert_eq!(report.parse_warnings.len(), 1);
        assert_eq!(report.parse_warnings[0].line_number, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_dependency_does_not_fail_scan() {
        let source = MockSource::new().failing("c", 100, MockFailure::Unavailable);
        let scanner = scanner(source);
        let report = scanner
            .scan_manifest(b"a\nb\nc\nd\ne", ManifestFormat::RequirementsTxt)
            .await
            .unwrap();
        assert_eq!(report.total_dependencies, 5);
        assert_eq!(report.risk_summary.unknown, 1);
        assert_eq!(report.risk_summary.none, 4);
        let failed = &report.results[2];
        assert_eq!(failed.dependency.name, "c");
        assert_eq!(failed.risk_level, RiskLevel::Unknown);
        assert!(failed.query_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn check_packages_normalizes_and_skips_blank() {
        let source = MockSource::new().with_vulns(
            "django",
            vec![Vulnerability::new("CVE-1", Severity::Critical)],
        );
        let scanner = scanner(source);
        let report = scanner
            .check_packages(&[
                PackageQuery::new("Django", Some("3.2".to_owned()), Ecosystem::Python),
                PackageQuery::new("  ", None, Ecosystem::Python),
                PackageQuery::new("lodash", Some(String::new()), Ecosystem::Node),
            ])
            .await
            .unwrap();
        assert_eq!(report.total_dependencies, 2);
        assert_eq!(report.results[0].dependency.name, "django");
        assert_eq!(report.results[0].risk_level, RiskLevel::Critical);
        assert_eq!(report.results[1].dependency.version, "any");
    }

    #[tokio::test(start_paused = true)]
    async fn check_packages_empty_is_error() {
        let scanner = scanner(MockSource::new());
        assert!(matches!(
            scanner.check_packages(&[]).await,
            Err(ScannerError::ManifestUnparseable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_limiter_is_used() {
        let limiter = Arc::new(RateLimiter::new(
            crate::config::RateLimitPolicy::WITH_API_KEY,
            Duration::from_secs(60),
        ));
        let scanner = ScannerBuilder::new()
            .config(config())
            .source(MockSource::new())
            .rate_limiter(Arc::clone(&limiter))
            .build()
            .unwrap();
        scanner
            .scan_manifest(b"a\nb\nc", ManifestFormat::RequirementsTxt)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(scanner.limiter(), &limiter));
        assert_eq!(limiter.available().await, 47);
    }
}
