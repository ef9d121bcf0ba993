//! 취약점 소스 -- 외부 DB 조회, 재시도, 중복 제거
//!
//! [`VulnerabilitySource`] trait은 패키지 하나에 대한 단일 HTTP 조회를 추상화하고,
//! [`VulnerabilityClient`]는 그 위에서 다음을 담당합니다.
//!
//! 1. 시도마다 공유 [`RateLimiter`]에서 슬롯 획득
//! 2. 429/5xx 계열 실패 시 [`RetryMachine`]에 따라 지수 backoff 재시도
//! 3. 재시도 소진 시 `SourceUnavailable`로 정리
//! 4. `cve_id` 기준 중복 제거 (먼저 나온 것 유지)
//! 5. 조회 버전이 CPE 범위 밖인 것이 확실한 CVE 제거
//!
//! ```text
//! VulnerabilityClient::query
//!   ├── RateLimiter::acquire      (매 시도마다)
//!   ├── VulnerabilitySource::fetch
//!   │     ├── NvdSource          (production)
//!   │     └── MockSource         (tests)
//!   └── dedup + version filter
//! ```

pub mod nvd;
pub mod retry;
pub mod version;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use dephealth_core::metrics as m;

use crate::error::ScannerError;
use crate::ratelimit::RateLimiter;
use crate::types::{PackageQuery, Vulnerability};

pub use nvd::NvdSource;
pub use retry::{AttemptOutcome, RetryMachine, RetryPolicy, RetryState};

/// 외부 취약점 DB 조회 trait
///
/// 한 번의 조회 시도만 수행합니다. rate limit, 재시도, 중복 제거는
/// [`VulnerabilityClient`]가 처리합니다.
///
/// # 에러 분류
///
/// - `SourceRateLimited`, `SourceUnavailable`: 재시도 대상
/// - `SourceMalformedResponse`, `Http`: 즉시 실패
pub trait VulnerabilitySource: Send + Sync + 'static {
    /// 소스 이름 (로그용)
    fn name(&self) -> &str;

    /// 패키지 하나를 조회합니다.
    fn fetch(
        &self,
        query: &PackageQuery,
    ) -> impl Future<Output = Result<Vec<Vulnerability>, ScannerError>> + Send;
}

/// rate limit과 재시도를 적용하는 조회 클라이언트
pub struct VulnerabilityClient<S> {
    source: Arc<S>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    version_filter: bool,
}

impl<S: VulnerabilitySource> VulnerabilityClient<S> {
    /// 새 클라이언트를 생성합니다. 버전 필터는 기본으로 켜져 있습니다.
    pub fn new(source: Arc<S>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            source,
            limiter,
            retry,
            version_filter: true,
        }
    }

    /// 버전 필터 사용 여부를 설정합니다.
    pub fn with_version_filter(mut self, enabled: bool) -> Self {
        self.version_filter = enabled;
        self
    }

    /// 내부 소스
    pub fn source(&self) -> &S {
        &self.source
    }

    /// 공유 rate limiter
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// 패키지 하나의 취약점을 조회합니다.
    ///
    /// # Errors
    ///
    /// - `RateLimitTimeout`: limiter 대기 한도 초과 (재시도하지 않음)
    /// - `SourceUnavailable`: 재시도 소진
    /// - `SourceMalformedResponse`, `Http`: 재시도 대상이 아닌 실패
    pub async fn query(&self, query: &PackageQuery) -> Result<Vec<Vulnerability>, ScannerError> {
        let mut machine = RetryMachine::new(self.retry.clone());
        let mut last_error: Option<ScannerError> = None;

        loop {
            match machine.state() {
                RetryState::Attempting(attempt) => {
                    if let Err(e) = self.limiter.acquire().await {
                        record_query(&e);
                        return Err(e);
                    }

                    match self.source.fetch(query).await {
                        Ok(vulns) => {
                            machine.record(AttemptOutcome::Success);
                            counter!(m::SCANNER_SOURCE_QUERIES_TOTAL, m::LABEL_RESULT => "success")
                                .increment(1);
                            debug!(
                                source = self.source.name(),
                                package = %query.name,
                                attempt,
                                found = vulns.len(),
                                "vulnerability query succeeded"
                            );
                            return Ok(self.finish(query, vulns));
                        }
                        Err(e) => {
                            let outcome = if e.is_retryable() {
                                AttemptOutcome::Retryable
                            } else {
                                AttemptOutcome::Terminal
                            };
                            if let RetryState::Backoff { delay, .. } = machine.record(outcome) {
                                counter!(m::SCANNER_SOURCE_RETRIES_TOTAL).increment(1);
                                warn!(
                                    source = self.source.name(),
                                    package = %query.name,
                                    attempt,
                                    delay_ms = delay.as_millis() as u64,
                                    error = %e,
                                    "vulnerability query failed, retrying"
                                );
                            }
                            last_error = Some(e);
                        }
                    }
                }
                RetryState::Backoff { delay, .. } => {
                    tokio::time::sleep(delay).await;
                    machine.backoff_elapsed();
                }
                RetryState::Succeeded | RetryState::Failed => break,
            }
        }

        let err = match last_error {
            Some(e) if e.is_retryable() => {
                let reason = match e {
                    ScannerError::SourceUnavailable(reason) => reason,
                    other => other.to_string(),
                };
                ScannerError::SourceUnavailable(format!(
                    "{reason} (gave up after {} attempts)",
                    machine.attempts()
                ))
            }
            Some(e) => e,
            None => ScannerError::SourceUnavailable("no attempt was made".to_owned()),
        };
        warn!(
            source = self.source.name(),
            package = %query.name,
            attempts = machine.attempts(),
            error = %err,
            "vulnerability query failed"
        );
        record_query(&err);
        Err(err)
    }

    /// 중복을 제거하고 버전 필터를 적용합니다.
    fn finish(&self, query: &PackageQuery, vulns: Vec<Vulnerability>) -> Vec<Vulnerability> {
        let mut seen = HashSet::with_capacity(vulns.len());
        let mut out: Vec<Vulnerability> = vulns
            .into_iter()
            .filter(|v| seen.insert(v.cve_id.clone()))
            .collect();

        if self.version_filter
            && let Some(ref version) = query.version
        {
            let before = out.len();
            out.retain(|v| version::is_affected(version, &v.ranges) != Some(false));
            if out.len() != before {
                debug!(
                    package = %query.name,
                    version = %version,
                    dropped = before - out.len(),
                    "dropped vulnerabilities outside affected ranges"
                );
            }
        }
        out
    }
}

impl<S> Clone for VulnerabilityClient<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            limiter: Arc::clone(&self.limiter),
            retry: self.retry.clone(),
            version_filter: self.version_filter,
        }
    }
}

impl<S> std::fmt::Debug for VulnerabilityClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulnerabilityClient")
            .field("limiter", &self.limiter)
            .field("retry", &self.retry)
            .field("version_filter", &self.version_filter)
            .finish_non_exhaustive()
    }
}

fn record_query(err: &ScannerError) {
    counter!(m::SCANNER_SOURCE_QUERIES_TOTAL, m::LABEL_RESULT => err.kind()).increment(1);
}

/// 테스트용 mock 소스
///
/// 패키지별 응답, 앞선 N회의 실패, 응답 지연을 설정할 수 있습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockSource {
    vulns: std::collections::HashMap<String, Vec<Vulnerability>>,
    failures: std::sync::Mutex<std::collections::HashMap<String, (u32, MockFailure)>>,
    calls: std::sync::atomic::AtomicUsize,
}

/// mock 실패 종류
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub enum MockFailure {
    /// HTTP 429
    RateLimited,
    /// 연결 실패
    Unavailable,
    /// 잘못된 응답
    Malformed,
}

#[cfg(test)]
impl MockSource {
    /// 빈 mock 소스를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 패키지의 응답을 설정합니다.
    pub fn with_vulns(mut self, name: &str, vulns: Vec<Vulnerability>) -> Self {
        self.vulns.insert(name.to_owned(), vulns);
        self
    }

    /// 처음 `times`번 조회를 실패시킵니다.
    pub fn failing(self, name: &str, times: u32, kind: MockFailure) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(name.to_owned(), (times, kind));
        }
        self
    }

    /// 총 조회 횟수
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl VulnerabilitySource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, query: &PackageQuery) -> Result<Vec<Vulnerability>, ScannerError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let failure = {
            let mut failures = self
                .failures
                .lock()
                .map_err(|_| ScannerError::SourceUnavailable("mock poisoned".to_owned()))?;
            match failures.get_mut(&query.name) {
                Some((remaining, kind)) if *remaining > 0 => {
                    *remaining -= 1;
                    Some(*kind)
                }
                _ => None,
            }
        };
        match failure {
            Some(MockFailure::RateLimited) => Err(ScannerError::SourceRateLimited { status: 429 }),
            Some(MockFailure::Unavailable) => {
                Err(ScannerError::SourceUnavailable("connection refused".to_owned()))
            }
            Some(MockFailure::Malformed) => {
                Err(ScannerError::SourceMalformedResponse("not json".to_owned()))
            }
            None => Ok(self.vulns.get(&query.name).cloned().unwrap_or_default()),
        }
    }
}
