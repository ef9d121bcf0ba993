//! 스캐너 설정
//!
//! [`ScannerConfig`]는 core의 [`SourceConfig`](dephealth_core::config::SourceConfig)와
//! [`ScanConfig`](dephealth_core::config::ScanConfig)를 하나로 합치고
//! 스캐너 고유 설정(jitter, 버전 필터)을 추가합니다.
//!
//! # 사용 예시
//!
//! ```
//! use dephealth_scanner::ScannerConfigBuilder;
//!
//! let config = ScannerConfigBuilder::new()
//!     .api_key("my-nvd-key")
//!     .concurrency(4)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.rate_limit_policy().max_requests, 50);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use dephealth_core::config::{
    DEFAULT_MAX_MANIFEST_SIZE, DEFAULT_NVD_BASE_URL, MAX_CONCURRENCY, MAX_RATE_LIMIT_WAIT_SECS,
    MAX_SCAN_TIMEOUT_SECS,
};

use crate::error::ScannerError;
use crate::source::retry::RetryPolicy;

/// 설정 상한값 상수
const MAX_MANIFEST_SIZE_LIMIT: usize = 64 * 1024 * 1024;
const MAX_RETRIES_LIMIT: u32 = 10;

/// rate limit 정책 (윈도우 W 동안 최대 K회)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// 윈도우당 최대 요청 수 (K)
    pub max_requests: usize,
    /// 윈도우 길이 (W)
    pub window: Duration,
}

impl RateLimitPolicy {
    /// NVD 공개 한도: API 키 없이 30초당 5회
    pub const ANONYMOUS: Self = Self {
        max_requests: 5,
        window: Duration::from_secs(30),
    };

    /// NVD 공개 한도: API 키 사용 시 30초당 50회
    pub const WITH_API_KEY: Self = Self {
        max_requests: 50,
        window: Duration::from_secs(30),
    };

    /// API 키 유무에 맞는 정책을 반환합니다.
    pub fn for_api_key(has_key: bool) -> Self {
        if has_key {
            Self::WITH_API_KEY
        } else {
            Self::ANONYMOUS
        }
    }
}

/// 스캐너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// CVE API 엔드포인트
    pub base_url: String,
    /// API 키
    pub api_key: Option<String>,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 조회당 결과 수
    pub results_per_page: u32,
    /// User-Agent 헤더
    pub user_agent: String,
    /// 재시도 횟수
    pub max_retries: u32,
    /// 재시도 기본 지연 (밀리초)
    pub retry_base_delay_ms: u64,
    /// 재시도 최대 지연 (밀리초)
    pub retry_max_delay_ms: u64,
    /// 동시 조회 수
    pub concurrency: usize,
    /// 스캔 전체 타임아웃 (초)
    pub scan_timeout_secs: u64,
    /// manifest 최대 크기 (바이트)
    pub max_manifest_size: usize,
    /// rate limiter 최대 대기 (초)
    pub rate_limit_max_wait_secs: u64,
    /// 관련성 필터 (설명에 패키지 이름이 없는 CVE 제외)
    pub relevance_filter: bool,

    // --- 모듈 고유 확장 ---
    /// 재시도 지연에 jitter 적용
    pub retry_jitter: bool,
    /// 고정 버전이 영향 범위 밖인 CVE 제외
    pub version_filter: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_NVD_BASE_URL.to_owned(),
            api_key: None,
            request_timeout_secs: 30,
            results_per_page: 10,
            user_agent: format!("dephealth/{}", env!("CARGO_PKG_VERSION")),
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            concurrency: 8,
            scan_timeout_secs: 300,
            max_manifest_size: DEFAULT_MAX_MANIFEST_SIZE,
            rate_limit_max_wait_secs: 60,
            relevance_filter: true,
            retry_jitter: true,
            version_filter: true,
        }
    }
}

impl ScannerConfig {
    /// core 설정에서 스캐너 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값을 사용합니다.
    pub fn from_core(core: &dephealth_core::config::DephealthConfig) -> Self {
        let api_key = core
            .source
            .has_api_key()
            .then(|| core.source.api_key.trim().to_owned());

        Self {
            base_url: core.source.base_url.clone(),
            api_key,
            request_timeout_secs: core.source.request_timeout_secs,
            results_per_page: core.source.results_per_page,
            user_agent: core.source.user_agent.clone(),
            max_retries: core.source.max_retries,
            retry_base_delay_ms: core.source.retry_base_delay_ms,
            retry_max_delay_ms: core.source.retry_max_delay_ms,
            concurrency: core.scan.concurrency,
            scan_timeout_secs: core.scan.scan_timeout_secs,
            max_manifest_size: core.scan.max_manifest_size,
            rate_limit_max_wait_secs: core.scan.rate_limit_max_wait_secs,
            relevance_filter: core.scan.relevance_filter,
            ..Self::default()
        }
    }

    /// API 키 유무에 따른 rate limit 정책
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::for_api_key(self.api_key.is_some())
    }

    /// 재시도 정책
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter: self.retry_jitter,
        }
    }

    /// 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 스캔 전체 타임아웃
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// rate limiter 최대 대기 시간
    pub fn rate_limit_max_wait(&self) -> Duration {
        Duration::from_secs(self.rate_limit_max_wait_secs)
    }

    /// 설정 값의 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    ///
    /// - `base_url`: http:// 또는 https://
    /// - `concurrency`: 1-64
    /// - `results_per_page`: 1-2000
    /// - `max_retries`: 0-10
    /// - `retry_base_delay_ms` <= `retry_max_delay_ms`
    /// - 타임아웃, 최대 대기: 0보다 커야 함
    /// - `max_manifest_size`: 1-64MiB
    pub fn validate(&self) -> Result<(), ScannerError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(config_err("base_url", "must start with http:// or https://"));
        }

        if self.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err(config_err("api_key", "must not be blank when set"));
        }

        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(config_err(
                "concurrency",
                &format!("must be 1-{MAX_CONCURRENCY}"),
            ));
        }

        if self.results_per_page == 0 || self.results_per_page > 2000 {
            return Err(config_err("results_per_page", "must be 1-2000"));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(config_err(
                "max_retries",
                &format!("must be 0-{MAX_RETRIES_LIMIT}"),
            ));
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(config_err(
                "retry_base_delay_ms",
                "must not exceed retry_max_delay_ms",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(config_err("request_timeout_secs", "must be greater than 0"));
        }

        if self.scan_timeout_secs == 0 || self.scan_timeout_secs > MAX_SCAN_TIMEOUT_SECS {
            return Err(config_err(
                "scan_timeout_secs",
                &format!("must be 1-{MAX_SCAN_TIMEOUT_SECS}"),
            ));
        }

        if self.rate_limit_max_wait_secs == 0
            || self.rate_limit_max_wait_secs > MAX_RATE_LIMIT_WAIT_SECS
        {
            return Err(config_err(
                "rate_limit_max_wait_secs",
                &format!("must be 1-{MAX_RATE_LIMIT_WAIT_SECS}"),
            ));
        }

        if self.max_manifest_size == 0 || self.max_manifest_size > MAX_MANIFEST_SIZE_LIMIT {
            return Err(config_err(
                "max_manifest_size",
                &format!("must be 1-{MAX_MANIFEST_SIZE_LIMIT}"),
            ));
        }

        Ok(())
    }
}

fn config_err(field: &str, reason: &str) -> ScannerError {
    ScannerError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// [`ScannerConfig`] 빌더
///
/// 빌드 시 유효성 검증을 수행합니다.
#[derive(Default)]
pub struct ScannerConfigBuilder {
    config: ScannerConfig,
}

impl ScannerConfigBuilder {
    /// 기본값을 가진 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기존 설정에서 시작합니다.
    pub fn from_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// CVE API 엔드포인트를 설정합니다.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// API 키를 설정합니다.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// 요청 타임아웃(초)을 설정합니다.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// 조회당 결과 수를 설정합니다.
    pub fn results_per_page(mut self, n: u32) -> Self {
        self.config.results_per_page = n;
        self
    }

    /// 재시도 횟수를 설정합니다.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    /// 재시도 지연 범위(밀리초)를 설정합니다.
    pub fn retry_delays_ms(mut self, base: u64, max: u64) -> Self {
        self.config.retry_base_delay_ms = base;
        self.config.retry_max_delay_ms = max;
        self
    }

    /// 재시도 jitter 사용 여부를 설정합니다.
    pub fn retry_jitter(mut self, enabled: bool) -> Self {
        self.config.retry_jitter = enabled;
        self
    }

    /// 동시 조회 수를 설정합니다.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    /// 스캔 전체 타임아웃(초)을 설정합니다.
    pub fn scan_timeout_secs(mut self, secs: u64) -> Self {
        self.config.scan_timeout_secs = secs;
        self
    }

    /// manifest 최대 크기(바이트)를 설정합니다.
    pub fn max_manifest_size(mut self, size: usize) -> Self {
        self.config.max_manifest_size = size;
        self
    }

    /// rate limiter 최대 대기(초)를 설정합니다.
    pub fn rate_limit_max_wait_secs(mut self, secs: u64) -> Self {
        self.config.rate_limit_max_wait_secs = secs;
        self
    }

    /// 관련성 필터 사용 여부를 설정합니다.
    pub fn relevance_filter(mut self, enabled: bool) -> Self {
        self.config.relevance_filter = enabled;
        self
    }

    /// 버전 필터 사용 여부를 설정합니다.
    pub fn version_filter(mut self, enabled: bool) -> Self {
        self.config.version_filter = enabled;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    ///
    /// # Errors
    ///
    /// 유효성 검증 실패 시 `ScannerError::Config` 반환
    pub fn build(self) -> Result<ScannerConfig, ScannerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
