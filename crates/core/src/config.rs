//! 설정 관리 -- dephealth.toml 파싱 및 런타임 설정
//!
//! [`DephealthConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`DEPHEALTH_SCAN_CONCURRENCY=16` 형식, `NVD_API_KEY`)
//! 3. 설정 파일 (`dephealth.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), dephealth_core::error::DephealthError> {
//! use dephealth_core::config::DephealthConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = DephealthConfig::load("dephealth.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = DephealthConfig::parse("[scan]\nconcurrency = 4")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DephealthError};

/// NVD CVE API 2.0 기본 엔드포인트
pub const DEFAULT_NVD_BASE_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

/// manifest 최대 크기 기본값 (5 MiB)
pub const DEFAULT_MAX_MANIFEST_SIZE: usize = 5 * 1024 * 1024;

/// 동시 조회 수 상한
pub const MAX_CONCURRENCY: usize = 64;

/// 전체 스캔 타임아웃 상한 (초, 24시간)
pub const MAX_SCAN_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// rate limit 최대 대기 시간 상한 (초, 1시간)
pub const MAX_RATE_LIMIT_WAIT_SECS: u64 = 60 * 60;

/// 관례적인 NVD API 키 환경변수
pub const NVD_API_KEY_ENV: &str = "NVD_API_KEY";

/// dephealth 통합 설정
///
/// `dephealth.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DephealthConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 취약점 소스 설정
    #[serde(default)]
    pub source: SourceConfig,
    /// 스캔 설정
    #[serde(default)]
    pub scan: ScanConfig,
}

impl DephealthConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DephealthError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일이 없으면 기본값에서 시작해 환경변수만 적용합니다.
    ///
    /// CLI처럼 설정 파일이 선택 사항인 경우에 사용합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, DephealthError> {
        let path = path.as_ref();
        let mut config = match Self::from_file(path).await {
            Ok(config) => config,
            Err(DephealthError::Config(ConfigError::FileNotFound { .. })) => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DephealthError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DephealthError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DephealthError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, DephealthError> {
        toml::from_str(toml_str).map_err(|e| {
            DephealthError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `DEPHEALTH_{SECTION}_{FIELD}`
    /// 예: `DEPHEALTH_SCAN_CONCURRENCY=16`
    ///
    /// `NVD_API_KEY`는 `DEPHEALTH_SOURCE_API_KEY`보다 먼저 적용되므로
    /// 둘 다 있으면 후자가 우선합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DEPHEALTH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DEPHEALTH_GENERAL_LOG_FORMAT");

        // Source
        override_string(&mut self.source.base_url, "DEPHEALTH_SOURCE_BASE_URL");
        override_string(&mut self.source.api_key, NVD_API_KEY_ENV);
        override_string(&mut self.source.api_key, "DEPHEALTH_SOURCE_API_KEY");
        override_u64(
            &mut self.source.request_timeout_secs,
            "DEPHEALTH_SOURCE_REQUEST_TIMEOUT_SECS",
        );
        override_u32(
            &mut self.source.results_per_page,
            "DEPHEALTH_SOURCE_RESULTS_PER_PAGE",
        );
        override_u32(&mut self.source.max_retries, "DEPHEALTH_SOURCE_MAX_RETRIES");
        override_u64(
            &mut self.source.retry_base_delay_ms,
            "DEPHEALTH_SOURCE_RETRY_BASE_DELAY_MS",
        );
        override_u64(
            &mut self.source.retry_max_delay_ms,
            "DEPHEALTH_SOURCE_RETRY_MAX_DELAY_MS",
        );
        override_string(&mut self.source.user_agent, "DEPHEALTH_SOURCE_USER_AGENT");

        // Scan
        override_usize(&mut self.scan.concurrency, "DEPHEALTH_SCAN_CONCURRENCY");
        override_u64(
            &mut self.scan.scan_timeout_secs,
            "DEPHEALTH_SCAN_SCAN_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.scan.max_manifest_size,
            "DEPHEALTH_SCAN_MAX_MANIFEST_SIZE",
        );
        override_u64(
            &mut self.scan.rate_limit_max_wait_secs,
            "DEPHEALTH_SCAN_RATE_LIMIT_MAX_WAIT_SECS",
        );
        override_bool(
            &mut self.scan.relevance_filter,
            "DEPHEALTH_SCAN_RELEVANCE_FILTER",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DephealthError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if !self.source.base_url.starts_with("http://")
            && !self.source.base_url.starts_with("https://")
        {
            return Err(invalid(
                "source.base_url",
                "must start with http:// or https://".to_owned(),
            ));
        }

        if self.source.request_timeout_secs == 0 {
            return Err(invalid(
                "source.request_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        // NVD는 페이지당 최대 2000건을 허용
        if self.source.results_per_page == 0 || self.source.results_per_page > 2000 {
            return Err(invalid(
                "source.results_per_page",
                "must be between 1 and 2000".to_owned(),
            ));
        }

        if self.source.max_retries > 10 {
            return Err(invalid(
                "source.max_retries",
                "must be at most 10".to_owned(),
            ));
        }

        if self.source.retry_base_delay_ms > self.source.retry_max_delay_ms {
            return Err(invalid(
                "source.retry_base_delay_ms",
                "must not exceed source.retry_max_delay_ms".to_owned(),
            ));
        }

        if self.scan.concurrency == 0 || self.scan.concurrency > MAX_CONCURRENCY {
            return Err(invalid(
                "scan.concurrency",
                format!("must be between 1 and {MAX_CONCURRENCY}"),
            ));
        }

        if self.scan.scan_timeout_secs == 0
            || self.scan.scan_timeout_secs > MAX_SCAN_TIMEOUT_SECS
        {
            return Err(invalid(
                "scan.scan_timeout_secs",
                format!("must be between 1 and {MAX_SCAN_TIMEOUT_SECS}"),
            ));
        }

        if self.scan.max_manifest_size == 0 {
            return Err(invalid(
                "scan.max_manifest_size",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.scan.rate_limit_max_wait_secs == 0
            || self.scan.rate_limit_max_wait_secs > MAX_RATE_LIMIT_WAIT_SECS
        {
            return Err(invalid(
                "scan.rate_limit_max_wait_secs",
                format!("must be between 1 and {MAX_RATE_LIMIT_WAIT_SECS}"),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> DephealthError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 취약점 소스(NVD) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// CVE API 엔드포인트
    pub base_url: String,
    /// API 키 (빈 문자열이면 키 없음)
    pub api_key: String,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 조회당 결과 수
    pub results_per_page: u32,
    /// 429/5xx 재시도 횟수
    pub max_retries: u32,
    /// 재시도 기본 지연 (밀리초)
    pub retry_base_delay_ms: u64,
    /// 재시도 최대 지연 (밀리초)
    pub retry_max_delay_ms: u64,
    /// User-Agent 헤더
    pub user_agent: String,
}

impl SourceConfig {
    /// API 키가 설정되어 있는지 확인합니다.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_NVD_BASE_URL.to_owned(),
            api_key: String::new(),
            request_timeout_secs: 30,
            results_per_page: 10,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            user_agent: format!("dephealth/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// 스캔 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 동시에 진행되는 의존성 조회 수
    pub concurrency: usize,
    /// 스캔 전체 타임아웃 (초)
    pub scan_timeout_secs: u64,
    /// manifest 최대 크기 (바이트)
    pub max_manifest_size: usize,
    /// rate limiter 최대 대기 시간 (초)
    pub rate_limit_max_wait_secs: u64,
    /// 설명에 패키지 이름이 없는 CVE 제외 여부
    pub relevance_filter: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            scan_timeout_secs: 300,
            max_manifest_size: DEFAULT_MAX_MANIFEST_SIZE,
            rate_limit_max_wait_secs: 60,
            relevance_filter: true,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
