//! 스캐너 에러 타입
//!
//! [`ScannerError`]는 스캔 엔진 내에서 발생할 수 있는 모든 에러를 나타냅니다.
//! `From<ScannerError> for DephealthError` 구현을 통해 `?` 연산자로
//! 상위 에러 타입으로 전파됩니다.
//!
//! # 에러 카테고리
//!
//! - **manifest**: `ManifestTooLarge`, `ManifestUnparseable` (스캔 전체 실패)
//! - **rate limit**: `RateLimitTimeout` (자체 제한, 네트워크 장애와 구분)
//! - **소스 조회**: `SourceUnavailable`, `SourceRateLimited`, `SourceMalformedResponse`, `Http`
//! - **타임아웃**: `ScanTimedOut` (의존성 단위, 스캔 전체를 실패시키지 않음)
//! - **설정**: `Config`
//!
//! 의존성 단위 에러는 [`DependencyResult::query_error`](crate::report::DependencyResult)
//! 로 기록되고, 호출자에게 전파되는 것은 manifest 에러뿐입니다.

use dephealth_core::error::{ConfigError, DephealthError, ScanError};

/// 스캐너 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    /// manifest 크기 초과 (파싱 전에 거부)
    #[error("manifest too large: {size} bytes (max: {max})")]
    ManifestTooLarge {
        /// 입력 크기 (바이트)
        size: usize,
        /// 최대 허용 크기 (바이트)
        max: usize,
    },

    /// 사용 가능한 의존성이 하나도 없음
    #[error("manifest unparseable: {0}")]
    ManifestUnparseable(String),

    /// rate limiter 대기 시간 초과
    #[error("rate limit wait exceeded after {waited_ms}ms")]
    RateLimitTimeout {
        /// 실제 대기한 시간 (밀리초)
        waited_ms: u64,
    },

    /// 취약점 소스에 연결할 수 없음 (재시도 소진 포함)
    #[error("vulnerability source unavailable: {0}")]
    SourceUnavailable(String),

    /// 취약점 소스가 요청을 제한함 (HTTP 403/429)
    #[error("vulnerability source rate limited the request (HTTP {status})")]
    SourceRateLimited {
        /// HTTP 상태 코드
        status: u16,
    },

    /// 응답을 해석할 수 없음
    #[error("malformed response from vulnerability source: {0}")]
    SourceMalformedResponse(String),

    /// 스캔 전체 타임아웃으로 조회가 취소됨
    #[error("timed out")]
    ScanTimedOut,

    /// 재시도 대상이 아닌 HTTP 상태
    #[error("unexpected HTTP status {status} from vulnerability source")]
    Http {
        /// HTTP 상태 코드
        status: u16,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl ScannerError {
    /// 재시도로 회복될 수 있는 일시적 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceRateLimited { .. } | Self::SourceUnavailable(_)
        )
    }

    /// 메트릭 레이블용 짧은 에러 이름을 반환합니다.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ManifestTooLarge { .. } => "manifest_too_large",
            Self::ManifestUnparseable(_) => "manifest_unparseable",
            Self::RateLimitTimeout { .. } => "rate_limit_timeout",
            Self::SourceUnavailable(_) => "unavailable",
            Self::SourceRateLimited { .. } => "rate_limited",
            Self::SourceMalformedResponse(_) => "malformed",
            Self::ScanTimedOut => "timed_out",
            Self::Http { .. } => "http_error",
            Self::Config { .. } => "config",
        }
    }
}

impl From<ScannerError> for DephealthError {
    fn from(err: ScannerError) -> Self {
        match err {
            ScannerError::ManifestTooLarge { .. } | ScannerError::ManifestUnparseable(_) => {
                DephealthError::Scan(ScanError::ManifestRejected(err.to_string()))
            }
            ScannerError::RateLimitTimeout { .. }
            | ScannerError::SourceUnavailable(_)
            | ScannerError::SourceRateLimited { .. }
            | ScannerError::SourceMalformedResponse(_)
            | ScannerError::Http { .. } => {
                DephealthError::Scan(ScanError::SourceFailed(err.to_string()))
            }
            ScannerError::ScanTimedOut => {
                DephealthError::Scan(ScanError::Internal(err.to_string()))
            }
            ScannerError::Config { field, reason } => {
                DephealthError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_too_large_display() {
        let err = ScannerError::ManifestTooLarge {
            size: 6_000_000,
            max: 5_242_880,
        };
        let msg = err.to_string();
        assert!(msg.contains("6000000"));
        assert!(msg.contains("5242880"));
    }

    #[test]
    fn scan_timed_out_displays_as_timed_out() {
        assert_eq!(ScannerError::ScanTimedOut.to_string(), "timed out");
    }

    #[test]
    fn retryable_classification() {
        assert!(ScannerError::SourceRateLimited { status: 429 }.is_retryable());
        assert!(ScannerError::SourceUnavailable("HTTP 503".to_owned()).is_retryable());
        assert!(!ScannerError::SourceMalformedResponse("eof".to_owned()).is_retryable());
        assert!(!ScannerError::Http { status: 400 }.is_retryable());
        assert!(!ScannerError::RateLimitTimeout { waited_ms: 10 }.is_retryable());
        assert!(!ScannerError::ScanTimedOut.is_retryable());
    }

    #[test]
    fn rate_limit_timeout_is_distinct_from_unavailable() {
        let own = ScannerError::RateLimitTimeout { waited_ms: 60_000 };
        let remote = ScannerError::SourceUnavailable("connection refused".to_owned());
        assert_ne!(own.kind(), remote.kind());
    }

    #[test]
    fn converts_manifest_errors_to_manifest_rejected() {
        let err: DephealthError = ScannerError::ManifestUnparseable("empty".to_owned()).into();
        assert!(matches!(
            err,
            DephealthError::Scan(ScanError::ManifestRejected(_))
        ));
    }

    #[test]
    fn converts_source_errors_to_source_failed() {
        let err: DephealthError = ScannerError::SourceRateLimited { status: 429 }.into();
        assert!(matches!(err, DephealthError::Scan(ScanError::SourceFailed(_))));
    }

    #[test]
    fn converts_config_error_to_invalid_value() {
        let err: DephealthError = ScannerError::Config {
            field: "concurrency".to_owned(),
            reason: "must be 1-64".to_owned(),
        }
        .into();
        match err {
            DephealthError::Config(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "concurrency");
            }
            other => panic!("unexpected conversion: {other:?}"),
        }
    }
}
