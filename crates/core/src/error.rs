//! 에러 타입 -- 도메인별 에러 정의

/// dephealth 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum DephealthError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스캔 처리 에러
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스캔 에러
///
/// 스캐너 크레이트의 세부 에러를 상위 계층에서 다루기 위한 요약 형태입니다.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// manifest가 거부됨 (크기 초과, 사용 가능한 의존성 없음)
    #[error("manifest rejected: {0}")]
    ManifestRejected(String),

    /// 외부 취약점 소스 조회 실패
    #[error("vulnerability source failed: {0}")]
    SourceFailed(String),

    /// 내부 처리 실패
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: DephealthError = ConfigError::ParseFailed {
            reason: "bad toml".to_owned(),
        }
        .into();
        assert!(matches!(err, DephealthError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn scan_error_display() {
        let err = ScanError::ManifestRejected("no dependencies".to_owned());
        assert_eq!(err.to_string(), "manifest rejected: no dependencies");
    }

    #[test]
    fn io_error_converts_to_top_level() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DephealthError = io_err.into();
        assert!(matches!(err, DephealthError::Io(_)));
    }

    #[test]
    fn invalid_value_mentions_field() {
        let err = ConfigError::InvalidValue {
            field: "scan.concurrency".to_owned(),
            reason: "must be 1-64".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("scan.concurrency"));
        assert!(msg.contains("must be 1-64"));
    }
}
