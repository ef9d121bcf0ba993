//! 메트릭 상수 및 설명 등록
//!
//! 스캐너가 기록하는 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않았다면 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `dephealth_`
//! - 모듈명: `scanner_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(dephealth_core::metrics::SCANNER_SCANS_COMPLETED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, empty, rate_limited, unavailable, malformed, error)
pub const LABEL_RESULT: &str = "result";

/// 심각도 레이블 키 (CRITICAL, HIGH, MEDIUM, LOW, UNKNOWN)
pub const LABEL_SEVERITY: &str = "severity";

/// 에코시스템 레이블 키 (python, node)
pub const LABEL_ECOSYSTEM: &str = "ecosystem";

// ─── Scanner 메트릭 ────────────────────────────────────────────────

/// Scanner: 취약점 소스 조회 수 (counter, label: result)
pub const SCANNER_SOURCE_QUERIES_TOTAL: &str = "dephealth_scanner_source_queries_total";

/// Scanner: 429/5xx 재시도 수 (counter)
pub const SCANNER_SOURCE_RETRIES_TOTAL: &str = "dephealth_scanner_source_retries_total";

/// Scanner: rate limiter 대기 시간 (histogram, 초)
pub const SCANNER_RATE_LIMIT_WAIT_SECONDS: &str = "dephealth_scanner_rate_limit_wait_seconds";

/// Scanner: rate limiter 대기 타임아웃 수 (counter)
pub const SCANNER_RATE_LIMIT_TIMEOUTS_TOTAL: &str = "dephealth_scanner_rate_limit_timeouts_total";

/// Scanner: 완료된 스캔 수 (counter)
pub const SCANNER_SCANS_COMPLETED_TOTAL: &str = "dephealth_scanner_scans_completed_total";

/// Scanner: 스캔된 의존성 수 (counter, label: ecosystem)
pub const SCANNER_DEPENDENCIES_SCANNED_TOTAL: &str = "dephealth_scanner_dependencies_scanned_total";

/// Scanner: 발견된 취약점 수 (counter, label: severity)
pub const SCANNER_VULNERABILITIES_FOUND_TOTAL: &str =
    "dephealth_scanner_vulnerabilities_found_total";

/// Scanner: 스캔 소요 시간 (histogram, 초)
pub const SCANNER_SCAN_DURATION_SECONDS: &str = "dephealth_scanner_scan_duration_seconds";

/// 스캔 소요 시간 히스토그램 버킷 (초)
pub const SCAN_DURATION_BUCKETS: &[f64] = &[0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더를 설치한 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        SCANNER_SOURCE_QUERIES_TOTAL,
        "Vulnerability source queries by result"
    );
    describe_counter!(
        SCANNER_SOURCE_RETRIES_TOTAL,
        "Retries after rate limiting or server errors"
    );
    describe_histogram!(
        SCANNER_RATE_LIMIT_WAIT_SECONDS,
        metrics::Unit::Seconds,
        "Time spent waiting for a rate limiter slot"
    );
    describe_counter!(
        SCANNER_RATE_LIMIT_TIMEOUTS_TOTAL,
        "Rate limiter acquisitions that exceeded the maximum wait"
    );
    describe_counter!(
        SCANNER_SCANS_COMPLETED_TOTAL,
        "Total number of completed scans"
    );
    describe_counter!(
        SCANNER_DEPENDENCIES_SCANNED_TOTAL,
        "Dependencies queried against the vulnerability source"
    );
    describe_counter!(
        SCANNER_VULNERABILITIES_FOUND_TOTAL,
        "Vulnerabilities found by severity"
    );
    describe_histogram!(
        SCANNER_SCAN_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Duration of a whole scan"
    );
}
