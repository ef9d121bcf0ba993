//! 위험도 분류
//!
//! CVSS 점수/심각도 레이블을 [`Severity`]로 정규화하고,
//! 의존성 하나의 취약점 목록에서 [`RiskLevel`]을 계산합니다.

use dephealth_core::types::{RiskLevel, Severity};

use crate::types::Vulnerability;

/// 위험도 분류기
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskClassifier;

impl RiskClassifier {
    /// CVSS 점수에서 심각도를 계산합니다.
    ///
    /// `>= 9.0` Critical, `>= 7.0` High, `>= 4.0` Medium, `> 0` Low, 그 외 Unknown.
    /// NaN이나 음수도 Unknown입니다.
    pub fn severity_from_cvss(score: f64) -> Severity {
        if score >= 9.0 {
            Severity::Critical
        } else if score >= 7.0 {
            Severity::High
        } else if score >= 4.0 {
            Severity::Medium
        } else if score > 0.0 {
            Severity::Low
        } else {
            Severity::Unknown
        }
    }

    /// 레이블을 우선하고, 없거나 해석할 수 없으면 점수로 심각도를 정합니다.
    ///
    /// 둘 다 없으면 Unknown입니다. 실패하지 않습니다.
    pub fn resolve_severity(label: Option<&str>, score: Option<f64>) -> Severity {
        match label.and_then(Severity::from_str_loose) {
            Some(sev) if sev != Severity::Unknown => sev,
            _ => score.map_or(Severity::Unknown, Self::severity_from_cvss),
        }
    }

    /// 의존성의 위험도를 계산합니다.
    ///
    /// 취약점이 없으면 `None`, 있으면 가장 높은 심각도입니다.
    /// 조회 실패는 호출자가 `RiskLevel::Unknown`으로 따로 표시합니다.
    pub fn classify(vulns: &[Vulnerability]) -> RiskLevel {
        vulns
            .iter()
            .map(|v| v.severity)
            .max()
            .map_or(RiskLevel::None, RiskLevel::from)
    }

    /// 심각도 내림차순, 같은 심각도는 `cve_id` 오름차순으로 정렬합니다.
    pub fn sort_vulnerabilities(vulns: &mut [Vulnerability]) {
        vulns.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.cve_id.cmp(&b.cve_id))
        });
    }
}
