//! 도메인 타입 -- 심각도와 위험 수준
//!
//! [`Severity`]는 단일 취약점의 심각도 버킷이고,
//! [`RiskLevel`]은 의존성 하나(또는 스캔 전체)에 부여되는 위험 수준입니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 취약점 심각도
///
/// `Ord` 구현으로 비교가 가능합니다 (`Unknown < Low < Medium < High < Critical`).
/// 직렬화 시 대문자 문자열(`"CRITICAL"`)을 사용합니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// 심각도를 판별할 수 없음
    #[default]
    Unknown,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적
    Critical,
}

impl Severity {
    /// 높은 순서로 나열한 전체 심각도
    pub const DESCENDING: [Severity; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Unknown,
    ];

    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다. 알 수 없는 값은 `None`입니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" | "crit" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" | "med" | "moderate" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "unknown" | "none" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// 대문자 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 의존성 위험 수준
///
/// `CRITICAL > HIGH > MEDIUM > LOW > UNKNOWN > NONE` 순서입니다.
///
/// - `None`: 조회에 성공했고 취약점이 없음
/// - `Unknown`: 조회 자체가 실패했거나, 취약점의 심각도를 알 수 없음
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// 취약점 없음
    #[default]
    None,
    /// 알 수 없음
    Unknown,
    /// 낮음
    Low,
    /// 중간
    Medium,
    /// 높음
    High,
    /// 치명적
    Critical,
}

impl RiskLevel {
    /// 높은 순서로 나열한 전체 위험 수준 (리포트 버킷 순서)
    pub const DESCENDING: [RiskLevel; 6] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Unknown,
        Self::None,
    ];

    /// 문자열에서 위험 수준을 파싱합니다 (대소문자 구분 없음).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(Self::None),
            other => Severity::from_str_loose(other)
                .filter(|_| other != "none")
                .map(Self::from),
        }
    }

    /// 대문자 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unknown => "UNKNOWN",
            Self::None => "NONE",
        }
    }
}

impl From<Severity> for RiskLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Self::Critical,
            Severity::High => Self::High,
            Severity::Medium => Self::Medium,
            Severity::Low => Self::Low,
            Severity::Unknown => Self::Unknown,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Unknown < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_from_str_loose() {
        assert_eq!(Severity::from_str_loose("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::from_str_loose("high"), Some(Severity::High));
        assert_eq!(Severity::from_str_loose(" Moderate "), Some(Severity::Medium));
        assert_eq!(Severity::from_str_loose("Unknown"), Some(Severity::Unknown));
        assert_eq!(Severity::from_str_loose("severe"), None);
    }

    #[test]
    fn severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, "\"HIGH\"");
        let parsed: Severity = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(parsed, Severity::Critical);
    }

    #[test]
    fn risk_level_ordering_puts_none_last() {
        assert!(RiskLevel::None < RiskLevel::Unknown);
        assert!(RiskLevel::Unknown < RiskLevel::Low);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(
            RiskLevel::DESCENDING.iter().max(),
            Some(&RiskLevel::Critical)
        );
    }

    #[test]
    fn risk_level_from_severity() {
        assert_eq!(RiskLevel::from(Severity::Critical), RiskLevel::Critical);
        assert_eq!(RiskLevel::from(Severity::Unknown), RiskLevel::Unknown);
    }

    #[test]
    fn risk_level_from_str_loose() {
        assert_eq!(RiskLevel::from_str_loose("none"), Some(RiskLevel::None));
        assert_eq!(RiskLevel::from_str_loose("HIGH"), Some(RiskLevel::High));
        assert_eq!(RiskLevel::from_str_loose("unknown"), Some(RiskLevel::Unknown));
        assert_eq!(RiskLevel::from_str_loose("bogus"), None);
    }

    #[test]
    fn risk_level_display() {
        assert_eq!(RiskLevel::None.to_string(), "NONE");
        assert_eq!(RiskLevel::Medium.to_string(), "MEDIUM");
    }
}
