//! 스캔 리포트 -- 의존성별 결과와 전체 집계
//!
//! [`ResultAggregator`]는 모든 의존성 결과가 정리된 뒤 한 번에 [`ScanReport`]를
//! 만듭니다. 리포트는 만들어진 뒤 변경되지 않습니다.
//!
//! # 불변 조건
//!
//! - `vulnerable_dependencies <= total_dependencies`
//! - `vulnerabilities_found == Σ results[i].vulnerabilities.len()`
//! - `risk_summary`의 합 == `total_dependencies` (모든 의존성이 정확히 한 버킷)
//! - `results`는 입력 순서 그대로

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dephealth_core::types::{RiskLevel, Severity};

use crate::classify::RiskClassifier;
use crate::manifest::ParseWarning;
use crate::types::{DependencyRecord, Ecosystem, PackageQuery, Vulnerability};

/// 버전을 알 수 없을 때 표시하는 값
pub const ANY_VERSION: &str = "any";

/// 리포트에 표시하는 의존성 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySummary {
    /// 패키지 이름
    pub name: String,
    /// 대표 버전 (`==` 고정이 없으면 `"any"`)
    pub version: String,
    /// 에코시스템
    #[serde(rename = "type")]
    pub ecosystem: Ecosystem,
}

impl DependencySummary {
    /// manifest 레코드에서 요약을 만듭니다.
    pub fn from_record(record: &DependencyRecord) -> Self {
        Self::from_query(&PackageQuery::from_record(record))
    }

    /// 직접 조회에서 요약을 만듭니다.
    pub fn from_query(query: &PackageQuery) -> Self {
        Self {
            name: query.name.clone(),
            version: query
                .version
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| ANY_VERSION.to_owned()),
            ecosystem: query.ecosystem,
        }
    }
}

/// 의존성 하나의 스캔 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyResult {
    /// 의존성 요약
    pub dependency: DependencySummary,
    /// 중복 제거 후 심각도 순으로 정렬된 취약점
    pub vulnerabilities: Vec<Vulnerability>,
    /// 취약점이 하나라도 있는지
    pub is_vulnerable: bool,
    /// 위험 수준
    pub risk_level: RiskLevel,
    /// 조회 실패 사유
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_error: Option<String>,
}

impl DependencyResult {
    /// 조회에 성공한 결과를 만듭니다. 취약점은 정렬됩니다.
    pub fn completed(dependency: DependencySummary, mut vulnerabilities: Vec<Vulnerability>) -> Self {
        RiskClassifier::sort_vulnerabilities(&mut vulnerabilities);
        let risk_level = RiskClassifier::classify(&vulnerabilities);
        Self {
            dependency,
            is_vulnerable: !vulnerabilities.is_empty(),
            vulnerabilities,
            risk_level,
            query_error: None,
        }
    }

    /// 조회에 실패한 결과를 만듭니다. 위험 수준은 `Unknown`입니다.
    pub fn failed(dependency: DependencySummary, error: impl Into<String>) -> Self {
        Self {
            dependency,
            vulnerabilities: Vec::new(),
            is_vulnerable: false,
            risk_level: RiskLevel::Unknown,
            query_error: Some(error.into()),
        }
    }

    /// 가중 위험 점수 (CRITICAL 10, HIGH 7, MEDIUM 4, LOW 2, UNKNOWN 1)
    pub fn risk_score(&self) -> u32 {
        self.vulnerabilities
            .iter()
            .map(|v| match v.severity {
                Severity::Critical => 10,
                Severity::High => 7,
                Severity::Medium => 4,
                Severity::Low => 2,
                Severity::Unknown => 1,
            })
            .sum()
    }
}

/// 위험 수준별 의존성 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    /// CRITICAL
    #[serde(rename = "CRITICAL")]
    pub critical: usize,
    /// HIGH
    #[serde(rename = "HIGH")]
    pub high: usize,
    /// MEDIUM
    #[serde(rename = "MEDIUM")]
    pub medium: usize,
    /// LOW
    #[serde(rename = "LOW")]
    pub low: usize,
    /// UNKNOWN
    #[serde(rename = "UNKNOWN")]
    pub unknown: usize,
    /// NONE
    #[serde(rename = "NONE")]
    pub none: usize,
}

impl RiskSummary {
    /// 버킷 값
    pub fn get(&self, level: RiskLevel) -> usize {
        match level {
            RiskLevel::Critical => self.critical,
            RiskLevel::High => self.high,
            RiskLevel::Medium => self.medium,
            RiskLevel::Low => self.low,
            RiskLevel::Unknown => self.unknown,
            RiskLevel::None => self.none,
        }
    }

    /// 버킷을 1 증가시킵니다.
    pub fn increment(&mut self, level: RiskLevel) {
        let slot = match level {
            RiskLevel::Critical => &mut self.critical,
            RiskLevel::High => &mut self.high,
            RiskLevel::Medium => &mut self.medium,
            RiskLevel::Low => &mut self.low,
            RiskLevel::Unknown => &mut self.unknown,
            RiskLevel::None => &mut self.none,
        };
        *slot += 1;
    }

    /// 모든 버킷의 합
    pub fn total(&self) -> usize {
        RiskLevel::DESCENDING.iter().map(|l| self.get(*l)).sum()
    }
}

/// 스캔 전체 리포트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// 스캔 ID (UUID v4)
    pub scan_id: String,
    /// 전체 의존성 수
    pub total_dependencies: usize,
    /// 취약점이 있는 의존성 수
    pub vulnerable_dependencies: usize,
    /// 전체 취약점 수
    pub vulnerabilities_found: usize,
    /// 위험 수준별 의존성 수
    pub risk_summary: RiskSummary,
    /// 입력 순서대로의 의존성 결과
    pub results: Vec<DependencyResult>,
    /// 집계 시각
    pub scan_timestamp: DateTime<Utc>,
    /// manifest 파싱 경고
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_warnings: Vec<ParseWarning>,
}

impl ScanReport {
    /// 심각도별 취약점 수 (의존성이 아닌 취약점 단위)
    pub fn severity_breakdown(&self) -> BTreeMap<Severity, usize> {
        let mut counts: BTreeMap<Severity, usize> =
            Severity::DESCENDING.iter().map(|s| (*s, 0)).collect();
        for vuln in self.results.iter().flat_map(|r| &r.vulnerabilities) {
            *counts.entry(vuln.severity).or_default() += 1;
        }
        counts
    }

    /// 위험 수준별 의존성 이름 목록
    ///
    /// `risk_summary`에서 파생된 보기이며, 각 목록의 길이는 해당 버킷 수와 같습니다.
    pub fn dependency_risk_summary(&self) -> BTreeMap<RiskLevel, Vec<String>> {
        let mut names: BTreeMap<RiskLevel, Vec<String>> = RiskLevel::DESCENDING
            .iter()
            .map(|l| (*l, Vec::new()))
            .collect();
        for result in &self.results {
            names
                .entry(result.risk_level)
                .or_default()
                .push(result.dependency.name.clone());
        }
        names
    }

    /// 가장 높은 위험 수준 (결과가 없으면 `None`)
    pub fn overall_risk(&self) -> RiskLevel {
        self.results
            .iter()
            .map(|r| r.risk_level)
            .max()
            .unwrap_or_default()
    }

    /// 조회에 실패한 의존성 수
    pub fn failed_dependencies(&self) -> usize {
        self.results.iter().filter(|r| r.query_error.is_some()).count()
    }

    /// 주어진 수준 이상인 의존성이 있는지 확인합니다.
    pub fn has_risk_at_or_above(&self, threshold: RiskLevel) -> bool {
        self.results.iter().any(|r| r.risk_level >= threshold)
    }
}

/// 결과 집계기
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    /// 결과 목록을 한 번 순회하며 리포트를 만듭니다.
    ///
    /// `scan_timestamp`는 호출 시각입니다.
    pub fn aggregate(results: Vec<DependencyResult>) -> ScanReport {
        Self::aggregate_with_warnings(results, Vec::new())
    }

    /// 파싱 경고를 함께 담아 리포트를 만듭니다.
    pub fn aggregate_with_warnings(
        results: Vec<DependencyResult>,
        parse_warnings: Vec<ParseWarning>,
    ) -> ScanReport {
        let mut risk_summary = RiskSummary::default();
        let mut vulnerable_dependencies = 0;
        let mut vulnerabilities_found = 0;

        for result in &results {
            risk_summary.increment(result.risk_level);
            if result.is_vulnerable {
                vulnerable_dependencies += 1;
            }
            vulnerabilities_found += result.vulnerabilities.len();
        }

        ScanReport {
            scan_id: uuid::Uuid::new_v4().to_string(),
            total_dependencies: results.len(),
            vulnerable_dependencies,
            vulnerabilities_found,
            risk_summary,
            results,
            scan_timestamp: Utc::now(),
            parse_warnings,
        }
    }
}
