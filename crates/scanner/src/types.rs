//! 스캐너 도메인 타입
//!
//! manifest 파싱 결과인 [`DependencyRecord`]와 소스 조회 결과인
//! [`Vulnerability`]를 정의합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dephealth_core::types::Severity;

/// 패키지 에코시스템
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    /// Python (PyPI, requirements.txt)
    #[default]
    Python,
    /// Node.js (npm, package.json)
    Node,
}

impl Ecosystem {
    /// 문자열에서 에코시스템을 파싱합니다 (대소문자 구분 없음).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "python" | "pypi" | "pip" => Some(Self::Python),
            "node" | "npm" | "nodejs" | "javascript" => Some(Self::Node),
            _ => None,
        }
    }

    /// 소문자 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Node => "node",
        }
    }

    /// 에코시스템 규칙에 따라 패키지 이름을 정규화합니다.
    ///
    /// - Python: PEP 503 (소문자, `-_.` 연속은 `-` 하나로)
    /// - Node: 그대로 유지
    pub fn normalize_name(&self, name: &str) -> String {
        match self {
            Self::Python => normalize_pep503(name),
            Self::Node => name.trim().to_owned(),
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_pep503(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
                in_separator = true;
            }
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

/// 버전 제약 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `===` (PEP 440 arbitrary equality, 문자열 그대로 비교)
    #[serde(rename = "===")]
    ArbitraryEq,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `~=` (PEP 440 compatible release)
    #[serde(rename = "~=")]
    Compatible,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `^` (npm caret range)
    #[serde(rename = "^")]
    Caret,
    /// `~` (npm tilde range)
    #[serde(rename = "~")]
    Tilde,
}

impl Operator {
    /// 연산자 기호를 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::ArbitraryEq => "===",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Compatible => "~=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Caret => "^",
            Self::Tilde => "~",
        }
    }

    /// 기호에서 연산자를 파싱합니다.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(Self::Eq),
            "===" => Some(Self::ArbitraryEq),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            "~=" => Some(Self::Compatible),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            "^" => Some(Self::Caret),
            "~" => Some(Self::Tilde),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 단일 버전 제약 (연산자, 버전)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionConstraint {
    /// 연산자
    pub op: Operator,
    /// 버전 문자열
    pub version: String,
}

impl VersionConstraint {
    /// 새 제약을 생성합니다.
    pub fn new(op: Operator, version: impl Into<String>) -> Self {
        Self {
            op,
            version: version.into(),
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

/// 의존성이 선언된 원본 위치
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    /// 1부터 시작하는 줄 번호
    pub line_number: usize,
    /// 원본 줄 내용
    pub text: String,
}

/// manifest에 선언된 의존성 하나
///
/// 이름이 없는 레코드는 만들어지지 않습니다. 파서는 그런 줄을
/// [`ParseWarning`](crate::manifest::ParseWarning)으로 보고합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// 정규화된 패키지 이름
    pub name: String,
    /// 에코시스템
    pub ecosystem: Ecosystem,
    /// 선언 순서대로의 버전 제약 (비어 있으면 unpinned)
    pub constraints: Vec<VersionConstraint>,
    /// extras (`pkg[security]`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
    /// 환경 마커 (`python_version < "3.8"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// 원본 위치
    pub source: SourceLine,
}

impl DependencyRecord {
    /// 제약 목록을 `>=1.0,<2.0` 형식으로 렌더링합니다.
    pub fn render_constraints(&self) -> String {
        self.constraints
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// requirements.txt 한 줄 형식으로 렌더링합니다.
    pub fn to_requirement_line(&self) -> String {
        let mut line = self.name.clone();
        if !self.extras.is_empty() {
            line.push('[');
            line.push_str(&self.extras.join(","));
            line.push(']');
        }
        line.push_str(&self.render_constraints());
        if let Some(marker) = &self.marker {
            line.push_str("; ");
            line.push_str(marker);
        }
        line
    }

    /// 조회에 사용할 대표 버전을 반환합니다.
    ///
    /// 정확한 `==`/`===` 고정 버전만 해당하며, 그 외에는 `None`입니다.
    pub fn resolved_version(&self) -> Option<&str> {
        self.constraints
            .iter()
            .find(|c| matches!(c.op, Operator::Eq | Operator::ArbitraryEq))
            .map(|c| c.version.as_str())
    }
}

/// 취약점 참조 링크
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// URL
    pub url: String,
    /// 제공처
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// 영향 버전 범위 (CPE match 기반)
///
/// 네 경계 모두 선택 사항이며, 없는 경계는 제한이 없음을 뜻합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRange {
    /// 이 버전부터 영향 (포함)
    pub start_including: Option<String>,
    /// 이 버전 초과부터 영향
    pub start_excluding: Option<String>,
    /// 이 버전까지 영향 (포함)
    pub end_including: Option<String>,
    /// 이 버전 미만까지 영향 (이 버전에서 수정됨)
    pub end_excluding: Option<String>,
}

/// 조회로 찾은 취약점 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// CVE ID (의존성 결과 내 중복 제거 키)
    pub cve_id: String,
    /// 설명
    pub description: String,
    /// 심각도 (점수가 없으면 UNKNOWN)
    pub severity: Severity,
    /// CVSS 기본 점수 (0.0-10.0)
    pub cvss_score: Option<f64>,
    /// 공개 시각
    pub published_date: Option<DateTime<Utc>>,
    /// 최종 수정 시각
    pub last_modified_date: Option<DateTime<Utc>>,
    /// 영향 버전 경계
    #[serde(default)]
    pub affected_versions: Vec<String>,
    /// 수정 버전
    #[serde(default)]
    pub fixed_versions: Vec<String>,
    /// 참조 링크 (최대 3개)
    #[serde(default)]
    pub references: Vec<Reference>,
    /// 버전 필터용 범위 (출력하지 않음)
    #[serde(skip)]
    pub ranges: Vec<VersionRange>,
}

impl Vulnerability {
    /// 최소 필드로 취약점을 생성합니다.
    pub fn new(cve_id: impl Into<String>, severity: Severity) -> Self {
        Self {
            cve_id: cve_id.into(),
            description: String::new(),
            severity,
            cvss_score: None,
            published_date: None,
            last_modified_date: None,
            affected_versions: Vec::new(),
            fixed_versions: Vec::new(),
            references: Vec::new(),
            ranges: Vec::new(),
        }
    }

    /// 설명을 설정합니다.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// CVSS 점수를 설정합니다.
    pub fn with_cvss_score(mut self, score: f64) -> Self {
        self.cvss_score = Some(score);
        self
    }
}

/// manifest 없이 직접 조회할 패키지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageQuery {
    /// 패키지 이름
    pub name: String,
    /// 버전 (없으면 이름만으로 조회)
    #[serde(default)]
    pub version: Option<String>,
    /// 에코시스템
    #[serde(default, alias = "type")]
    pub ecosystem: Ecosystem,
}

impl PackageQuery {
    /// 새 조회를 생성합니다.
    pub fn new(name: impl Into<String>, version: Option<String>, ecosystem: Ecosystem) -> Self {
        Self {
            name: name.into(),
            version,
            ecosystem,
        }
    }

    /// manifest 레코드에서 조회를 만듭니다.
    ///
    /// 버전은 `==` 고정일 때만 채워지고, 그 외에는 이름만으로 조회합니다.
    pub fn from_record(record: &DependencyRecord) -> Self {
        Self {
            name: record.name.clone(),
            version: record.resolved_version().map(str::to_owned),
            ecosystem: record.ecosystem,
        }
    }
}
