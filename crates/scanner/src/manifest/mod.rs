//! manifest 파서 -- requirements.txt, package.json, 원문 텍스트
//!
//! [`ManifestParser`]는 호출자가 지정한 [`ManifestFormat`]에 따라 알맞은
//! [`ManifestGrammar`] 구현으로 내용을 넘기고, 선언 순서 그대로의
//! [`DependencyRecord`] 목록과 [`ParseWarning`] 목록을 돌려줍니다.
//!
//! # 지원 형식
//!
//! - `requirements.txt` -- [`RequirementsParser`]
//! - `package.json` -- [`PackageJsonParser`]
//! - 원문 텍스트 -- requirements 문법을 먼저 시도하고, 레코드가 없으면
//!   전체 내용을 한 줄로 취급
//!
//! 크기 제한을 넘는 입력은 파싱 전에 `ManifestTooLarge`로 거부됩니다.
//! 잘못된 줄은 경고로 남기고 건너뛰며, 전체 파싱을 중단하지 않습니다.

pub mod package_json;
pub mod requirements;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use dephealth_core::config::DEFAULT_MAX_MANIFEST_SIZE;

use crate::error::ScannerError;
use crate::types::{DependencyRecord, Ecosystem};

pub use package_json::PackageJsonParser;
pub use requirements::RequirementsParser;

/// manifest 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestFormat {
    /// Python requirements.txt
    RequirementsTxt,
    /// Node package.json
    PackageJson,
    /// 형식을 모르는 원문 텍스트
    RawText,
}

impl ManifestFormat {
    /// 문자열에서 형식을 파싱합니다 (대소문자 구분 없음).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "requirements" | "requirements_txt" | "requirements.txt" | "pip" => {
                Some(Self::RequirementsTxt)
            }
            "package-json" | "package_json" | "package.json" | "npm" => Some(Self::PackageJson),
            "raw" | "raw_text" | "text" => Some(Self::RawText),
            _ => None,
        }
    }

    /// 파일 이름으로 형식을 추정합니다.
    ///
    /// `package.json` → PackageJson, `*.txt` / `*.in` → RequirementsTxt,
    /// 그 외에는 RawText입니다.
    pub fn from_file_name(file_name: &str) -> Self {
        let lower = file_name.to_lowercase();
        if lower == "package.json" {
            Self::PackageJson
        } else if lower.ends_with(".txt") || lower.ends_with(".in") {
            Self::RequirementsTxt
        } else {
            Self::RawText
        }
    }

    /// 형식 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequirementsTxt => "requirements_txt",
            Self::PackageJson => "package_json",
            Self::RawText => "raw_text",
        }
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 줄 단위 파싱 경고 (치명적이지 않음)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// 1부터 시작하는 줄 번호
    pub line_number: usize,
    /// 원본 줄 내용
    pub line: String,
    /// 경고 사유
    pub reason: String,
}

impl ParseWarning {
    /// 새 경고를 생성합니다.
    pub fn new(line_number: usize, line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            line_number,
            line: line.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({})", self.line_number, self.reason, self.line)
    }
}

/// 파싱 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedManifest {
    /// 선언 순서대로의 의존성
    pub records: Vec<DependencyRecord>,
    /// 건너뛴 줄에 대한 경고
    pub warnings: Vec<ParseWarning>,
}

impl ParsedManifest {
    /// 사용 가능한 의존성이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// manifest 문법 trait
///
/// 각 형식의 파서가 구현합니다. 크기 검사는 [`ManifestParser`]가 먼저 수행합니다.
pub trait ManifestGrammar: Send + Sync {
    /// 이 문법이 만드는 레코드의 에코시스템
    fn ecosystem(&self) -> Ecosystem;

    /// 내용을 파싱합니다.
    ///
    /// 문서 전체를 해석할 수 없을 때만 에러를 반환합니다.
    fn parse(&self, content: &str) -> Result<ParsedManifest, ScannerError>;
}

/// manifest 파서
///
/// 같은 입력 바이트는 항상 같은 결과를 만듭니다.
#[derive(Debug, Clone)]
pub struct ManifestParser {
    max_size: usize,
}

impl Default for ManifestParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MANIFEST_SIZE)
    }
}

impl ManifestParser {
    /// 최대 크기를 지정해 파서를 생성합니다.
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    /// 최대 허용 크기 (바이트)
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// manifest를 파싱합니다.
    ///
    /// # Errors
    ///
    /// - `ManifestTooLarge`: 입력이 최대 크기를 넘음 (파싱 전 검사)
    /// - `ManifestUnparseable`: package.json이 올바른 JSON 객체가 아님
    pub fn parse(
        &self,
        content: &[u8],
        format: ManifestFormat,
    ) -> Result<ParsedManifest, ScannerError> {
        if content.len() > self.max_size {
            return Err(ScannerError::ManifestTooLarge {
                size: content.len(),
                max: self.max_size,
            });
        }

        let text = String::from_utf8_lossy(content);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

        let parsed = match format {
            ManifestFormat::RequirementsTxt => RequirementsParser.parse(text)?,
            ManifestFormat::PackageJson => PackageJsonParser.parse(text)?,
            ManifestFormat::RawText => parse_raw_text(text)?,
        };

        debug!(
            format = %format,
            records = parsed.records.len(),
            warnings = parsed.warnings.len(),
            "manifest parsed"
        );
        Ok(parsed)
    }
}

/// requirements 문법을 먼저 시도하고, 레코드가 없으면 전체 내용을 한 줄로 파싱합니다.
fn parse_raw_text(text: &str) -> Result<ParsedManifest, ScannerError> {
    let first = RequirementsParser.parse(text)?;
    if !first.is_empty() {
        return Ok(first);
    }

    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        return Ok(first);
    }

    let fallback = RequirementsParser.parse(&joined)?;
    if fallback.is_empty() {
        Ok(first)
    } else {
        Ok(fallback)
    }
}
