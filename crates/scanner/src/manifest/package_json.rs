//! package.json 파서
//!
//! [`PackageJsonParser`]는 `dependencies`와 `devDependencies`를 선언 순서대로 읽어
//! [`DependencyRecord`]로 변환합니다.
//!
//! # 범위 문자열 해석
//!
//! | 입력 | 결과 |
//! |---|---|
//! | `4.17.21`, `=4.17.21`, `v4.17.21` | `==4.17.21` |
//! | `^4.17.0`, `~1.2.3` | 단일 `^` / `~` 제약 (전개하지 않음) |
//! | `>=1.2.0 <2.0.0` | 순서대로 두 제약 |
//! | `1.2.3 - 2.0.0` | `>=1.2.3`, `<=2.0.0` |
//! | `1.x`, `1.2.*` | `^1`, `~1.2` |
//! | `*`, `x`, `latest`, `""`, `a \|\| b` | 제약 없음 |
//! | URL, `file:`, `git...`, `npm:`, `user/repo` | 제약 없음 + 경고 |

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::de::{MapAccess, Visitor};

use crate::error::ScannerError;
use crate::manifest::{ManifestGrammar, ParseWarning, ParsedManifest};
use crate::types::{DependencyRecord, Ecosystem, Operator, SourceLine, VersionConstraint};

/// npm 버전 (부분 버전, x-range 포함)
static NODE_VERSION_RE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.([0-9]+|[xX*])){0,2}(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$")
});

const NON_REGISTRY_PREFIXES: [&str; 10] = [
    "http://",
    "https://",
    "git",
    "file:",
    "link:",
    "npm:",
    "workspace:",
    "github:",
    "gitlab:",
    "bitbucket:",
];

/// package.json 파서
pub struct PackageJsonParser;

/// package.json 구조 (파싱용)
#[derive(Deserialize)]
struct PackageJsonDoc {
    #[serde(default)]
    dependencies: Option<OrderedEntries>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: Option<OrderedEntries>,
}

/// 선언 순서를 보존하는 JSON 객체 항목 목록
struct OrderedEntries(Vec<(String, serde_json::Value)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping package names to version ranges")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, value)) = map.next_entry::<String, serde_json::Value>()? {
                    entries.push((name, value));
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl ManifestGrammar for PackageJsonParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Node
    }

    fn parse(&self, content: &str) -> Result<ParsedManifest, ScannerError> {
        let doc: PackageJsonDoc = serde_json::from_str(content)
            .map_err(|e| ScannerError::ManifestUnparseable(format!("invalid package.json: {e}")))?;
        let version_re = NODE_VERSION_RE
            .as_ref()
            .map_err(|e| ScannerError::ManifestUnparseable(format!("version pattern: {e}")))?;

        let mut parsed = ParsedManifest::default();
        let sections = [
            ("dependencies", doc.dependencies),
            ("devDependencies", doc.dev_dependencies),
        ];

        for (section, entries) in sections {
            let Some(OrderedEntries(entries)) = entries else {
                continue;
            };
            let mut locator = LineLocator::new(content, section);

            for (name, value) in entries {
                let (line_number, line_text) = locator.locate(&name);
                let name = name.trim();

                if name.is_empty() {
                    parsed.warnings.push(ParseWarning::new(
                        line_number,
                        line_text,
                        "empty package name",
                    ));
                    continue;
                }
                if parsed.records.iter().any(|r| r.name == name) {
                    parsed.warnings.push(ParseWarning::new(
                        line_number,
                        line_text,
                        format!("duplicate dependency '{name}' in {section}"),
                    ));
                    continue;
                }

                let Some(range) = value.as_str() else {
                    parsed.warnings.push(ParseWarning::new(
                        line_number,
                        line_text,
                        "version range is not a string",
                    ));
                    continue;
                };

                let (constraints, note) = parse_range(range, version_re);
                if let Some(note) = note {
                    parsed
                        .warnings
                        .push(ParseWarning::new(line_number, line_text.clone(), note));
                }

                parsed.records.push(DependencyRecord {
                    name: Ecosystem::Node.normalize_name(name),
                    ecosystem: Ecosystem::Node,
                    constraints,
                    extras: Vec::new(),
                    marker: None,
                    source: SourceLine {
                        line_number,
                        text: line_text,
                    },
                });
            }
        }

        Ok(parsed)
    }
}

/// 섹션 안에서 패키지 키가 나타나는 줄을 순서대로 찾습니다 (진단용).
struct LineLocator<'a> {
    content: &'a str,
    cursor: usize,
}

impl<'a> LineLocator<'a> {
    fn new(content: &'a str, section: &str) -> Self {
        let cursor = content.find(&format!("\"{section}\"")).unwrap_or(0);
        Self { content, cursor }
    }

    fn locate(&mut self, name: &str) -> (usize, String) {
        let needle = format!("\"{name}\"");
        match self.content[self.cursor..].find(&needle) {
            Some(offset) => {
                let pos = self.cursor + offset;
                self.cursor = pos + needle.len();
                let line_number = self.content[..pos].matches('\n').count() + 1;
                let line_start = self.content[..pos].rfind('\n').map_or(0, |i| i + 1);
                let line_end = self.content[pos..]
                    .find('\n')
                    .map_or(self.content.len(), |i| pos + i);
                let text = self.content[line_start..line_end]
                    .trim()
                    .trim_end_matches(',')
                    .to_owned();
                (line_number, text)
            }
            // 이스케이프된 키 등: 직전 위치의 줄로 대신합니다.
            None => {
                let line_number = self.content[..self.cursor].matches('\n').count() + 1;
                (line_number, needle)
            }
        }
    }
}

/// npm 범위 문자열을 제약 목록으로 변환합니다.
///
/// 해석할 수 없는 범위는 제약 없음으로 두고 경고 사유를 함께 반환합니다.
pub(crate) fn parse_range(raw: &str, version_re: &Regex) -> (Vec<VersionConstraint>, Option<String>) {
    let range = raw.trim();

    // "", "*", "x", dist-tag (latest, next, beta ...)
    if range.is_empty()
        || range == "*"
        || range.eq_ignore_ascii_case("x")
        || range.chars().all(|c| c.is_ascii_alphabetic())
    {
        return (Vec::new(), None);
    }

    if NON_REGISTRY_PREFIXES.iter().any(|p| range.starts_with(p)) || range.contains('/') {
        return (
            Vec::new(),
            Some(format!("non-registry specifier '{range}' is not checked by version")),
        );
    }

    if range.contains("||") {
        return (Vec::new(), None);
    }

    let unrecognized = || {
        (
            Vec::new(),
            Some(format!("unrecognized version range '{range}'")),
        )
    };

    // 하이픈 범위
    if let Some((low, high)) = range.split_once(" - ") {
        let (Some(low), Some(high)) = (
            clean_version(low, version_re),
            clean_version(high, version_re),
        ) else {
            return unrecognized();
        };
        return (
            vec![
                VersionConstraint::new(Operator::Ge, low),
                VersionConstraint::new(Operator::Le, high),
            ],
            None,
        );
    }

    let mut constraints = Vec::new();
    for comparator in comparators(range) {
        let (op, version) = split_operator(&comparator);
        let Some(version) = clean_version(version, version_re) else {
            return unrecognized();
        };
        constraints.push(widen_partial(op, version));
    }

    if constraints.is_empty() {
        return unrecognized();
    }
    (constraints, None)
}

/// 공백으로 나눈 비교자 목록 (`>= 1.0`처럼 떨어진 연산자는 다음 토큰과 합침)
fn comparators(range: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in range.split_whitespace() {
        if matches!(token, ">=" | "<=" | ">" | "<" | "=" | "^" | "~") {
            pending_op = Some(token);
            continue;
        }
        match pending_op.take() {
            Some(op) => out.push(format!("{op}{token}")),
            None => out.push(token.to_owned()),
        }
    }
    if let Some(op) = pending_op {
        out.push(op.to_owned());
    }
    out
}

fn split_operator(comparator: &str) -> (Operator, &str) {
    const PREFIXES: [(&str, Operator); 7] = [
        (">=", Operator::Ge),
        ("<=", Operator::Le),
        (">", Operator::Gt),
        ("<", Operator::Lt),
        ("^", Operator::Caret),
        ("~", Operator::Tilde),
        ("=", Operator::Eq),
    ];
    for (prefix, op) in PREFIXES {
        if let Some(rest) = comparator.strip_prefix(prefix) {
            return (op, rest);
        }
    }
    (Operator::Eq, comparator)
}

/// `v` 접두사를 떼고 형식을 검사합니다.
fn clean_version(version: &str, version_re: &Regex) -> Option<String> {
    let version = version.trim();
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);
    version_re.is_match(version).then(|| version.to_owned())
}

/// 부분 버전과 x-range를 caret/tilde로 바꿉니다.
///
/// `1.x` → `^1`, `1.2.x` → `~1.2`. 정확한 버전은 그대로 둡니다.
fn widen_partial(op: Operator, version: String) -> VersionConstraint {
    let core = version
        .split(['-', '+'])
        .next()
        .unwrap_or(version.as_str())
        .to_owned();
    let numeric: Vec<&str> = core
        .split('.')
        .take_while(|p| p.chars().all(|c| c.is_ascii_digit()))
        .collect();
    let is_partial = numeric.len() < 3;

    if !is_partial {
        return VersionConstraint::new(op, version);
    }

    let trimmed = numeric.join(".");
    match (op, numeric.len()) {
        (Operator::Eq, 1) => VersionConstraint::new(Operator::Caret, trimmed),
        (Operator::Eq, _) => VersionConstraint::new(Operator::Tilde, trimmed),
        (op, _) => VersionConstraint::new(op, trimmed),
    }
}
