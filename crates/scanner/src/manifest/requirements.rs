//! requirements.txt 파서
//!
//! [`RequirementsParser`]는 pip requirements 형식을 줄 단위로 파싱합니다.
//!
//! # 문법
//!
//! ```text
//! # 주석
//! flask==2.3.3
//! requests[security]>=2.28,<3.0 ; python_version >= "3.8"   # 인라인 주석
//! numpy
//! ```
//!
//! - `name[extras] op version[, op version...] [; marker]`
//! - 연산자: `==`, `===`, `>=`, `<=`, `~=`, `>`, `<` (`!=`는 무시)
//! - `\`로 끝나는 줄은 다음 줄과 이어집니다.
//! - VCS URL(`git+` 등), editable install(`-e`), pip 옵션(`-r`, `-c`, `--...`),
//!   직접 URL/경로는 경고와 함께 건너뜁니다.
//! - 이름은 PEP 503 규칙으로 정규화됩니다.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ScannerError;
use crate::manifest::{ManifestGrammar, ParseWarning, ParsedManifest};
use crate::types::{DependencyRecord, Ecosystem, Operator, SourceLine, VersionConstraint};

/// `name [extras] rest`
static REQUIREMENT_RE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(?:\[([^\]]*)\])?\s*(.*)$")
});

/// PEP 440 버전 문자 (와일드카드, local version 포함)
static VERSION_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.*+!_-]*$"));

/// 긴 것부터 매칭해야 하는 연산자 기호
const OPERATOR_SYMBOLS: [&str; 8] = ["===", "==", ">=", "<=", "~=", "!=", ">", "<"];

const VCS_PREFIXES: [&str; 4] = ["git+", "hg+", "svn+", "bzr+"];
const URL_PREFIXES: [&str; 5] = ["http://", "https://", "file:", "./", "/"];

/// requirements.txt 파서
pub struct RequirementsParser;

impl ManifestGrammar for RequirementsParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Python
    }

    fn parse(&self, content: &str) -> Result<ParsedManifest, ScannerError> {
        let requirement_re = compiled(&REQUIREMENT_RE)?;
        let version_re = compiled(&VERSION_RE)?;

        let mut parsed = ParsedManifest::default();
        for (line_number, text) in logical_lines(content) {
            match parse_line(&text, requirement_re, version_re) {
                LineOutcome::Skip => {}
                LineOutcome::Warn(reason) => {
                    parsed
                        .warnings
                        .push(ParseWarning::new(line_number, text.trim(), reason));
                }
                LineOutcome::Record(parts) => {
                    let RequirementParts {
                        name,
                        extras,
                        constraints,
                        marker,
                        notes,
                    } = parts;
                    for note in notes {
                        parsed
                            .warnings
                            .push(ParseWarning::new(line_number, text.trim(), note));
                    }
                    parsed.records.push(DependencyRecord {
                        name: Ecosystem::Python.normalize_name(&name),
                        ecosystem: Ecosystem::Python,
                        constraints,
                        extras,
                        marker,
                        source: SourceLine {
                            line_number,
                            text: text.trim().to_owned(),
                        },
                    });
                }
            }
        }

        Ok(parsed)
    }
}

fn compiled(re: &'static LazyLock<Result<Regex, regex::Error>>) -> Result<&'static Regex, ScannerError> {
    re.as_ref()
        .map_err(|e| ScannerError::ManifestUnparseable(format!("requirement pattern: {e}")))
}

/// `\` 줄 이음을 합친 (시작 줄 번호, 내용) 목록
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_number = idx + 1;
        let (start, mut buf) = pending.take().unwrap_or((line_number, String::new()));
        if let Some(stripped) = raw.trim_end().strip_suffix('\\') {
            buf.push_str(stripped);
            buf.push(' ');
            pending = Some((start, buf));
        } else {
            buf.push_str(raw);
            lines.push((start, buf));
        }
    }
    if let Some(last) = pending {
        lines.push(last);
    }
    lines
}

enum LineOutcome {
    Skip,
    Warn(String),
    Record(RequirementParts),
}

struct RequirementParts {
    name: String,
    extras: Vec<String>,
    constraints: Vec<VersionConstraint>,
    marker: Option<String>,
    notes: Vec<String>,
}

fn parse_line(text: &str, requirement_re: &Regex, version_re: &Regex) -> LineOutcome {
    let line = strip_comment(text).trim();
    if line.is_empty() {
        return LineOutcome::Skip;
    }

    if line.starts_with("-e") || line.starts_with("--editable") {
        return LineOutcome::Warn("editable install is not supported".to_owned());
    }
    if line.starts_with('-') {
        return LineOutcome::Warn("pip option is not a dependency".to_owned());
    }
    if VCS_PREFIXES.iter().any(|p| line.starts_with(p)) {
        return LineOutcome::Warn("VCS requirement is not supported".to_owned());
    }
    if URL_PREFIXES.iter().any(|p| line.starts_with(p)) {
        return LineOutcome::Warn("direct URL or path requirement is not supported".to_owned());
    }

    // `--hash=...` 같은 줄 끝 옵션 제거
    let line = match line.find(" --") {
        Some(pos) => line[..pos].trim_end(),
        None => line,
    };

    let (spec, marker) = match line.split_once(';') {
        Some((spec, marker)) => {
            let marker = marker.trim();
            (spec.trim(), (!marker.is_empty()).then(|| marker.to_owned()))
        }
        None => (line, None),
    };

    let Some(caps) = requirement_re.captures(spec) else {
        return LineOutcome::Warn("unparsable package name".to_owned());
    };
    let Some(name) = caps.get(1).map(|m| m.as_str()) else {
        return LineOutcome::Warn("unparsable package name".to_owned());
    };
    if name.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return LineOutcome::Warn("unparsable package name".to_owned());
    }

    let extras = caps
        .get(2)
        .map(|m| {
            m.as_str()
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let rest = caps.get(3).map_or("", |m| m.as_str()).trim();
    let mut notes = Vec::new();
    let constraints = if rest.is_empty() || rest.starts_with('@') {
        // 제약 없음 또는 PEP 508 직접 참조
        Vec::new()
    } else {
        let rest = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rest);
        match parse_constraints(rest, version_re, &mut notes) {
            Ok(constraints) => constraints,
            Err(reason) => return LineOutcome::Warn(reason),
        }
    };

    LineOutcome::Record(RequirementParts {
        name: name.to_owned(),
        extras,
        constraints,
        marker,
        notes,
    })
}

/// 줄 시작 또는 공백 뒤의 `#`부터 끝까지를 제거합니다.
fn strip_comment(line: &str) -> &str {
    let mut prev_is_space = true;
    for (idx, c) in line.char_indices() {
        if c == '#' && prev_is_space {
            return &line[..idx];
        }
        prev_is_space = c.is_whitespace();
    }
    line
}

/// `>=1.0,<2.0` 형식의 제약 목록을 파싱합니다.
///
/// `!=` 제약은 조회 범위를 정하지 않으므로 버리고 `notes`에 기록합니다.
pub(crate) fn parse_constraints(
    spec: &str,
    version_re: &Regex,
    notes: &mut Vec<String>,
) -> Result<Vec<VersionConstraint>, String> {
    let mut constraints = Vec::new();
    for piece in spec.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err("empty version constraint".to_owned());
        }

        let Some(symbol) = OPERATOR_SYMBOLS.iter().find(|s| piece.starts_with(**s)) else {
            return Err(format!("missing operator in '{piece}'"));
        };
        let version = piece[symbol.len()..].trim();
        if version.is_empty() || !version_re.is_match(version) {
            return Err(format!("invalid version in '{piece}'"));
        }

        if *symbol == "!=" {
            notes.push(format!("exclusion constraint '{piece}' ignored"));
            continue;
        }
        match Operator::from_symbol(symbol) {
            Some(op) => constraints.push(VersionConstraint::new(op, version)),
            None => return Err(format!("unsupported operator in '{piece}'")),
        }
    }
    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> ParsedManifest {
        RequirementsParser.parse(content).unwrap()
    }

    #[test]
    fn parses_pinned_requirements() {
        let parsed = parse("flask==2.3.3\nrequests==2.31.0\n");
        assert_eq!(parsed.records.len(), 2);
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.records[0].name, "flask");
        assert_eq!(parsed.records[0].resolved_version(), Some("2.3.3"));
        assert_eq!(parsed.records[1].name, "requests");
        assert_eq!(parsed.records[1].source.line_number, 2);
    }

    #[test]
    fn parses_combined_constraints_in_order() {
        let parsed = parse("pkg>=1.0,<2.0");
        let rec = &parsed.records[0];
        assert_eq!(
            rec.constraints,
            vec![
                VersionConstraint::new(Operator::Ge, "1.0"),
                VersionConstraint::new(Operator::Lt, "2.0"),
            ]
        );
    }

    #[test]
    fn whitespace_around_operators() {
        let parsed = parse("Django >= 3.2 , < 4.0");
        let rec = &parsed.records[0];
        assert_eq!(rec.name, "django");
        assert_eq!(rec.render_constraints(), ">=3.2,<4.0");
    }

    #[test]
    fn line_without_operator_is_unconstrained() {
        let parsed = parse("numpy");
        assert!(parsed.records[0].constraints.is_empty());
        assert_eq!(parsed.records[0].resolved_version(), None);
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let parsed = parse("# header\n\n   \nflask==2.3.3  # web framework\n");
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.records[0].source.line_number, 4);
    }

    #[test]
    fn malformed_name_is_warned_not_fatal() {
        let parsed = parse("@@@not-a-package\nflask==2.3.3");
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line_number, 1);
        assert_eq!(parsed.warnings[0].line, "@@@not-a-package");
    }

    #[test]
    fn malformed_constraint_drops_line() {
        let parsed = parse("flask==\nrequests=>2.0\nclick==8.1.7");
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].name, "click");
        assert_eq!(parsed.warnings.len(), 2);
    }

    #[test]
    fn extras_and_markers_are_retained() {
        let parsed = parse("requests[security,socks]>=2.28; python_version >= \"3.8\"");
        let rec = &parsed.records[0];
        assert_eq!(rec.name, "requests");
        assert_eq!(rec.extras, vec!["security", "socks"]);
        assert_eq!(rec.marker.as_deref(), Some("python_version >= \"3.8\""));
        assert_eq!(rec.render_constraints(), ">=2.28");
    }

    #[test]
    fn unsupported_lines_are_warned() {
        let content = "\
git+https://github.com/pallets/flask.git
hg+https://example.com/repo
-e ./local-package
-r other-requirements.txt
-c constraints.txt
--index-url https://pypi.example.com/simple
https://example.com/pkg.whl
flask==2.3.3
";
        let parsed = parse(content);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.warnings.len(), 7);
        assert!(parsed.warnings[0].reason.contains("VCS"));
        assert!(parsed.warnings[2].reason.contains("editable"));
        assert!(parsed.warnings[3].reason.contains("pip option"));
    }

    #[test]
    fn hash_options_are_stripped() {
        let parsed = parse("flask==2.3.3 --hash=sha256:abcdef");
        assert_eq!(parsed.records[0].resolved_version(), Some("2.3.3"));
    }

    #[test]
    fn line_continuation_joins_lines() {
        let parsed = parse("flask==2.3.3 \\\n    --hash=sha256:abcdef\nclick");
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].source.line_number, 1);
        assert_eq!(parsed.records[1].source.line_number, 3);
    }

    #[test]
    fn names_are_pep503_normalized() {
        let parsed = parse("Flask_SQLAlchemy==3.0\nzope.interface");
        assert_eq!(parsed.records[0].name, "flask-sqlalchemy");
        assert_eq!(parsed.records[1].name, "zope-interface");
    }

    #[test]
    fn exclusion_constraint_is_ignored_with_note() {
        let parsed = parse("urllib3>=1.26,!=1.26.0");
        assert_eq!(parsed.records[0].render_constraints(), ">=1.26");
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].reason.contains("!=1.26.0"));
    }

    #[test]
    fn arbitrary_equality_is_kept_distinct() {
        let parsed = parse("pkg===1.0.0-custom");
        let record = &parsed.records[0];
        assert_eq!(record.constraints[0].op, Operator::ArbitraryEq);
        assert_eq!(record.render_constraints(), "===1.0.0-custom");
        assert_eq!(record.to_requirement_line(), "pkg===1.0.0-custom");
        assert_eq!(record.resolved_version(), Some("1.0.0-custom"));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn compatible_release_and_wildcards() {
        let parsed = parse("pkg~=1.4.2\nother==1.*");
        assert_eq!(parsed.records[0].constraints[0].op, Operator::Compatible);
        assert_eq!(parsed.records[1].constraints[0].version, "1.*");
    }

    #[test]
    fn direct_reference_is_unconstrained() {
        let parsed = parse("pkg @ https://example.com/pkg-1.0.tar.gz");
        assert_eq!(parsed.records[0].name, "pkg");
        assert!(parsed.records[0].constraints.is_empty());
    }

    #[test]
    fn version_like_name_is_rejected() {
        let parsed = parse("2.3.3");
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn hash_inside_token_is_not_a_comment() {
        assert_eq!(strip_comment("pkg==1.0#frag"), "pkg==1.0#frag");
        assert_eq!(strip_comment("pkg==1.0 # note"), "pkg==1.0 ");
        assert_eq!(strip_comment("# note"), "");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn python_operator() -> impl Strategy<Value = Operator> {
            prop_oneof![
                Just(Operator::Eq),
                Just(Operator::ArbitraryEq),
                Just(Operator::Ge),
                Just(Operator::Le),
                Just(Operator::Compatible),
                Just(Operator::Gt),
                Just(Operator::Lt),
            ]
        }

        fn constraint() -> impl Strategy<Value = VersionConstraint> {
            (python_operator(), "[0-9]{1,3}(\\.[0-9]{1,3}){0,3}(\\.\\*)?")
                .prop_map(|(op, version)| VersionConstraint::new(op, version))
        }

        proptest! {
            #[test]
            fn rendered_constraints_reparse_identically(
                name in "[a-z][a-z0-9]{0,10}(-[a-z0-9]{1,5}){0,2}",
                constraints in prop::collection::vec(constraint(), 0..4),
                extras in prop::collection::vec("[a-z]{1,8}", 0..3),
            ) {
                let record = DependencyRecord {
                    name: name.clone(),
                    ecosystem: Ecosystem::Python,
                    constraints: constraints.clone(),
                    extras: extras.clone(),
                    marker: None,
                    source: SourceLine { line_number: 1, text: String::new() },
                };
                let line = record.to_requirement_line();
                let parsed = RequirementsParser.parse(&line).unwrap();
                prop_assert_eq!(parsed.records.len(), 1);
                prop_assert_eq!(&parsed.records[0].name, &name);
                prop_assert_eq!(&parsed.records[0].constraints, &constraints);
                prop_assert_eq!(&parsed.records[0].extras, &extras);
            }

            #[test]
            fn parser_never_panics(content in "\\PC{0,200}") {
                let _ = RequirementsParser.parse(&content);
            }

            #[test]
            fn every_record_has_a_name(content in "[a-zA-Z0-9=<>~!.,;#@\\[\\] \\n-]{0,200}") {
                let parsed = RequirementsParser.parse(&content).unwrap();
                for record in &parsed.records {
                    prop_assert!(!record.name.is_empty());
                }
            }
        }
    }
}
