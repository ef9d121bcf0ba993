//! NVD CVE API 2.0 소스
//!
//! `keywordSearch`로 패키지 이름을 검색하고 응답 JSON을 [`Vulnerability`]로 변환합니다.
//!
//! # 요청
//!
//! - `keywordSearch`: 정리된 이름 (npm scope 제거) + 에코시스템 힌트 (Python은 `python`)
//! - `resultsPerPage`: 설정값
//! - `apiKey` 헤더: API 키가 있을 때만
//!
//! # 상태 코드
//!
//! | 상태 | 결과 |
//! |------|------|
//! | 2xx | 응답 파싱 |
//! | 404 | 취약점 없음 |
//! | 403, 429 | `SourceRateLimited` (재시도) |
//! | 5xx, 연결 실패 | `SourceUnavailable` (재시도) |
//! | 그 외 | `Http` (재시도 안 함) |
//!
//! 응답 파싱은 관대합니다. 최상위 `vulnerabilities` 배열만 필수이고,
//! 각 항목의 필드가 없거나 형식이 다르면 그 필드만 비워 둡니다.

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::debug;

use crate::classify::RiskClassifier;
use crate::config::ScannerConfig;
use crate::error::ScannerError;
use crate::source::VulnerabilitySource;
use crate::types::{Ecosystem, PackageQuery, Reference, VersionRange, Vulnerability};

/// CVSS 메트릭 우선순위
const METRIC_KEYS: [&str; 3] = ["cvssMetricV31", "cvssMetricV30", "cvssMetricV2"];

/// 보존할 최대 참조 링크 수
const MAX_REFERENCES: usize = 3;

/// NVD CVE API 클라이언트
pub struct NvdSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    results_per_page: u32,
    relevance_filter: bool,
}

impl NvdSource {
    /// 스캐너 설정으로 클라이언트를 생성합니다.
    ///
    /// # Errors
    ///
    /// HTTP 클라이언트를 만들 수 없으면 `Config` 에러를 반환합니다.
    pub fn new(config: &ScannerConfig) -> Result<Self, ScannerError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ScannerError::Config {
                field: "source".to_owned(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            results_per_page: config.results_per_page,
            relevance_filter: config.relevance_filter,
        })
    }

    /// API 키가 설정되었는지 확인합니다.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// 조회 URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for NvdSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvdSource")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("results_per_page", &self.results_per_page)
            .field("relevance_filter", &self.relevance_filter)
            .finish()
    }
}

impl VulnerabilitySource for NvdSource {
    fn name(&self) -> &str {
        "nvd"
    }

    async fn fetch(&self, query: &PackageQuery) -> Result<Vec<Vulnerability>, ScannerError> {
        let name = search_name(&query.name);
        let keyword = search_keyword(&query.name, query.ecosystem);
        let per_page = self.results_per_page.to_string();

        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[
                ("keywordSearch", keyword.as_str()),
                ("resultsPerPage", per_page.as_str()),
            ])
            .header(ACCEPT, "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("apiKey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ScannerError::SourceUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        debug!(package = %query.name, keyword = %keyword, status = status.as_u16(), "nvd response");

        match status.as_u16() {
            404 => return Ok(Vec::new()),
            403 | 429 => {
                return Err(ScannerError::SourceRateLimited {
                    status: status.as_u16(),
                });
            }
            _ if status.is_server_error() => {
                return Err(ScannerError::SourceUnavailable(format!(
                    "server returned HTTP {}",
                    status.as_u16()
                )));
            }
            _ if !status.is_success() => {
                return Err(ScannerError::Http {
                    status: status.as_u16(),
                });
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScannerError::SourceUnavailable(format!("failed to read body: {e}")))?;

        parse_nvd_response(&body, name, self.relevance_filter)
    }
}

/// 검색에 쓸 이름: npm scope를 떼어 냅니다 (`@types/node` → `node`).
pub fn search_name(name: &str) -> &str {
    let name = name.trim();
    match name.strip_prefix('@').and_then(|rest| rest.split_once('/')) {
        Some((_, bare)) if !bare.is_empty() => bare,
        _ => name,
    }
}

/// `keywordSearch` 값을 만듭니다.
///
/// 정규화된 Python 이름의 `-`는 공백으로 바꿉니다. NVD 설명은 선언된 표기
/// (`ruamel.yaml`, `zope.interface`)를 쓰므로 구간별 단어로 찾아야 합니다.
pub fn search_keyword(name: &str, ecosystem: Ecosystem) -> String {
    let name = search_name(name);
    match ecosystem {
        Ecosystem::Python => format!("{} python", name.replace('-', " ")),
        Ecosystem::Node => name.to_owned(),
    }
}

/// 구분자를 가리지 않는 비교 형태: 소문자로 바꾸고 `-`, `_`, `.`을 `-`로
/// 통일합니다. CPE 이스케이프(`\.`)의 역슬래시는 버립니다.
fn fold_separators(text: &str) -> String {
    text.chars()
        .filter(|&c| c != '\\')
        .map(|c| if matches!(c, '_' | '.') { '-' } else { c })
        .flat_map(char::to_lowercase)
        .collect()
}

/// NVD 응답 본문을 취약점 목록으로 변환합니다.
///
/// `relevance_filter`가 켜져 있으면 설명에 패키지 이름이 없는 CVE를 버립니다.
///
/// # Errors
///
/// 본문이 JSON 객체가 아니거나 `vulnerabilities` 배열이 없으면
/// `SourceMalformedResponse`를 반환합니다.
pub fn parse_nvd_response(
    body: &str,
    package: &str,
    relevance_filter: bool,
) -> Result<Vec<Vulnerability>, ScannerError> {
    let doc: Value = serde_json::from_str(body)
        .map_err(|e| ScannerError::SourceMalformedResponse(format!("invalid JSON: {e}")))?;

    let entries = doc
        .get("vulnerabilities")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ScannerError::SourceMalformedResponse("missing 'vulnerabilities' array".to_owned())
        })?;

    let needle = fold_separators(package);
    let mut out = Vec::with_capacity(entries.len());

    for entry in entries {
        let Some(cve) = entry.get("cve") else {
            continue;
        };
        let Some(id) = cve.get("id").and_then(Value::as_str) else {
            continue;
        };

        let description = english_description(cve);
        if relevance_filter && !fold_separators(&description).contains(&needle) {
            debug!(cve_id = id, package, "dropped irrelevant CVE");
            continue;
        }

        let (score, label) = cvss(cve);
        let ranges = cpe_ranges(cve, &needle);

        out.push(Vulnerability {
            cve_id: id.to_owned(),
            description,
            severity: RiskClassifier::resolve_severity(label.as_deref(), score),
            cvss_score: score,
            published_date: cve.get("published").and_then(Value::as_str).and_then(parse_date),
            last_modified_date: cve
                .get("lastModified")
                .and_then(Value::as_str)
                .and_then(parse_date),
            affected_versions: affected_versions(&ranges),
            fixed_versions: fixed_versions(&ranges),
            references: references(cve),
            ranges,
        });
    }

    Ok(out)
}

fn english_description(cve: &Value) -> String {
    cve.get("descriptions")
        .and_then(Value::as_array)
        .and_then(|descs| {
            descs
                .iter()
                .find(|d| d.get("lang").and_then(Value::as_str) == Some("en"))
        })
        .and_then(|d| d.get("value"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// 우선순위가 가장 높은 메트릭의 (점수, 심각도 레이블)
fn cvss(cve: &Value) -> (Option<f64>, Option<String>) {
    let Some(metrics) = cve.get("metrics") else {
        return (None, None);
    };

    for key in METRIC_KEYS {
        let Some(metric) = metrics
            .get(key)
            .and_then(Value::as_array)
            .and_then(|list| list.first())
        else {
            continue;
        };
        let data = metric.get("cvssData");
        let score = data
            .and_then(|d| d.get("baseScore"))
            .and_then(Value::as_f64)
            .filter(|s| (0.0..=10.0).contains(s));
        let label = data
            .and_then(|d| d.get("baseSeverity"))
            .or_else(|| metric.get("baseSeverity"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        return (score, label);
    }

    (None, None)
}

fn references(cve: &Value) -> Vec<Reference> {
    cve.get("references")
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .filter_map(|r| {
                    let url = r.get("url").and_then(Value::as_str)?;
                    Some(Reference {
                        url: url.to_owned(),
                        source: r.get("source").and_then(Value::as_str).map(str::to_owned),
                    })
                })
                .take(MAX_REFERENCES)
                .collect()
        })
        .unwrap_or_default()
}

/// NVD 날짜는 보통 시간대 없이 옵니다 (`2023-05-01T15:15:09.470`). UTC로 간주합니다.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// 패키지와 product가 일치하는 취약 CPE match에서 버전 범위를 뽑습니다.
fn cpe_ranges(cve: &Value, product: &str) -> Vec<VersionRange> {
    let mut ranges = Vec::new();

    let Some(configurations) = cve.get("configurations").and_then(Value::as_array) else {
        return ranges;
    };

    let matches = configurations
        .iter()
        .filter_map(|c| c.get("nodes").and_then(Value::as_array))
        .flatten()
        .filter_map(|n| n.get("cpeMatch").and_then(Value::as_array))
        .flatten();

    for m in matches {
        if m.get("vulnerable").and_then(Value::as_bool) != Some(true) {
            continue;
        }
        let Some(criteria) = m.get("criteria").and_then(Value::as_str) else {
            continue;
        };
        let parts: Vec<&str> = criteria.split(':').collect();
        let Some(cpe_product) = parts.get(4) else {
            continue;
        };
        if fold_separators(cpe_product) != product {
            continue;
        }

        let field = |key: &str| m.get(key).and_then(Value::as_str).map(str::to_owned);
        let mut range = VersionRange {
            start_including: field("versionStartIncluding"),
            start_excluding: field("versionStartExcluding"),
            end_including: field("versionEndIncluding"),
            end_excluding: field("versionEndExcluding"),
        };

        if range == VersionRange::default()
            && let Some(version) = parts.get(5).filter(|v| !matches!(**v, "*" | "-" | ""))
        {
            range.start_including = Some((*version).to_owned());
            range.end_including = Some((*version).to_owned());
        }

        if !ranges.contains(&range) {
            ranges.push(range);
        }
    }

    ranges
}

fn affected_versions(ranges: &[VersionRange]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for r in ranges {
        for v in [&r.start_including, &r.end_including].into_iter().flatten() {
            if !out.contains(v) {
                out.push(v.clone());
            }
        }
    }
    out
}

fn fixed_versions(ranges: &[VersionRange]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in ranges.iter().filter_map(|r| r.end_excluding.as_ref()) {
        if !out.contains(v) {
            out.push(v.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use dephealth_core::types::Severity;

    use super::*;

    const FLASK: &str = r#"{
      "resultsPerPage": 2,
      "vulnerabilities": [
        {
          "cve": {
            "id": "CVE-2023-30861",
            "published": "2023-05-02T18:15:52.183",
            "lastModified": "2023-05-12T05:15:07.700",
            "descriptions": [
              {"lang": "es", "value": "Flask es un framework"},
              {"lang": "en", "value": "Flask is a lightweight WSGI web application framework. Responses may be cached."}
            ],
            "metrics": {
              "cvssMetricV31": [
                {"source": "nvd@nist.gov", "cvssData": {"version": "3.1", "baseScore": 7.5, "baseSeverity": "HIGH"}}
              ],
              "cvssMetricV2": [
                {"cvssData": {"baseScore": 5.0}, "baseSeverity": "MEDIUM"}
              ]
            },
            "configurations": [
              {"nodes": [{"cpeMatch": [
                {"vulnerable": true, "criteria": "cpe:2.3:a:palletsprojects:flask:*:*:*:*:*:*:*:*", "versionEndExcluding": "2.2.5"},
                {"vulnerable": true, "criteria": "cpe:2.3:a:palletsprojects:flask:*:*:*:*:*:*:*:*", "versionStartIncluding": "2.3.0", "versionEndExcluding": "2.3.2"},
                {"vulnerable": false, "criteria": "cpe:2.3:o:debian:debian_linux:11.0:*:*:*:*:*:*:*"}
              ]}]}
            ],
            "references": [
              {"url": "https://a.example/1", "source": "nvd"},
              {"url": "https://a.example/2"},
              {"url": "https://a.example/3"},
              {"url": "https://a.example/4"}
            ]
          }
        },
        {
          "cve": {
            "id": "CVE-2020-0001",
            "descriptions": [{"lang": "en", "value": "Something unrelated in another product."}]
          }
        }
      ]
    }"#;

    #[test]
    fn parses_full_entry() {
        let vulns = parse_nvd_response(FLASK, "flask", true).unwrap();
        assert_eq!(vulns.len(), 1);
        let v = &vulns[0];
        assert_eq!(v.cve_id, "CVE-2023-30861");
        assert!(v.description.starts_with("Flask is"));
        assert_eq!(v.severity, Severity::High);
        assert_eq!(v.cvss_score, Some(7.5));
        assert_eq!(v.references.len(), 3);
        assert_eq!(v.references[0].source.as_deref(), Some("nvd"));
        assert_eq!(v.fixed_versions, vec!["2.2.5", "2.3.2"]);
        assert_eq!(v.affected_versions, vec!["2.3.0"]);
        assert_eq!(v.ranges.len(), 2);
        let published = v.published_date.unwrap();
        assert_eq!(published.to_rfc3339(), "2023-05-02T18:15:52.183+00:00");
    }

    #[test]
    fn relevance_filter_can_be_disabled() {
        let vulns = parse_nvd_response(FLASK, "flask", false).unwrap();
        assert_eq!(vulns.len(), 2);
        assert_eq!(vulns[1].severity, Severity::Unknown);
        assert!(vulns[1].cvss_score.is_none());
    }

    #[test]
    fn v2_severity_from_metric_level_label() {
        let body = r#"{"vulnerabilities":[{"cve":{"id":"CVE-1",
            "descriptions":[{"lang":"en","value":"requests leaks"}],
            "metrics":{"cvssMetricV2":[{"cvssData":{"baseScore":4.3},"baseSeverity":"MEDIUM"}]}}}]}"#;
        let vulns = parse_nvd_response(body, "requests", true).unwrap();
        assert_eq!(vulns[0].severity, Severity::Medium);
        assert_eq!(vulns[0].cvss_score, Some(4.3));
    }

    #[test]
    fn severity_derived_from_score_without_label() {
        let body = r#"{"vulnerabilities":[{"cve":{"id":"CVE-1",
            "descriptions":[{"lang":"en","value":"requests bug"}],
            "metrics":{"cvssMetricV2":[{"cvssData":{"baseScore":9.3}}]}}}]}"#;
        let vulns = parse_nvd_response(body, "requests", true).unwrap();
        assert_eq!(vulns[0].severity, Severity::Critical);
    }

    #[test]
    fn garbage_metric_values_degrade_to_unknown() {
        let body = r#"{"vulnerabilities":[{"cve":{"id":"CVE-1",
            "descriptions":[{"lang":"en","value":"requests bug"}],
            "metrics":{"cvssMetricV31":[{"cvssData":{"baseScore":"high","baseSeverity":42}}]}}}]}"#;
        let vulns = parse_nvd_response(body, "requests", true).unwrap();
        assert_eq!(vulns[0].severity, Severity::Unknown);
        assert!(vulns[0].cvss_score.is_none());
    }

    #[test]
    fn entries_without_id_are_skipped() {
        let body = r#"{"vulnerabilities":[{"cve":{"descriptions":[]}},{"nope":1}]}"#;
        assert!(parse_nvd_response(body, "x", false).unwrap().is_empty());
    }

    #[test]
    fn exact_cpe_version_becomes_point_range() {
        let body = r#"{"vulnerabilities":[{"cve":{"id":"CVE-1",
            "descriptions":[{"lang":"en","value":"python-dateutil issue"}],
            "configurations":[{"nodes":[{"cpeMatch":[
              {"vulnerable":true,"criteria":"cpe:2.3:a:dateutil:python_dateutil:2.8.0:*:*:*:*:*:*:*"}]}]}]}}]}"#;
        let vulns = parse_nvd_response(body, "python-dateutil", true).unwrap();
        assert_eq!(vulns[0].ranges.len(), 1);
        assert_eq!(vulns[0].ranges[0].start_including.as_deref(), Some("2.8.0"));
        assert_eq!(vulns[0].ranges[0].end_including.as_deref(), Some("2.8.0"));
        assert_eq!(vulns[0].affected_versions, vec!["2.8.0"]);
    }

    #[test]
    fn other_product_cpe_is_ignored() {
        let body = r#"{"vulnerabilities":[{"cve":{"id":"CVE-1",
            "descriptions":[{"lang":"en","value":"flask plugin issue"}],
            "configurations":[{"nodes":[{"cpeMatch":[
              {"vulnerable":true,"criteria":"cpe:2.3:a:x:flask_admin:*:*:*:*:*:*:*:*","versionEndExcluding":"1.0"}]}]}]}}]}"#;
        let vulns = parse_nvd_response(body, "flask", true).unwrap();
        assert!(vulns[0].ranges.is_empty());
    }

    #[test]
    fn dotted_name_matches_declared_spelling() {
        let body = r#"{"vulnerabilities":[{"cve":{"id":"CVE-2019-20478",
            "descriptions":[{"lang":"en","value":"In ruamel.yaml through 0.16.7, the load method allows code execution."}],
            "configurations":[{"nodes":[{"cpeMatch":[
              {"vulnerable":true,"criteria":"cpe:2.3:a:ruamel.yaml_project:ruamel.yaml:*:*:*:*:*:*:*:*","versionEndIncluding":"0.16.7"}]}]}]}}]}"#;
        let name = Ecosystem::Python.normalize_name("ruamel.yaml");
        let vulns = parse_nvd_response(body, &name, true).unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].ranges.len(), 1);
        assert_eq!(vulns[0].ranges[0].end_including.as_deref(), Some("0.16.7"));
    }

    #[test]
    fn underscored_name_matches_hyphenated_description() {
        let body = r#"{"vulnerabilities":[{"cve":{"id":"CVE-1",
            "descriptions":[{"lang":"en","value":"Zope_Interface before 5.0 mishandles input"}]}}]}"#;
        let name = Ecosystem::Python.normalize_name("zope.interface");
        assert_eq!(parse_nvd_response(body, &name, true).unwrap().len(), 1);
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        assert!(matches!(
            parse_nvd_response("<html>", "x", true),
            Err(ScannerError::SourceMalformedResponse(_))
        ));
        assert!(matches!(
            parse_nvd_response(r#"{"totalResults":0}"#, "x", true),
            Err(ScannerError::SourceMalformedResponse(_))
        ));
    }

    #[test]
    fn search_name_strips_npm_scope() {
        assert_eq!(search_name("@types/node"), "node");
        assert_eq!(search_name("lodash"), "lodash");
        assert_eq!(search_name("@broken"), "@broken");
    }

    #[test]
    fn keyword_adds_python_hint_only_for_python() {
        assert_eq!(search_keyword("flask", Ecosystem::Python), "flask python");
        assert_eq!(
            search_keyword("ruamel-yaml", Ecosystem::Python),
            "ruamel yaml python"
        );
        assert_eq!(search_keyword("lodash.merge", Ecosystem::Node), "lodash.merge");
        assert_eq!(search_keyword("@angular/core", Ecosystem::Node), "core");
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ScannerConfig {
            api_key: Some("secret-key".to_owned()),
            ..ScannerConfig::default()
        };
        let source = NvdSource::new(&config).unwrap();
        assert!(source.has_api_key());
        let debug = format!("{source:?}");
        assert!(!debug.contains("secret-key"));
    }
}
