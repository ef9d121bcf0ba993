//! 버전 범위 매칭 -- CPE 범위로 결과 거르기
//!
//! `semver` 크레이트로 조회 버전이 CVE의 영향 범위에 들어가는지 판단합니다.
//! PyPI/npm 버전은 SemVer가 아닌 경우가 많으므로 (`2.3`, `v4`) 느슨하게
//! 정규화한 뒤 비교합니다. 정규화가 정보를 버려야 하면 (`1.0.0rc1`) 판단을
//! 보류합니다.

use semver::Version;

use crate::types::VersionRange;

/// 버전 문자열을 느슨하게 SemVer로 해석합니다.
///
/// - 앞의 `v`/`=` 제거
/// - 부족한 구간은 0으로 채움 (`2.3` → `2.3.0`)
/// - 넷째 이후 구간은 모두 0일 때만 버림 (`1.2.3.0` → `1.2.3`)
///
/// 정보를 잃지 않고는 SemVer로 옮길 수 없는 버전 (`4.2rc1`, `1.0.dev0`,
/// `2.31.0.post1`, `1.2.3.4`)과 숫자 구간이 없는 문자열은 `None`입니다.
/// 잘린 버전으로 비교하면 실제로 영향받는 버전을 제외할 수 있습니다.
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V', '=']);
    if let Ok(v) = Version::parse(trimmed) {
        return Some(v);
    }

    let mut parts: Vec<u64> = Vec::with_capacity(3);
    for segment in trimmed.split('.') {
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u64 = segment.parse().ok()?;
        if parts.len() == 3 {
            if value != 0 {
                return None;
            }
            continue;
        }
        parts.push(value);
    }
    if parts.is_empty() {
        return None;
    }
    parts.resize(3, 0);
    Some(Version::new(parts[0], parts[1], parts[2]))
}

/// 주어진 버전이 범위 목록 중 하나에 들어가는지 판단합니다.
///
/// # 반환
///
/// - `Some(true)`: 적어도 하나의 범위에 포함
/// - `Some(false)`: 모든 범위가 이 버전을 확실히 제외
/// - `None`: 범위가 없거나 버전/경계를 해석할 수 없어 판단 불가
pub fn is_affected(version: &str, ranges: &[VersionRange]) -> Option<bool> {
    if ranges.is_empty() {
        return None;
    }
    let version = parse_lenient(version)?;

    let mut undetermined = false;
    for range in ranges {
        match in_range(&version, range) {
            Some(true) => return Some(true),
            Some(false) => {}
            None => undetermined = true,
        }
    }

    if undetermined { None } else { Some(false) }
}

fn in_range(version: &Version, range: &VersionRange) -> Option<bool> {
    let bound = |b: &Option<String>| -> Option<Option<Version>> {
        match b {
            Some(s) => parse_lenient(s).map(Some),
            None => Some(None),
        }
    };

    let start_inc = bound(&range.start_including)?;
    let start_exc = bound(&range.start_excluding)?;
    let end_inc = bound(&range.end_including)?;
    let end_exc = bound(&range.end_excluding)?;

    if let Some(ref s) = start_inc
        && version < s
    {
        return Some(false);
    }
    if let Some(ref s) = start_exc
        && version <= s
    {
        return Some(false);
    }
    if let Some(ref e) = end_inc
        && version > e
    {
        return Some(false);
    }
    if let Some(ref e) = end_exc
        && version >= e
    {
        return Some(false);
    }
    Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(
        start_inc: Option<&str>,
        start_exc: Option<&str>,
        end_inc: Option<&str>,
        end_exc: Option<&str>,
    ) -> VersionRange {
        VersionRange {
            start_including: start_inc.map(str::to_owned),
            start_excluding: start_exc.map(str::to_owned),
            end_including: end_inc.map(str::to_owned),
            end_excluding: end_exc.map(str::to_owned),
        }
    }

    #[test]
    fn lenient_parse_pads_and_strips() {
        assert_eq!(parse_lenient("2.3"), Some(Version::new(2, 3, 0)));
        assert_eq!(parse_lenient("v4.17.21"), Some(Version::new(4, 17, 21)));
        assert_eq!(parse_lenient("3"), Some(Version::new(3, 0, 0)));
        assert_eq!(parse_lenient("1.2.3.0"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_lenient("latest"), None);
        assert_eq!(parse_lenient(""), None);
    }

    #[test]
    fn lenient_parse_refuses_lossy_versions() {
        assert_eq!(parse_lenient("1.0.0rc1"), None);
        assert_eq!(parse_lenient("4.2rc1"), None);
        assert_eq!(parse_lenient("1.0.dev0"), None);
        assert_eq!(parse_lenient("2.0a1"), None);
        assert_eq!(parse_lenient("2.31.0.post1"), None);
        assert_eq!(parse_lenient("1.2.3.4"), None);
        assert_eq!(parse_lenient("1..2"), None);
    }

    #[test]
    fn pep440_prerelease_is_not_excluded_by_its_final_release_bound() {
        let ranges = vec![range(None, None, None, Some("4.2"))];
        assert_ne!(is_affected("4.2rc1", &ranges), Some(false));
        assert_ne!(is_affected("4.2.dev0", &ranges), Some(false));
    }

    #[test]
    fn fourth_version_segment_is_not_truncated_away() {
        let ranges = vec![range(None, None, None, Some("1.2.3.5"))];
        assert_ne!(is_affected("1.2.3.4", &ranges), Some(false));

        let ranges = vec![range(None, None, None, Some("1.2.4"))];
        assert_ne!(is_affected("1.2.3.4", &ranges), Some(false));
    }

    #[test]
    fn lenient_parse_keeps_semver_prerelease() {
        let v = parse_lenient("1.2.3-beta.1").unwrap();
        assert_eq!(v.pre.as_str(), "beta.1");
    }

    #[test]
    fn affected_in_half_open_range() {
        let ranges = vec![range(Some("2.0.0"), None, None, Some("2.3.3"))];
        assert_eq!(is_affected("2.0.0", &ranges), Some(true));
        assert_eq!(is_affected("2.3.2", &ranges), Some(true));
        assert_eq!(is_affected("2.3.3", &ranges), Some(false));
        assert_eq!(is_affected("1.9", &ranges), Some(false));
    }

    #[test]
    fn inclusive_end_boundary() {
        let ranges = vec![range(None, None, Some("2.2.5"), None)];
        assert_eq!(is_affected("2.2.5", &ranges), Some(true));
        assert_eq!(is_affected("2.2.6", &ranges), Some(false));
    }

    #[test]
    fn exclusive_start_boundary() {
        let ranges = vec![range(None, Some("1.0"), None, None)];
        assert_eq!(is_affected("1.0.0", &ranges), Some(false));
        assert_eq!(is_affected("1.0.1", &ranges), Some(true));
    }

    #[test]
    fn unbounded_range_affects_everything() {
        let ranges = vec![VersionRange::default()];
        assert_eq!(is_affected("0.0.1", &ranges), Some(true));
        assert_eq!(is_affected("99.0", &ranges), Some(true));
    }

    #[test]
    fn any_matching_range_wins() {
        let ranges = vec![
            range(Some("1.0"), None, None, Some("1.0.5")),
            range(Some("2.0"), None, None, Some("2.0.3")),
        ];
        assert_eq!(is_affected("2.0.1", &ranges), Some(true));
        assert_eq!(is_affected("1.5.0", &ranges), Some(false));
    }

    #[test]
    fn no_ranges_is_undetermined() {
        assert_eq!(is_affected("1.0.0", &[]), None);
    }

    #[test]
    fn unparseable_version_is_undetermined() {
        let ranges = vec![range(Some("1.0"), None, None, Some("2.0"))];
        assert_eq!(is_affected("latest", &ranges), None);
    }

    #[test]
    fn unparseable_bound_is_undetermined_unless_another_range_matches() {
        let ranges = vec![
            range(Some("abc"), None, None, None),
            range(Some("1.0"), None, None, Some("2.0")),
        ];
        assert_eq!(is_affected("1.5", &ranges), Some(true));
        assert_eq!(is_affected("3.0", &ranges), None);
    }
}
