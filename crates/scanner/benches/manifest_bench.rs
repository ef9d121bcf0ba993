//! 스캐너 벤치마크
//!
//! manifest 파싱, NVD 응답 파싱, 위험도 집계 성능을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use dephealth_core::types::Severity;
use dephealth_scanner::source::nvd::parse_nvd_response;
use dephealth_scanner::{
    DependencyResult, DependencySummary, ManifestFormat, ManifestParser, ResultAggregator,
    Vulnerability,
};

fn generate_requirements(count: usize) -> String {
    let mut out = String::from("# generated\n");
    for i in 0..count {
        match i % 4 {
            0 => out.push_str(&format!("package-{i}==1.{i}.0\n")),
            1 => out.push_str(&format!("package-{i}[extra]>=2.0,<3.0 ; python_version >= \"3.8\"\n")),
            2 => out.push_str(&format!("package-{i}~=0.{i}\n")),
            _ => out.push_str(&format!("package-{i}\n")),
        }
    }
    out
}

fn generate_package_json(count: usize) -> String {
    let deps: Vec<String> = (0..count)
        .map(|i| format!(r#""package-{i}": "^1.{i}.0""#))
        .collect();
    format!(
        r#"{{"name": "bench", "dependencies": {{{}}}}}"#,
        deps.join(",")
    )
}

fn generate_nvd_body(count: usize) -> String {
    let entries: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"cve": {{
                    "id": "CVE-2024-{i:04}",
                    "published": "2024-01-01T00:00:00.000",
                    "descriptions": [{{"lang": "en", "value": "flask issue {i}"}}],
                    "metrics": {{"cvssMetricV31": [{{"cvssData": {{"baseScore": 7.5, "baseSeverity": "HIGH"}}}}]}},
                    "configurations": [{{"nodes": [{{"cpeMatch": [{{
                        "criteria": "cpe:2.3:a:palletsprojects:flask:*:*:*:*:*:*:*:*",
                        "versionEndExcluding": "2.{i}.0"
                    }}]}}]}}],
                    "references": [{{"url": "https://example.com/{i}", "source": "bench"}}]
                }}}}"#
            )
        })
        .collect();
    format!(r#"{{"vulnerabilities": [{}]}}"#, entries.join(","))
}

fn bench_manifest_parsing(c: &mut Criterion) {
    let parser = ManifestParser::default();
    let mut group = c.benchmark_group("manifest_parsing");

    for size in [10, 100, 1000] {
        let requirements = generate_requirements(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::new("requirements_txt", size),
            &requirements,
            |b, content| {
                b.iter(|| {
                    parser
                        .parse(black_box(content.as_bytes()), ManifestFormat::RequirementsTxt)
                        .unwrap()
                })
            },
        );

        let package_json = generate_package_json(size);
        group.bench_with_input(
            BenchmarkId::new("package_json", size),
            &package_json,
            |b, content| {
                b.iter(|| {
                    parser
                        .parse(black_box(content.as_bytes()), ManifestFormat::PackageJson)
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

fn bench_nvd_response(c: &mut Criterion) {
    let body = generate_nvd_body(10);
    let mut group = c.benchmark_group("nvd_response");
    group.throughput(Throughput::Elements(10));
    group.bench_function("parse_10_cves", |b| {
        b.iter(|| parse_nvd_response(black_box(&body), "flask", true).unwrap())
    });
    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let severities = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Unknown,
    ];
    let results: Vec<DependencyResult> = (0..500)
        .map(|i| {
            let dependency = DependencySummary {
                name: format!("package-{i}"),
                version: "any".to_owned(),
                ecosystem: dephealth_scanner::Ecosystem::Python,
            };
            let vulns = (0..i % 4)
                .map(|j| {
                    Vulnerability::new(format!("CVE-2024-{i:04}{j}"), severities[(i + j) % 5])
                })
                .collect();
            DependencyResult::completed(dependency, vulns)
        })
        .collect();

    let mut group = c.benchmark_group("aggregation");
    group.throughput(Throughput::Elements(500));
    group.bench_function("aggregate_500", |b| {
        b.iter(|| ResultAggregator::aggregate(black_box(results.clone())))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_manifest_parsing,
    bench_nvd_response,
    bench_aggregation
);
criterion_main!(benches);
