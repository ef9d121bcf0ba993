#![no_main]

use dephealth_scanner::manifest::{ManifestGrammar, PackageJsonParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        if let Ok(parsed) = PackageJsonParser.parse(content) {
            for record in &parsed.records {
                assert!(!record.name.is_empty());
            }
        }
    }
});
