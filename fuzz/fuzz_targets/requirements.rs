#![no_main]

use dephealth_scanner::manifest::{ManifestGrammar, RequirementsParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        if let Ok(parsed) = RequirementsParser.parse(content) {
            let lines = content.split('\n').count();
            for record in &parsed.records {
                assert!(!record.name.is_empty());
                assert!(record.source.line_number >= 1 && record.source.line_number <= lines);
            }
        }
    }
});
