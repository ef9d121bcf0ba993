#![no_main]

use arbitrary::Arbitrary;
use dephealth_scanner::{ManifestFormat, ManifestParser};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Format {
    Requirements,
    PackageJson,
    Raw,
}

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    format: Format,
    max_size: u16,
    content: &'a [u8],
}

fuzz_target!(|input: Input<'_>| {
    let format = match input.format {
        Format::Requirements => ManifestFormat::RequirementsTxt,
        Format::PackageJson => ManifestFormat::PackageJson,
        Format::Raw => ManifestFormat::RawText,
    };
    let parser = ManifestParser::new(usize::from(input.max_size).max(1));
    let first = parser.parse(input.content, format);
    // same bytes, same result
    let second = parser.parse(input.content, format);
    match (first, second) {
        (Ok(a), Ok(b)) => assert_eq!(a, b),
        (Err(_), Err(_)) => {}
        _ => panic!("parser is not deterministic"),
    }
});
