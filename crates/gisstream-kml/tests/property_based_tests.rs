//! Property-Based Tests
//!
//! Invariants checked over generated inputs:
//! - The coordinate tokenizer never panics and never invents tuples
//! - Tuple separators are interchangeable
//! - The decoder never panics on arbitrary text inside a document
//! - Archive references survive a parse round trip

use gisstream_kml::{parse_coordinates, KmlDecoder, UrlRef};
use proptest::prelude::*;
use url::Url;

/// Upper bound on the numbers in `text`: every number holds at least one
/// run of digits
fn digit_runs(text: &str) -> usize {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .count()
}

/// Property: arbitrary text yields at most one tuple per number
#[test]
fn proptest_coordinates_no_panic() {
    proptest!(|(text in "[-0-9., \\t\\nabcE+]{0,200}")| {
        let coords = parse_coordinates(&text);
        prop_assert!(coords.len() <= digit_runs(&text));
        for c in &coords {
            prop_assert!((-90.0..=90.0).contains(&c.lat));
        }
    });
}

/// Property: comma-separated numbers never produce more tuples than numbers
#[test]
fn proptest_tuple_count_bounded() {
    proptest!(|(values in prop::collection::vec(-89.0f64..89.0, 0..30))| {
        let text = values.iter().map(f64::to_string).collect::<Vec<_>>().join(",");
        let coords = parse_coordinates(&text);
        prop_assert!(coords.len() <= values.len());
    });
}

/// Property: whitespace, padded commas and bare commas between tuples agree
#[test]
fn proptest_separators_are_equivalent() {
    proptest!(|(tuples in prop::collection::vec((-179.0f64..179.0, -89.0f64..89.0, -100.0f64..9000.0), 1..10))| {
        let join = |sep: &str, inner: &str| {
            tuples
                .iter()
                .map(|(x, y, z)| format!("{x}{inner}{y}{inner}{z}"))
                .collect::<Vec<_>>()
                .join(sep)
        };
        let spaced = parse_coordinates(&join(" ", ","));
        let padded = parse_coordinates(&join("   ", ", "));
        let commas = parse_coordinates(&join(",", ","));
        prop_assert_eq!(spaced.len(), tuples.len());
        prop_assert_eq!(&spaced, &padded);
        prop_assert_eq!(&spaced, &commas);
    });
}

/// Property: any text content inside a Placemark decodes without panic
#[test]
fn proptest_decoder_no_panic() {
    proptest!(|(name in "\\PC{0,80}", coords in "[-0-9., a-z]{0,60}")| {
        let escaped = name.replace('&', "&amp;").replace('<', "&lt;");
        let kml = format!(
            r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Placemark><name>{escaped}</name><Point><coordinates>{coords}</coordinates></Point></Placemark></kml>"#
        );
        let mut decoder = KmlDecoder::new(kml.as_bytes()).unwrap();
        let mut count = 0;
        while let Ok(Some(_)) = decoder.read() {
            count += 1;
            prop_assert!(count < 10);
        }
    });
}

/// Property: archive entry references parse back to the same parts
#[test]
fn proptest_archive_reference_round_trip() {
    proptest!(|(rel in "[a-z][a-z0-9 _/]{0,30}[a-z]")| {
        let archive = Url::parse("http://example.com/data/a.kmz?token=1").unwrap();
        let entry = UrlRef::new(&archive, Some(&rel)).unwrap();
        let back = UrlRef::parse(entry.uri()).unwrap();
        prop_assert_eq!(back.url(), &archive);
        prop_assert_eq!(back.kmz_rel_path(), entry.kmz_rel_path());
        prop_assert_eq!(&back, &entry);
    });
}
