/*!
 * Tests for text normalization
 */

use bookvox::errors::ConfigError;
use bookvox::text::{AbbreviationTable, Normalizer};

fn table(entries: &[(&str, &str)]) -> AbbreviationTable {
    AbbreviationTable::new(entries.iter().map(|(k, v)| (k.to_string(), v.to_string())))
        .expect("valid table")
}

/// Test the documented example of the default table
#[test]
fn test_normalize_withDefaultTable_shouldExpandAndCollapse() {
    let normalizer = Normalizer::default();
    let result = normalizer.normalize("Mr.\u{00A0}Smith  met   Dr. Jones — e.g. yesterday.");
    assert_eq!(result, "Mister Smith met Doctor Jones — for example yesterday.");
}

/// Test that line structure survives collapsing
#[test]
fn test_normalize_withBlankLineRuns_shouldKeepOneBlankLine() {
    let normalizer = Normalizer::new(AbbreviationTable::empty());
    let result = normalizer.normalize("# Title\n\n\n\n  first   line \nsecond\t line\n\n\nthird");
    assert_eq!(result, "# Title\n\nfirst line\nsecond line\n\nthird");
}

/// Test em-dash spacing between words
#[test]
fn test_normalize_withTightDash_shouldSpaceIt() {
    let normalizer = Normalizer::new(AbbreviationTable::empty());
    assert_eq!(normalizer.normalize("word\u{2014}word"), "word \u{2014} word");
}

/// Test that normalization is idempotent on its own output
#[test]
fn test_normalize_twice_shouldBeStable() {
    let normalizer = Normalizer::default();
    let once = normalizer.normalize("Dr.  Who\u{202F}arrived\u{2014}late.\n\n\n\nMr. X");
    let twice = normalizer.normalize(&once);
    assert_eq!(once, twice);
}

/// Test that abbreviations only match at word boundaries
#[test]
fn test_apply_withKeyInsideWord_shouldNotExpand() {
    let abbreviations = table(&[("St.", "Street"), ("Mr.", "Mister")]);
    assert_eq!(abbreviations.apply("Mr. Ramsey at Main St."), "Mister Ramsey at Main Street");
    assert_eq!(abbreviations.apply("FirstSt. stays"), "FirstSt. stays");
}

/// Test that longer keys win over their prefixes
#[test]
fn test_apply_withOverlappingKeys_shouldPreferLongest() {
    let abbreviations = table(&[("e.", "E"), ("e.g.", "for example")]);
    assert_eq!(abbreviations.apply("see e.g. this"), "see for example this");
}

/// Test that replacements are not scanned again
#[test]
fn test_apply_withExpansionContainingKey_shouldNotRecurse() {
    let abbreviations = table(&[("Dr.", "Dr. Doctor")]);
    assert_eq!(abbreviations.apply("Dr. No"), "Dr. Doctor No");
}

/// Test loading a table from JSON
#[test]
fn test_from_json_withValidObject_shouldLoadEntries() {
    let abbreviations = AbbreviationTable::from_json(r#"{"Prof.": "Professor", "vs.": "versus"}"#)
        .expect("valid json");
    assert_eq!(abbreviations.len(), 2);
    assert_eq!(abbreviations.apply("Prof. X vs. Y"), "Professor X versus Y");
}

/// Test that malformed tables are rejected as a whole
#[test]
fn test_from_json_withMalformedInput_shouldFail() {
    for json in [r#"["Mr."]"#, r#"{"Mr.": 1}"#, r#"{"": "x"}"#, r#"{"Mr.": " "}"#, "not json"] {
        let result = AbbreviationTable::from_json(json);
        assert!(
            matches!(result, Err(ConfigError::MalformedAbbreviations(_))),
            "expected malformed table for {}",
            json
        );
    }
}
