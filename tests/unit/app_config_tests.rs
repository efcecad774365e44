/*!
 * Tests for application configuration functionality
 */

use anyhow::Result;
use std::path::PathBuf;
use std::str::FromStr;

use bookvox::app_config::{Config, LogLevel, SynthesisEngineKind};
use bookvox::errors::ConfigError;
use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.chunking.max_chars, 1200);
    assert!(config.chunking.break_at_headings);
    assert_eq!(config.synthesis.engine, SynthesisEngineKind::Studio);
    assert_eq!(config.synthesis.concurrent_requests, None);
    assert_eq!(config.mastering.loudness_target_lufs, -18.0);
    assert_eq!(config.mastering.stereo_loudness_target_lufs, -16.0);
    assert_eq!(config.mastering.true_peak_ceiling_db, -1.0);
    assert!(!config.mastering.deess);
    assert_eq!(config.packaging.bitrate, "64k");
    assert_eq!(config.work_dir, PathBuf::from("data/work"));
    assert_eq!(config.log_level, LogLevel::Info);
    assert!(config.validate().is_ok());
}

/// Test configuration validation ranges
#[test]
fn test_config_validation_withOutOfRangeValues_shouldNameTheKey() {
    let cases: Vec<(&str, Box<dyn Fn(&mut Config)>)> = vec![
        ("chunking.max_chars", Box::new(|c: &mut Config| c.chunking.max_chars = 0)),
        ("synthesis.voice", Box::new(|c: &mut Config| c.synthesis.voice = "  ".to_string())),
        ("synthesis.speed", Box::new(|c: &mut Config| c.synthesis.speed = 0.0)),
        ("synthesis.pitch", Box::new(|c: &mut Config| c.synthesis.pitch = 20.0)),
        ("synthesis.concurrent_requests", Box::new(|c: &mut Config| c.synthesis.concurrent_requests = Some(0))),
        ("synthesis.studio.endpoint", Box::new(|c: &mut Config| c.synthesis.studio.endpoint = "not a url".to_string())),
        ("mastering.loudness_target_lufs", Box::new(|c: &mut Config| c.mastering.loudness_target_lufs = 3.0)),
        ("mastering.true_peak_ceiling_db", Box::new(|c: &mut Config| c.mastering.true_peak_ceiling_db = 2.0)),
        ("mastering.deess_threshold", Box::new(|c: &mut Config| c.mastering.deess_threshold = 1.5)),
        ("mastering.concurrent_jobs", Box::new(|c: &mut Config| c.mastering.concurrent_jobs = 0)),
        ("packaging.bitrate", Box::new(|c: &mut Config| c.packaging.bitrate = String::new())),
    ];

    for (expected_key, mutate) in cases {
        let mut config = Config::default();
        mutate(&mut config);
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected invalid {} but got {:?}", expected_key, other),
        }
    }
}

/// Test that a malformed inline abbreviation table fails validation
#[test]
fn test_config_validation_withMalformedAbbreviations_shouldFail() {
    let mut config = Config::default();
    config.abbreviation_map.insert("Mr.".to_string(), String::new());
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MalformedAbbreviations(_))
    ));
}

/// Test that an abbreviation file takes precedence over the inline map
#[test]
fn test_abbreviation_table_withFile_shouldPreferFile() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "abbr.json", r#"{"Prof.": "Professor"}"#)?;

    let mut config = Config::default();
    config.abbreviation_map.insert("Mr.".to_string(), "Mister".to_string());
    config.abbreviation_file = Some(path);

    let table = config.abbreviation_table()?;
    assert_eq!(table.len(), 1);
    assert_eq!(table.apply("Prof. Mr. X"), "Professor Mr. X");
    Ok(())
}

/// Test saving and loading a configuration file
#[test]
fn test_config_save_and_load_shouldPreserveValues() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let mut config = Config::default();
    config.synthesis.engine = SynthesisEngineKind::Fast;
    config.synthesis.voice = "en_US-amy".to_string();
    config.mastering.deess = true;
    config.save(&path)?;

    let loaded = Config::load(&path)?;
    assert_eq!(loaded, config);
    Ok(())
}

/// Test that a missing config file is created with defaults
#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefault() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let config = Config::load_or_create(&path)?;
    assert!(path.exists());
    assert_eq!(config, Config::default());
    Ok(())
}

/// Test that partial configuration files fall back to defaults
#[test]
fn test_load_withPartialFile_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{"synthesis": {"engine": "fast", "voice": "v1"}, "abbreviations": {"St.": "Saint"}}"#,
    )?;

    let config = Config::load(&path)?;
    assert_eq!(config.synthesis.engine, SynthesisEngineKind::Fast);
    assert_eq!(config.synthesis.voice, "v1");
    assert_eq!(config.chunking.max_chars, 1200);
    assert_eq!(config.abbreviation_map.get("St.").map(String::as_str), Some("Saint"));
    Ok(())
}

/// Test engine name parsing
#[test]
fn test_engine_kind_fromStr_shouldAcceptKnownNames() {
    assert_eq!(SynthesisEngineKind::from_str("Studio").ok(), Some(SynthesisEngineKind::Studio));
    assert_eq!(SynthesisEngineKind::from_str("fast").ok(), Some(SynthesisEngineKind::Fast));
    assert!(SynthesisEngineKind::from_str("robot").is_err());
}
