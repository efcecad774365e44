use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::default::Default;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;
use crate::text::normalizer::AbbreviationTable;

/// Application configuration module
/// This module handles the run configuration including loading,
/// validating and saving configuration settings. One `Config` value is
/// built per run and handed to every stage; nothing reads settings from
/// process-wide state.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Directory holding every intermediate artifact of a run
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Text chunking settings
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Speech synthesis settings
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Loudness mastering settings
    #[serde(default)]
    pub mastering: MasteringConfig,

    /// Final container settings
    #[serde(default)]
    pub packaging: PackagingConfig,

    /// EPUB conversion settings
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Inline abbreviation expansions (e.g. "Dr." -> "Doctor")
    #[serde(default, alias = "abbreviations")]
    pub abbreviation_map: BTreeMap<String, String>,

    /// JSON file with abbreviation expansions; takes precedence over the inline map
    #[serde(default)]
    pub abbreviation_file: Option<PathBuf>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Synthesis engine family, selected once per run
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisEngineKind {
    // @engine: HTTP studio-quality engine with timed pauses and emphasis
    #[default]
    Studio,
    // @engine: Command-line fast engine, plain text only
    Fast,
}

impl SynthesisEngineKind {
    // @returns: Capitalized engine name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Studio => "Studio",
            Self::Fast => "Fast",
        }
    }

    // @returns: Lowercase engine identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Studio => "studio".to_string(),
            Self::Fast => "fast".to_string(),
        }
    }
}

impl std::fmt::Display for SynthesisEngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for SynthesisEngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "studio" => Ok(Self::Studio),
            "fast" => Ok(Self::Fast),
            _ => Err(anyhow!("Invalid engine type: {}", s)),
        }
    }
}

/// Chunking configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChunkingConfig {
    /// Maximum spoken characters per chunk
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Start a new chunk at every heading so chapter offsets are exact
    #[serde(default = "default_true")]
    pub break_at_headings: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            break_at_headings: true,
        }
    }
}

/// Studio engine endpoint configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StudioEngineConfig {
    // @field: Service URL
    #[serde(default = "default_studio_endpoint")]
    pub endpoint: String,
}

impl Default for StudioEngineConfig {
    fn default() -> Self {
        Self {
            endpoint: default_studio_endpoint(),
        }
    }
}

/// Fast engine command configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FastEngineConfig {
    // @field: Executable name or path
    #[serde(default = "default_fast_command")]
    pub command: String,

    // @field: Extra arguments appended to every invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for FastEngineConfig {
    fn default() -> Self {
        Self {
            command: default_fast_command(),
            extra_args: Vec::new(),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SynthesisConfig {
    /// Engine family
    #[serde(default)]
    pub engine: SynthesisEngineKind,

    /// Voice identifier understood by the engine
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Speech rate multiplier (1.0 = engine default)
    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Pitch offset in semitones
    #[serde(default)]
    pub pitch: f32,

    /// Reference recording for voice cloning (studio engine only)
    #[serde(default)]
    pub reference_audio: Option<PathBuf>,

    /// Maximum concurrent synthesis requests; engine profile default when unset
    #[serde(default)]
    pub concurrent_requests: Option<usize>,

    /// Per-request timeout in seconds
    #[serde(default = "default_synthesis_timeout_secs")]
    pub timeout_secs: u64,

    /// Studio engine settings
    #[serde(default)]
    pub studio: StudioEngineConfig,

    /// Fast engine settings
    #[serde(default)]
    pub fast: FastEngineConfig,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            engine: SynthesisEngineKind::default(),
            voice: default_voice(),
            speed: default_speed(),
            pitch: 0.0,
            reference_audio: None,
            concurrent_requests: None,
            timeout_secs: default_synthesis_timeout_secs(),
            studio: StudioEngineConfig::default(),
            fast: FastEngineConfig::default(),
        }
    }
}

/// Loudness mastering configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MasteringConfig {
    /// Integrated loudness target for mono units (LUFS)
    #[serde(default = "default_loudness_target_lufs")]
    pub loudness_target_lufs: f64,

    /// Integrated loudness target for stereo units (LUFS)
    #[serde(default = "default_stereo_loudness_target_lufs")]
    pub stereo_loudness_target_lufs: f64,

    /// True-peak ceiling (dBTP)
    #[serde(default = "default_true_peak_ceiling_db")]
    pub true_peak_ceiling_db: f64,

    /// Loudness range target (LU)
    #[serde(default = "default_loudness_range")]
    pub loudness_range: f64,

    /// Apply light de-essing after normalization
    #[serde(default)]
    pub deess: bool,

    /// De-esser center frequency in Hz
    #[serde(default = "default_deess_frequency")]
    pub deess_frequency: f64,

    /// De-esser threshold (0.0 - 1.0)
    #[serde(default = "default_deess_threshold")]
    pub deess_threshold: f64,

    /// Maximum units mastered at the same time
    #[serde(default = "default_concurrent_jobs")]
    pub concurrent_jobs: usize,

    /// Audio tool executable
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    /// Per-unit timeout in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MasteringConfig {
    fn default() -> Self {
        Self {
            loudness_target_lufs: default_loudness_target_lufs(),
            stereo_loudness_target_lufs: default_stereo_loudness_target_lufs(),
            true_peak_ceiling_db: default_true_peak_ceiling_db(),
            loudness_range: default_loudness_range(),
            deess: false,
            deess_frequency: default_deess_frequency(),
            deess_threshold: default_deess_threshold(),
            concurrent_jobs: default_concurrent_jobs(),
            ffmpeg: default_ffmpeg(),
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Final container configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PackagingConfig {
    /// Book title written to the container metadata
    #[serde(default = "default_title")]
    pub title: String,

    /// Author, written as the artist tag
    #[serde(default = "default_artist")]
    pub artist: String,

    /// Album tag
    #[serde(default = "default_album")]
    pub album: String,

    /// Cover image attached to the container when present on disk
    #[serde(default)]
    pub cover: Option<PathBuf>,

    /// AAC bitrate
    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// Output audiobook path
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Muxer executable
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    /// Muxing timeout in seconds
    #[serde(default = "default_mux_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            artist: default_artist(),
            album: default_album(),
            cover: None,
            bitrate: default_bitrate(),
            output: default_output(),
            ffmpeg: default_ffmpeg(),
            timeout_secs: default_mux_timeout_secs(),
        }
    }
}

/// EPUB conversion configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConversionConfig {
    /// Converter executable
    #[serde(default = "default_converter_command")]
    pub command: String,

    /// XPath expression used by the converter to detect chapters
    #[serde(default = "default_chapter_xpath")]
    pub chapter_xpath: String,

    /// Conversion timeout in seconds
    #[serde(default = "default_conversion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            command: default_converter_command(),
            chapter_xpath: default_chapter_xpath(),
            timeout_secs: default_conversion_timeout_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("data/work")
}

fn default_output() -> PathBuf {
    PathBuf::from("data/output/audiobook.m4b")
}

fn default_max_chars() -> usize {
    1200
}

fn default_true() -> bool {
    true
}

fn default_studio_endpoint() -> String {
    "http://localhost:8020".to_string()
}

fn default_fast_command() -> String {
    "piper".to_string()
}

fn default_voice() -> String {
    "en_female_01".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_synthesis_timeout_secs() -> u64 {
    300
}

fn default_loudness_target_lufs() -> f64 {
    -18.0
}

fn default_stereo_loudness_target_lufs() -> f64 {
    -16.0
}

fn default_true_peak_ceiling_db() -> f64 {
    -1.0
}

fn default_loudness_range() -> f64 {
    11.0
}

fn default_deess_frequency() -> f64 {
    5500.0
}

fn default_deess_threshold() -> f64 {
    0.5
}

fn default_concurrent_jobs() -> usize {
    4
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    300
}

fn default_mux_timeout_secs() -> u64 {
    3600
}

fn default_title() -> String {
    "Audiobook".to_string()
}

fn default_artist() -> String {
    "TTS Generated".to_string()
}

fn default_album() -> String {
    "EPUB Conversion".to_string()
}

fn default_bitrate() -> String {
    "64k".to_string()
}

fn default_converter_command() -> String {
    "ebook-convert".to_string()
}

fn default_chapter_xpath() -> String {
    r#"//*[(name()="h1" or name()="h2") and re:test(., "chapter|prologue|epilogue|part", "i")]"#
        .to_string()
}

fn default_conversion_timeout_secs() -> u64 {
    600
}

/// Check that a float lies in an inclusive range
fn check_range(key: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::invalid(
            key,
            format!("{} is outside the accepted range [{}, {}]", value, min, max),
        ));
    }
    Ok(())
}

fn check_positive(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(key, "must be greater than zero"));
    }
    Ok(())
}

impl Config {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load the configuration, writing a default one when the file is missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Ok(Self::load(path)?);
        }

        log::warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        crate::file_utils::FileManager::write_to_file(path, &json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }

    /// Validate the configuration for consistency and accepted ranges.
    ///
    /// This also builds the abbreviation table so a malformed table aborts the
    /// run before any stage starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.max_chars == 0 {
            return Err(ConfigError::invalid("chunking.max_chars", "must be greater than zero"));
        }

        let synthesis = &self.synthesis;
        if synthesis.voice.trim().is_empty() {
            return Err(ConfigError::invalid("synthesis.voice", "must not be empty"));
        }
        if !synthesis.speed.is_finite() || synthesis.speed <= 0.0 || synthesis.speed > 4.0 {
            return Err(ConfigError::invalid(
                "synthesis.speed",
                format!("{} is outside the accepted range (0, 4]", synthesis.speed),
            ));
        }
        check_range("synthesis.pitch", synthesis.pitch as f64, -12.0, 12.0)?;
        if synthesis.concurrent_requests == Some(0) {
            return Err(ConfigError::invalid("synthesis.concurrent_requests", "must be greater than zero"));
        }
        check_positive("synthesis.timeout_secs", synthesis.timeout_secs)?;
        if synthesis.engine == SynthesisEngineKind::Studio {
            url::Url::parse(&synthesis.studio.endpoint).map_err(|e| {
                ConfigError::invalid("synthesis.studio.endpoint", e.to_string())
            })?;
        }
        if synthesis.engine == SynthesisEngineKind::Fast && synthesis.fast.command.trim().is_empty() {
            return Err(ConfigError::invalid("synthesis.fast.command", "must not be empty"));
        }

        let mastering = &self.mastering;
        check_range("mastering.loudness_target_lufs", mastering.loudness_target_lufs, -70.0, -5.0)?;
        check_range(
            "mastering.stereo_loudness_target_lufs",
            mastering.stereo_loudness_target_lufs,
            -70.0,
            -5.0,
        )?;
        check_range("mastering.true_peak_ceiling_db", mastering.true_peak_ceiling_db, -9.0, 0.0)?;
        check_range("mastering.loudness_range", mastering.loudness_range, 1.0, 20.0)?;
        check_range("mastering.deess_frequency", mastering.deess_frequency, 1000.0, 16000.0)?;
        check_range("mastering.deess_threshold", mastering.deess_threshold, 0.0, 1.0)?;
        check_positive("mastering.concurrent_jobs", mastering.concurrent_jobs as u64)?;
        check_positive("mastering.timeout_secs", mastering.timeout_secs)?;

        if self.packaging.bitrate.trim().is_empty() {
            return Err(ConfigError::invalid("packaging.bitrate", "must not be empty"));
        }
        check_positive("packaging.timeout_secs", self.packaging.timeout_secs)?;
        check_positive("conversion.timeout_secs", self.conversion.timeout_secs)?;

        self.abbreviation_table()?;

        Ok(())
    }

    /// Build the abbreviation table for this run.
    ///
    /// The file wins over the inline map; with neither configured the
    /// built-in defaults are used.
    pub fn abbreviation_table(&self) -> Result<AbbreviationTable, ConfigError> {
        if let Some(path) = &self.abbreviation_file {
            return AbbreviationTable::from_file(path);
        }

        if self.abbreviation_map.is_empty() {
            return Ok(AbbreviationTable::default());
        }

        AbbreviationTable::new(
            self.abbreviation_map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        )
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            work_dir: default_work_dir(),
            chunking: ChunkingConfig::default(),
            synthesis: SynthesisConfig::default(),
            mastering: MasteringConfig::default(),
            packaging: PackagingConfig::default(),
            conversion: ConversionConfig::default(),
            abbreviation_map: BTreeMap::new(),
            abbreviation_file: None,
            log_level: LogLevel::default(),
        }
    }
}
