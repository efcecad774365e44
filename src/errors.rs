/*!
 * Error types for the bookvox application.
 *
 * This module contains custom error types for the different stages of the
 * audiobook pipeline, using the thiserror crate for ergonomic error definitions.
 * Every error raised by a stage carries enough context (stage name, chunk index)
 * for the caller to resume the run from that point.
 */

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage names used in error reports and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    Conversion,
    Chunking,
    Synthesis,
    Mastering,
    Assembly,
}

impl StageName {
    /// Lowercase identifier of the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversion => "conversion",
            Self::Chunking => "chunking",
            Self::Synthesis => "synthesis",
            Self::Mastering => "mastering",
            Self::Assembly => "assembly",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while loading or validating the run configuration.
///
/// Any of these aborts the run before the first stage starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The abbreviation table could not be used as a whole
    #[error("Malformed abbreviation table: {0}")]
    MalformedAbbreviations(String),

    /// A configuration value is outside its accepted range
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Dotted configuration key
        key: String,
        /// What is wrong with it
        message: String,
    },

    /// The configuration file could not be read or parsed
    #[error("Failed to load configuration from {path}: {message}")]
    Unreadable {
        /// Path of the configuration file
        path: String,
        /// Underlying reason
        message: String,
    },
}

impl ConfigError {
    /// Shorthand for an out-of-range value
    pub fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Errors reported by a synthesis engine for a single request
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making a request fails
    #[error("Synthesis request failed: {0}")]
    RequestFailed(String),

    /// Error when the engine answered with something that is not usable audio
    #[error("Failed to decode engine audio: {0}")]
    InvalidAudio(String),

    /// Error returned by the engine API itself
    #[error("Engine responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the engine
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The engine process could not be run or exited unsuccessfully
    #[error("Engine process failed: {0}")]
    ProcessFailed(String),
}

/// Failure of a single external tool invocation (converter, ffmpeg, engine CLI)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    /// The program is not installed or not on PATH
    #[error("{program} not found, is it installed?")]
    NotFound {
        /// Program name
        program: String,
    },

    /// The program ran past its deadline and was killed
    #[error("{program} timed out after {seconds}s")]
    TimedOut {
        /// Program name
        program: String,
        /// Timeout that was exceeded
        seconds: u64,
    },

    /// The program exited with a non-zero status
    #[error("{program} exited with status {code:?}: {stderr}")]
    Failed {
        /// Program name
        program: String,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Filtered standard error output
        stderr: String,
    },

    /// Spawning or talking to the process failed
    #[error("{program} I/O error: {message}")]
    Io {
        /// Program name
        program: String,
        /// Underlying I/O error message
        message: String,
    },
}

/// Errors reading or writing WAV audio units
#[derive(Error, Debug)]
pub enum AudioError {
    /// The WAV data could not be decoded
    #[error("Failed to read audio {path}: {message}")]
    Decode {
        /// Source of the audio data
        path: String,
        /// Decoder message
        message: String,
    },

    /// The WAV data could not be written
    #[error("Failed to write audio {path}: {message}")]
    Encode {
        /// Destination path
        path: String,
        /// Encoder message
        message: String,
    },
}

/// Errors about the persisted chunk manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    /// There is no manifest where one was expected
    #[error("Manifest not found at {0}, run the chunk stage first")]
    NotFound(PathBuf),

    /// The manifest or a chunk file is not valid JSON
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// File that failed to parse
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// The manifest indices are not the contiguous range 0..n
    #[error("Manifest index sequence broken at position {position}: found index {found}")]
    BrokenSequence {
        /// Position in the manifest
        position: usize,
        /// Index stored at that position
        found: usize,
    },

    /// A manifest already exists and overwriting was not requested
    #[error("Manifest already exists at {0} (use --force to re-chunk)")]
    AlreadyExists(PathBuf),

    /// A chunk file referenced by the manifest does not match its entry
    #[error("Chunk file {path} holds index {found}, manifest expects {expected}")]
    ChunkMismatch {
        /// Chunk file path
        path: PathBuf,
        /// Index from the manifest
        expected: usize,
        /// Index inside the chunk file
        found: usize,
    },
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid configuration; raised before any stage runs
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An external capability failed during a stage
    #[error("{stage} failed{}: {message}", chunk_suffix(.index))]
    ExternalTool {
        /// Stage that invoked the tool
        stage: StageName,
        /// Chunk index being processed, if the failure is per chunk
        index: Option<usize>,
        /// Description of the failure
        message: String,
    },

    /// An expected audio unit is absent
    #[error("Missing audio unit for chunk {index} ({path})")]
    MissingUnit {
        /// First missing index
        index: usize,
        /// Where the unit was expected
        path: PathBuf,
    },

    /// Manifest problems
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Audio decoding or encoding problems
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// The run was cancelled before it finished
    #[error("Run cancelled during {0}")]
    Cancelled(StageName),

    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),
}

impl AppError {
    /// Build an external tool error for a stage and optional chunk index
    pub fn external(stage: StageName, index: Option<usize>, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            stage,
            index,
            message: message.into(),
        }
    }

    /// Chunk index the error refers to, if any
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::ExternalTool { index, .. } => *index,
            Self::MissingUnit { index, .. } => Some(*index),
            _ => None,
        }
    }
}

fn chunk_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" at chunk {}", i)).unwrap_or_default()
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
