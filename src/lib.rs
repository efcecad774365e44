/*!
 * # bookvox - chapterized audiobooks from EPUB books
 *
 * A Rust library that turns a book into an M4B audiobook with chapters.
 *
 * ## Features
 *
 * - EPUB to Markdown conversion through an external converter
 * - Text normalization (whitespace, dashes, abbreviations)
 * - Prosody cues: pauses and emphasis around headings and paragraphs
 * - Budgeted chunking with a persisted, resumable manifest
 * - Speech synthesis through a studio (HTTP) or fast (CLI) engine
 * - Loudness mastering and single-pass chapterized muxing
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `text`: Normalizer, cue annotator and chunker
 * - `manifest`: Chunk and manifest persistence
 * - `synthesis`: Engines, cue rendering and the synthesis dispatcher
 * - `mastering`: Per-unit loudness normalization
 * - `assembler`: Chapter computation and final muxing
 * - `converter`: EPUB conversion
 * - `tools`: External program invocation
 * - `audio`: PCM buffers and WAV units
 * - `concurrency`: Worker pool defaults and run cancellation
 * - `file_utils`: File system operations and workspace layout
 * - `app_controller`: Main application controller
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod assembler;
pub mod audio;
pub mod concurrency;
pub mod converter;
pub mod errors;
pub mod file_utils;
pub mod manifest;
pub mod mastering;
pub mod synthesis;
pub mod text;
pub mod tools;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, RunOptions, Stage};
pub use errors::{AppError, ConfigError, ManifestError, ProviderError, StageName, ToolError};
pub use manifest::{Manifest, ManifestEntry};
pub use text::{Chunk, Chunker, CueAnnotator, Normalizer};
