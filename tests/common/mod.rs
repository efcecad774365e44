/*!
 * Common test utilities for the bookvox test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use bookvox::app_config::Config;
use bookvox::app_controller::Controller;
use bookvox::synthesis::SynthesisEngine;
use bookvox::synthesis::mock::MockEngine;
use bookvox::tools::ToolRunner;
use bookvox::tools::mock::MockToolRunner;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// A short book with three chapters
pub fn create_test_book(dir: &Path) -> Result<PathBuf> {
    let content = "# Chapter One\n\nIt was a bright cold day in April.\n\nThe clocks were striking thirteen.\n\n\
# Chapter Two\n\nMr. Smith walked home\u{00A0}slowly.\n\nHe did not look back.\n\n\
# Chapter Three\n\nThe end came quietly.\n";
    create_test_file(dir, "book.md", content)
}

/// A book without headings, split into `paragraphs` chunks of one
/// paragraph each under the budget of `config_in`
pub fn create_flat_book(dir: &Path, paragraphs: usize) -> Result<PathBuf> {
    let content = (0..paragraphs)
        .map(|i| format!("Paragraph number {:02} of the flat test book.", i))
        .collect::<Vec<_>>()
        .join("\n\n");
    create_test_file(dir, "flat.md", &content)
}

/// Configuration rooted in a temporary directory
pub fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.work_dir = dir.join("work");
    config.packaging.output = dir.join("out").join("book.m4b");
    config.packaging.title = "Test Book".to_string();
    // one flat-book paragraph per chunk
    config.chunking.max_chars = 60;
    config.mastering.concurrent_jobs = 2;
    config
}

/// Controller wired to mock components, without progress bars
pub fn mock_controller(
    config: Config,
    engine: Arc<MockEngine>,
    runner: Arc<MockToolRunner>,
) -> Result<Controller> {
    let engine: Arc<dyn SynthesisEngine> = engine;
    let runner: Arc<dyn ToolRunner> = runner;
    Ok(Controller::with_components(config, runner, engine)?.with_progress(false))
}

/// Controller with a working engine and a copying tool runner
pub fn working_controller(config: Config) -> Result<Controller> {
    mock_controller(
        config,
        Arc::new(MockEngine::working()),
        Arc::new(MockToolRunner::copying()),
    )
}
