/*!
 * EPUB to Markdown conversion.
 *
 * Thin adapter around the external e-book converter. Its Markdown output
 * keeps the book's headings so the cue annotator can recover chapters.
 * Inputs that already are Markdown or plain text are copied as they are.
 */

use log::info;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::ConversionConfig;
use crate::errors::{AppError, StageName};
use crate::file_utils::FileManager;
use crate::tools::{ToolInvocation, ToolRunner};

/// Extensions taken as already converted text
const TEXT_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// Runs the external EPUB converter
#[derive(Debug)]
pub struct DocumentConverter {
    config: ConversionConfig,
    runner: Arc<dyn ToolRunner>,
}

impl DocumentConverter {
    pub fn new(config: ConversionConfig, runner: Arc<dyn ToolRunner>) -> Self {
        Self { config, runner }
    }

    /// Whether the input can skip conversion
    pub fn is_text_input(input: &Path) -> bool {
        input
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                TEXT_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }

    /// Converter command line
    pub fn invocation(&self, input: &Path, output: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.config.command)
            .arg(input.display().to_string())
            .arg(output.display().to_string())
            .args(["--keep-links", "--pretty-print", "--chapter"])
            .arg(self.config.chapter_xpath.clone())
            .timeout(Duration::from_secs(self.config.timeout_secs))
    }

    /// Convert `input` into Markdown at `output`
    pub async fn convert(&self, input: &Path, output: &Path) -> Result<(), AppError> {
        if !input.exists() {
            return Err(AppError::File(format!("Input file does not exist: {:?}", input)));
        }

        if let Some(parent) = output.parent() {
            FileManager::ensure_dir(parent).map_err(|e| AppError::File(format!("{:#}", e)))?;
        }

        if Self::is_text_input(input) {
            info!("Input {:?} is already text, copying", input);
            FileManager::copy_file(input, output).map_err(|e| AppError::File(format!("{:#}", e)))?;
            return Ok(());
        }

        info!("Converting {:?} with {}", input, self.config.command);
        self.runner
            .run(self.invocation(input, output))
            .await
            .map_err(|e| AppError::external(StageName::Conversion, None, e.to_string()))?;

        if !output.exists() {
            return Err(AppError::external(
                StageName::Conversion,
                None,
                format!("converter produced no output at {:?}", output),
            ));
        }
        Ok(())
    }
}
