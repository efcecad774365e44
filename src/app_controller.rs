use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::app_config::Config;
use crate::assembler::{Assembler, AssemblyReport};
use crate::concurrency::{CancelFlag, LogCapture, LogEntry};
use crate::converter::DocumentConverter;
use crate::errors::{AppError, StageName};
use crate::file_utils::{FileManager, WorkspaceLayout};
use crate::manifest::{Manifest, persist_chunks};
use crate::mastering::{MasteringReport, MasteringStage};
use crate::synthesis::{DispatchReport, SynthesisDispatcher, SynthesisEngine, build_engine};
use crate::text::{Chunker, CueAnnotator, Normalizer};
use crate::tools::{SystemToolRunner, ToolRunner};

// @module: Application controller for the audiobook pipeline

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Convert,
    Chunk,
    Synthesize,
    Master,
    Package,
}

impl Stage {
    pub fn all() -> [Stage; 5] {
        [
            Stage::Convert,
            Stage::Chunk,
            Stage::Synthesize,
            Stage::Master,
            Stage::Package,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Convert => "convert",
            Stage::Chunk => "chunk",
            Stage::Synthesize => "synthesize",
            Stage::Master => "master",
            Stage::Package => "package",
        }
    }

    fn stage_name(&self) -> StageName {
        match self {
            Stage::Convert => StageName::Conversion,
            Stage::Chunk => StageName::Chunking,
            Stage::Synthesize => StageName::Synthesis,
            Stage::Master => StageName::Mastering,
            Stage::Package => StageName::Assembly,
        }
    }
}

/// Options of a full pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    // @field: First stage to execute; earlier stages' artifacts must exist
    pub from_stage: Stage,
    // @field: Re-chunk even when a manifest exists
    pub force: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            from_stage: Stage::Convert,
            force: false,
        }
    }
}

/// Snapshot of a work directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    /// Manifest entries, when a manifest exists
    pub manifest_entries: Option<usize>,
    /// Headings recorded in the manifest
    pub headings: usize,
    /// Synthesized units on disk
    pub raw_units: usize,
    /// Mastered units on disk
    pub mastered_units: usize,
    /// Whether the final audiobook exists
    pub output_exists: bool,
}

/// Main application controller for the audiobook pipeline
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Paths of this run
    layout: WorkspaceLayout,
    // @field: Runs the converter, the audio tool and the muxer
    runner: Arc<dyn ToolRunner>,
    // @field: Engine chosen once for the run
    engine: Arc<dyn SynthesisEngine>,
    // @field: Run-level cancellation
    cancel: CancelFlag,
    // @field: Whether progress bars are drawn
    show_progress: bool,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let runner: Arc<dyn ToolRunner> = Arc::new(SystemToolRunner::new());
        let engine = build_engine(&config.synthesis, runner.clone());
        Self::with_components(config, runner, engine)
    }

    /// Create a controller with explicit tool runner and engine
    pub fn with_components(
        config: Config,
        runner: Arc<dyn ToolRunner>,
        engine: Arc<dyn SynthesisEngine>,
    ) -> Result<Self> {
        config.validate().map_err(AppError::from)?;
        let layout = WorkspaceLayout::new(&config.work_dir, &config.packaging.output);

        Ok(Self {
            config,
            layout,
            runner,
            engine,
            cancel: CancelFlag::new(),
            show_progress: true,
        })
    }

    /// Enable or disable progress bars
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Flag that stops the run when set (e.g. on Ctrl-C)
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn check_cancelled(&self, next: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled(next.stage_name()).into());
        }
        Ok(())
    }

    /// Run the pipeline from `options.from_stage` to the final audiobook
    pub async fn run(&self, input: Option<&Path>, options: RunOptions) -> Result<AssemblyReport> {
        let start_time = Instant::now();
        self.layout.prepare()?;

        info!(
            "Starting run in {:?} from stage '{}'",
            self.layout.work_dir,
            options.from_stage.as_str()
        );

        for stage in Stage::all().into_iter().filter(|s| *s >= options.from_stage) {
            self.check_cancelled(stage)?;

            match stage {
                Stage::Convert => {
                    let input = input.ok_or_else(|| anyhow!("An input book is required to start from the convert stage"))?;
                    self.convert(input).await?;
                }
                Stage::Chunk => {
                    let markdown = self.layout.markdown();
                    if options.force || !self.layout.manifest().exists() {
                        self.chunk(&markdown, options.force)?;
                    } else if self.manifest_matches(&markdown)? {
                        info!("Manifest matches {:?}, reusing it (use --force to re-chunk)", markdown);
                    } else {
                        warn!("{:?} changed since the manifest was written, re-chunking", markdown);
                        self.chunk(&markdown, true)?;
                    }
                }
                Stage::Synthesize => {
                    self.synthesize().await?;
                }
                Stage::Master => {
                    self.master().await?;
                }
                Stage::Package => {
                    let report = self.package().await?;
                    info!(
                        "Finished in {}: {} of audio",
                        Self::format_duration(start_time.elapsed()),
                        Self::format_duration(std::time::Duration::from_millis(report.total_duration_ms))
                    );
                    return Ok(report);
                }
            }
        }

        Err(anyhow!("Run ended before packaging"))
    }

    /// Convert the input book to Markdown in the work directory
    pub async fn convert(&self, input: &Path) -> Result<PathBuf> {
        let output = self.layout.markdown();
        let converter = DocumentConverter::new(self.config.conversion.clone(), self.runner.clone());
        converter.convert(input, &output).await?;
        info!("Converted {:?} to {:?}", input, output);
        Ok(output)
    }

    /// Normalize, annotate and chunk a Markdown file, then write the manifest
    pub fn chunk(&self, markdown: &Path, force: bool) -> Result<Manifest> {
        let raw = FileManager::read_to_string(markdown)?;

        let normalizer = Normalizer::new(self.config.abbreviation_table().map_err(AppError::from)?);
        let normalized = normalizer.normalize(&raw);
        let annotated = CueAnnotator::new().annotate(&normalized);
        let chunks = Chunker::from_config(&self.config.chunking).chunk(&annotated);

        if chunks.is_empty() {
            return Err(anyhow!("No speakable text found in {:?}", markdown));
        }

        let source_hash = FileManager::sha256_hex(raw.as_bytes());
        let had_manifest = self.layout.manifest().exists();
        let manifest = persist_chunks(&self.layout, &chunks, &source_hash, force)?;

        if force && had_manifest {
            // units of the previous chunking no longer line up with the manifest
            FileManager::remove_dir_if_exists(self.layout.wavs_dir())?;
            FileManager::remove_dir_if_exists(self.layout.mastered_dir())?;
            self.layout.prepare()?;
            info!("Removed audio units of the previous chunking");
        }

        info!(
            "Chunked {} paragraphs into {} chunks ({} headings, budget {} chars)",
            annotated.len(),
            manifest.len(),
            manifest.heading_count(),
            self.config.chunking.max_chars
        );
        Ok(manifest)
    }

    /// Whether the existing manifest was cut from the current Markdown
    fn manifest_matches(&self, markdown: &Path) -> Result<bool> {
        let manifest = self.load_manifest()?;
        let raw = FileManager::read_to_string(markdown)?;
        let current = FileManager::sha256_hex(raw.as_bytes());
        debug!(
            "Manifest source {}, current source {}",
            manifest.source_hash().unwrap_or("unknown"),
            current
        );
        Ok(manifest.matches_source(&current))
    }

    fn load_manifest(&self) -> Result<Manifest> {
        Manifest::load(&self.layout.manifest())
            .map_err(AppError::from)
            .context("Cannot continue without a valid manifest")
    }

    /// Synthesize every chunk that has no audio unit yet
    pub async fn synthesize(&self) -> Result<DispatchReport> {
        let manifest = self.load_manifest()?;
        FileManager::ensure_dir(self.layout.wavs_dir())?;

        let missing = manifest
            .entries()
            .iter()
            .filter(|e| !self.layout.raw_unit(e.index).exists())
            .count();
        if missing > 0 {
            self.engine
                .test_connection()
                .await
                .map_err(|e| AppError::external(StageName::Synthesis, None, e.to_string()))?;
        }

        let dispatcher = SynthesisDispatcher::new(self.engine.clone(), &self.config.synthesis, self.cancel.clone());
        info!(
            "Synthesis engine: {} - voice {}",
            self.config.synthesis.engine.display_name(),
            self.config.synthesis.voice
        );

        let progress_bar = self.progress_bar(manifest.len() as u64, "Synthesizing");
        let log_capture: LogCapture = Arc::new(Mutex::new(Vec::new()));
        let pb = progress_bar.clone();

        let result = dispatcher
            .run(&manifest, &self.layout, log_capture.clone(), move |completed, _total| {
                pb.set_position(completed as u64);
            })
            .await;

        progress_bar.finish_and_clear();
        self.report_captured_logs(&log_capture, "Synthesis");

        Ok(result?)
    }

    /// Master every unit that has no mastered copy yet
    pub async fn master(&self) -> Result<MasteringReport> {
        let manifest = self.load_manifest()?;
        let stage = MasteringStage::new(self.config.mastering.clone(), self.runner.clone(), self.cancel.clone());

        let progress_bar = self.progress_bar(manifest.len() as u64, "Mastering");
        let log_capture: LogCapture = Arc::new(Mutex::new(Vec::new()));
        let pb = progress_bar.clone();

        let result = stage
            .run(&manifest, &self.layout, log_capture.clone(), move |completed, _total| {
                pb.set_position(completed as u64);
            })
            .await;

        progress_bar.finish_and_clear();
        self.report_captured_logs(&log_capture, "Mastering");

        Ok(result?)
    }

    /// Concatenate mastered units into the final chapterized audiobook
    pub async fn package(&self) -> Result<AssemblyReport> {
        let manifest = self.load_manifest()?;
        let assembler = Assembler::new(self.config.packaging.clone(), self.runner.clone());
        Ok(assembler.run(&manifest, &self.layout).await?)
    }

    /// Inspect the work directory
    pub fn status(&self) -> Result<StatusReport> {
        let manifest = if self.layout.manifest().exists() {
            Some(Manifest::load(&self.layout.manifest()).map_err(AppError::from)?)
        } else {
            None
        };

        let count_units = |dir: PathBuf| -> Result<usize> {
            Ok(FileManager::find_files(dir, "wav")?
                .iter()
                .filter(|p| !p.to_string_lossy().ends_with(".partial.wav"))
                .count())
        };

        Ok(StatusReport {
            manifest_entries: manifest.as_ref().map(Manifest::len),
            headings: manifest.as_ref().map(Manifest::heading_count).unwrap_or(0),
            raw_units: count_units(self.layout.wavs_dir())?,
            mastered_units: count_units(self.layout.mastered_dir())?,
            output_exists: FileManager::file_exists(&self.layout.output),
        })
    }

    fn progress_bar(&self, len: u64, message: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress_bar = ProgressBar::new(len);
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(template_result.progress_chars("█▓▒░"));
        progress_bar.set_message(message);
        progress_bar
    }

    /// Print logs captured while a progress bar was visible and keep them on disk
    fn report_captured_logs(&self, log_capture: &LogCapture, stage: &str) {
        let logs: Vec<LogEntry> = log_capture.lock().clone();
        if logs.is_empty() {
            return;
        }

        let error_logs = logs.iter().filter(|log| log.level == "ERROR").count();
        let warning_logs = logs.iter().filter(|log| log.level == "WARN").count();
        info!("{} completed with {} errors and {} warnings.", stage, error_logs, warning_logs);

        let log_file_path = self.layout.work_dir.join("bookvox.issues.log");
        for log in &logs {
            match log.level.as_str() {
                "ERROR" => error!("{}", log.message),
                "WARN" => warn!("{}", log.message),
                _ => debug!("{}", log.message),
            }
            let line = format!("{} {}: {}", stage, log.level, log.message);
            if let Err(e) = FileManager::append_to_log_file(&log_file_path, &line) {
                warn!("Failed to write logs to file: {}", e);
                break;
            }
        }
    }

    // Format duration in a human-readable format (HH:MM:SS)
    fn format_duration(duration: std::time::Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
