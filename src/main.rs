// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

use bookvox::app_config::{self, Config, SynthesisEngineKind};
use bookvox::app_controller::{Controller, RunOptions, Stage};
use bookvox::errors::AppError;

/// CLI Wrapper for SynthesisEngineKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliEngine {
    Studio,
    Fast,
}

impl From<CliEngine> for SynthesisEngineKind {
    fn from(cli_engine: CliEngine) -> Self {
        match cli_engine {
            CliEngine::Studio => SynthesisEngineKind::Studio,
            CliEngine::Fast => SynthesisEngineKind::Fast,
        }
    }
}

/// CLI Wrapper for Stage to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliStage {
    Convert,
    Chunk,
    Synthesize,
    Master,
    Package,
}

impl From<CliStage> for Stage {
    fn from(cli_stage: CliStage) -> Self {
        match cli_stage {
            CliStage::Convert => Stage::Convert,
            CliStage::Chunk => Stage::Chunk,
            CliStage::Synthesize => Stage::Synthesize,
            CliStage::Master => Stage::Master,
            CliStage::Package => Stage::Package,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the whole pipeline: convert, chunk, synthesize, master, package
    Convert {
        /// Input book (EPUB, or Markdown/text to skip conversion)
        #[arg(value_name = "BOOK")]
        input: Option<PathBuf>,

        /// Stage to start from; artifacts of earlier stages must exist
        #[arg(long, value_enum, default_value = "convert")]
        from_stage: CliStage,

        /// Re-chunk even if a manifest already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Normalize, annotate and chunk a Markdown file into the work directory
    Chunk {
        /// Markdown file; defaults to the converted book in the work directory
        #[arg(value_name = "MARKDOWN")]
        input: Option<PathBuf>,

        /// Replace an existing manifest
        #[arg(short, long)]
        force: bool,
    },

    /// Synthesize audio units for every chunk in the manifest
    Synthesize,

    /// Loudness-master every synthesized unit
    Master,

    /// Assemble mastered units into the final audiobook
    Package,

    /// Show manifest size and produced unit counts
    Status,

    /// Generate shell completions for bookvox
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// bookvox - chapterized audiobooks from EPUB books
///
/// Converts a book to Markdown, splits it into cue-annotated chunks,
/// synthesizes each chunk, masters the audio and packages an M4B with chapters.
#[derive(Parser, Debug)]
#[command(name = "bookvox")]
#[command(version = "0.1.0")]
#[command(about = "Turn EPUB books into chapterized audiobooks")]
#[command(long_about = "bookvox turns EPUB books into chapterized M4B audiobooks.

EXAMPLES:
    bookvox convert book.epub                     # Full run with conf.json
    bookvox convert --from-stage master           # Resume from mastering
    bookvox convert -f book.epub                  # Re-chunk and start over
    bookvox chunk notes.md                        # Only chunk a Markdown file
    bookvox -e fast --voice en_US-amy synthesize  # Synthesize with the fast engine
    bookvox status                                # Show work directory progress
    bookvox completions bash > bookvox.bash       # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

ENGINES:
    studio - HTTP engine with timed pauses, emphasis and voice cloning
    fast   - Command-line engine (piper compatible) reading text on stdin")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// Work directory for intermediate files
    #[arg(short, long, global = true)]
    work_dir: Option<PathBuf>,

    /// Output audiobook path
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Synthesis engine to use
    #[arg(short, long, value_enum, global = true)]
    engine: Option<CliEngine>,

    /// Voice identifier
    #[arg(long, global = true)]
    voice: Option<String>,

    /// Speech rate multiplier
    #[arg(long, global = true)]
    speed: Option<f32>,

    /// Maximum characters per chunk
    #[arg(long, global = true)]
    max_chars: Option<usize>,

    /// Book title for the audiobook metadata
    #[arg(long, global = true)]
    title: Option<String>,

    /// Author for the audiobook metadata
    #[arg(long, global = true)]
    author: Option<String>,

    /// Cover image attached to the audiobook
    #[arg(long, global = true)]
    cover: Option<PathBuf>,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color code for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }

    // @returns: Short tag for log level
    fn tag_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "ERR",
            Level::Warn => "WRN",
            Level::Info => "",
            Level::Debug => "DBG",
            Level::Trace => "TRC",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // The global max level is adjusted after config load
        metadata.level() <= self.level || metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {:>3} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                Self::tag_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Load the configuration and apply command line overrides
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let mut config = Config::load_or_create(Path::new(&cli.config_path))
        .with_context(|| format!("Failed to load config file: {}", cli.config_path))?;

    if let Some(work_dir) = &cli.work_dir {
        config.work_dir = work_dir.clone();
    }
    if let Some(output) = &cli.output {
        config.packaging.output = output.clone();
    }
    if let Some(engine) = &cli.engine {
        config.synthesis.engine = engine.clone().into();
    }
    if let Some(voice) = &cli.voice {
        config.synthesis.voice = voice.clone();
    }
    if let Some(speed) = cli.speed {
        config.synthesis.speed = speed;
    }
    if let Some(max_chars) = cli.max_chars {
        config.chunking.max_chars = max_chars;
    }
    if let Some(title) = &cli.title {
        config.packaging.title = title.clone();
    }
    if let Some(author) = &cli.author {
        config.packaging.artist = author.clone();
    }
    if let Some(cover) = &cli.cover {
        config.packaging.cover = Some(cover.clone());
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }

    config
        .validate()
        .map_err(AppError::from)
        .context("Configuration validation failed")?;

    Ok(config)
}

#[tokio::main]
async fn main() {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    if let Err(e) = CustomLogger::init(LevelFilter::Info) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let cli = CommandLineOptions::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        if let Some(app_error) = e.downcast_ref::<AppError>() {
            if let Some(index) = app_error.chunk_index() {
                warn!("Fix the problem and resume; units before chunk {} are kept", index);
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: CommandLineOptions) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "bookvox", &mut std::io::stdout());
        return Ok(());
    }

    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &cli.log_level {
        log::set_max_level(level_filter(&cmd_log_level.clone().into()));
    }

    let config = load_config(&cli)?;
    log::set_max_level(level_filter(&config.log_level));

    let controller = Controller::with_config(config)?;

    // Ctrl-C stops dispatching new chunk work; in-flight work completes
    let cancel = controller.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::Convert {
            input,
            from_stage,
            force,
        } => {
            let options = RunOptions {
                from_stage: from_stage.into(),
                force,
            };
            let report = controller.run(input.as_deref(), options).await?;
            info!("Success: {}", report.output.display());
        }
        Commands::Chunk { input, force } => {
            controller.layout().prepare()?;
            let markdown = input.unwrap_or_else(|| controller.layout().markdown());
            let manifest = controller.chunk(&markdown, force)?;
            info!("Manifest with {} chunks at {}", manifest.len(), controller.layout().manifest().display());
        }
        Commands::Synthesize => {
            let report = controller.synthesize().await?;
            info!("Synthesized {} units, {} already present", report.synthesized, report.skipped);
        }
        Commands::Master => {
            let report = controller.master().await?;
            info!(
                "Mastered {} units ({} on retry), {} already present",
                report.mastered, report.retried, report.skipped
            );
        }
        Commands::Package => {
            let report = controller.package().await?;
            info!("Success: {} ({} chapters)", report.output.display(), report.chapters.len());
        }
        Commands::Status => {
            let status = controller.status()?;
            match status.manifest_entries {
                Some(entries) => info!("Manifest: {} chunks, {} headings", entries, status.headings),
                None => info!("Manifest: not created yet"),
            }
            info!("Synthesized units: {}", status.raw_units);
            info!("Mastered units: {}", status.mastered_units);
            info!(
                "Audiobook: {}",
                if status.output_exists { "written" } else { "not written yet" }
            );
        }
        Commands::Completions { .. } => {
            return Err(anyhow!("Completions are handled before configuration is loaded"));
        }
    }

    Ok(())
}
