/*!
 * Loudness mastering of synthesized units.
 *
 * Each raw unit is run through the audio filter tool with a loudnorm
 * chain (and optional de-essing) into `wavs_master/`. The sample rate and
 * channel count are pinned to the input so durations stay comparable; a
 * mastered unit whose duration drifts by more than 5 ms is rejected. A
 * failed unit gets one more attempt with default parameters.
 */

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::app_config::MasteringConfig;
use crate::audio::{WavInfo, wav_info};
use crate::concurrency::{CancelFlag, LogCapture, capture_warning};
use crate::errors::{AppError, StageName};
use crate::file_utils::{FileManager, WorkspaceLayout, chunk_stem};
use crate::manifest::Manifest;
use crate::tools::{ToolInvocation, ToolRunner};

/// Largest accepted duration change in milliseconds
pub const DURATION_TOLERANCE_MS: f64 = 5.0;

/// Filter parameters for one mastering attempt
#[derive(Debug, Clone, PartialEq)]
pub struct MasteringParams {
    pub mono_target_lufs: f64,
    pub stereo_target_lufs: f64,
    pub true_peak_db: f64,
    pub loudness_range: f64,
    /// De-esser center frequency (Hz) and intensity, when enabled
    pub deess: Option<(f64, f64)>,
}

impl MasteringParams {
    pub fn from_config(config: &MasteringConfig) -> Self {
        Self {
            mono_target_lufs: config.loudness_target_lufs,
            stereo_target_lufs: config.stereo_loudness_target_lufs,
            true_peak_db: config.true_peak_ceiling_db,
            loudness_range: config.loudness_range,
            deess: config
                .deess
                .then_some((config.deess_frequency, config.deess_threshold)),
        }
    }

    /// Parameters of the retry attempt
    pub fn fallback() -> Self {
        Self::from_config(&MasteringConfig::default())
    }

    /// Filter chain for a unit with the given format
    pub fn filter_chain(&self, sample_rate: u32, channels: u16) -> String {
        let target = if channels >= 2 {
            self.stereo_target_lufs
        } else {
            self.mono_target_lufs
        };

        let mut chain = format!(
            "loudnorm=I={}:TP={}:LRA={}",
            target, self.true_peak_db, self.loudness_range
        );

        if let Some((frequency, intensity)) = self.deess {
            // the de-esser takes its frequency relative to Nyquist
            let nyquist = (sample_rate as f64 / 2.0).max(1.0);
            let normalized = (frequency / nyquist).clamp(0.01, 1.0);
            chain.push_str(&format!(",deesser=i={}:f={:.3}", intensity, normalized));
        }

        chain
    }
}

/// Summary of a mastering stage run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasteringReport {
    pub mastered: usize,
    pub skipped: usize,
    /// Units that only succeeded on the fallback attempt
    pub retried: usize,
}

enum Outcome {
    Mastered { retried: bool },
    Skipped,
    NotStarted,
    Failed(AppError),
}

/// Mastering stage over all units of a manifest
#[derive(Debug)]
pub struct MasteringStage {
    config: MasteringConfig,
    runner: Arc<dyn ToolRunner>,
    cancel: CancelFlag,
}

impl MasteringStage {
    pub fn new(config: MasteringConfig, runner: Arc<dyn ToolRunner>, cancel: CancelFlag) -> Self {
        Self {
            config,
            runner,
            cancel,
        }
    }

    fn invocation(&self, input: &Path, output: &Path, info: &WavInfo, params: &MasteringParams) -> ToolInvocation {
        ToolInvocation::new(&self.config.ffmpeg)
            .args(["-y", "-hide_banner", "-nostats", "-i"])
            .arg(input.display().to_string())
            .arg("-af")
            .arg(params.filter_chain(info.sample_rate, info.channels))
            .arg("-ar")
            .arg(info.sample_rate.to_string())
            .arg("-ac")
            .arg(info.channels.to_string())
            .args(["-c:a", "pcm_s16le"])
            .arg(output.display().to_string())
            .timeout(Duration::from_secs(self.config.timeout_secs))
    }

    /// One filter pass into a partial file, checked and renamed into place
    async fn attempt(
        &self,
        input: &Path,
        output: &Path,
        info: &WavInfo,
        params: &MasteringParams,
    ) -> Result<(), String> {
        let partial = output.with_extension("partial.wav");

        let result = self
            .runner
            .run(self.invocation(input, &partial, info, params))
            .await;

        let checked = match result {
            Ok(_) => check_duration(info, &partial),
            Err(e) => Err(e.to_string()),
        };

        match checked {
            Ok(()) => std::fs::rename(&partial, output)
                .map_err(|e| format!("failed to move mastered unit into place: {}", e)),
            Err(message) => {
                let _ = FileManager::remove_if_exists(&partial);
                Err(message)
            }
        }
    }

    /// Master one unit, retrying once with default parameters
    async fn master_unit(&self, index: usize, input: PathBuf, output: PathBuf, log_capture: &LogCapture) -> Outcome {
        if !input.exists() {
            return Outcome::Failed(AppError::MissingUnit { index, path: input });
        }

        let info = match wav_info(&input) {
            Ok(info) => info,
            Err(e) => {
                return Outcome::Failed(AppError::external(StageName::Mastering, Some(index), e.to_string()));
            }
        };

        let params = MasteringParams::from_config(&self.config);
        debug!("Mastering {} with {}", chunk_stem(index), params.filter_chain(info.sample_rate, info.channels));

        let first_error = match self.attempt(&input, &output, &info, &params).await {
            Ok(()) => return Outcome::Mastered { retried: false },
            Err(message) => message,
        };

        capture_warning(
            log_capture,
            format!("Mastering chunk {} failed ({}), retrying with defaults", index, first_error),
        );

        match self.attempt(&input, &output, &info, &MasteringParams::fallback()).await {
            Ok(()) => Outcome::Mastered { retried: true },
            Err(message) => Outcome::Failed(AppError::external(
                StageName::Mastering,
                Some(index),
                format!("{} (retry after: {})", message, first_error),
            )),
        }
    }

    /// Master every unit that has no mastered copy yet
    pub async fn run<F>(
        &self,
        manifest: &Manifest,
        layout: &WorkspaceLayout,
        log_capture: LogCapture,
        progress_callback: F,
    ) -> Result<MasteringReport, AppError>
    where
        F: Fn(usize, usize) + Send + Sync + Clone + 'static,
    {
        let total = manifest.len();
        let jobs = self.config.concurrent_jobs.max(1);
        let semaphore = Arc::new(Semaphore::new(jobs));
        let processed = Arc::new(AtomicUsize::new(0));

        FileManager::ensure_dir(layout.mastered_dir()).map_err(|e| AppError::File(format!("{:#}", e)))?;
        info!("Mastering {} units ({} concurrent)", total, jobs);

        let results = stream::iter(manifest.entries().iter())
            .map(|entry| {
                let semaphore = semaphore.clone();
                let processed = processed.clone();
                let progress_callback = progress_callback.clone();
                let log_capture = log_capture.clone();
                let index = entry.index;
                let input = layout.raw_unit(index);
                let output = layout.mastered_unit(index);

                async move {
                    if output.exists() {
                        let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                        progress_callback(current, total);
                        return (index, Outcome::Skipped);
                    }

                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return (index, Outcome::NotStarted),
                    };
                    if self.cancel.is_cancelled() {
                        return (index, Outcome::NotStarted);
                    }

                    let outcome = self.master_unit(index, input, output, &log_capture).await;
                    if matches!(outcome, Outcome::Failed(_)) {
                        self.cancel.cancel();
                    }

                    let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress_callback(current, total);
                    (index, outcome)
                }
            })
            .buffer_unordered(jobs)
            .collect::<Vec<_>>()
            .await;

        let mut report = MasteringReport::default();
        let mut failures: Vec<(usize, AppError)> = Vec::new();
        let mut not_started = 0;

        for (index, outcome) in results {
            match outcome {
                Outcome::Mastered { retried } => {
                    report.mastered += 1;
                    if retried {
                        report.retried += 1;
                    }
                }
                Outcome::Skipped => report.skipped += 1,
                Outcome::NotStarted => not_started += 1,
                Outcome::Failed(e) => failures.push((index, e)),
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|(index, _)| *index);
            warn!("Mastering halted after {} failures", failures.len());
            let (_, first) = failures.remove(0);
            return Err(first);
        }

        if not_started > 0 {
            return Err(AppError::Cancelled(StageName::Mastering));
        }

        info!(
            "Mastering finished: {} new ({} on retry), {} reused",
            report.mastered, report.retried, report.skipped
        );
        Ok(report)
    }
}

/// Reject a mastered unit whose duration drifted
fn check_duration(input: &WavInfo, output: &Path) -> Result<(), String> {
    if !output.exists() {
        return Err("audio tool produced no output".to_string());
    }
    let mastered = wav_info(output).map_err(|e| e.to_string())?;
    let drift = (mastered.duration_ms_f64() - input.duration_ms_f64()).abs();
    if drift > DURATION_TOLERANCE_MS {
        return Err(format!(
            "duration changed by {:.1} ms ({} ms -> {} ms)",
            drift,
            input.duration_ms(),
            mastered.duration_ms()
        ));
    }
    Ok(())
}
