/*!
 * Per-chunk synthesis dispatch.
 *
 * Every manifest entry is rendered with the run's cue policy, sent to the
 * engine and persisted as `wavs/chunk_NNNN.wav`. Work runs on a bounded
 * pool; completion order does not matter since every unit is keyed by its
 * chunk index. The first failure stops dispatching new work, in-flight
 * requests finish, and the run reports the lowest failing index.
 */

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::Semaphore;

use super::{CueRenderer, SynthesisEngine, SynthesisRequest};
use crate::app_config::SynthesisConfig;
use crate::audio::{wav_info, write_wav};
use crate::concurrency::{CancelFlag, EngineProfile, LogCapture, capture_error};
use crate::errors::{AppError, StageName};
use crate::file_utils::WorkspaceLayout;
use crate::manifest::{Manifest, ManifestEntry};

/// Summary of a synthesis stage run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Units produced in this run
    pub synthesized: usize,
    /// Units already on disk and skipped
    pub skipped: usize,
    /// Sample rate shared by every unit of the run
    pub sample_rate: Option<u32>,
}

enum Outcome {
    Synthesized,
    Skipped,
    NotStarted,
    Failed(AppError),
}

/// Dispatches manifest entries to a synthesis engine
#[derive(Debug)]
pub struct SynthesisDispatcher {
    engine: Arc<dyn SynthesisEngine>,
    renderer: CueRenderer,
    voice: String,
    speed: f32,
    pitch: f32,
    reference_audio: Option<PathBuf>,
    max_concurrent_requests: usize,
    cancel: CancelFlag,
}

impl SynthesisDispatcher {
    /// Create a dispatcher; the cue policy is fixed here from the engine's capabilities
    pub fn new(engine: Arc<dyn SynthesisEngine>, config: &SynthesisConfig, cancel: CancelFlag) -> Self {
        let renderer = CueRenderer::for_capabilities(engine.capabilities());
        let max_concurrent_requests = EngineProfile::for_engine(config.engine)
            .effective_concurrent_requests(config.concurrent_requests);

        Self {
            engine,
            renderer,
            voice: config.voice.clone(),
            speed: config.speed,
            pitch: config.pitch,
            reference_audio: config.reference_audio.clone(),
            max_concurrent_requests,
            cancel,
        }
    }

    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    pub fn renderer(&self) -> CueRenderer {
        self.renderer
    }

    fn request_for(&self, text: String) -> SynthesisRequest {
        SynthesisRequest {
            text,
            voice: self.voice.clone(),
            speed: self.speed,
            pitch: self.pitch,
            reference_audio: self.reference_audio.clone(),
        }
    }

    /// Sample rate of the first unit already on disk, if any
    fn existing_sample_rate(manifest: &Manifest, layout: &WorkspaceLayout) -> Option<u32> {
        manifest
            .entries()
            .iter()
            .map(|entry| layout.raw_unit(entry.index))
            .find(|path| path.exists())
            .and_then(|path| wav_info(&path).ok())
            .map(|info| info.sample_rate)
    }

    /// Synthesize one entry and persist its unit
    async fn synthesize_entry(
        &self,
        manifest: &Manifest,
        entry: &ManifestEntry,
        unit_path: PathBuf,
        run_rate: &Mutex<Option<u32>>,
    ) -> Result<(), AppError> {
        let index = entry.index;
        let fail = |message: String| AppError::external(StageName::Synthesis, Some(index), message);

        let chunk = manifest.read_chunk(entry)?;
        let text = self.renderer.render(&chunk.paragraphs);
        debug!("Synthesizing chunk {} ({} chars)", index, text.chars().count());

        let buffer = self
            .engine
            .synthesize(self.request_for(text))
            .await
            .map_err(|e| fail(e.to_string()))?;

        if buffer.is_empty() {
            return Err(fail("engine returned no audio".to_string()));
        }

        {
            let mut rate = run_rate.lock();
            match *rate {
                None => *rate = Some(buffer.sample_rate),
                Some(expected) if expected != buffer.sample_rate => {
                    return Err(fail(format!(
                        "engine returned {} Hz audio, run is fixed at {} Hz",
                        buffer.sample_rate, expected
                    )));
                }
                Some(_) => {}
            }
        }

        write_wav(&unit_path, &buffer).map_err(|e| fail(e.to_string()))?;
        Ok(())
    }

    /// Synthesize every manifest entry that has no unit yet
    pub async fn run<F>(
        &self,
        manifest: &Manifest,
        layout: &WorkspaceLayout,
        log_capture: LogCapture,
        progress_callback: F,
    ) -> Result<DispatchReport, AppError>
    where
        F: Fn(usize, usize) + Send + Sync + Clone + 'static,
    {
        let start_time = Instant::now();
        let total = manifest.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_requests));
        let processed = Arc::new(AtomicUsize::new(0));
        let run_rate = Mutex::new(Self::existing_sample_rate(manifest, layout));

        info!(
            "Synthesizing {} chunks with the {} engine ({} concurrent)",
            total,
            self.engine.name(),
            self.max_concurrent_requests
        );

        let results = stream::iter(manifest.entries().iter())
            .map(|entry| {
                let semaphore = semaphore.clone();
                let processed = processed.clone();
                let progress_callback = progress_callback.clone();
                let unit_path = layout.raw_unit(entry.index);
                let run_rate = &run_rate;

                async move {
                    if unit_path.exists() {
                        let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                        progress_callback(current, total);
                        return (entry.index, Outcome::Skipped);
                    }

                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return (entry.index, Outcome::NotStarted),
                    };

                    // checked after the permit so queued work sees an earlier failure
                    if self.cancel.is_cancelled() {
                        return (entry.index, Outcome::NotStarted);
                    }

                    let outcome = match self
                        .synthesize_entry(manifest, entry, unit_path, run_rate)
                        .await
                    {
                        Ok(()) => Outcome::Synthesized,
                        Err(e) => {
                            self.cancel.cancel();
                            Outcome::Failed(e)
                        }
                    };

                    let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress_callback(current, total);
                    (entry.index, outcome)
                }
            })
            .buffer_unordered(self.max_concurrent_requests)
            .collect::<Vec<_>>()
            .await;

        let mut report = DispatchReport::default();
        let mut failures: Vec<(usize, AppError)> = Vec::new();
        let mut not_started = 0;

        for (index, outcome) in results {
            match outcome {
                Outcome::Synthesized => report.synthesized += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::NotStarted => not_started += 1,
                Outcome::Failed(e) => failures.push((index, e)),
            }
        }
        report.sample_rate = *run_rate.lock();

        if !failures.is_empty() {
            failures.sort_by_key(|(index, _)| *index);
            for (_, error) in failures.iter().skip(1) {
                capture_error(&log_capture, error.to_string());
            }
            warn!(
                "Synthesis halted: {} failed, {} not started, {} units on disk",
                failures.len(),
                not_started,
                report.synthesized + report.skipped
            );
            let (_, first) = failures.remove(0);
            return Err(first);
        }

        if not_started > 0 {
            return Err(AppError::Cancelled(StageName::Synthesis));
        }

        info!(
            "Synthesis finished in {:.1}s: {} new, {} reused",
            start_time.elapsed().as_secs_f64(),
            report.synthesized,
            report.skipped
        );
        Ok(report)
    }
}
