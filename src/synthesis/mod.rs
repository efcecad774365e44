/*!
 * Speech synthesis engines and the per-chunk dispatcher.
 *
 * This module contains the engine abstraction and its implementations:
 * - `studio`: HTTP engine with timed pauses, structured emphasis and voice cloning
 * - `fast`: Command-line engine fed plain text on stdin
 * - `mock`: In-process engine for tests
 * - `render`: Cue rendering chosen from engine capabilities
 * - `dispatcher`: Bounded worker pool producing one audio unit per chunk
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use crate::app_config::{SynthesisConfig, SynthesisEngineKind};
use crate::audio::PcmBuffer;
use crate::errors::ProviderError;
use crate::tools::ToolRunner;

pub use self::dispatcher::{DispatchReport, SynthesisDispatcher};
pub use self::render::{CueRenderer, EmphasisPolicy, PausePolicy};

pub mod dispatcher;
pub mod fast;
pub mod mock;
pub mod render;
pub mod studio;

/// What an engine understands beyond plain text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCapabilities {
    /// Honors `<break time="..">` directives
    pub timed_pauses: bool,
    /// Honors `<emphasis level="..">` directives
    pub structured_emphasis: bool,
}

/// One synthesis request
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// Rendered text for this chunk
    pub text: String,
    /// Voice identifier
    pub voice: String,
    /// Speech rate multiplier
    pub speed: f32,
    /// Pitch offset in semitones
    pub pitch: f32,
    /// Reference recording for voice cloning
    pub reference_audio: Option<PathBuf>,
}

/// Common trait for all synthesis engines
///
/// The engine is chosen once per run; the dispatcher only talks to it
/// through this trait.
#[async_trait]
pub trait SynthesisEngine: Send + Sync + Debug {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Cue support, used to pick the rendering policy once per run
    fn capabilities(&self) -> EngineCapabilities;

    /// Synthesize one chunk
    ///
    /// # Returns
    /// * `Result<PcmBuffer, ProviderError>` - Audio at the engine's sample rate
    async fn synthesize(&self, request: SynthesisRequest) -> Result<PcmBuffer, ProviderError>;

    /// Check that the engine is reachable before a run
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// Build the configured engine
pub fn build_engine(
    config: &SynthesisConfig,
    runner: Arc<dyn ToolRunner>,
) -> Arc<dyn SynthesisEngine> {
    match config.engine {
        SynthesisEngineKind::Studio => Arc::new(studio::StudioEngine::new(
            &config.studio.endpoint,
            config.timeout_secs,
        )),
        SynthesisEngineKind::Fast => Arc::new(fast::FastEngine::new(
            &config.fast.command,
            config.fast.extra_args.clone(),
            config.timeout_secs,
            runner,
        )),
    }
}
