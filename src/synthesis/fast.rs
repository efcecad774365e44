use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

use super::{EngineCapabilities, SynthesisEngine, SynthesisRequest};
use crate::audio::{PcmBuffer, read_wav};
use crate::errors::ProviderError;
use crate::tools::{ToolInvocation, ToolRunner};

/// Command-line engine reading text on stdin and writing a WAV file
#[derive(Debug)]
pub struct FastEngine {
    command: String,
    extra_args: Vec<String>,
    timeout: Duration,
    runner: Arc<dyn ToolRunner>,
}

impl FastEngine {
    pub fn new(
        command: impl Into<String>,
        extra_args: Vec<String>,
        timeout_secs: u64,
        runner: Arc<dyn ToolRunner>,
    ) -> Self {
        Self {
            command: command.into(),
            extra_args,
            timeout: Duration::from_secs(timeout_secs),
            runner,
        }
    }

    /// Command line for one request writing to `output`
    pub fn invocation(&self, request: &SynthesisRequest, output: &std::path::Path) -> ToolInvocation {
        // the engine slows speech down as length_scale grows
        let length_scale = 1.0 / request.speed.max(0.01);

        ToolInvocation::new(&self.command)
            .args([
                "--model".to_string(),
                request.voice.clone(),
                "--output_file".to_string(),
                output.display().to_string(),
                "--length_scale".to_string(),
                format!("{:.3}", length_scale),
            ])
            .args(self.extra_args.iter().cloned())
            .stdin(request.text.clone())
            .timeout(self.timeout)
    }
}

#[async_trait]
impl SynthesisEngine for FastEngine {
    fn name(&self) -> &str {
        "fast"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            timed_pauses: false,
            structured_emphasis: false,
        }
    }

    async fn synthesize(&self, request: SynthesisRequest) -> Result<PcmBuffer, ProviderError> {
        if request.pitch != 0.0 {
            debug!("Fast engine ignores pitch offset {}", request.pitch);
        }

        let scratch = tempfile::tempdir()
            .map_err(|e| ProviderError::ProcessFailed(format!("Failed to create scratch dir: {}", e)))?;
        let output = scratch.path().join("out.wav");

        self.runner
            .run(self.invocation(&request, &output))
            .await
            .map_err(|e| ProviderError::ProcessFailed(e.to_string()))?;

        read_wav(&output).map_err(|e| ProviderError::InvalidAudio(e.to_string()))
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let invocation = ToolInvocation::new(&self.command)
            .arg("--help")
            .timeout(Duration::from_secs(10));
        self.runner
            .run(invocation)
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::ProcessFailed(e.to_string()))
    }
}
