use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{EngineCapabilities, SynthesisEngine, SynthesisRequest};
use crate::audio::{PcmBuffer, decode_wav_bytes};
use crate::errors::ProviderError;

/// Studio engine client speaking JSON over HTTP
#[derive(Debug)]
pub struct StudioEngine {
    /// Base URL of the engine service
    endpoint: String,
    /// HTTP client for making requests
    client: Client,
}

/// Request body for `POST /synthesize`
#[derive(Debug, Serialize)]
struct StudioRequest<'a> {
    /// Text with SSML-style cue markup
    text: &'a str,
    /// Voice identifier
    voice: &'a str,
    /// Speech rate multiplier
    speed: f32,
    /// Pitch offset in semitones
    pitch: f32,
    /// Reference recording for voice cloning
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_audio: Option<String>,
    /// Markup dialect of `text`
    markup: &'static str,
}

impl StudioEngine {
    /// Create a new client for the given endpoint
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            endpoint,
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SynthesisEngine for StudioEngine {
    fn name(&self) -> &str {
        "studio"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            timed_pauses: true,
            structured_emphasis: true,
        }
    }

    async fn synthesize(&self, request: SynthesisRequest) -> Result<PcmBuffer, ProviderError> {
        let url = format!("{}/synthesize", self.endpoint);
        let body = StudioRequest {
            text: &request.text,
            voice: &request.voice,
            speed: request.speed,
            pitch: request.pitch,
            reference_audio: request
                .reference_audio
                .as_ref()
                .map(|p| p.display().to_string()),
            markup: "ssml",
        };

        debug!("Studio request: {} chars to {}", request.text.chars().count(), url);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ProviderError::ConnectionError(format!("{}: {}", url, e))
                } else {
                    ProviderError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("Studio engine error {}: {}", status.as_u16(), message);
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::RequestFailed(format!("Failed to read audio body: {}", e)))?;

        decode_wav_bytes(&bytes).map_err(|e| ProviderError::InvalidAudio(e.to_string()))
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(format!("{}: {}", self.endpoint, e)))?;

        if response.status().is_server_error() {
            return Err(ProviderError::ApiError {
                status_code: response.status().as_u16(),
                message: "engine reported a server error".to_string(),
            });
        }
        Ok(())
    }
}
