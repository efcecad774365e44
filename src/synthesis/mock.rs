/*!
 * Mock synthesis engine for testing.
 *
 * This module provides an engine that simulates different behaviors:
 * - `MockEngine::working()` - Always succeeds, 10 ms of audio per character
 * - `MockEngine::failing()` - Always fails with an error
 * - `MockEngine::fail_on_text(..)` - Fails for requests containing a marker
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{EngineCapabilities, SynthesisEngine, SynthesisRequest};
use crate::audio::PcmBuffer;
use crate::errors::ProviderError;

/// Sample rate of mock audio
pub const MOCK_SAMPLE_RATE: u32 = 24000;

/// Milliseconds of mock audio per input character
pub const MOCK_MS_PER_CHAR: u64 = 10;

/// Behavior mode for the mock engine
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Always fails with an error
    Failing,
    /// Fails on the n-th request (0-based), succeeds otherwise
    FailOnCall { call: usize },
    /// Fails for requests whose text contains the marker
    FailWhenContains(String),
    /// Returns audio at a different sample rate from the n-th request on
    SwitchRateOnCall { call: usize, sample_rate: u32 },
}

/// Mock engine recording every request
#[derive(Debug)]
pub struct MockEngine {
    behavior: MockBehavior,
    capabilities: EngineCapabilities,
    request_count: Arc<AtomicUsize>,
    requests: Mutex<Vec<SynthesisRequest>>,
}

impl MockEngine {
    /// Create a new mock engine with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            capabilities: EngineCapabilities {
                timed_pauses: true,
                structured_emphasis: true,
            },
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn fail_on_text(marker: impl Into<String>) -> Self {
        Self::new(MockBehavior::FailWhenContains(marker.into()))
    }

    /// Report crude capabilities, like a command-line engine
    pub fn with_plain_text_only(mut self) -> Self {
        self.capabilities = EngineCapabilities {
            timed_pauses: false,
            structured_emphasis: false,
        };
        self
    }

    /// Number of requests received
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Snapshot of received requests
    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().clone()
    }

    fn audio_for(text: &str, sample_rate: u32) -> PcmBuffer {
        let ms = text.chars().count() as u64 * MOCK_MS_PER_CHAR;
        PcmBuffer::silence(ms.max(MOCK_MS_PER_CHAR), sample_rate, 1)
    }
}

#[async_trait]
impl SynthesisEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> EngineCapabilities {
        self.capabilities
    }

    async fn synthesize(&self, request: SynthesisRequest) -> Result<PcmBuffer, ProviderError> {
        let call = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        match &self.behavior {
            MockBehavior::Working => Ok(Self::audio_for(&request.text, MOCK_SAMPLE_RATE)),
            MockBehavior::Failing => Err(ProviderError::RequestFailed(
                "Mock engine failure".to_string(),
            )),
            MockBehavior::FailOnCall { call: failing } => {
                if call == *failing {
                    Err(ProviderError::RequestFailed(format!("Mock failure on call {}", call)))
                } else {
                    Ok(Self::audio_for(&request.text, MOCK_SAMPLE_RATE))
                }
            }
            MockBehavior::FailWhenContains(marker) => {
                if request.text.contains(marker.as_str()) {
                    Err(ProviderError::RequestFailed(format!(
                        "Mock failure for text containing {:?}",
                        marker
                    )))
                } else {
                    Ok(Self::audio_for(&request.text, MOCK_SAMPLE_RATE))
                }
            }
            MockBehavior::SwitchRateOnCall { call: from, sample_rate } => {
                let rate = if call >= *from { *sample_rate } else { MOCK_SAMPLE_RATE };
                Ok(Self::audio_for(&request.text, rate))
            }
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError(
                "Mock engine unreachable".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
