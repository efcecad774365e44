/*!
 * Worker pool tuning and run cancellation.
 *
 * This module provides per-engine concurrency defaults, the shared
 * run-level cancellation flag observed by every bounded worker pool, and
 * the log capture workers write to while a progress bar is on screen.
 */

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::app_config::SynthesisEngineKind;

/// Engine-specific concurrency profile with tuned defaults
#[derive(Debug, Clone)]
pub struct EngineProfile {
    /// Maximum concurrent synthesis requests
    pub max_concurrent_requests: usize,
}

impl EngineProfile {
    /// Get the default profile for a given engine
    pub fn for_engine(engine: SynthesisEngineKind) -> Self {
        match engine {
            SynthesisEngineKind::Studio => Self {
                // One GPU-bound server, more requests only queue up
                max_concurrent_requests: 2,
            },
            SynthesisEngineKind::Fast => Self {
                // Each request is its own CPU process
                max_concurrent_requests: 4,
            },
        }
    }

    /// Get effective concurrent requests, respecting any user override
    pub fn effective_concurrent_requests(&self, user_override: Option<usize>) -> usize {
        user_override.unwrap_or(self.max_concurrent_requests).max(1)
    }
}

/// Shared run-level cancellation flag.
///
/// Once set, pools stop dispatching new chunk work; in-flight invocations
/// are left to complete or time out.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A log line captured while a progress bar is visible
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
}

/// Log lines shared between workers, printed once the bar is finished
pub type LogCapture = Arc<Mutex<Vec<LogEntry>>>;

/// Record a warning in the capture
pub fn capture_warning(capture: &LogCapture, message: impl Into<String>) {
    capture.lock().push(LogEntry {
        level: "WARN".to_string(),
        message: message.into(),
    });
}

/// Record an error in the capture
pub fn capture_error(capture: &LogCapture, message: impl Into<String>) {
    capture.lock().push(LogEntry {
        level: "ERROR".to_string(),
        message: message.into(),
    });
}
