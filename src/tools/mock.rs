/*!
 * Mock tool runner for testing.
 *
 * This module provides a tool runner that never spawns processes:
 * - `MockToolRunner::copying()` - Copies the input file to the output path
 * - `MockToolRunner::failing()` - Always fails with a non-zero exit
 * - `MockToolRunner::silent_wav(ms, rate)` - Writes a silent WAV, like a CLI engine
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ToolInvocation, ToolOutput, ToolRunner};
use crate::audio::{PcmBuffer, write_wav};
use crate::errors::ToolError;

/// Behavior mode for the mock runner
#[derive(Debug, Clone, PartialEq)]
pub enum MockToolBehavior {
    /// Copy the input file to the output path
    CopyInput,
    /// Always fail
    Failing,
    /// Fail the first `count` invocations, then copy
    FailFirst { count: usize },
    /// Fail invocations whose arguments contain the text, copy otherwise
    FailWhenArgContains(String),
    /// Write a silent WAV to the output path
    SilentWav { ms: u64, sample_rate: u32 },
    /// Report a timeout without running anything
    TimedOut,
}

/// Mock runner recording every invocation
#[derive(Debug)]
pub struct MockToolRunner {
    behavior: MockToolBehavior,
    call_count: Arc<AtomicUsize>,
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl MockToolRunner {
    pub fn new(behavior: MockToolBehavior) -> Self {
        Self {
            behavior,
            call_count: Arc::new(AtomicUsize::new(0)),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn copying() -> Self {
        Self::new(MockToolBehavior::CopyInput)
    }

    pub fn failing() -> Self {
        Self::new(MockToolBehavior::Failing)
    }

    pub fn silent_wav(ms: u64, sample_rate: u32) -> Self {
        Self::new(MockToolBehavior::SilentWav { ms, sample_rate })
    }

    /// Number of invocations so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Snapshot of recorded invocations
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().clone()
    }

    fn failure(invocation: &ToolInvocation) -> ToolError {
        ToolError::Failed {
            program: invocation.program.clone(),
            code: Some(1),
            stderr: "mock failure".to_string(),
        }
    }
}

/// Input file of an invocation: the `-i` value, else the first argument
fn input_path(invocation: &ToolInvocation) -> Option<PathBuf> {
    invocation
        .arg_after("-i")
        .or_else(|| invocation.args.first().map(String::as_str))
        .map(PathBuf::from)
}

/// Output file of an invocation: `--output_file`, the last argument of an
/// ffmpeg-style call, else the second argument
fn output_path(invocation: &ToolInvocation) -> Option<PathBuf> {
    if let Some(path) = invocation.arg_after("--output_file") {
        return Some(PathBuf::from(path));
    }
    if invocation.args.iter().any(|a| a == "-i") {
        return invocation.args.last().map(PathBuf::from);
    }
    invocation.args.get(1).map(PathBuf::from)
}

fn copy_input(invocation: &ToolInvocation) -> Result<(), ToolError> {
    let io_error = |message: String| ToolError::Io {
        program: invocation.program.clone(),
        message,
    };

    let input = input_path(invocation).ok_or_else(|| io_error("no input argument".to_string()))?;
    let output = output_path(invocation).ok_or_else(|| io_error("no output argument".to_string()))?;

    std::fs::copy(&input, &output)
        .map_err(|e| io_error(format!("copy {:?} -> {:?}: {}", input, output, e)))?;
    Ok(())
}

#[async_trait]
impl ToolRunner for MockToolRunner {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.invocations.lock().push(invocation.clone());

        match &self.behavior {
            MockToolBehavior::CopyInput => copy_input(&invocation)?,
            MockToolBehavior::Failing => return Err(Self::failure(&invocation)),
            MockToolBehavior::FailFirst { count } => {
                if call < *count {
                    return Err(Self::failure(&invocation));
                }
                copy_input(&invocation)?;
            }
            MockToolBehavior::FailWhenArgContains(needle) => {
                if invocation.args.iter().any(|a| a.contains(needle.as_str())) {
                    return Err(Self::failure(&invocation));
                }
                copy_input(&invocation)?;
            }
            MockToolBehavior::SilentWav { ms, sample_rate } => {
                // probes like `--help` have nothing to write
                if let Some(output) = output_path(&invocation) {
                    write_wav(&output, &PcmBuffer::silence(*ms, *sample_rate, 1)).map_err(|e| {
                        ToolError::Io {
                            program: invocation.program.clone(),
                            message: e.to_string(),
                        }
                    })?;
                }
            }
            MockToolBehavior::TimedOut => {
                return Err(ToolError::TimedOut {
                    program: invocation.program.clone(),
                    seconds: invocation.timeout.as_secs(),
                });
            }
        }

        Ok(ToolOutput::default())
    }
}
