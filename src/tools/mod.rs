/*!
 * External tool invocation.
 *
 * Every external program the pipeline drives (the EPUB converter, the
 * audio filter tool, the muxer and the command-line synthesis engine) is
 * run through the `ToolRunner` trait:
 * - `SystemToolRunner`: spawns real processes with a per-invocation timeout
 * - `mock::MockToolRunner`: records invocations and simulates outputs in tests
 */

use async_trait::async_trait;
use log::debug;
use std::fmt::Debug;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::ToolError;

pub mod mock;

/// One invocation of an external program
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Program name or path
    pub program: String,
    /// Command line arguments
    pub args: Vec<String>,
    /// Data written to the program's standard input, if any
    pub stdin: Option<String>,
    /// Deadline after which the process is killed
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Value following a flag, e.g. the path after `-i`
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Shell-like rendering for logs
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Captured output of a successful invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs on behalf of the pipeline stages
#[async_trait]
pub trait ToolRunner: Send + Sync + Debug {
    /// Run the program to completion.
    ///
    /// # Returns
    /// * `Result<ToolOutput, ToolError>` - Captured output, or an error for a
    ///   missing program, a timeout or a non-zero exit status
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError>;
}

/// Runner that spawns real processes
#[derive(Debug, Clone, Default)]
pub struct SystemToolRunner;

impl SystemToolRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        let program = invocation.program.clone();
        debug!("Running: {}", invocation.command_line());

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound {
                    program: program.clone(),
                }
            } else {
                ToolError::Io {
                    program: program.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let stdin_pipe = child.stdin.take();
        let input = invocation.stdin.clone();
        let write_stdin = async move {
            if let (Some(mut pipe), Some(input)) = (stdin_pipe, input) {
                pipe.write_all(input.as_bytes()).await?;
                // dropping the pipe closes it so the program sees EOF
            }
            Ok::<(), std::io::Error>(())
        };

        // stdin is fed while output is drained, both under the deadline
        let finished = async {
            let (written, waited) = tokio::join!(write_stdin, child.wait_with_output());
            match written {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(ToolError::Io {
                        program: program.clone(),
                        message: format!("failed to write stdin: {}", e),
                    });
                }
                Err(_) => debug!("{} closed stdin early", program),
                Ok(()) => {}
            }
            waited.map_err(|e| ToolError::Io {
                program: program.clone(),
                message: e.to_string(),
            })
        };

        let output = tokio::select! {
            result = finished => result?,
            _ = tokio::time::sleep(invocation.timeout) => {
                return Err(ToolError::TimedOut {
                    program: program.clone(),
                    seconds: invocation.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(ToolError::Failed {
                program,
                code: output.status.code(),
                stderr: filter_tool_stderr(&stderr),
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// Filter ffmpeg-style stderr to only show meaningful error lines, stripping
/// the version banner, build configuration, and stream metadata noise.
pub fn filter_tool_stderr(stderr: &str) -> String {
    let noise_prefixes = [
        "ffmpeg version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Metadata:",
        "Duration:",
        "Chapter",
        "Stream #",
        "encoder",
        "Output #",
        "Stream mapping:",
        "Press [q]",
        "size=",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !noise_prefixes.iter().any(|p| line.starts_with(p)))
        .collect();

    if meaningful.is_empty() {
        return "no error output".to_string();
    }

    // the last lines carry the actual failure
    let start = meaningful.len().saturating_sub(5);
    meaningful[start..].join("\n")
}
