use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::process::{ChildStdin, ChildStdout};

/// Unique identifier for a process
pub type ProcessId = u32;

/// Status of a process after it left the running state
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessStatus {
    /// Process exited with status information
    Exited(std::process::ExitStatus),
    /// Process exited but its status could not be collected
    Failed(String),
    /// Exit was observed without any status (observer went away)
    Unknown,
}

impl ProcessStatus {
    pub fn success(&self) -> bool {
        matches!(self, ProcessStatus::Exited(status) if status.success())
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStatus::Exited(status) => write!(f, "{status}"),
            ProcessStatus::Failed(reason) => write!(f, "wait failed: {reason}"),
            ProcessStatus::Unknown => f.write_str("unknown"),
        }
    }
}

/// Result of a process termination operation
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Process was terminated and reaped
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Permission denied (insufficient privileges)
    AccessDenied,
    /// Process did not exit even after the forced kill
    Timeout,
    /// Operation failed with specific error message
    Failed(String),
}

impl TerminationResult {
    /// Whether the process is known to be gone afterwards
    pub fn is_terminated(&self) -> bool {
        matches!(
            self,
            TerminationResult::Success | TerminationResult::ProcessNotFound
        )
    }
}

/// Error types for process operations
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Everything needed to start one server process
#[derive(Debug, Clone, Copy)]
pub struct LaunchRequest<'a> {
    pub server_name: &'a str,
    pub command: &'a str,
    pub args: &'a [String],
    /// Complete environment; the child inherits nothing else
    pub env: &'a HashMap<String, String>,
    pub working_dir: Option<&'a Path>,
}

/// A freshly started process together with the pipes of its protocol channel
pub struct SpawnedProcess<H> {
    pub handle: H,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

/// Trait representing exclusive ownership of a running child process
///
/// Nothing outside the owning session may signal or wait on the process
/// except through this handle.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID as observed at spawn time
    fn pid(&self) -> Option<ProcessId>;

    /// Get the command that started this process
    fn command(&self) -> &str;

    /// Non-blocking check whether exit has already been observed
    fn has_exited(&self) -> bool;

    /// Resolve once the process has exited, for whatever reason
    ///
    /// May be awaited from several tasks at once.
    async fn wait_for_exit(&self) -> ProcessStatus;

    /// Ask the process to stop, escalating to a forced kill after `grace`
    async fn terminate(&self, grace: Duration) -> TerminationResult;
}

/// Platform-specific process spawning
pub trait ProcessLauncher: Send + Sync {
    /// The type of process handle this launcher produces
    type Handle: ProcessHandle + 'static;

    /// Spawn a server process with piped stdin/stdout
    fn spawn(&self, request: LaunchRequest<'_>) -> Result<SpawnedProcess<Self::Handle>, ProcessError>;

    /// Get the platform name for logging and debugging
    fn platform_name(&self) -> &'static str;
}
