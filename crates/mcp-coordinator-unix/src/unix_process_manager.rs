use async_trait::async_trait;
use mcp_coordinator_core::{
    LaunchRequest, ProcessError, ProcessHandle, ProcessId, ProcessLauncher, ProcessStatus,
    SpawnedProcess, TerminationResult,
};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid as NixPid;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Minimum time allowed for reaping after SIGKILL
const REAP_TIMEOUT: Duration = Duration::from_millis(500);

/// Unix-specific process handle
///
/// The `Child` itself lives in an observer task that reaps it; the handle
/// only sees the published exit status.
pub struct UnixProcessHandle {
    pid: Option<ProcessId>,
    command: String,
    exit: watch::Receiver<Option<ProcessStatus>>,
    kill: CancellationToken,
}

impl UnixProcessHandle {
    fn observe(child: Child, command: String, server_name: String) -> Self {
        let pid = child.id();
        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = CancellationToken::new();

        tokio::spawn(reap(child, exit_tx, kill.clone(), server_name));

        Self {
            pid,
            command,
            exit: exit_rx,
            kill,
        }
    }

    fn process_group(&self) -> Option<NixPid> {
        let pid = i32::try_from(self.pid?).ok()?;
        Some(NixPid::from_raw(pid))
    }

    async fn exited_within(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait_for_exit()).await.is_ok()
    }
}

async fn reap(
    mut child: Child,
    exit_tx: watch::Sender<Option<ProcessStatus>>,
    kill: CancellationToken,
    server_name: String,
) {
    let pid = child.id();
    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill.cancelled() => None,
    };

    let waited = match waited {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                debug!(server = %server_name, "start_kill on pid {:?} failed: {}", pid, e);
            }
            child.wait().await
        }
    };

    let status = match waited {
        Ok(status) => ProcessStatus::Exited(status),
        Err(e) => ProcessStatus::Failed(e.to_string()),
    };
    info!(server = %server_name, "Unix process {:?} exited: {}", pid, status);
    exit_tx.send_replace(Some(status));
}

async fn forward_stderr(server_name: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(server = %server_name, "stderr: {}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(server = %server_name, "Stopped reading stderr: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl ProcessHandle for UnixProcessHandle {
    fn pid(&self) -> Option<ProcessId> {
        self.pid
    }

    fn command(&self) -> &str {
        &self.command
    }

    fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    async fn wait_for_exit(&self) -> ProcessStatus {
        let mut exit = self.exit.clone();
        let status = match exit.wait_for(Option::is_some).await {
            Ok(status) => status.clone().unwrap_or(ProcessStatus::Unknown),
            Err(_) => ProcessStatus::Unknown,
        };
        status
    }

    async fn terminate(&self, grace: Duration) -> TerminationResult {
        if self.has_exited() {
            return TerminationResult::ProcessNotFound;
        }
        let Some(pgid) = self.process_group() else {
            self.kill.cancel();
            return if self.exited_within(REAP_TIMEOUT).await {
                TerminationResult::Success
            } else {
                TerminationResult::Timeout
            };
        };

        let mut denied = false;
        match signal::killpg(pgid, Signal::SIGTERM) {
            Ok(()) => info!("Sent SIGTERM to process group {}", pgid),
            Err(Errno::ESRCH) => info!("Process group {} not found (already terminated)", pgid),
            Err(Errno::EPERM) => {
                warn!("Permission denied to terminate process group {}", pgid);
                denied = true;
            }
            Err(e) => warn!("Failed to send SIGTERM to process group {}: {}", pgid, e),
        }

        if self.exited_within(grace).await {
            return TerminationResult::Success;
        }

        warn!(
            "Process group {} still running after {:?}, sending SIGKILL",
            pgid, grace
        );
        match signal::killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(Errno::EPERM) => denied = true,
            Err(e) => warn!("Failed to send SIGKILL to process group {}: {}", pgid, e),
        }
        self.kill.cancel();

        if self.exited_within(grace.max(REAP_TIMEOUT)).await {
            TerminationResult::Success
        } else if denied {
            TerminationResult::AccessDenied
        } else {
            TerminationResult::Timeout
        }
    }
}

impl Drop for UnixProcessHandle {
    fn drop(&mut self) {
        // The reaper owns the child; without a handle nobody could stop it.
        self.kill.cancel();
    }
}

/// Unix-specific process launcher
///
/// Every child gets its own process group so a terminal interrupt aimed at
/// the coordinator does not reach it, and termination reaches its whole
/// subtree.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixProcessManager;

impl UnixProcessManager {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for UnixProcessManager {
    type Handle = UnixProcessHandle;

    fn spawn(
        &self,
        request: LaunchRequest<'_>,
    ) -> Result<SpawnedProcess<UnixProcessHandle>, ProcessError> {
        let mut cmd = Command::new(request.command);
        cmd.args(request.args)
            .env_clear()
            .envs(request.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);

        if let Some(dir) = request.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(target_os = "linux")]
        die_with_parent(&mut cmd);

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProcessError::SpawnFailed("stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::SpawnFailed("stdout was not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(request.server_name.to_string(), stderr));
        }

        info!(
            server = %request.server_name,
            "Spawned Unix process: {} (PID: {:?}) with args: {:?}",
            request.command,
            child.id(),
            request.args
        );

        let handle = UnixProcessHandle::observe(
            child,
            request.command.to_string(),
            request.server_name.to_string(),
        );
        Ok(SpawnedProcess {
            handle,
            stdin,
            stdout,
        })
    }

    fn platform_name(&self) -> &'static str {
        "unix"
    }
}

/// Have the kernel kill the child if the coordinator dies without cleanup
#[cfg(target_os = "linux")]
fn die_with_parent(cmd: &mut Command) {
    // SAFETY: prctl is async-signal-safe and the closure touches no shared state.
    unsafe {
        cmd.pre_exec(|| {
            nix::sys::prctl::set_pdeathsig(Signal::SIGKILL).map_err(std::io::Error::from)
        });
    }
}
