//! Compile-time choice of process launcher

#[cfg(unix)]
pub type PlatformLauncher = mcp_coordinator_unix::UnixProcessManager;

#[cfg(not(unix))]
compile_error!("Unsupported platform: mcp-coordinator only runs on Unix");

pub fn platform_launcher() -> PlatformLauncher {
    PlatformLauncher::default()
}
