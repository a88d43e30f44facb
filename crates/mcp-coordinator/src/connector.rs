use crate::transport::RmcpTransport;
use async_trait::async_trait;
use mcp_coordinator_core::{
    CoordinatorError, CoordinatorSettings, LaunchRequest, ProcessHandle, ProcessLauncher,
    ServerConfig, SessionTransport, SpawnedProcess,
};
use std::collections::HashMap;
use tracing::{info, warn};

/// What a connector needs to bring one server up
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest<'a> {
    pub server_name: &'a str,
    pub config: &'a ServerConfig,
    /// Fully resolved child environment
    pub env: &'a HashMap<String, String>,
}

/// A started process with a completed handshake
pub struct Connected {
    pub process: Box<dyn ProcessHandle>,
    pub transport: Box<dyn SessionTransport>,
}

/// Spawns a server and negotiates its session
///
/// On error nothing must be left running.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, request: ConnectRequest<'_>) -> Result<Connected, CoordinatorError>;
}

/// Connector for stdio servers: platform launcher plus rmcp handshake
pub struct StdioConnector<L> {
    launcher: L,
    settings: CoordinatorSettings,
}

impl<L: ProcessLauncher> StdioConnector<L> {
    pub fn new(launcher: L, settings: CoordinatorSettings) -> Self {
        info!(
            "Creating stdio connector on {} platform",
            launcher.platform_name()
        );
        Self { launcher, settings }
    }
}

#[async_trait]
impl<L: ProcessLauncher> SessionConnector for StdioConnector<L> {
    async fn connect(&self, request: ConnectRequest<'_>) -> Result<Connected, CoordinatorError> {
        let server_name = request.server_name;
        let SpawnedProcess {
            handle,
            stdin,
            stdout,
        } = self
            .launcher
            .spawn(LaunchRequest {
                server_name,
                command: &request.config.command,
                args: &request.config.args,
                env: request.env,
                working_dir: request.config.cwd.as_deref(),
            })
            .map_err(|e| CoordinatorError::spawn_failure(server_name, e))?;

        match RmcpTransport::handshake(server_name, stdout, stdin, &self.settings).await {
            Ok(transport) => Ok(Connected {
                process: Box::new(handle),
                transport: Box::new(transport),
            }),
            Err(e) => {
                warn!(server = %server_name, pid = ?handle.pid(), error = %e, "Handshake failed, terminating child");
                let result = handle.terminate(self.settings.termination_grace).await;
                if !result.is_terminated() {
                    warn!(server = %server_name, "Child did not terminate cleanly: {:?}", result);
                }
                Err(e)
            }
        }
    }
}
