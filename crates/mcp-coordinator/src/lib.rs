//! One MCP endpoint in front of a manifest of stdio MCP servers.
//!
//! Servers are spawned on first use, kept for reuse, evicted when their
//! process dies or their channel breaks, and all terminated on shutdown.

pub mod connector;
pub mod facade;
pub mod manager;
pub mod platform;
pub mod registry;
pub mod server;
pub mod supervisor;
pub mod transport;

pub use connector::{ConnectRequest, Connected, SessionConnector, StdioConnector};
pub use facade::{ToolFacade, flatten_content};
pub use manager::SessionManager;
pub use registry::{Session, SessionId, SessionRegistry};
pub use server::CoordinatorServer;
#[cfg(unix)]
pub use supervisor::ShutdownSignal;
pub use supervisor::{LifecycleSupervisor, Retirement, ShutdownReport};
pub use transport::RmcpTransport;

pub use mcp_coordinator_core::*;

use std::collections::HashMap;
use std::sync::Arc;

/// Fully wired coordinator state, owned by whoever runs it
///
/// Nothing here is global; independent instances share no sessions.
pub struct Coordinator {
    registry: Arc<SessionRegistry>,
    manager: Arc<SessionManager>,
    supervisor: Arc<LifecycleSupervisor>,
    facade: ToolFacade,
}

impl Coordinator {
    /// Coordinator that launches real child processes on this platform
    pub fn new(manifest: Manifest, settings: CoordinatorSettings) -> Self {
        let connector = StdioConnector::new(platform::platform_launcher(), settings.clone());
        Self::with_connector(manifest, settings, Arc::new(connector))
    }

    pub fn with_connector(
        manifest: Manifest,
        settings: CoordinatorSettings,
        connector: Arc<dyn SessionConnector>,
    ) -> Self {
        Self::assemble(manifest, settings, connector, None)
    }

    /// Like [`with_connector`](Self::with_connector), resolving `${NAME}`
    /// placeholders against `ambient` instead of the process environment
    pub fn with_ambient_env(
        manifest: Manifest,
        settings: CoordinatorSettings,
        connector: Arc<dyn SessionConnector>,
        ambient: HashMap<String, String>,
    ) -> Self {
        Self::assemble(manifest, settings, connector, Some(ambient))
    }

    fn assemble(
        manifest: Manifest,
        settings: CoordinatorSettings,
        connector: Arc<dyn SessionConnector>,
        ambient: Option<HashMap<String, String>>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let supervisor = Arc::new(LifecycleSupervisor::new(
            registry.clone(),
            settings.termination_grace,
        ));
        let mut manager = SessionManager::new(
            Arc::new(manifest),
            registry.clone(),
            connector,
            supervisor.clone(),
        );
        if let Some(ambient) = ambient {
            manager = manager.with_ambient_env(ambient);
        }
        let manager = Arc::new(manager);
        let facade = ToolFacade::new(manager.clone());

        Self {
            registry,
            manager,
            supervisor,
            facade,
        }
    }

    pub fn facade(&self) -> &ToolFacade {
        &self.facade
    }

    pub fn server(&self) -> CoordinatorServer {
        CoordinatorServer::new(self.facade.clone())
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Close every session and terminate every child process
    pub async fn shutdown(&self) -> ShutdownReport {
        self.supervisor.shutdown().await
    }
}
