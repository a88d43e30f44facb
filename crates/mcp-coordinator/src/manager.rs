use crate::connector::{ConnectRequest, SessionConnector};
use crate::registry::{Session, SessionId, SessionRegistry};
use crate::supervisor::LifecycleSupervisor;
use mcp_coordinator_core::{CoordinatorError, Manifest, ServerConfig, process_env, resolve_env};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Hands out live sessions, spawning at most one per server name
pub struct SessionManager {
    manifest: Arc<Manifest>,
    registry: Arc<SessionRegistry>,
    connector: Arc<dyn SessionConnector>,
    supervisor: Arc<LifecycleSupervisor>,
    /// One guard per manifest entry; different names never contend
    in_flight: HashMap<String, Mutex<()>>,
    /// Replaces the process environment as the resolver's ambient input
    ambient_env: Option<HashMap<String, String>>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(
        manifest: Arc<Manifest>,
        registry: Arc<SessionRegistry>,
        connector: Arc<dyn SessionConnector>,
        supervisor: Arc<LifecycleSupervisor>,
    ) -> Self {
        let in_flight = manifest
            .server_names()
            .map(|name| (name.to_string(), Mutex::new(())))
            .collect();

        Self {
            manifest,
            registry,
            connector,
            supervisor,
            in_flight,
            ambient_env: None,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_ambient_env(mut self, ambient: HashMap<String, String>) -> Self {
        self.ambient_env = Some(ambient);
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Return the live session for `server_name`, creating it if needed
    ///
    /// Concurrent callers for the same name wait for a single in-flight
    /// spawn and then share its session.
    pub async fn ensure_session(&self, server_name: &str) -> Result<Arc<Session>, CoordinatorError> {
        let (Some(config), Some(guard)) = (
            self.manifest.get(server_name),
            self.in_flight.get(server_name),
        ) else {
            return Err(CoordinatorError::UnknownServer {
                server: server_name.to_string(),
            });
        };

        if let Some(session) = self.live_session(server_name).await {
            return Ok(session);
        }

        let _in_flight = guard.lock().await;
        if let Some(session) = self.live_session(server_name).await {
            debug!(server = %server_name, "Joined session created by a concurrent request");
            return Ok(session);
        }
        if self.supervisor.is_shutting_down() {
            return Err(CoordinatorError::ShuttingDown);
        }

        self.start_session(server_name, config).await
    }

    /// Registered session, unless its process is already gone
    async fn live_session(&self, server_name: &str) -> Option<Arc<Session>> {
        let session = self.registry.get(server_name).await?;
        if session.is_alive() {
            return Some(session);
        }
        debug!(server = %server_name, session = %session.id, "Registered session has exited");
        self.evict(&session).await;
        None
    }

    async fn start_session(
        &self,
        server_name: &str,
        config: &ServerConfig,
    ) -> Result<Arc<Session>, CoordinatorError> {
        let ambient = match &self.ambient_env {
            Some(ambient) => ambient.clone(),
            None => process_env(),
        };
        let resolved = resolve_env(&config.env, &ambient);
        if !resolved.unresolved.is_empty() {
            if config.strict_env {
                return Err(CoordinatorError::UnresolvedEnvironment {
                    server: server_name.to_string(),
                    variables: resolved.unresolved,
                });
            }
            warn!(
                server = %server_name,
                variables = ?resolved.unresolved,
                "Unset environment variables substituted with empty values"
            );
        }

        info!(server = %server_name, command = %config.command, "Starting session");
        let request = ConnectRequest {
            server_name,
            config,
            env: &resolved.vars,
        };
        let shutdown = self.supervisor.shutdown_token();
        let connected = tokio::select! {
            connected = self.connector.connect(request) => connected?,
            _ = shutdown.cancelled() => return Err(CoordinatorError::ShuttingDown),
        };

        let session = Arc::new(Session {
            id: SessionId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            server_name: server_name.to_string(),
            process: connected.process,
            transport: connected.transport,
        });

        if let Some(displaced) = self.registry.insert(session.clone()).await {
            self.supervisor.retire_in_background(displaced);
        }
        // Shutdown may have drained the registry while the handshake ran
        if self.supervisor.is_shutting_down() {
            if let Some(late) = self.registry.remove_if(server_name, session.id).await {
                self.supervisor.retire(&late).await;
            }
            return Err(CoordinatorError::ShuttingDown);
        }
        self.supervisor.observe_exit(session.clone());

        info!(
            server = %server_name,
            session = %session.id,
            pid = ?session.process.pid(),
            "Session established"
        );
        Ok(session)
    }

    /// Drop `session` from the registry and retire it in the background
    ///
    /// No-op if the registry already moved on to another session.
    pub async fn evict(&self, session: &Arc<Session>) {
        if let Some(evicted) = self
            .registry
            .remove_if(&session.server_name, session.id)
            .await
        {
            warn!(server = %evicted.server_name, session = %evicted.id, "Evicting session");
            self.supervisor.retire_in_background(evicted);
        }
    }
}
