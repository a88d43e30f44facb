use mcp_coordinator_core::{ProcessHandle, SessionTransport};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Identity of one session incarnation
///
/// A server name may map to many sessions over the coordinator's lifetime;
/// the id tells a stale exit notification apart from the live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live pairing of one child process and its open protocol channel
pub struct Session {
    pub id: SessionId,
    pub server_name: String,
    pub process: Box<dyn ProcessHandle>,
    pub transport: Box<dyn SessionTransport>,
}

impl Session {
    pub fn is_alive(&self) -> bool {
        !self.process.has_exited()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("server_name", &self.server_name)
            .field("pid", &self.process.pid())
            .field("command", &self.process.command())
            .finish()
    }
}

/// Map from server name to its live session
///
/// At most one entry per name. Entries are only added after a successful
/// handshake and removed on exit, on eviction or at shutdown.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, server_name: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(server_name).cloned()
    }

    /// Store a session, returning whatever it displaced
    pub async fn insert(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        self.sessions
            .write()
            .await
            .insert(session.server_name.clone(), session)
    }

    /// Remove the entry for `server_name` only if it is still session `id`
    pub async fn remove_if(&self, server_name: &str, id: SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(server_name) {
            Some(current) if current.id == id => sessions.remove(server_name),
            _ => None,
        }
    }

    /// Take every entry out, leaving the registry empty
    pub async fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
