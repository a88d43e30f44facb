use thiserror::Error;

/// Core error types for coordinator operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    #[error("server \"{server}\" not found")]
    UnknownServer { server: String },

    #[error("failed to spawn server \"{server}\": {reason}")]
    SpawnFailure { server: String, reason: String },

    #[error("handshake with server \"{server}\" failed: {reason}")]
    HandshakeFailure { server: String, reason: String },

    #[error("server \"{server}\" unreachable: {reason}")]
    ServerUnreachable { server: String, reason: String },

    #[error("server \"{server}\" returned an error: {message}")]
    RemoteError { server: String, message: String },

    #[error("unresolved environment placeholders for server \"{server}\": {}", .variables.join(", "))]
    UnresolvedEnvironment {
        server: String,
        variables: Vec<String>,
    },

    #[error("coordinator is shutting down")]
    ShuttingDown,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Coarse classification of [`CoordinatorError`], stable for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownServer,
    SpawnFailure,
    HandshakeFailure,
    ServerUnreachable,
    RemoteError,
    UnresolvedEnvironment,
    ShuttingDown,
    Config,
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::UnknownServer { .. } => ErrorKind::UnknownServer,
            CoordinatorError::SpawnFailure { .. } => ErrorKind::SpawnFailure,
            CoordinatorError::HandshakeFailure { .. } => ErrorKind::HandshakeFailure,
            CoordinatorError::ServerUnreachable { .. } => ErrorKind::ServerUnreachable,
            CoordinatorError::RemoteError { .. } => ErrorKind::RemoteError,
            CoordinatorError::UnresolvedEnvironment { .. } => ErrorKind::UnresolvedEnvironment,
            CoordinatorError::ShuttingDown => ErrorKind::ShuttingDown,
            CoordinatorError::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Whether the session that produced this error must not be reused
    pub fn evicts_session(&self) -> bool {
        matches!(self, CoordinatorError::ServerUnreachable { .. })
    }

    /// Whether this error must stop the coordinator; only startup config qualifies
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoordinatorError::ConfigError(_))
    }

    pub fn spawn_failure(server: impl Into<String>, reason: impl ToString) -> Self {
        CoordinatorError::SpawnFailure {
            server: server.into(),
            reason: reason.to_string(),
        }
    }

    pub fn handshake_failure(server: impl Into<String>, reason: impl ToString) -> Self {
        CoordinatorError::HandshakeFailure {
            server: server.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unreachable(server: impl Into<String>, reason: impl ToString) -> Self {
        CoordinatorError::ServerUnreachable {
            server: server.into(),
            reason: reason.to_string(),
        }
    }
}
