use crate::registry::{Session, SessionRegistry};
use mcp_coordinator_core::TerminationResult;
use std::sync::Arc;
use std::time::Duration;
#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Outcome of retiring one session
#[derive(Debug, Clone, PartialEq)]
pub struct Retirement {
    pub server_name: String,
    pub close_error: Option<String>,
    pub termination: TerminationResult,
}

/// What a coordinator-wide shutdown did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShutdownReport {
    pub retired: Vec<Retirement>,
}

impl ShutdownReport {
    pub fn session_count(&self) -> usize {
        self.retired.len()
    }

    /// Whether every child is known to be gone
    pub fn all_terminated(&self) -> bool {
        self.retired.iter().all(|r| r.termination.is_terminated())
    }

    pub fn close_failures(&self) -> usize {
        self.retired.iter().filter(|r| r.close_error.is_some()).count()
    }
}

/// Watches child exits and drives coordinator shutdown
pub struct LifecycleSupervisor {
    registry: Arc<SessionRegistry>,
    termination_grace: Duration,
    shutdown: CancellationToken,
    retiring: TaskTracker,
}

impl LifecycleSupervisor {
    pub fn new(registry: Arc<SessionRegistry>, termination_grace: Duration) -> Self {
        Self {
            registry,
            termination_grace,
            shutdown: CancellationToken::new(),
            retiring: TaskTracker::new(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled once shutdown has begun
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Evict `session` from the registry once its process exits
    ///
    /// The entry is removed only if it still refers to this session, so a
    /// late notification never touches a replacement.
    pub fn observe_exit(&self, session: Arc<Session>) {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let status = session.process.wait_for_exit().await;
            if registry
                .remove_if(&session.server_name, session.id)
                .await
                .is_some()
            {
                warn!(
                    server = %session.server_name,
                    session = %session.id,
                    "Server process exited ({}); session evicted",
                    status
                );
                if let Err(e) = session.transport.close().await {
                    debug!(server = %session.server_name, "Closing dead session: {}", e);
                }
            } else {
                debug!(
                    server = %session.server_name,
                    session = %session.id,
                    "Server process exited ({}) after its session was retired",
                    status
                );
            }
        });
    }

    /// Close and terminate a session that is already out of the registry
    pub async fn retire(&self, session: &Session) -> Retirement {
        retire(session, self.termination_grace).await
    }

    /// Like [`retire`](Self::retire), without waiting for the outcome
    pub fn retire_in_background(&self, session: Arc<Session>) {
        let grace = self.termination_grace;
        self.retiring.spawn(async move {
            retire(&session, grace).await;
        });
    }

    /// Close every session and terminate every child
    ///
    /// A failing close never skips termination, and a failure on one session
    /// never skips the others. The registry is empty afterwards.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown.cancel();

        let sessions = self.registry.drain().await;
        info!("Shutting down {} sessions", sessions.len());

        let mut tasks = JoinSet::new();
        for session in sessions {
            let grace = self.termination_grace;
            tasks.spawn(async move { retire(&session, grace).await });
        }

        let mut report = ShutdownReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(retirement) => report.retired.push(retirement),
                Err(e) => error!("Session retirement task failed: {}", e),
            }
        }
        report.retired.sort_by(|a, b| a.server_name.cmp(&b.server_name));

        self.retiring.close();
        self.retiring.wait().await;

        info!(
            "Shutdown complete: {} sessions, {} close failures",
            report.session_count(),
            report.close_failures()
        );
        report
    }
}

async fn retire(session: &Session, grace: Duration) -> Retirement {
    let close_error = match session.transport.close().await {
        Ok(()) => None,
        Err(e) => {
            warn!(server = %session.server_name, session = %session.id, error = %e, "Failed to close session");
            Some(e.to_string())
        }
    };

    let termination = session.process.terminate(grace).await;
    match &termination {
        TerminationResult::Success | TerminationResult::ProcessNotFound => {
            info!(server = %session.server_name, session = %session.id, "Session retired");
        }
        other => {
            warn!(server = %session.server_name, session = %session.id, "Termination incomplete: {:?}", other);
        }
    }

    Retirement {
        server_name: session.server_name.clone(),
        close_error,
        termination,
    }
}

/// SIGINT and SIGTERM listeners
///
/// Both are registered by [`install`](Self::install), not on first poll.
#[cfg(unix)]
pub struct ShutdownSignal {
    interrupt: Signal,
    terminate: Signal,
}

#[cfg(unix)]
impl ShutdownSignal {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolve on the next signal and name it
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}
