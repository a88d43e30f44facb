#![allow(dead_code)]

use async_trait::async_trait;
use mcp_coordinator::{
    ConnectRequest, Connected, Coordinator, CoordinatorError, CoordinatorSettings, JsonObject,
    Manifest, ProcessHandle, ProcessId, ProcessStatus, ServerConfig, SessionConnector,
    SessionTransport, TerminationResult, ToolCallOutput, ToolDescriptor,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_target(false)
        .try_init();
}

pub fn manifest(names: &[&str]) -> Manifest {
    names
        .iter()
        .map(|name| {
            let config = ServerConfig::builder()
                .description(format!("{name} test server"))
                .command(format!("fake-{name}"))
                .build()
                .unwrap();
            (name.to_string(), config)
        })
        .collect()
}

pub fn settings() -> CoordinatorSettings {
    CoordinatorSettings::builder()
        .termination_grace(Duration::from_millis(50))
        .build()
        .unwrap()
}

pub fn coordinator(names: &[&str], connector: &Arc<FakeConnector>) -> Coordinator {
    Coordinator::with_connector(manifest(names), settings(), connector.clone())
}

/// Write `contents` to a manifest file unique to this test process
pub fn manifest_file(tag: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "mcp-coordinator-{tag}-{}.json",
        std::process::id()
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

/// Wait for a condition that background tasks make true
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Wait for the registry to drop `server_name`
pub async fn unregistered_soon(coordinator: &Coordinator, server_name: &str) -> bool {
    for _ in 0..200 {
        if coordinator.registry().get(server_name).await.is_none() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Canned behaviour of one fake server
#[derive(Clone, Default)]
pub struct FakeServer {
    pub tools: Vec<ToolDescriptor>,
    /// Content returned by every call; echoes the call when absent
    pub content: Option<Value>,
    pub call_error: Option<CoordinatorError>,
    pub fail_spawn: bool,
    pub fail_close: bool,
}

impl FakeServer {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names
                .iter()
                .map(|name| ToolDescriptor {
                    name: name.to_string(),
                    description: Some(format!("{name} tool")),
                    input_schema: json!({"type": "object"}),
                })
                .collect(),
            ..Self::default()
        }
    }
}

/// Test-side view of one fake child process
pub struct ProcessProbe {
    pub pid: ProcessId,
    pub server_name: String,
    exit: watch::Sender<Option<ProcessStatus>>,
    terminated: AtomicBool,
    closed: AtomicBool,
}

impl ProcessProbe {
    /// Simulate the child dying on its own
    pub fn crash(&self) {
        self.exit.send_replace(Some(ProcessStatus::Unknown));
    }

    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeProcess {
    probe: Arc<ProcessProbe>,
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn pid(&self) -> Option<ProcessId> {
        Some(self.probe.pid)
    }

    fn command(&self) -> &str {
        &self.probe.server_name
    }

    fn has_exited(&self) -> bool {
        self.probe.has_exited()
    }

    async fn wait_for_exit(&self) -> ProcessStatus {
        let mut exit = self.probe.exit.subscribe();
        let status = match exit.wait_for(Option::is_some).await {
            Ok(status) => status.clone().unwrap_or(ProcessStatus::Unknown),
            Err(_) => ProcessStatus::Unknown,
        };
        status
    }

    async fn terminate(&self, _grace: Duration) -> TerminationResult {
        if self.probe.has_exited() {
            return TerminationResult::ProcessNotFound;
        }
        self.probe.terminated.store(true, Ordering::SeqCst);
        self.probe.crash();
        TerminationResult::Success
    }
}

struct FakeTransport {
    server: FakeServer,
    probe: Arc<ProcessProbe>,
}

#[async_trait]
impl SessionTransport for FakeTransport {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, CoordinatorError> {
        Ok(self.server.tools.clone())
    }

    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: JsonObject,
    ) -> Result<ToolCallOutput, CoordinatorError> {
        if let Some(error) = &self.server.call_error {
            return Err(error.clone());
        }
        let content = self.server.content.clone().unwrap_or_else(|| {
            json!([{
                "type": "text",
                "text": format!("{tool_name} {}", Value::Object(arguments)),
            }])
        });
        Ok(ToolCallOutput {
            content,
            is_error: false,
        })
    }

    async fn close(&self) -> Result<(), CoordinatorError> {
        self.probe.closed.store(true, Ordering::SeqCst);
        if self.server.fail_close {
            return Err(CoordinatorError::unreachable(
                &self.probe.server_name,
                "close failed",
            ));
        }
        Ok(())
    }
}

/// Connector that fabricates sessions and counts spawns
#[derive(Default)]
pub struct FakeConnector {
    servers: HashMap<String, FakeServer>,
    delay: Duration,
    attempts: AtomicUsize,
    spawns: AtomicUsize,
    next_pid: AtomicU32,
    processes: Mutex<Vec<Arc<ProcessProbe>>>,
    envs: Mutex<Vec<(String, HashMap<String, String>)>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            ..Self::default()
        }
    }

    pub fn with_server(mut self, name: &str, server: FakeServer) -> Self {
        self.servers.insert(name.to_string(), server);
        self
    }

    /// Make every connect take this long, like a slow handshake
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn processes(&self) -> Vec<Arc<ProcessProbe>> {
        self.processes.lock().unwrap().clone()
    }

    pub fn processes_for(&self, server_name: &str) -> Vec<Arc<ProcessProbe>> {
        self.processes()
            .into_iter()
            .filter(|p| p.server_name == server_name)
            .collect()
    }

    pub fn last_env(&self, server_name: &str) -> Option<HashMap<String, String>> {
        self.envs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(name, _)| name == server_name)
            .map(|(_, env)| env.clone())
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self, request: ConnectRequest<'_>) -> Result<Connected, CoordinatorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.envs
            .lock()
            .unwrap()
            .push((request.server_name.to_string(), request.env.clone()));

        let server = self
            .servers
            .get(request.server_name)
            .cloned()
            .unwrap_or_default();
        if server.fail_spawn {
            return Err(CoordinatorError::spawn_failure(
                request.server_name,
                "No such file or directory (os error 2)",
            ));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let (exit, _) = watch::channel(None);
        let probe = Arc::new(ProcessProbe {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            server_name: request.server_name.to_string(),
            exit,
            terminated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.processes.lock().unwrap().push(probe.clone());
        self.spawns.fetch_add(1, Ordering::SeqCst);

        Ok(Connected {
            process: Box::new(FakeProcess {
                probe: probe.clone(),
            }),
            transport: Box::new(FakeTransport { server, probe }),
        })
    }
}
