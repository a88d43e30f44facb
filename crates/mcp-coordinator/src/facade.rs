use crate::manager::SessionManager;
use mcp_coordinator_core::{CoordinatorError, JsonObject, ServerSummary, ToolDescriptor};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// The three caller-facing operations
///
/// The typed methods keep the error taxonomy intact. The `*_text` methods
/// are the outer boundary: they always produce a response string and never
/// fail, whatever happened to the downstream server.
#[derive(Clone)]
pub struct ToolFacade {
    manager: Arc<SessionManager>,
}

impl ToolFacade {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    /// Every manifest entry, without contacting any server
    pub fn list_servers(&self) -> Vec<ServerSummary> {
        self.manager.manifest().summaries()
    }

    /// Fresh tool list from the server's live session
    pub async fn list_tools(&self, server_name: &str) -> Result<Vec<ToolDescriptor>, CoordinatorError> {
        let session = self.manager.ensure_session(server_name).await?;
        match session.transport.list_tools().await {
            Ok(tools) => Ok(tools),
            Err(e) => {
                if e.evicts_session() {
                    self.manager.evict(&session).await;
                }
                Err(e)
            }
        }
    }

    /// Invoke `tool_name` and flatten its content into display text
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<String, CoordinatorError> {
        let session = self.manager.ensure_session(server_name).await?;
        let output = match session
            .transport
            .call_tool(tool_name, arguments.unwrap_or_default())
            .await
        {
            Ok(output) => output,
            Err(e) => {
                if e.evicts_session() {
                    self.manager.evict(&session).await;
                }
                return Err(e);
            }
        };

        if output.is_error {
            debug!(server = %server_name, tool = %tool_name, "Tool reported an error result");
        }
        Ok(flatten_content(&output.content))
    }

    pub fn list_servers_text(&self) -> String {
        to_pretty_json(&self.list_servers())
    }

    pub async fn list_tools_text(&self, server_name: &str) -> String {
        match self.list_tools(server_name).await {
            Ok(tools) => to_pretty_json(&tools),
            Err(CoordinatorError::UnknownServer { .. }) => format!(
                "Error: Server \"{server_name}\" not found. Use list_mcps to see available servers."
            ),
            Err(e) => {
                warn!(server = %server_name, kind = ?e.kind(), "list_tools failed: {}", e);
                format!("Error connecting to {server_name}: {e}")
            }
        }
    }

    pub async fn call_tool_text(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Option<JsonObject>,
    ) -> String {
        match self.call_tool(server_name, tool_name, arguments).await {
            Ok(text) => text,
            Err(CoordinatorError::UnknownServer { .. }) => {
                format!("Error: Server \"{server_name}\" not found.")
            }
            Err(e) => {
                warn!(server = %server_name, tool = %tool_name, kind = ?e.kind(), "call_tool failed: {}", e);
                format!("Error calling {tool_name} on {server_name}: {e}")
            }
        }
    }
}

/// Render a tool result's content for display
///
/// A sequence of parts becomes one line per part: text parts verbatim,
/// anything else as compact JSON. A non-sequence is rendered as JSON.
pub fn flatten_content(content: &Value) -> String {
    match content {
        Value::Array(parts) => parts
            .iter()
            .map(|part| match (part.get("type"), part.get("text")) {
                (Some(Value::String(kind)), Some(Value::String(text))) if kind == "text" => {
                    text.clone()
                }
                _ => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("Error: {e}"))
}
