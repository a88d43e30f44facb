use crate::error::CoordinatorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type JsonObject = serde_json::Map<String, Value>;

/// A tool as advertised by a downstream server
///
/// Fetched fresh on every enumeration, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    Value::Object(JsonObject::new())
}

/// Raw outcome of a `tools/call` round-trip
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallOutput {
    /// The `content` member of the response, usually an array of parts
    pub content: Value,
    pub is_error: bool,
}

/// The open request/response channel of one session
///
/// Requests on the same transport are issued in call order; responses are
/// correlated by request id inside the implementation.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, CoordinatorError>;

    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: JsonObject,
    ) -> Result<ToolCallOutput, CoordinatorError>;

    /// Close the channel gracefully; later requests fail
    async fn close(&self) -> Result<(), CoordinatorError>;
}
