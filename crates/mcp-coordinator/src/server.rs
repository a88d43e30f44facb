use crate::facade::ToolFacade;
use mcp_coordinator_core::JsonObject;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

pub const LIST_SERVERS_TOOL: &str = "list_mcps";
pub const LIST_TOOLS_TOOL: &str = "get_mcp_tools";
pub const CALL_TOOL_TOOL: &str = "call_mcp_tool";

#[derive(Debug, Deserialize)]
struct ServerArgs {
    server_name: String,
}

#[derive(Debug, Deserialize)]
struct CallArgs {
    server_name: String,
    tool_name: String,
    #[serde(default)]
    tool_args: Option<JsonObject>,
}

/// The coordinator's own MCP surface, served over stdio
#[derive(Clone)]
pub struct CoordinatorServer {
    facade: ToolFacade,
}

impl CoordinatorServer {
    pub fn new(facade: ToolFacade) -> Self {
        Self { facade }
    }

    /// Run one of the coordinator tools and produce its result text
    ///
    /// Downstream failures come back as text; only a malformed request to
    /// the coordinator itself is a protocol error.
    pub async fn dispatch(
        &self,
        tool: &str,
        arguments: Option<JsonObject>,
    ) -> Result<String, ErrorData> {
        debug!(tool = %tool, "Dispatching coordinator tool");
        match tool {
            LIST_SERVERS_TOOL => Ok(self.facade.list_servers_text()),
            LIST_TOOLS_TOOL => {
                let args: ServerArgs = parse_args(tool, arguments)?;
                Ok(self.facade.list_tools_text(&args.server_name).await)
            }
            CALL_TOOL_TOOL => {
                let args: CallArgs = parse_args(tool, arguments)?;
                Ok(self
                    .facade
                    .call_tool_text(&args.server_name, &args.tool_name, args.tool_args)
                    .await)
            }
            other => Err(ErrorData::invalid_params(
                format!("unknown tool: {other}"),
                None,
            )),
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Option<JsonObject>) -> Result<T, ErrorData> {
    serde_json::from_value(Value::Object(arguments.unwrap_or_default())).map_err(|e| {
        ErrorData::invalid_params(format!("invalid arguments for {tool}: {e}"), None)
    })
}

fn schema(value: Value) -> Arc<JsonObject> {
    match value {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(JsonObject::new()),
    }
}

/// Descriptors of the three coordinator tools
pub fn coordinator_tools() -> Vec<Tool> {
    vec![
        Tool::new(
            LIST_SERVERS_TOOL,
            "List every configured MCP server with its description.",
            schema(json!({ "type": "object", "properties": {} })),
        ),
        Tool::new(
            LIST_TOOLS_TOOL,
            "List the tools offered by one MCP server, starting it if needed.",
            schema(json!({
                "type": "object",
                "properties": {
                    "server_name": { "type": "string", "description": "Name from list_mcps" }
                },
                "required": ["server_name"]
            })),
        ),
        Tool::new(
            CALL_TOOL_TOOL,
            "Call a tool on one MCP server and return its output as text.",
            schema(json!({
                "type": "object",
                "properties": {
                    "server_name": { "type": "string", "description": "Name from list_mcps" },
                    "tool_name": { "type": "string", "description": "Name from get_mcp_tools" },
                    "tool_args": { "type": "object", "description": "Arguments for the tool" }
                },
                "required": ["server_name", "tool_name"]
            })),
        ),
    ]
}

#[allow(clippy::manual_async_fn)]
impl ServerHandler for CoordinatorServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mcp-coordinator".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Use list_mcps to discover servers, get_mcp_tools to see a server's tools, \
                 and call_mcp_tool to run one."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        async {
            Ok(ListToolsResult {
                next_cursor: None,
                tools: coordinator_tools(),
            })
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let text = self.dispatch(&request.name, request.arguments).await?;
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
    }
}
