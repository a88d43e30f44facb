use async_trait::async_trait;
use mcp_coordinator_core::{
    CoordinatorError, CoordinatorSettings, JsonObject, SessionTransport, ToolCallOutput,
    ToolDescriptor,
};
use rmcp::model::{
    CallToolRequestParam, ClientCapabilities, ClientInfo, Implementation, InitializeRequestParam,
    ProtocolVersion,
};
use rmcp::service::{Peer, RunningService};
use rmcp::{RoleClient, ServiceError, ServiceExt};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// MCP client session over a child's stdio pipes, backed by rmcp
pub struct RmcpTransport {
    server_name: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, InitializeRequestParam>>>,
    call_timeout: Duration,
}

impl RmcpTransport {
    /// Run the initialize exchange over `reader`/`writer`
    ///
    /// Fails with `HandshakeFailure` if the peer closes, answers with garbage,
    /// or stays silent past the configured handshake timeout.
    pub async fn handshake<R, W>(
        server_name: &str,
        reader: R,
        writer: W,
        settings: &CoordinatorSettings,
    ) -> Result<Self, CoordinatorError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let client_info = Self::create_client_info(settings);

        let service =
            match tokio::time::timeout(settings.handshake_timeout, client_info.serve((reader, writer)))
                .await
            {
                Ok(Ok(service)) => service,
                Ok(Err(e)) => return Err(CoordinatorError::handshake_failure(server_name, e)),
                Err(_) => {
                    return Err(CoordinatorError::handshake_failure(
                        server_name,
                        format!(
                            "no initialize response within {:?}",
                            settings.handshake_timeout
                        ),
                    ));
                }
            };

        if let Some(peer_info) = service.peer_info() {
            info!(
                server = %server_name,
                "Handshake complete with {} {}",
                peer_info.server_info.name, peer_info.server_info.version
            );
        }

        Ok(Self {
            server_name: server_name.to_string(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            call_timeout: settings.call_timeout,
        })
    }

    fn create_client_info(settings: &CoordinatorSettings) -> ClientInfo {
        ClientInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: settings.client_name.clone(),
                version: settings.client_version.clone(),
            },
        }
    }

    /// Bound a single request by the call timeout
    async fn bounded<T>(
        &self,
        operation: &str,
        request: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, CoordinatorError> {
        match tokio::time::timeout(self.call_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.classify(e)),
            Err(_) => Err(CoordinatorError::unreachable(
                &self.server_name,
                format!("{operation} timed out after {:?}", self.call_timeout),
            )),
        }
    }

    /// A JSON-RPC error object means the child is alive and answering; any
    /// other failure means the channel is gone.
    fn classify(&self, error: ServiceError) -> CoordinatorError {
        match error {
            ServiceError::McpError(e) => CoordinatorError::RemoteError {
                server: self.server_name.clone(),
                message: e.message.to_string(),
            },
            other => CoordinatorError::unreachable(&self.server_name, other),
        }
    }
}

/// A response that does not decode leaves the channel in an unknown state
fn malformed(server_name: &str, e: serde_json::Error) -> CoordinatorError {
    CoordinatorError::unreachable(server_name, format!("malformed response: {e}"))
}

#[async_trait]
impl SessionTransport for RmcpTransport {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, CoordinatorError> {
        let tools = self
            .bounded("tools/list", self.peer.list_all_tools())
            .await?;
        debug!(server = %self.server_name, "Listed {} tools", tools.len());

        tools
            .into_iter()
            .map(|tool| {
                serde_json::to_value(tool)
                    .and_then(serde_json::from_value)
                    .map_err(|e| malformed(&self.server_name, e))
            })
            .collect()
    }

    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: JsonObject,
    ) -> Result<ToolCallOutput, CoordinatorError> {
        let request = CallToolRequestParam {
            name: tool_name.to_string().into(),
            arguments: Some(arguments),
        };
        let result = self
            .bounded("tools/call", self.peer.call_tool(request))
            .await?;

        let mut value = serde_json::to_value(result).map_err(|e| malformed(&self.server_name, e))?;
        let is_error = value
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let content = value
            .get_mut("content")
            .map(Value::take)
            .unwrap_or_else(|| Value::Array(Vec::new()));

        Ok(ToolCallOutput { content, is_error })
    }

    async fn close(&self) -> Result<(), CoordinatorError> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };

        match service.cancel().await {
            Ok(reason) => {
                debug!(server = %self.server_name, "Session closed: {:?}", reason);
                Ok(())
            }
            Err(e) => {
                error!(server = %self.server_name, error = %e, "Failed to close session");
                Err(CoordinatorError::unreachable(&self.server_name, e))
            }
        }
    }
}
