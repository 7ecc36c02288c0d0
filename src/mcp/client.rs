//! MCP client implementation

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::agent::Arguments;
use crate::tools::{ToolDefinition, ToolProvider};

use super::protocol::{methods, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};
use super::transport::Transport;
use super::{CallToolResult, PROTOCOL_VERSION};

/// MCP client for one tool server connection
pub struct McpClient<T: Transport> {
    transport: Mutex<T>,
    request_id: AtomicI64,
    server_info: Option<ServerInfo>,
}

impl<T: Transport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
            request_id: AtomicI64::new(1),
            server_info: None,
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Server identity reported during `initialize`
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Perform the `initialize` handshake
    pub async fn initialize(&mut self, client_info: ClientInfo) -> Result<ServerInfo, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": client_info.name,
                "version": client_info.version
            }
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::INITIALIZE).with_params(params);
        let result: InitializeResult = self.request(request).await?;

        let notification = serde_json::to_value(JsonRpcNotification::new(methods::INITIALIZED))
            .map_err(|e| McpError::Protocol(e.to_string()))?;
        self.transport
            .lock()
            .await
            .send(notification)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let info = ServerInfo {
            name: result.server_info.name,
            version: result.server_info.version,
        };
        info!("Connected to tool server {} {}", info.name, info.version);
        self.server_info = Some(info.clone());
        Ok(info)
    }

    /// List available tools
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, McpError> {
        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_LIST);
        let result: ToolsListResult = self.request(request).await?;
        Ok(result.tools)
    }

    /// Call a tool
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Arguments,
    ) -> Result<CallToolResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_CALL).with_params(params);
        self.request(request).await
    }

    /// Shut the server down
    pub async fn close(&self) -> Result<(), McpError> {
        self.transport
            .lock()
            .await
            .close()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }

    async fn request<R: for<'de> Deserialize<'de>>(&self, request: JsonRpcRequest) -> Result<R, McpError> {
        let response = self.send_request(request).await?;

        if let Some(error) = response.error {
            return Err(McpError::Server(error.message));
        }
        let result = response
            .result
            .ok_or_else(|| McpError::Protocol("Empty response".to_string()))?;
        serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))
    }

    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let mut transport = self.transport.lock().await;
        let id = request.id.clone();

        let request_value =
            serde_json::to_value(&request).map_err(|e| McpError::Protocol(e.to_string()))?;

        transport
            .send(request_value)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        loop {
            let value = transport
                .receive()
                .await
                .map_err(|e| McpError::Transport(e.to_string()))?
                .ok_or_else(|| McpError::Transport("Connection closed".to_string()))?;

            if !JsonRpcResponse::is_response(&value) {
                debug!("Skipping server message: {}", value);
                continue;
            }

            let response: JsonRpcResponse =
                serde_json::from_value(value).map_err(|e| McpError::Protocol(e.to_string()))?;
            if response.id.as_ref() == Some(&id) {
                return Ok(response);
            }
            debug!("Skipping response for request {:?}, waiting for {}", response.id, id);
        }
    }
}

#[async_trait]
impl<T: Transport> ToolProvider for McpClient<T> {
    async fn list_tools(&self) -> crate::Result<Vec<ToolDefinition>> {
        Ok(McpClient::list_tools(self).await?)
    }

    async fn call_tool(&self, name: &str, arguments: Arguments) -> crate::Result<CallToolResult> {
        Ok(McpClient::call_tool(self, name, arguments).await?)
    }

    async fn shutdown(&self) -> crate::Result<()> {
        Ok(self.close().await?)
    }
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct InitializeResult {
    #[serde(rename = "serverInfo")]
    server_info: ServerInfoInner,
}

#[derive(Debug, Deserialize)]
struct ServerInfoInner {
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct ToolsListResult {
    tools: Vec<ToolDefinition>,
}

/// MCP errors
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Server error: {0}")]
    Server(String),
}

impl From<McpError> for crate::Error {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Transport(_) => crate::Error::Connection(err.to_string()),
            McpError::Protocol(_) | McpError::Server(_) => crate::Error::ToolInvocation(err.to_string()),
        }
    }
}
