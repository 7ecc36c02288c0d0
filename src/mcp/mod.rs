//! MCP (Model Context Protocol) client
//!
//! Just enough of the protocol to talk to a tool server over stdio:
//! `initialize`, `tools/list` and `tools/call`.

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::{ClientInfo, McpClient, McpError, ServerInfo};
pub use transport::{StdioTransport, Transport};

use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::Result;

/// MCP protocol version
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Result of a `tools/call` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Successful result with one text item
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem {
                content_type: "text".to_string(),
                text: Some(text.into()),
            }],
            is_error: false,
        }
    }

    /// Text of the first content item. Later items are ignored.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(|c| c.text.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Spawn the configured tool server and complete the MCP handshake.
pub async fn connect_stdio(server: &ServerConfig) -> Result<McpClient<StdioTransport>> {
    let transport = StdioTransport::spawn(&server.command, &server.args, &server.env)
        .map_err(|e| Error::Connection(format!("failed to start `{}`: {}", server.command, e)))?;

    let mut client = McpClient::new(transport);
    client
        .initialize(ClientInfo::default())
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_result_first_text() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Battery: 85%, Status: active"},
                {"type": "text", "text": "ignored"}
            ]
        }))
        .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.first_text(), Some("Battery: 85%, Status: active"));
    }

    #[test]
    fn test_call_result_without_text() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "image", "data": "...", "mimeType": "image/png"}],
            "isError": false
        }))
        .unwrap();
        assert_eq!(result.first_text(), None);
    }
}
