//! Tool executor - validates and forwards tool calls to the provider

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::agent::{Arguments, ToolCallRequest, ToolCallResult};
use crate::error::Error;
use crate::Result;

use super::{ToolDefinition, ToolProvider};

/// Tool executor owns the provider connection and the session's catalog
pub struct ToolExecutor {
    provider: Arc<dyn ToolProvider>,
    catalog: Vec<ToolDefinition>,
    known: HashSet<String>,
}

impl ToolExecutor {
    /// Create an executor for a fixed catalog
    pub fn new(provider: Arc<dyn ToolProvider>, catalog: Vec<ToolDefinition>) -> Self {
        let known = catalog.iter().map(|t| t.name.clone()).collect();
        Self {
            provider,
            catalog,
            known,
        }
    }

    /// Fetch the catalog from the provider and build an executor for it.
    ///
    /// Any failure here is a connection error: there is no session without
    /// a tool catalog.
    pub async fn connect(provider: Arc<dyn ToolProvider>) -> Result<Self> {
        let catalog = provider
            .list_tools()
            .await
            .map_err(|e| Error::Connection(format!("failed to list tools: {e}")))?;
        Ok(Self::new(provider, catalog))
    }

    /// Tool definitions for this session
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.catalog
    }

    /// Check if a tool exists
    pub fn has(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    /// List catalog tool names in provider order
    pub fn tool_names(&self) -> Vec<&str> {
        self.catalog.iter().map(|t| t.name.as_str()).collect()
    }

    /// Close the provider connection
    pub async fn shutdown(&self) -> Result<()> {
        self.provider.shutdown().await
    }

    /// Execute a normalized tool call request.
    pub async fn dispatch(&self, call: &ToolCallRequest) -> ToolCallResult {
        if let Some(ref reason) = call.malformed {
            let err = Error::MalformedArguments(reason.clone());
            warn!("Tool {} not called: {}", call.name, err);
            return ToolCallResult::error(
                &call.id,
                format!("Error parsing arguments for {}: {}", call.name, reason),
            );
        }

        let mut result = self.invoke(&call.name, call.arguments.clone()).await;
        result.call_id = call.id.clone();
        result
    }

    /// Execute a tool by name. Failures become error results, never `Err`.
    pub async fn invoke(&self, name: &str, arguments: Arguments) -> ToolCallResult {
        debug!("Executing tool: {} with args: {:?}", name, arguments);

        match self.try_invoke(name, arguments).await {
            Ok(result) if result.is_error => {
                warn!("Tool {} reported an error: {}", name, result.output);
                result
            }
            Ok(result) => {
                debug!("Tool {} succeeded: {} chars", name, result.output.len());
                result
            }
            Err(e) => {
                let output = format!("Error calling tool: {e}");
                warn!("Tool {} failed: {}", name, output);
                ToolCallResult::error("", output)
            }
        }
    }

    async fn try_invoke(&self, name: &str, arguments: Arguments) -> Result<ToolCallResult> {
        if !self.has(name) {
            return Err(Error::UnknownTool(name.to_string()));
        }

        let result = self.provider.call_tool(name, arguments).await?;
        let text = result
            .first_text()
            .ok_or_else(|| Error::ToolInvocation("Tool returned no content".to_string()))?;

        Ok(ToolCallResult {
            call_id: String::new(),
            output: text.to_string(),
            is_error: result.is_error,
        })
    }
}
