//! Tools module - the agent's view of the external tool provider
//!
//! Tools live in a separate process. This module only knows their
//! descriptions, how to declare them to a model backend, and how to forward
//! calls to the provider.

mod catalog;
mod executor;

pub use catalog::{build_declarations, CatalogFormat, ToolDeclarations};
pub use executor::ToolExecutor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::Arguments;
use crate::mcp::CallToolResult;
use crate::Result;

/// Tool definition as advertised by the tool provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", alias = "input_schema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Tool provider trait - the external process exposing callable tools
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Fetch the tool catalog
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    /// Invoke a tool by name
    async fn call_tool(&self, name: &str, arguments: Arguments) -> Result<CallToolResult>;

    /// Release the connection at the end of a session
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Scripted tool provider for testing
#[cfg(test)]
pub struct FakeToolProvider {
    pub tools: Vec<ToolDefinition>,
    pub calls: std::sync::Mutex<Vec<(String, Arguments)>>,
    /// Tool names whose calls fail at the transport level
    pub failing: Vec<String>,
    pub shut_down: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl FakeToolProvider {
    pub fn new(names: &[&str]) -> Self {
        Self {
            tools: names
                .iter()
                .map(|name| ToolDefinition {
                    name: name.to_string(),
                    description: format!("Test tool {name}"),
                    input_schema: empty_schema(),
                })
                .collect(),
            calls: std::sync::Mutex::new(Vec::new()),
            failing: Vec::new(),
            shut_down: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.push(name.to_string());
        self
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl ToolProvider for FakeToolProvider {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Arguments) -> Result<CallToolResult> {
        self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
        if self.failing.iter().any(|f| f == name) {
            return Err(crate::Error::Connection("broken pipe".to_string()));
        }
        let city = arguments
            .get("city")
            .and_then(Value::as_str)
            .unwrap_or("nowhere");
        Ok(CallToolResult::text(format!("The weather of {city} is sunny.")))
    }

    async fn shutdown(&self) -> Result<()> {
        self.shut_down.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
