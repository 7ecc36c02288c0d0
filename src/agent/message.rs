//! Message types for agent communication

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tool call arguments, keyed by parameter name.
pub type Arguments = Map<String, Value>;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Result of a tool call, paired with a preceding assistant request
    Tool,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,

    /// Tool call ID (for tool responses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool calls made by assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create an assistant message with tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }

    /// Create a tool result message
    pub fn tool_result(call_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: result.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
        }
    }

    /// Tool calls carried by this message, empty for anything but an
    /// assistant tool-call turn.
    pub fn calls(&self) -> &[ToolCallRequest] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// A tool call request from the LLM, normalized across providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Arguments,

    /// Parse failure for a textual argument payload. `arguments` is empty
    /// when this is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malformed: Option<String>,

    /// Argument text exactly as the backend sent it, for providers that
    /// encode arguments as a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_arguments: Option<String>,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            malformed: None,
            raw_arguments: None,
        }
    }

    /// Build a request from a JSON-encoded argument payload.
    ///
    /// Empty text and `null` mean "no arguments". Anything that isn't a
    /// JSON object is recorded as malformed instead of being dropped.
    pub fn from_json_text(id: impl Into<String>, name: impl Into<String>, raw: &str) -> Self {
        let mut request = Self::new(id, name, Arguments::new());
        request.raw_arguments = Some(raw.to_string());
        let raw = raw.trim();
        if raw.is_empty() {
            return request;
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => request.arguments = map,
            Ok(Value::Null) => {}
            Ok(other) => {
                request.malformed = Some(format!("expected a JSON object, got `{other}`"));
            }
            Err(e) => request.malformed = Some(e.to_string()),
        }
        request
    }

    /// Build a request from already-structured arguments.
    pub fn from_value(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        let arguments = match args {
            Value::Object(map) => map,
            _ => Arguments::new(),
        };
        Self::new(id, name, arguments)
    }
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub output: String,
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn ok(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
            is_error: true,
        }
    }
}

/// Response from the agent for one user turn
#[derive(Debug, Clone)]
pub struct Response {
    pub content: String,
    /// Model rounds used to produce the answer
    pub rounds: usize,
    /// Tool calls executed during the turn
    pub tool_calls: usize,
    /// Set when the round cap cut the turn short
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.calls().is_empty());
    }

    #[test]
    fn test_arguments_from_json_text() {
        let req = ToolCallRequest::from_json_text("c1", "get_weather", r#"{"city":"Paris"}"#);
        assert_eq!(req.arguments.get("city"), Some(&json!("Paris")));
        assert!(req.malformed.is_none());
    }

    #[test]
    fn test_empty_and_null_arguments() {
        assert!(ToolCallRequest::from_json_text("c1", "get_ip", "").arguments.is_empty());
        let req = ToolCallRequest::from_json_text("c1", "get_ip", "null");
        assert!(req.arguments.is_empty());
        assert!(req.malformed.is_none());
    }

    #[test]
    fn test_malformed_arguments_are_kept() {
        let req = ToolCallRequest::from_json_text("c1", "perform_move", r#"{"move_name": "dance""#);
        assert!(req.arguments.is_empty());
        assert!(req.malformed.is_some());

        assert_eq!(req.raw_arguments.as_deref(), Some(r#"{"move_name": "dance""#));

        let req = ToolCallRequest::from_json_text("c2", "perform_move", "[1, 2]");
        assert!(req.malformed.unwrap().contains("JSON object"));
    }

    #[test]
    fn test_arguments_from_value() {
        let req = ToolCallRequest::from_value("c1", "play_sound", json!({"sound_name": "bark"}));
        assert_eq!(req.arguments.len(), 1);

        let req = ToolCallRequest::from_value("c2", "get_ip", Value::Null);
        assert!(req.arguments.is_empty());
    }
}
