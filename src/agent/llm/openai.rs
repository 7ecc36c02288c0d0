//! OpenAI-compatible chat completions client.
//!
//! Stateless: every call resends the whole transcript, including earlier
//! tool calls and their results.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Error;
use crate::tools::{CatalogFormat, ToolDeclarations};
use crate::Result;

use super::super::message::{Message, Role, ToolCallRequest};
use super::{LlmClient, LlmResponse, ModelTurn, Usage};

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Client for any server speaking the OpenAI chat completions API.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    tool_choice: String,
    temperature: f32,
    system_prompt: Option<String>,
    client: Client,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: OPENAI_API_URL.to_string(),
            tool_choice: "auto".to_string(),
            temperature: 0.7,
            system_prompt: None,
            client: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: &str) -> Self {
        self.tool_choice = tool_choice.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt.filter(|s| !s.trim().is_empty());
        self
    }

    fn build_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn convert_messages(&self, messages: &[Message]) -> Vec<Value> {
        let mut converted = Vec::with_capacity(messages.len() + 1);

        if let Some(ref system) = self.system_prompt {
            converted.push(json!({"role": "system", "content": system}));
        }

        converted.extend(messages.iter().map(|m| match m.role {
            Role::User => json!({"role": "user", "content": m.content}),
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id.as_deref().unwrap_or_default(),
                "content": m.content
            }),
            Role::Assistant if !m.calls().is_empty() => {
                let calls: Vec<Value> = m
                    .calls()
                    .iter()
                    .map(|tc| {
                        let arguments = match tc.raw_arguments.as_deref() {
                            Some(raw) if !raw.trim().is_empty() => raw.to_string(),
                            _ => Value::Object(tc.arguments.clone()).to_string(),
                        };
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": arguments
                            }
                        })
                    })
                    .collect();

                let content = if m.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(m.content.clone())
                };
                json!({"role": "assistant", "content": content, "tool_calls": calls})
            }
            Role::Assistant => json!({"role": "assistant", "content": m.content}),
        }));

        converted
    }

    fn build_request(&self, messages: &[Message], tools: &ToolDeclarations) -> Value {
        let mut request = json!({
            "model": self.model,
            "messages": self.convert_messages(messages),
            "temperature": self.temperature
        });

        if let Some(tool_config) = tools.value() {
            request["tools"] = tool_config.clone();
            request["tool_choice"] = json!(self.tool_choice);
        }

        request
    }

    fn parse_response(&self, response: ChatCompletion) -> Result<LlmResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Backend("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest::from_json_text(tc.id, tc.function.name, &tc.function.arguments))
            .collect();

        let usage = response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn catalog_format(&self) -> CatalogFormat {
        CatalogFormat::OpenAi
    }

    async fn complete(&self, transcript: &[Message], tools: &ToolDeclarations) -> Result<ModelTurn> {
        let request = self.build_request(transcript, tools);

        let response = self
            .client
            .post(self.build_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!("OpenAI API error ({status}): {error_text}")));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("Invalid completion response: {e}")))?;
        let parsed = self.parse_response(completion)?;
        debug!(
            "Completion finished ({}), {} tokens, {} tool calls",
            parsed.finish_reason,
            parsed.usage.total_tokens,
            parsed.tool_calls.len()
        );

        Ok(parsed.into_turn())
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{build_declarations, ToolDefinition};

    fn completion(value: Value) -> ChatCompletion {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_convert_full_transcript() {
        let client = OpenAiClient::new("sk-test", "gpt-4o-mini")
            .with_system_prompt(Some("Be brief.".to_string()));
        let call = ToolCallRequest::from_value("call_a", "get_weather", json!({"city": "Paris"}));
        let transcript = vec![
            Message::user("What's the weather in Paris?"),
            Message::assistant_with_tools("", vec![call]),
            Message::tool_result("call_a", "The weather of Paris is sunny."),
            Message::assistant("It's sunny in Paris."),
        ];

        let messages = client.convert_messages(&transcript);
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["content"], Value::Null);
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], r#"{"city":"Paris"}"#);
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_a");
        assert_eq!(messages[4]["content"], "It's sunny in Paris.");
    }

    #[test]
    fn test_request_includes_tools_and_choice() {
        let client = OpenAiClient::new("sk-test", "gpt-4o-mini").with_tool_choice("required");
        let tools = build_declarations(
            CatalogFormat::OpenAi,
            &[ToolDefinition {
                name: "get_ip".to_string(),
                description: "Returns the IP address of the device.".to_string(),
                input_schema: json!({"type": "object", "properties": {}}),
            }],
        );

        let request = client.build_request(&[Message::user("ip?")], &tools);
        assert_eq!(request["tool_choice"], "required");
        assert_eq!(request["tools"][0]["function"]["name"], "get_ip");

        let bare = client.build_request(&[Message::user("hi")], &build_declarations(CatalogFormat::OpenAi, &[]));
        assert!(bare.get("tools").is_none());
        assert!(bare.get("tool_choice").is_none());
    }

    #[test]
    fn test_parse_parallel_tool_calls() {
        let client = OpenAiClient::new("sk-test", "gpt-4o-mini");
        let parsed = client
            .parse_response(completion(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": null, "tool_calls": [
                        {"id": "call_1", "type": "function",
                         "function": {"name": "perform_move", "arguments": "{\"move_name\":\"dance\",\"intensity\":3}"}},
                        {"id": "call_2", "type": "function",
                         "function": {"name": "play_sound", "arguments": "{\"sound_name\": \"bark\""}}
                    ]},
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 20, "completion_tokens": 8, "total_tokens": 28}
            })))
            .unwrap();

        assert_eq!(parsed.tool_calls.len(), 2);
        assert_eq!(parsed.tool_calls[0].arguments["intensity"], 3);
        assert!(parsed.tool_calls[0].malformed.is_none());
        assert!(parsed.tool_calls[1].malformed.is_some());
        assert_eq!(parsed.usage.total_tokens, 28);
    }

    #[test]
    fn test_parse_text_answer_and_empty_choices() {
        let client = OpenAiClient::new("sk-test", "gpt-4o-mini");
        let parsed = client
            .parse_response(completion(json!({
                "choices": [{"message": {"content": "It's sunny in Paris."}, "finish_reason": "stop"}]
            })))
            .unwrap();
        assert_eq!(parsed.into_turn(), ModelTurn::FinalAnswer("It's sunny in Paris.".to_string()));

        let err = client.parse_response(completion(json!({"choices": []}))).unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[test]
    fn test_malformed_arguments_are_resent_verbatim() {
        let client = OpenAiClient::new("sk-test", "gpt-4o-mini");
        let raw = r#"{"sound_name": "bark""#;
        let transcript = vec![
            Message::user("Bark!"),
            Message::assistant_with_tools(
                "",
                vec![
                    ToolCallRequest::from_json_text("call_1", "play_sound", raw),
                    ToolCallRequest::from_json_text("call_2", "get_ip", ""),
                ],
            ),
        ];

        let messages = client.convert_messages(&transcript);
        let calls = &messages[1]["tool_calls"];
        assert_eq!(calls[0]["function"]["arguments"], raw);
        assert_eq!(calls[1]["function"]["arguments"], "{}");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = OpenAiClient::new("k", "m").with_base_url("http://localhost:11434/v1/");
        assert_eq!(client.build_url(), "http://localhost:11434/v1/chat/completions");
    }
}
