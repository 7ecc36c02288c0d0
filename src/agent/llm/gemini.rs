//! Gemini LLM client implementation (API key authentication).
//!
//! Gemini is driven like a chat session: the client keeps the `contents`
//! it has already sent and only converts transcript messages it hasn't
//! absorbed yet. The model's own turn is recorded straight from the
//! response and counts for the assistant message the loop appends after
//! it. Any other assistant message (the round-cap notice) goes out as
//! model text.

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Error;
use crate::tools::{CatalogFormat, ToolDeclarations};
use crate::Result;

use super::super::message::{Message, Role, ToolCallRequest};
use super::{GeminiResponse, LlmClient, LlmResponse, ModelTurn, Usage};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini API client using API key authentication.
pub struct GeminiClient {
    api_key: String,
    model: String,
    temperature: f32,
    system_prompt: Option<String>,
    client: Client,
    chat: Mutex<ChatSession>,
}

impl GeminiClient {
    /// Create a new Gemini client with API key.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: 0.7,
            system_prompt: None,
            client: Client::new(),
            chat: Mutex::new(ChatSession::default()),
        }
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
        format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_URL, self.model, self.api_key
        )
    }

    fn session(&self) -> std::sync::MutexGuard<'_, ChatSession> {
        self.chat.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn build_request(&self, contents: &[Value], tools: &ToolDeclarations) -> Value {
        let mut request = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": 8192
            }
        });

        if let Some(ref system) = self.system_prompt {
            request["systemInstruction"] = json!({
                "parts": [{"text": system}]
            });
        }

        if let Some(tool_config) = tools.value() {
            request["tools"] = tool_config.clone();
        }

        request
    }

    fn parse_response(&self, response: &GeminiResponse) -> Result<LlmResponse> {
        let candidate = response.candidates.first().ok_or_else(|| {
            let feedback = response
                .prompt_feedback
                .as_ref()
                .map(|f| f.to_string())
                .unwrap_or_default();
            Error::Backend(format!("No candidates in response {feedback}").trim_end().to_string())
        })?;

        let mut content: Option<String> = None;
        let mut tool_calls = Vec::new();

        let parts = candidate.content.as_ref().map(|c| c.parts.as_slice()).unwrap_or(&[]);
        for part in parts {
            if let Some(ref text) = part.text {
                if !part.thought {
                    content.get_or_insert_with(String::new).push_str(text);
                }
            }

            if let Some(ref fc) = part.function_call {
                tool_calls.push(ToolCallRequest::from_value(
                    format!("call_{}", uuid::Uuid::new_v4().simple()),
                    fc.name.clone(),
                    fc.args.clone(),
                ));
            }
        }

        let usage = response
            .usage_metadata
            .as_ref()
            .map(|u| Usage {
                prompt_tokens: u.prompt_token_count.unwrap_or(0),
                completion_tokens: u.candidates_token_count.unwrap_or(0),
                total_tokens: u.total_token_count.unwrap_or(0),
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            tool_calls,
            finish_reason: candidate
                .finish_reason
                .clone()
                .unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn catalog_format(&self) -> CatalogFormat {
        CatalogFormat::Gemini
    }

    fn seed(&self, history: &[Message]) {
        self.session().seed(history);
        debug!("Seeded Gemini chat with {} messages", history.len());
    }

    async fn complete(&self, transcript: &[Message], tools: &ToolDeclarations) -> Result<ModelTurn> {
        // The session is only updated once the backend has answered.
        let contents = self.session().request_contents(transcript);

        let request = self.build_request(&contents, tools);
        let response = self
            .client
            .post(self.build_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!("Gemini API error ({status}): {error_text}")));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("Invalid Gemini response: {e}")))?;
        let gemini_response: GeminiResponse = serde_json::from_value(raw.clone())
            .map_err(|e| Error::Backend(format!("Invalid Gemini response: {e}")))?;
        let parsed = self.parse_response(&gemini_response)?;
        debug!(
            "Gemini finished ({}), {} tokens, {} tool calls",
            parsed.finish_reason,
            parsed.usage.total_tokens,
            parsed.tool_calls.len()
        );

        let model_content = raw
            .pointer("/candidates/0/content")
            .cloned()
            .unwrap_or_else(|| json!({"role": "model", "parts": []}));
        self.session().commit(contents, model_content, transcript.len());

        Ok(parsed.into_turn())
    }

    fn rewind(&self, transcript_len: usize) {
        self.session().rewind(transcript_len);
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

/// Client-side chat state: what has been sent so far.
#[derive(Debug, Default)]
struct ChatSession {
    contents: Vec<Value>,
    /// Transcript messages already reflected in `contents`
    synced: usize,
    /// `(synced, contents.len())` after seeding and every committed round
    checkpoints: Vec<(usize, usize)>,
}

impl ChatSession {
    /// Everything sent so far plus the unsent transcript tail.
    fn request_contents(&mut self, transcript: &[Message]) -> Vec<Value> {
        if transcript.len() < self.synced {
            self.rewind(transcript.len());
        }
        let mut contents = self.contents.clone();
        contents.extend(pending_contents(transcript, self.synced));
        contents
    }

    fn seed(&mut self, history: &[Message]) {
        self.contents = history
            .iter()
            .filter_map(|m| match m.role {
                Role::User => Some(text_content("user", &m.content)),
                Role::Assistant => Some(text_content("model", &m.content)),
                Role::Tool => None,
            })
            .collect();
        self.synced = history.len();
        self.checkpoints = vec![(self.synced, self.contents.len())];
    }

    /// Record a successful round. `transcript_len` is the transcript the
    /// request was built from; the assistant message appended for this
    /// answer is counted as synced too.
    fn commit(&mut self, mut contents: Vec<Value>, model_content: Value, transcript_len: usize) {
        contents.push(model_content);
        self.contents = contents;
        self.synced = transcript_len + 1;
        self.checkpoints.push((self.synced, self.contents.len()));
    }

    fn rewind(&mut self, transcript_len: usize) {
        while matches!(self.checkpoints.last(), Some(&(synced, _)) if synced > transcript_len) {
            self.checkpoints.pop();
        }
        let (synced, len) = self.checkpoints.last().copied().unwrap_or((0, 0));
        self.contents.truncate(len);
        self.synced = synced;
    }
}

fn text_content(role: &str, text: &str) -> Value {
    json!({"role": role, "parts": [{"text": text}]})
}

/// Convert the transcript tail past `synced` into Gemini contents.
///
/// Consecutive tool results are merged into one content so that all
/// responses to a batch of function calls travel together.
fn pending_contents(transcript: &[Message], synced: usize) -> Vec<Value> {
    let mut contents: Vec<Value> = Vec::new();
    let mut last_was_tool = false;

    for message in transcript.iter().skip(synced) {
        match message.role {
            Role::User => {
                contents.push(text_content("user", &message.content));
                last_was_tool = false;
            }
            Role::Assistant => {
                contents.push(model_content_for(message));
                last_was_tool = false;
            }
            Role::Tool => {
                let name = message
                    .tool_call_id
                    .as_deref()
                    .and_then(|id| tool_name_for(transcript, id))
                    .unwrap_or("unknown");
                let part = json!({
                    "functionResponse": {
                        "name": name,
                        "response": {"result": message.content}
                    }
                });

                match contents.last_mut() {
                    Some(last) if last_was_tool => {
                        if let Some(parts) = last["parts"].as_array_mut() {
                            parts.push(part);
                        }
                    }
                    _ => contents.push(json!({"role": "user", "parts": [part]})),
                }
                last_was_tool = true;
            }
        }
    }

    contents
}

/// Model content for an assistant message the backend never produced.
fn model_content_for(message: &Message) -> Value {
    let mut parts: Vec<Value> = Vec::new();
    if !message.content.is_empty() {
        parts.push(json!({"text": message.content}));
    }
    parts.extend(message.calls().iter().map(|call| {
        json!({"functionCall": {"name": call.name, "args": call.arguments}})
    }));
    json!({"role": "model", "parts": parts})
}

fn tool_name_for<'a>(transcript: &'a [Message], call_id: &str) -> Option<&'a str> {
    transcript
        .iter()
        .rev()
        .flat_map(|m| m.calls())
        .find(|c| c.id == call_id)
        .map(|c| c.name.as_str())
}
