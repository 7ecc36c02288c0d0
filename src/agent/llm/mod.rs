//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable LLM providers
//! - [`ModelTurn`], the one shape every provider's answer is normalized to
//! - [`ProviderRegistry`] for dynamic provider creation
//! - Concrete implementations: Gemini (native tool calling, stateful chat
//!   session) and OpenAI-compatible chat completions (stateless)
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `anthropic.rs`)
//! 2. Implement `LlmClient` trait
//! 3. Add to `ProviderRegistry::create()`
//! 4. Add config fields in `config.rs`

mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::tools::{CatalogFormat, ToolDeclarations};
use crate::Result;

pub use types::*;

pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use super::message::{Message, ToolCallRequest};

/// What one model round produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    FinalAnswer(String),
    /// Never empty. Every call must be answered before the next round.
    ToolCallBatch(Vec<ToolCallRequest>),
}

/// Response from an LLM provider, before normalization.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Text content of the response.
    pub content: Option<String>,

    /// Tool calls requested by the LLM.
    pub tool_calls: Vec<ToolCallRequest>,

    /// Reason the response finished.
    pub finish_reason: String,

    /// Token usage statistics.
    pub usage: Usage,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    /// Check if response has tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Collapse into a [`ModelTurn`]. Tool calls win over text.
    pub fn into_turn(self) -> ModelTurn {
        if self.has_tool_calls() {
            ModelTurn::ToolCallBatch(self.tool_calls)
        } else {
            ModelTurn::FinalAnswer(self.content.unwrap_or_default())
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// LLM client trait, one implementation per provider.
///
/// The orchestration loop always hands over the full in-memory transcript.
/// Stateless providers resend all of it; stateful ones forward only what
/// they haven't seen yet.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Declaration format this provider expects for the tool catalog.
    fn catalog_format(&self) -> CatalogFormat;

    /// Prime the provider with the persisted history at session start.
    fn seed(&self, _history: &[Message]) {}

    /// One backend round-trip.
    async fn complete(&self, transcript: &[Message], tools: &ToolDeclarations) -> Result<ModelTurn>;

    /// Forget everything past `transcript_len` messages. Called after the
    /// loop discards a failed or cancelled turn.
    fn rewind(&self, _transcript_len: usize) {}

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;
}

#[async_trait]
impl<C: LlmClient + ?Sized> LlmClient for Box<C> {
    fn catalog_format(&self) -> CatalogFormat {
        (**self).catalog_format()
    }

    fn seed(&self, history: &[Message]) {
        (**self).seed(history)
    }

    async fn complete(&self, transcript: &[Message], tools: &ToolDeclarations) -> Result<ModelTurn> {
        (**self).complete(transcript, tools).await
    }

    fn rewind(&self, transcript_len: usize) {
        (**self).rewind(transcript_len)
    }

    fn default_model(&self) -> &str {
        (**self).default_model()
    }
}

/// Provider registry, creates LLM clients from config.
///
/// # Example
///
/// ```ignore
/// let client = ProviderRegistry::create(&config)?;
/// let turn = client.complete(&transcript, &declarations).await?;
/// ```
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Create an LLM client from configuration.
    ///
    /// Supported providers:
    /// - `"gemini"`: Gemini API with API key authentication
    /// - `"openai"`: any OpenAI-compatible chat completions endpoint
    pub fn create(config: &Config) -> Result<Box<dyn LlmClient>> {
        match config.provider.as_str() {
            "gemini" => {
                if config.gemini_api_key.is_empty() {
                    return Err(Error::Config(
                        "Gemini API key not set. Set GOOGLE_API_KEY or run 'conduit onboard'.".to_string(),
                    ));
                }
                let client = GeminiClient::new(&config.gemini_api_key, &config.model)
                    .with_temperature(config.temperature)
                    .with_system_prompt(config.system_prompt.clone());
                Ok(Box::new(client))
            }
            "openai" => {
                if config.openai.api_key.is_empty() {
                    return Err(Error::Config(
                        "OpenAI API key not set. Set OPENAI_API_KEY or run 'conduit onboard'.".to_string(),
                    ));
                }
                let client = OpenAiClient::new(&config.openai.api_key, &config.model)
                    .with_base_url(&config.openai.base_url)
                    .with_tool_choice(&config.openai.tool_choice)
                    .with_temperature(config.temperature)
                    .with_system_prompt(config.system_prompt.clone());
                Ok(Box::new(client))
            }
            other => Err(Error::Config(format!(
                "Unknown provider: {other} (available: {})",
                Self::available().join(", ")
            ))),
        }
    }

    /// List available provider names.
    pub fn available() -> &'static [&'static str] {
        &["gemini", "openai"]
    }
}

/// Scripted LLM client for testing.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<ModelTurn>>>,
    /// Returned once the script runs dry
    fallback: Option<ModelTurn>,
    /// Transcript seen by every `complete` call
    pub seen: std::sync::Mutex<Vec<Vec<Message>>>,
    pub seeded: std::sync::Mutex<Vec<Message>>,
    pub rewinds: std::sync::Mutex<Vec<usize>>,
}

#[cfg(test)]
impl FakeLlmClient {
    pub fn script(responses: Vec<Result<ModelTurn>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            fallback: None,
            seen: std::sync::Mutex::new(Vec::new()),
            seeded: std::sync::Mutex::new(Vec::new()),
            rewinds: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create with predefined text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::script(
            responses
                .iter()
                .map(|s| Ok(ModelTurn::FinalAnswer(s.to_string())))
                .collect(),
        )
    }

    /// Create with a single tool call followed by a text response.
    pub fn with_tool_call(name: &str, args: serde_json::Value, final_response: &str) -> Self {
        Self::script(vec![
            Ok(ModelTurn::ToolCallBatch(vec![ToolCallRequest::from_value("tc_1", name, args)])),
            Ok(ModelTurn::FinalAnswer(final_response.to_string())),
        ])
    }

    /// Answer every call with the same tool call.
    pub fn always_tool_call(name: &str) -> Self {
        let mut client = Self::script(vec![]);
        client.fallback = Some(ModelTurn::ToolCallBatch(vec![ToolCallRequest::from_value(
            "tc_loop",
            name,
            serde_json::json!({}),
        )]));
        client
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    fn catalog_format(&self) -> CatalogFormat {
        CatalogFormat::OpenAi
    }

    fn seed(&self, history: &[Message]) {
        *self.seeded.lock().unwrap() = history.to_vec();
    }

    async fn complete(&self, transcript: &[Message], _tools: &ToolDeclarations) -> Result<ModelTurn> {
        self.seen.lock().unwrap().push(transcript.to_vec());
        let mut responses = self.responses.lock().unwrap();
        match responses.pop_front() {
            Some(response) => response,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| Error::Backend("No more fake responses".to_string())),
        }
    }

    fn rewind(&self, transcript_len: usize) {
        self.rewinds.lock().unwrap().push(transcript_len);
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::build_declarations;

    #[tokio::test]
    async fn test_fake_llm_client() {
        let client = FakeLlmClient::new(vec!["Hello!", "World!"]);
        let tools = build_declarations(CatalogFormat::OpenAi, &[]);

        let resp1 = client.complete(&[], &tools).await.unwrap();
        assert_eq!(resp1, ModelTurn::FinalAnswer("Hello!".to_string()));

        let resp2 = client.complete(&[], &tools).await.unwrap();
        assert_eq!(resp2, ModelTurn::FinalAnswer("World!".to_string()));

        assert!(client.complete(&[], &tools).await.is_err());
    }

    #[test]
    fn test_response_into_turn() {
        assert_eq!(
            LlmResponse::text("hi").into_turn(),
            ModelTurn::FinalAnswer("hi".to_string())
        );

        let mut response = LlmResponse::text("let me check");
        response.tool_calls.push(ToolCallRequest::from_value(
            "c1",
            "get_battery_status",
            serde_json::json!({}),
        ));
        assert!(matches!(response.into_turn(), ModelTurn::ToolCallBatch(calls) if calls.len() == 1));

        let empty = LlmResponse {
            content: None,
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        };
        assert_eq!(empty.into_turn(), ModelTurn::FinalAnswer(String::new()));
    }

    #[test]
    fn test_registry_rejects_unknown_and_keyless() {
        let mut config = Config::default();
        config.gemini_api_key.clear();
        assert!(matches!(ProviderRegistry::create(&config), Err(Error::Config(_))));

        config.provider = "llama-farm".to_string();
        let err = ProviderRegistry::create(&config).err().unwrap();
        assert!(err.to_string().contains("available: gemini, openai"));

        config.provider = "openai".to_string();
        config.openai.api_key = "sk-test".to_string();
        let client = ProviderRegistry::create(&config).unwrap();
        assert_eq!(client.catalog_format(), CatalogFormat::OpenAi);
    }
}
