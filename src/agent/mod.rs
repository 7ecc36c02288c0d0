//! Agent module: core agent logic.
//!
//! This module contains:
//! - Message types (Message, ToolCallRequest, ToolCallResult, Response)
//! - LLM client trait and implementations
//! - Session state (transcript, tool connection, store)
//! - Agent loop for processing one user turn
//!
//! # Adding a New LLM Provider
//!
//! See [`llm::ProviderRegistry`] for instructions.

mod loop_impl;
mod message;
mod session;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use llm::{GeminiClient, LlmClient, LlmResponse, ModelTurn, OpenAiClient, ProviderRegistry, Usage};
pub use loop_impl::{AgentLoop, TurnState};
pub use message::{Arguments, Message, Response, Role, ToolCallRequest, ToolCallResult};
pub use session::Session;
