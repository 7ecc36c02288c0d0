//! Conduit - chat bridge between LLM backends and MCP tool servers
//!
//! This library provides the tool-calling orchestration loop, provider
//! adapters for Gemini and OpenAI-compatible backends, an MCP stdio client
//! and a flat transcript store.

pub mod agent;
pub mod history;
pub mod mcp;
pub mod tools;
pub mod adapters;
pub mod config;
pub mod error;
pub mod ui;

pub use error::{Error, Result};
