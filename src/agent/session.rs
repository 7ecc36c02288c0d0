//! Session state for one conversation.

use std::sync::Arc;

use tracing::{info, warn};

use crate::history::TranscriptStore;
use crate::tools::{build_declarations, ToolDeclarations, ToolExecutor, ToolProvider};
use crate::Result;

use super::llm::LlmClient;
use super::message::{Message, Role};

/// A session owns the in-memory transcript, the tool connection and the
/// transcript store. Nothing here is shared with other sessions.
pub struct Session {
    transcript: Vec<Message>,
    executor: ToolExecutor,
    declarations: ToolDeclarations,
    store: Box<dyn TranscriptStore>,
}

impl Session {
    /// Connect to the tool provider, build the tool catalog and load the
    /// persisted transcript.
    ///
    /// Fails only when the tool catalog can't be fetched. An unreadable
    /// history starts the session empty.
    pub async fn start<C: LlmClient + ?Sized>(
        client: &C,
        provider: Arc<dyn ToolProvider>,
        store: Box<dyn TranscriptStore>,
    ) -> Result<Self> {
        let executor = ToolExecutor::connect(provider).await?;
        let declarations = build_declarations(client.catalog_format(), executor.definitions());
        info!("Available tools: {:?}", executor.tool_names());

        let transcript = match store.load() {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Error loading history, starting fresh: {}", e);
                Vec::new()
            }
        };
        info!("Loaded {} messages of history", transcript.len());
        client.seed(&transcript);

        Ok(Self {
            transcript,
            executor,
            declarations,
            store,
        })
    }

    /// Current in-memory transcript, including transient tool exchanges
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn declarations(&self) -> &ToolDeclarations {
        &self.declarations
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.transcript.push(message);
    }

    /// End the session and shut the tool provider down.
    pub async fn close(&self) {
        match self.executor.shutdown().await {
            Ok(()) => info!("Tool provider closed"),
            Err(e) => warn!("Failed to close tool provider: {}", e),
        }
    }

    /// Drop everything after `checkpoint` messages.
    pub(crate) fn truncate(&mut self, checkpoint: usize) {
        self.transcript.truncate(checkpoint);
    }

    /// Write a completed message to the store. Failures are logged only.
    pub(crate) fn persist(&self, role: Role, text: &str) {
        if let Err(e) = self.store.append(role, text) {
            warn!("Failed to save {:?} message to history: {}", role, e);
        }
    }
}
