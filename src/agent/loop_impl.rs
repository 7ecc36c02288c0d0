//! Agent loop - the tool-calling state machine for one user turn

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::history::TranscriptStore;
use crate::tools::ToolProvider;
use crate::Result;

use super::llm::{LlmClient, ModelTurn};
use super::message::{Message, Response, Role, ToolCallRequest};
use super::session::Session;

/// Where the loop is within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingUserInput,
    AwaitingModel,
    ExecutingTools,
    Done,
}

/// The agent loop drives model rounds and tool execution until the model
/// produces a final answer.
pub struct AgentLoop<C: LlmClient> {
    client: C,
    max_rounds: Option<usize>,
}

impl<C: LlmClient> AgentLoop<C> {
    /// Create a new agent loop. `max_rounds` caps model rounds per turn;
    /// `None` lets the model call tools for as long as it wants.
    pub fn new(client: C, max_rounds: Option<usize>) -> Self {
        Self { client, max_rounds }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn max_rounds(&self) -> Option<usize> {
        self.max_rounds
    }

    /// Start a session for this loop's provider.
    pub async fn start_session(
        &self,
        provider: Arc<dyn ToolProvider>,
        store: Box<dyn TranscriptStore>,
    ) -> Result<Session> {
        Session::start(&self.client, provider, store).await
    }

    /// Run one user turn to completion.
    ///
    /// On a backend error the transcript is rolled back to where it was
    /// before the turn and nothing is persisted, so the user can retry.
    pub async fn run_turn(&self, session: &mut Session, input: &str) -> Result<Response> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::EmptyInput);
        }

        let checkpoint = session.len();
        let mut state = TurnState::AwaitingUserInput;
        session.push(Message::user(input));
        info!("Starting turn with message: {}", input);

        let mut rounds = 0;
        let mut tool_calls = 0;

        loop {
            if let Some(max) = self.max_rounds {
                if rounds >= max {
                    warn!("Round cap of {} reached, ending turn", max);
                    let content =
                        format!("Stopped after {max} tool-calling rounds without a final answer.");
                    return Ok(self.finish(session, input, content, rounds, tool_calls, true));
                }
            }

            transition(&mut state, TurnState::AwaitingModel);
            rounds += 1;
            debug!("Round {}", rounds);

            let turn = match self.client.complete(session.transcript(), session.declarations()).await {
                Ok(turn) => turn,
                Err(e) => {
                    warn!("Model call failed in round {}: {}", rounds, e);
                    self.abort_turn(session, checkpoint);
                    return Err(match e {
                        Error::Backend(_) => e,
                        other => Error::Backend(other.to_string()),
                    });
                }
            };

            match turn {
                ModelTurn::FinalAnswer(content) => {
                    transition(&mut state, TurnState::Done);
                    info!("Turn completed with response: {} chars", content.len());
                    return Ok(self.finish(session, input, content, rounds, tool_calls, false));
                }
                ModelTurn::ToolCallBatch(calls) => {
                    transition(&mut state, TurnState::ExecutingTools);
                    tool_calls += calls.len();
                    self.execute_batch(session, calls).await;
                }
            }
        }
    }

    /// Discard an unfinished turn, leaving the transcript at `checkpoint`.
    pub fn abort_turn(&self, session: &mut Session, checkpoint: usize) {
        session.truncate(checkpoint);
        self.client.rewind(checkpoint);
    }

    /// Run every call in request order. One failing call never stops the
    /// rest of the batch.
    async fn execute_batch(&self, session: &mut Session, calls: Vec<ToolCallRequest>) {
        session.push(Message::assistant_with_tools("", calls.clone()));

        for call in &calls {
            info!("Calling tool: {} with args: {:?}", call.name, call.arguments);
            let result = session.executor().dispatch(call).await;
            if result.is_error {
                debug!("Tool {} returned error: {}", call.name, result.output);
            } else {
                debug!("Tool {} result: {}", call.name, result.output);
            }
            session.push(Message::tool_result(result.call_id, result.output));
        }
    }

    fn finish(
        &self,
        session: &mut Session,
        input: &str,
        content: String,
        rounds: usize,
        tool_calls: usize,
        truncated: bool,
    ) -> Response {
        session.push(Message::assistant(content.clone()));
        session.persist(Role::User, input);
        session.persist(Role::Assistant, &content);

        Response {
            content,
            rounds,
            tool_calls,
            truncated,
        }
    }
}

fn transition(state: &mut TurnState, next: TurnState) {
    debug!("{:?} -> {:?}", state, next);
    *state = next;
}
