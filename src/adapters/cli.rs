//! CLI adapter for interactive and single-message use.

use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::agent::{AgentLoop, LlmClient, Response, Session};
use crate::error::Error;
use crate::ui;
use crate::Result;

/// Reserved inputs that end the session
pub fn is_exit_command(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "exit" | "quit")
}

/// CLI channel for interactive agent sessions.
pub struct CliChannel<C: LlmClient> {
    agent: AgentLoop<C>,
    session: Session,
}

impl<C: LlmClient> CliChannel<C> {
    /// Create a new CLI channel.
    pub fn new(agent: AgentLoop<C>, session: Session) -> Self {
        Self { agent, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run a single message and return the response.
    pub async fn run_once(&mut self, message: &str) -> Result<Response> {
        self.agent.run_turn(&mut self.session, message).await
    }

    /// Run interactive REPL loop until `quit`, EOF or Ctrl+C at the prompt.
    pub async fn run_interactive(&mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = io::stdout();

        println!("\n--- Start chatting (type 'quit' to exit) ---\n");

        loop {
            ui::print_user_prompt();
            stdout.flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            };

            // EOF
            let Some(line) = line else {
                println!();
                break;
            };

            let input = line.trim();
            if is_exit_command(input) {
                break;
            }
            if input.is_empty() {
                continue;
            }

            self.run_interruptible(input).await;
        }

        info!("Session ended with {} messages in memory", self.session.len());
        println!("Bye!");
        Ok(())
    }

    /// Run one turn; Ctrl+C discards it and restores the transcript.
    async fn run_interruptible(&mut self, input: &str) {
        let checkpoint = self.session.len();
        let spinner = ui::spinner("Thinking");

        let outcome = tokio::select! {
            result = self.agent.run_turn(&mut self.session, input) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };
        spinner.finish_and_clear();

        match outcome {
            Some(Ok(response)) => {
                ui::print_answer(&response.content);
                if response.truncated {
                    ui::print_warning("Turn stopped at the round limit");
                }
            }
            Some(Err(Error::EmptyInput)) => {}
            Some(Err(e)) => {
                ui::print_error(&e.to_string());
                ui::print_step("Your message was not saved; send it again to retry.");
            }
            None => {
                self.agent.abort_turn(&mut self.session, checkpoint);
                ui::print_warning("Turn cancelled");
            }
        }
    }
}
