//! Conduit CLI entry point

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use conduit::agent::{AgentLoop, LlmClient, ProviderRegistry};
use conduit::adapters::CliChannel;
use conduit::config::Config;
use conduit::history::{FileTranscriptStore, TranscriptStore};
use conduit::tools::ToolProvider;
use conduit::ui;

#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "Chat with an LLM that can call tools on an MCP server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (default)
    Chat {
        /// Send one message and exit
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Create or update ~/.conduit/config.json
    Onboard,

    /// Connect to the tool server and list its tools
    Tools,

    /// Print the persisted conversation
    History,

    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with the conversation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Chat { message: None }) {
        Commands::Chat { message } => {
            let config = conduit::config::load_or_default()?;
            run_chat(&config, message.as_deref()).await?;
        }

        Commands::Onboard => {
            conduit::config::onboard()?;
        }

        Commands::Tools => {
            let config = conduit::config::load_or_default()?;
            let tools = connect_tools(&config).await?;
            let definitions = tools.list_tools().await?;

            ui::print_success(&format!("{} tools available", definitions.len()));
            for tool in definitions {
                ui::print_step(&format!("{}: {}", tool.name, tool.description.trim()));
            }
            tools.shutdown().await?;
        }

        Commands::History => {
            let config = conduit::config::load_or_default()?;
            let store = FileTranscriptStore::new(&config.history_file);
            let messages = store.load()?;
            if messages.is_empty() {
                ui::print_step(&format!("No history at {:?}", store.path()));
            }
            for message in messages {
                let tag = match message.role {
                    conduit::agent::Role::User => "You",
                    _ => "AI",
                };
                println!("{}: {}", tag, message.content);
            }
        }

        Commands::Status => {
            let config = conduit::config::load_or_default()?;
            println!("conduit status\n");
            println!("Config: {:?}", conduit::config::config_path());
            println!("Provider: {}", config.provider);
            println!("Model: {}", config.model);
            println!("Tool server: {} {}", config.server.command, config.server.args.join(" "));
            println!("History: {:?}", config.history_file);
            match config.max_rounds {
                Some(max) => println!("Max rounds per turn: {}", max),
                None => println!("Max rounds per turn: unlimited"),
            }

            match config.provider.as_str() {
                "gemini" => {
                    println!("Gemini API key: {}", if config.gemini_api_key.is_empty() { "not set" } else { "✓" });
                }
                "openai" => {
                    println!("Base URL: {}", config.openai.base_url);
                    println!("API key: {}", if config.openai.api_key.is_empty() { "not set" } else { "✓" });
                }
                other => {
                    println!("Unknown provider: {}", other);
                }
            }
        }
    }

    Ok(())
}

async fn connect_tools(config: &Config) -> Result<Arc<dyn ToolProvider>> {
    ui::print_thinking(&format!(
        "Connecting to tool server `{} {}`",
        config.server.command,
        config.server.args.join(" ")
    ));
    let client = conduit::mcp::connect_stdio(&config.server)
        .await
        .context("Failed to connect to tool server")?;
    Ok(Arc::new(client))
}

async fn run_chat(config: &Config, message: Option<&str>) -> Result<()> {
    let client = ProviderRegistry::create(config)?;
    let tools = connect_tools(config).await?;
    let store: Box<dyn TranscriptStore> = Box::new(FileTranscriptStore::new(&config.history_file));

    let agent = AgentLoop::new(client, config.max_rounds);
    let session = agent.start_session(tools, store).await?;
    ui::print_success(&format!(
        "Connected! Tools: {}",
        session.executor().tool_names().join(", ")
    ));
    if !session.is_empty() {
        ui::print_step(&format!("Loaded {} messages of history", session.len()));
    }

    ui::print_header(agent.client().default_model(), &config.provider);
    let mut cli = CliChannel::new(agent, session);

    let outcome = match message {
        Some(msg) => cli.run_once(msg).await.map(|response| ui::print_answer(&response.content)),
        None => cli.run_interactive().await,
    };
    cli.session().close().await;

    Ok(outcome?)
}
