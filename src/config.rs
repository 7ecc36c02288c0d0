//! Configuration management

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::llm::openai::OPENAI_API_URL;
use crate::error::Error;
use crate::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM provider to use ("gemini" or "openai")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Gemini API key (used when provider is "gemini")
    #[serde(default)]
    pub gemini_api_key: String,

    /// OpenAI-compatible backend settings (used when provider is "openai")
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Tool server to spawn
    #[serde(default)]
    pub server: ServerConfig,

    /// Persisted transcript file
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,

    /// Maximum model rounds per user turn, `null` for no cap
    #[serde(default = "default_max_rounds")]
    pub max_rounds: Option<usize>,

    /// Optional system instruction sent with every request
    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// `tool_choice` sent with every request ("auto", "required", "none")
    #[serde(default = "default_tool_choice")]
    pub tool_choice: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openai_base_url(),
            tool_choice: default_tool_choice(),
        }
    }
}

/// How to launch the MCP tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_command")]
    pub command: String,

    #[serde(default = "default_server_args")]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_server_command(),
            args: default_server_args(),
            env: HashMap::new(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_history_file() -> PathBuf {
    config_dir().join("chat_history.txt")
}

fn default_max_rounds() -> Option<usize> {
    Some(20)
}

fn default_temperature() -> f32 {
    0.7
}

fn default_openai_base_url() -> String {
    OPENAI_API_URL.to_string()
}

fn default_tool_choice() -> String {
    "auto".to_string()
}

fn default_server_command() -> String {
    "python3".to_string()
}

fn default_server_args() -> Vec<String> {
    vec!["server.py".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            gemini_api_key: String::new(),
            openai: OpenAiConfig::default(),
            server: ServerConfig::default(),
            history_file: default_history_file(),
            max_rounds: default_max_rounds(),
            system_prompt: None,
            temperature: default_temperature(),
        }
    }
}

impl Config {
    /// Fill empty API keys from `GOOGLE_API_KEY` / `OPENAI_API_KEY`.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.gemini_api_key.is_empty() {
            if let Some(key) = lookup("GOOGLE_API_KEY").filter(|k| !k.is_empty()) {
                self.gemini_api_key = key;
            }
        }
        if self.openai.api_key.is_empty() {
            if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
                self.openai.api_key = key;
            }
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".conduit")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file, without environment overrides
pub fn load() -> Result<Config> {
    let path = config_path();

    if !path.exists() {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'conduit onboard' first.",
            path
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Load the config file if there is one, otherwise defaults, then apply
/// environment overrides.
pub fn load_or_default() -> Result<Config> {
    let mut config = if config_path().exists() {
        load()?
    } else {
        debug!("No config at {:?}, using defaults", config_path());
        Config::default()
    };
    config.apply_env();
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    let path = config_path();

    // Create parent directory
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}

/// Interactive setup wizard
pub fn onboard() -> Result<()> {
    use crate::ui;
    use inquire::{Confirm, Select, Text};

    ui::print_header("Setup Wizard", "local");
    println!("  I'll connect a chat model to your MCP tool server.\n");

    let mut config = load().unwrap_or_default();

    // 1. Select Provider
    let providers = vec!["Gemini (native tool calling)", "OpenAI-compatible (function calling)"];
    let provider_choice = Select::new("Choose your AI provider:", providers)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    if provider_choice.starts_with("Gemini") {
        config.provider = "gemini".to_string();
        config.model = default_model();
        config.gemini_api_key = Text::new("Enter your Gemini API Key (blank to use GOOGLE_API_KEY):")
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    } else {
        config.provider = "openai".to_string();
        config.openai.base_url = Text::new("Base URL:")
            .with_default(&config.openai.base_url)
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
        config.model = Text::new("Model:")
            .with_default("gpt-4o-mini")
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
        config.openai.api_key = Text::new("Enter your API Key (blank to use OPENAI_API_KEY):")
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    }

    // 2. Tool server
    let command_line = Text::new("Tool server command:")
        .with_default(&format!("{} {}", config.server.command, config.server.args.join(" ")))
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    let mut words = command_line.split_whitespace().map(str::to_string);
    match words.next() {
        Some(command) => {
            config.server.command = command;
            config.server.args = words.collect();
        }
        None => return Err(Error::Config("Tool server command cannot be empty".to_string())),
    }

    // 3. History
    ui::print_step(&format!("History is kept at {:?}", config.history_file));
    let keep_history = Confirm::new("Use this history file?")
        .with_default(true)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    if !keep_history {
        let new_path = Text::new("Enter history file path:")
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
        config.history_file = PathBuf::from(new_path);
    }

    // 4. Save Config
    ui::print_thinking("Saving configuration");
    save(&config)?;

    println!();
    ui::print_success("Setup complete!");
    ui::print_step("Run 'conduit' to start chatting.");

    Ok(())
}
