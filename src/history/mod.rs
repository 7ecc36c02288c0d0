//! History module - durable conversation transcript
//!
//! The persisted form is deliberately flat: one line per completed user or
//! assistant message, tagged with the speaker.
//!
//! ```text
//! User: What's the weather in Paris?
//! AI: It's sunny in Paris.
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::Utf8Error;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::agent::{Message, Role};
use crate::error::Error;
use crate::Result;

const USER_TAG: &str = "User: ";
const ASSISTANT_TAG: &str = "AI: ";

/// Transcript store trait - interface for persisted conversation history
pub trait TranscriptStore: Send + Sync {
    /// Read the persisted transcript. Unrecognized lines are skipped.
    fn load(&self) -> Result<Vec<Message>>;

    /// Durably append one completed message
    fn append(&self, role: Role, text: &str) -> Result<()>;
}

/// Render one persisted line. Tool results have no persisted form.
pub fn encode_line(role: Role, text: &str) -> Result<String> {
    let tag = match role {
        Role::User => USER_TAG,
        Role::Assistant => ASSISTANT_TAG,
        Role::Tool => {
            return Err(Error::Persistence(
                "tool results are not persisted".to_string(),
            ))
        }
    };
    Ok(format!("{}{}", tag, collapse_newlines(text)))
}

/// Parse one persisted line
pub fn decode_line(line: &str) -> Option<Message> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(text) = line.strip_prefix(USER_TAG) {
        Some(Message::user(text))
    } else {
        line.strip_prefix(ASSISTANT_TAG).map(Message::assistant)
    }
}

fn collapse_newlines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

fn decode_all<'a>(lines: impl Iterator<Item = std::result::Result<&'a str, Utf8Error>>) -> Vec<Message> {
    let mut messages = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping undecodable history line {}: {}", idx + 1, e);
                continue;
            }
        };
        match decode_line(line) {
            Some(msg) => messages.push(msg),
            None if line.trim().is_empty() => {}
            None => warn!("Skipping unrecognized history line {}", idx + 1),
        }
    }
    messages
}

/// Line-per-message transcript file
pub struct FileTranscriptStore {
    path: PathBuf,
}

impl FileTranscriptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TranscriptStore for FileTranscriptStore {
    fn load(&self) -> Result<Vec<Message>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        // Decoded per line so one corrupt line doesn't cost the whole history
        let content = std::fs::read(&self.path)
            .map_err(|e| Error::Persistence(format!("reading {:?}: {}", self.path, e)))?;
        let messages = decode_all(content.split(|b| *b == b'\n').map(std::str::from_utf8));
        debug!("Loaded {} messages from {:?}", messages.len(), self.path);
        Ok(messages)
    }

    fn append(&self, role: Role, text: &str) -> Result<()> {
        let line = encode_line(role, text)?;

        // Create directory if needed
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::Persistence(format!("opening {:?}: {}", self.path, e)))?;
        writeln!(file, "{line}")?;
        file.flush()?;

        Ok(())
    }
}

/// In-memory store for testing
#[derive(Default)]
pub struct InMemoryTranscriptStore {
    lines: Mutex<Vec<String>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with raw persisted lines
    pub fn with_lines(lines: &[&str]) -> Self {
        Self {
            lines: Mutex::new(lines.iter().map(|l| l.to_string()).collect()),
        }
    }

    /// Raw persisted lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl TranscriptStore for InMemoryTranscriptStore {
    fn load(&self) -> Result<Vec<Message>> {
        let lines = self
            .lines
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(decode_all(lines.iter().map(|line| Ok(line.as_str()))))
    }

    fn append(&self, role: Role, text: &str) -> Result<()> {
        let line = encode_line(role, text)?;
        self.lines
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?
            .push(line);
        Ok(())
    }
}
