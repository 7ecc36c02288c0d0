//! End-to-end turns through the agent loop, an MCP client and a file store.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use conduit::agent::{AgentLoop, LlmClient, Message, ModelTurn, Role, ToolCallRequest};
use conduit::history::{FileTranscriptStore, TranscriptStore};
use conduit::mcp::{ClientInfo, McpClient, Transport};
use conduit::tools::{CatalogFormat, ToolDeclarations};
use conduit::{Error, Result};

/// In-process tool server speaking JSON-RPC. Requests are answered as soon
/// as they are sent.
#[derive(Default)]
struct LocalServer {
    outbox: VecDeque<Value>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl LocalServer {
    fn answer(&self, method: &str, params: &Value) -> std::result::Result<Value, String> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "local", "version": "0.0.1"}
            })),
            "tools/list" => Ok(json!({"tools": [
                {
                    "name": "get_weather",
                    "description": "Returns the weather of the city.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"city": {"type": "string"}},
                        "required": ["city"]
                    }
                },
                {"name": "get_ip", "description": "Returns the public IP."}
            ]})),
            "tools/call" => {
                let name = params["name"].as_str().unwrap_or_default();
                self.calls.lock().unwrap().push(name.to_string());
                match name {
                    "get_weather" => {
                        let city = params["arguments"]["city"].as_str().unwrap_or("nowhere");
                        Ok(json!({"content": [
                            {"type": "text", "text": format!("The weather of {city} is sunny.")}
                        ]}))
                    }
                    _ => Err("lookup service is down".to_string()),
                }
            }
            other => Err(format!("method not found: {other}")),
        }
    }
}

#[async_trait]
impl Transport for LocalServer {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let Some(id) = message.get("id").cloned() else {
            // notifications get no reply
            return Ok(());
        };
        let method = message["method"].as_str().unwrap_or_default().to_string();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        // progress noise ahead of every reply
        self.outbox.push_back(json!({
            "jsonrpc": "2.0",
            "method": "notifications/progress",
            "params": {"progress": 1}
        }));
        let reply = match self.answer(&method, &params) {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(message) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32000, "message": message}
            }),
        };
        self.outbox.push_back(reply);
        Ok(())
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        Ok(self.outbox.pop_front())
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Model that follows a fixed script and records what it was shown.
struct ScriptedModel {
    turns: Mutex<VecDeque<Result<ModelTurn>>>,
    seen: Mutex<Vec<Vec<Message>>>,
    seeded: Mutex<Vec<Message>>,
}

impl ScriptedModel {
    fn new(turns: Vec<Result<ModelTurn>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            seen: Mutex::new(Vec::new()),
            seeded: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedModel {
    fn catalog_format(&self) -> CatalogFormat {
        CatalogFormat::Gemini
    }

    fn seed(&self, history: &[Message]) {
        *self.seeded.lock().unwrap() = history.to_vec();
    }

    async fn complete(&self, transcript: &[Message], tools: &ToolDeclarations) -> Result<ModelTurn> {
        assert_eq!(tools.names(), ["get_weather", "get_ip"]);
        self.seen.lock().unwrap().push(transcript.to_vec());
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Backend("script exhausted".to_string())))
    }

    fn default_model(&self) -> &str {
        "scripted"
    }
}

async fn connect(calls: Arc<Mutex<Vec<String>>>) -> Arc<McpClient<LocalServer>> {
    let server = LocalServer {
        outbox: VecDeque::new(),
        calls,
    };
    let mut client = McpClient::new(server);
    client.initialize(ClientInfo::default()).await.unwrap();
    Arc::new(client)
}

fn weather_call(id: &str, city: &str) -> ToolCallRequest {
    ToolCallRequest::from_value(id, "get_weather", json!({ "city": city }))
}

#[tokio::test]
async fn test_weather_question_persists_two_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat_history.txt");
    let calls = Arc::new(Mutex::new(Vec::new()));

    let model = ScriptedModel::new(vec![
        Ok(ModelTurn::ToolCallBatch(vec![weather_call("call_1", "Paris")])),
        Ok(ModelTurn::FinalAnswer("It's sunny in Paris.".to_string())),
    ]);
    let agent = AgentLoop::new(model, Some(20));
    let mut session = agent
        .start_session(connect(calls.clone()).await, Box::new(FileTranscriptStore::new(&path)))
        .await
        .unwrap();

    let response = agent
        .run_turn(&mut session, "What's the weather in Paris?")
        .await
        .unwrap();

    assert_eq!(response.content, "It's sunny in Paris.");
    assert_eq!(response.rounds, 2);
    assert_eq!(*calls.lock().unwrap(), vec!["get_weather"]);

    let seen = agent.client().seen.lock().unwrap();
    assert_eq!(seen[1][2], Message::tool_result("call_1", "The weather of Paris is sunny."));

    let persisted = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        persisted,
        "User: What's the weather in Paris?\nAI: It's sunny in Paris.\n"
    );
}

#[tokio::test]
async fn test_session_resumes_from_history_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat_history.txt");
    std::fs::write(&path, "User: Hi\nAI: Hello! How can I help?\n").unwrap();

    let model = ScriptedModel::new(vec![Ok(ModelTurn::FinalAnswer(
        "You said hi earlier.".to_string(),
    ))]);
    let agent = AgentLoop::new(model, None);
    let mut session = agent
        .start_session(
            connect(Arc::new(Mutex::new(Vec::new()))).await,
            Box::new(FileTranscriptStore::new(&path)),
        )
        .await
        .unwrap();

    let expected = vec![Message::user("Hi"), Message::assistant("Hello! How can I help?")];
    assert_eq!(session.transcript(), &expected[..]);
    assert_eq!(*agent.client().seeded.lock().unwrap(), expected);

    agent.run_turn(&mut session, "What did I say?").await.unwrap();

    let reloaded = FileTranscriptStore::new(&path).load().unwrap();
    assert_eq!(reloaded.len(), 4);
    assert_eq!(reloaded[2], Message::user("What did I say?"));
    assert_eq!(reloaded[3].role, Role::Assistant);
}

#[tokio::test]
async fn test_failing_tool_is_reported_and_batch_continues() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat_history.txt");
    let calls = Arc::new(Mutex::new(Vec::new()));

    let model = ScriptedModel::new(vec![
        Ok(ModelTurn::ToolCallBatch(vec![
            ToolCallRequest::from_value("call_ip", "get_ip", json!({})),
            weather_call("call_rome", "Rome"),
        ])),
        Ok(ModelTurn::FinalAnswer("Rome is sunny. I couldn't get your IP.".to_string())),
    ]);
    let agent = AgentLoop::new(model, None);
    let mut session = agent
        .start_session(connect(calls.clone()).await, Box::new(FileTranscriptStore::new(&path)))
        .await
        .unwrap();

    let response = agent.run_turn(&mut session, "IP and Rome weather?").await.unwrap();
    assert_eq!(response.tool_calls, 2);
    assert_eq!(*calls.lock().unwrap(), vec!["get_ip", "get_weather"]);

    let transcript = session.transcript();
    assert_eq!(transcript[2].tool_call_id.as_deref(), Some("call_ip"));
    assert!(transcript[2].content.starts_with("Error calling tool: "));
    assert!(transcript[2].content.contains("lookup service is down"));
    assert_eq!(transcript[3].content, "The weather of Rome is sunny.");

    // only the user line and the final answer are durable
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
}

#[tokio::test]
async fn test_backend_failure_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat_history.txt");

    let model = ScriptedModel::new(vec![
        Ok(ModelTurn::ToolCallBatch(vec![weather_call("call_1", "Oslo")])),
        Err(Error::Backend("429 Too Many Requests".to_string())),
    ]);
    let agent = AgentLoop::new(model, None);
    let mut session = agent
        .start_session(
            connect(Arc::new(Mutex::new(Vec::new()))).await,
            Box::new(FileTranscriptStore::new(&path)),
        )
        .await
        .unwrap();

    let err = agent.run_turn(&mut session, "Weather in Oslo?").await.unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
    assert!(err.is_recoverable());
    assert!(session.is_empty());
    assert!(!path.exists());
}

#[test]
fn test_handshake_reports_server_info() {
    let client = tokio_test::block_on(async {
        let mut client = McpClient::new(LocalServer::default());
        client.initialize(ClientInfo::default()).await.unwrap();
        client
    });

    let info = client.server_info().unwrap();
    assert_eq!(info.name, "local");
    assert_eq!(info.version, "0.0.1");
}
