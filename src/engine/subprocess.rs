//! Subprocess engine: NDJSON over stdio
//!
//! Drives a CLI agent engine as a child process. User turns are written to
//! the child's stdin one JSON object per line; engine messages are read the
//! same way from stdout. Tool-gate callbacks arrive as `control_request`
//! lines and are answered with `control_response` lines once the relay's
//! permission gate resolves.

use std::process::Stdio;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

use super::{Engine, EngineControl, EngineInvocation, EngineMessage, EngineQuery};
use crate::error::{Error, Result};
use crate::gate::PermissionContext;

/// Engine backed by a spawned child process speaking NDJSON on stdio.
pub struct SubprocessEngine {
    command: String,
    args: Vec<String>,
}

impl SubprocessEngine {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

impl Engine for SubprocessEngine {
    fn query(&self, query: EngineQuery) -> Result<EngineInvocation> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Engine(format!("failed to spawn engine '{}': {e}", self.command))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Engine("engine child has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Engine("engine child has no stdout".into()))?;

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<StdinCommand>(64);
        let (message_tx, message_rx) = mpsc::channel::<Result<EngineMessage>>(64);

        // Stdin writer: the single point that touches the child's stdin.
        // `Eof` drops the handle so the child observes end of input.
        let mut stdin_writer = stdin;
        tokio::spawn(async move {
            while let Some(command) = stdin_rx.recv().await {
                let line = match command {
                    StdinCommand::Line(line) => line,
                    StdinCommand::Eof => break,
                };
                if stdin_writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin_writer.flush().await.is_err() {
                    break;
                }
            }
        });

        // Prompt pump: forward user turns from the session's input channel.
        // When the input channel closes, signal EOF so the child winds down.
        let prompt_tx = stdin_tx.clone();
        let mut prompt = query.prompt;
        tokio::spawn(async move {
            while let Some(turn) = prompt.recv().await {
                match serde_json::to_string(&turn) {
                    Ok(line) => {
                        if prompt_tx.send(StdinCommand::Line(line + "\n")).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Failed to encode user turn: {e}"),
                }
            }
            let _ = prompt_tx.send(StdinCommand::Eof).await;
        });

        // Stdout reader: engine messages out, permission round-trips inline.
        let gate = query.permissions.clone();
        let response_tx = stdin_tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }

                        let value: Value = match serde_json::from_str(trimmed) {
                            Ok(v) => v,
                            Err(e) => {
                                tracing::warn!("Undecodable engine line: {e}");
                                continue;
                            }
                        };

                        if value["type"] == "control_request" {
                            handle_control_request(&value, &gate, &response_tx);
                            continue;
                        }

                        match serde_json::from_value::<EngineMessage>(value) {
                            Ok(msg) => {
                                if message_tx.send(Ok(msg)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!("Unknown engine message: {e}"),
                        }
                    }
                    Err(e) => {
                        let _ = message_tx
                            .send(Err(Error::Engine(format!("engine stdout read failed: {e}"))))
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(EngineInvocation {
            messages: message_rx,
            control: std::sync::Arc::new(SubprocessControl {
                child: Mutex::new(Some(child)),
                stdin_tx,
            }),
        })
    }
}

/// Answer a `can_use_tool` control request through the permission gate.
///
/// The round-trip runs in its own task: the engine keeps streaming other
/// output while the approval is pending.
fn handle_control_request(
    value: &Value,
    gate: &std::sync::Arc<crate::gate::PermissionGate>,
    stdin_tx: &mpsc::Sender<StdinCommand>,
) {
    let request = &value["request"];
    if request["subtype"] != "can_use_tool" {
        tracing::debug!(subtype = %request["subtype"], "Ignoring control request");
        return;
    }

    let request_id = value["request_id"].clone();
    let tool_name = request["tool_name"].as_str().unwrap_or_default().to_string();
    let input = request["input"].clone();
    let context = PermissionContext {
        tool_use_id: request["tool_use_id"].as_str().map(str::to_string),
        reason: request["reason"].as_str().map(str::to_string),
    };

    let gate = gate.clone();
    let stdin_tx = stdin_tx.clone();
    tokio::spawn(async move {
        let responder = gate.request(&tool_name, input, context).await;
        // Sender dropped means the session was aborted; nothing to answer.
        let Ok(result) = responder.await else { return };

        let response = json!({
            "type": "control_response",
            "response": {
                "request_id": request_id,
                "response": result,
            },
        });
        match serde_json::to_string(&response) {
            Ok(line) => {
                let _ = stdin_tx.send(StdinCommand::Line(line + "\n")).await;
            }
            Err(e) => tracing::warn!("Failed to encode control response: {e}"),
        }
    });
}

/// What the stdin writer task should do next.
enum StdinCommand {
    Line(String),
    Eof,
}

struct SubprocessControl {
    child: Mutex<Option<Child>>,
    stdin_tx: mpsc::Sender<StdinCommand>,
}

#[async_trait::async_trait]
impl EngineControl for SubprocessControl {
    async fn interrupt(&self) {
        let request = json!({
            "type": "control_request",
            "request": {"subtype": "interrupt"},
        });
        if let Ok(line) = serde_json::to_string(&request) {
            let _ = self.stdin_tx.send(StdinCommand::Line(line + "\n")).await;
        }
    }

    async fn abort(&self) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            let _ = child.kill().await;
        }
    }
}
