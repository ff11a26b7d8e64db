//! Client runtime: EventSource consumption plus POST orchestration
//!
//! Owns the accumulating [`AgentState`] behind a `watch` channel. The first
//! `send_message` creates the session and starts a background reader on the
//! SSE endpoint; each decoded event is folded into the state, and watchers
//! are notified per change. Snapshots are `Arc`s, referentially stable
//! until the next event lands.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::reduce::AgentState;
use crate::error::{Error, Result};
use crate::protocol::{decode_event, PermissionBehavior};

/// Browser-equivalent consumer of the relay's HTTP surface.
pub struct ClientRuntime {
    base_url: String,
    http: reqwest::Client,
    session_id: Mutex<Option<String>>,
    state: watch::Sender<Arc<AgentState>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ClientRuntime {
    pub fn new(base_url: impl Into<String>) -> Self {
        let (state, _) = watch::channel(Arc::new(AgentState::default()));
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            session_id: Mutex::new(None),
            state,
            reader: Mutex::new(None),
        }
    }

    /// Send a user turn.
    ///
    /// Without a session yet: create one and connect to its event stream.
    /// With one: push onto the existing session.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let existing = self
            .session_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        match existing {
            Some(id) => {
                self.http
                    .post(format!("{}/sessions/{id}/messages", self.base_url))
                    .json(&json!({"message": text}))
                    .send()
                    .await?
                    .error_for_status()?;
            }
            None => {
                let created: Value = self
                    .http
                    .post(format!("{}/sessions", self.base_url))
                    .json(&json!({"message": text}))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                let id = created["sessionId"]
                    .as_str()
                    .ok_or_else(|| Error::Protocol("create response missing sessionId".into()))?
                    .to_string();

                *self
                    .session_id
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = Some(id.clone());
                self.connect(&id);
            }
        }
        Ok(())
    }

    /// Start the background SSE reader for a session.
    fn connect(&self, session_id: &str) {
        let url = format!("{}/sessions/{session_id}/events", self.base_url);
        let http = self.http.clone();
        let state = self.state.clone();

        let handle = tokio::spawn(async move {
            // Transport failures disconnect silently, matching EventSource
            // error handling on the browser side.
            let Ok(response) = http.get(&url).send().await else {
                return;
            };
            let Ok(response) = response.error_for_status() else {
                return;
            };

            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            'read: while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(boundary) = buffer.find("\n\n") {
                    let frame: String = buffer.drain(..boundary + 2).collect();
                    for line in frame.lines() {
                        let line = line.trim();
                        if line.is_empty() || !line.starts_with("data: ") {
                            continue;
                        }
                        match decode_event(line) {
                            Ok(Some(event)) => {
                                state.send_modify(|s| Arc::make_mut(s).apply(&event));
                            }
                            Ok(None) => break 'read,
                            Err(e) => {
                                tracing::warn!("Dropping undecodable event: {e}");
                            }
                        }
                    }
                }
            }
        });

        let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = reader.replace(handle) {
            previous.abort();
        }
    }

    /// Current state snapshot; stable until the next event is folded.
    pub fn snapshot(&self) -> Arc<AgentState> {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AgentState>> {
        self.state.subscribe()
    }

    /// Resolve a pending permission on the active session.
    pub async fn respond_to_permission(
        &self,
        id: &str,
        behavior: PermissionBehavior,
        updated_input: Option<Value>,
    ) -> Result<()> {
        self.respond(json!({
            "kind": "permission",
            "id": id,
            "behavior": behavior,
            "updatedInput": updated_input,
        }))
        .await
    }

    /// Answer a pending question on the active session.
    pub async fn respond_to_question(&self, id: &str, answer: &str) -> Result<()> {
        self.respond(json!({
            "kind": "question",
            "id": id,
            "answer": answer,
        }))
        .await
    }

    async fn respond(&self, body: Value) -> Result<()> {
        let session_id = self
            .session_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| Error::InvalidRequest("no active session".into()))?;

        self.http
            .post(format!("{}/sessions/{session_id}/respond", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Stop consuming events. State stops changing; snapshots keep working.
    pub fn destroy(&self) {
        if let Some(handle) = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for ClientRuntime {
    fn drop(&mut self) {
        self.destroy();
    }
}
