//! Session lifecycle: one engine invocation, two push channels, a
//! translator, and a permission gate
//!
//! A session multiplexes user turns (input channel) and normalized events
//! (output channel) against a single long-running engine invocation. A
//! background driver task folds engine messages through the translator and
//! pushes the results contiguously onto the output channel; the gate writes
//! the same channel out-of-band. The SSE subscriber is the output channel's
//! single consumer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::channel::{push_channel, PushReceiver, PushSender};
use crate::engine::{user_message, Engine, EngineControl, EngineMessage, EngineQuery};
use crate::error::{Error, Result};
use crate::gate::PermissionGate;
use crate::protocol::AgentEvent;
use crate::translate::Translator;

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A live conversation bound to one engine invocation.
pub struct Session {
    id: String,
    created_at: u64,
    input: PushSender<EngineMessage>,
    output: PushSender<AgentEvent>,
    /// Receiver half of the output channel, claimed once by the SSE
    /// subscriber.
    events: Mutex<Option<PushReceiver<AgentEvent>>>,
    gate: Arc<PermissionGate>,
    control: Arc<dyn EngineControl>,
    aborted: Arc<AtomicBool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Start a session: wire the channels, invoke the engine, push the
    /// initial user turn, and spawn the driver task.
    pub fn spawn(engine: &dyn Engine, initial_prompt: &str) -> Result<Arc<Self>> {
        let id = uuid::Uuid::new_v4().to_string();

        let (input_tx, input_rx) = push_channel();
        let (output_tx, output_rx) = push_channel();
        let gate = Arc::new(PermissionGate::new(output_tx.clone()));

        let invocation = engine.query(EngineQuery {
            prompt: input_rx,
            permissions: gate.clone(),
        })?;

        input_tx.push(user_message(initial_prompt));

        let aborted = Arc::new(AtomicBool::new(false));
        let driver = tokio::spawn(drive(
            id.clone(),
            invocation.messages,
            output_tx.clone(),
            aborted.clone(),
        ));

        tracing::info!(session_id = %id, "Session started");
        Ok(Arc::new(Self {
            id,
            created_at: unix_now(),
            input: input_tx,
            output: output_tx,
            events: Mutex::new(Some(output_rx)),
            gate,
            control: invocation.control,
            aborted,
            driver: Mutex::new(Some(driver)),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Whether the driver task is still consuming engine output.
    pub fn is_running(&self) -> bool {
        self.driver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Claim the session's event stream.
    ///
    /// The output channel has a single consumer: the first subscriber takes
    /// the receiver and later subscribers get [`Error::StreamTaken`]. A
    /// subscriber connecting after a disconnect would only observe events
    /// not yet drained; the session itself keeps running either way.
    pub fn events(&self) -> Result<PushReceiver<AgentEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| Error::StreamTaken(self.id.clone()))
    }

    /// Queue a follow-up user turn for the engine.
    pub fn push_message(&self, text: &str) {
        self.input.push(user_message(text));
    }

    /// The session's permission gate, for the respond endpoint.
    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    /// Stop the current generation without ending the session.
    pub async fn interrupt(&self) {
        self.control.interrupt().await;
    }

    /// Tear the session down: close both channels and abort the engine.
    ///
    /// The SSE subscriber observes end-of-stream and finishes with `[DONE]`.
    /// Pending permissions and questions never resolve; their holder (the
    /// engine) is gone.
    pub async fn abort(&self) {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(session_id = %self.id, "Session aborted");
        self.input.close();
        self.output.close();
        self.control.abort().await;
    }
}

/// Driver: fold engine messages into events until the engine finishes, the
/// session aborts, or the engine fails.
async fn drive(
    session_id: String,
    mut messages: tokio::sync::mpsc::Receiver<Result<EngineMessage>>,
    output: PushSender<AgentEvent>,
    aborted: Arc<AtomicBool>,
) {
    let mut translator = Translator::new();

    while let Some(item) = messages.recv().await {
        if aborted.load(Ordering::SeqCst) {
            break;
        }
        match item {
            Ok(message) => {
                for event in translator.translate(&message) {
                    output.push(event);
                }
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, "Engine failed: {e}");
                output.push(AgentEvent::Error {
                    message: e.to_string(),
                });
                break;
            }
        }
    }

    output.close();
    tracing::debug!(session_id = %session_id, "Session driver finished");
}

/// Summary row for the session listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: u64,
    pub is_running: bool,
}

/// Registry of live sessions, shared with every HTTP handler.
pub struct SessionManager {
    engine: Arc<dyn Engine>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create and register a session seeded with the initial prompt.
    pub async fn create(&self, initial_prompt: &str) -> Result<Arc<Session>> {
        let session = Session::spawn(self.engine.as_ref(), initial_prompt)?;
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), session.clone());
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Abort a session and drop it from the registry.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        session.abort().await;
        Ok(())
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| SessionInfo {
                session_id: s.id().to_string(),
                created_at: s.created_at(),
                is_running: s.is_running(),
            })
            .collect()
    }

    /// Abort every session; used on graceful shutdown so subscribers drain
    /// `[DONE]` before the process exits.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        for (_, session) in sessions {
            session.abort().await;
        }
    }
}
