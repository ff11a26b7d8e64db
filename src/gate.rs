//! Permission gate: deferred resolution for tool approvals and questions
//!
//! The engine's tool-gate callback runs inside the engine's own task and must
//! suspend until the user answers out-of-band over HTTP. The gate bridges
//! that gap: `request` registers a oneshot responder and emits a
//! `permission_request` event onto the session's output stream; `resolve`
//! (called from the router) removes the registration, emits
//! `permission_resolved`, and completes the oneshot the engine is awaiting.
//! Questions follow the same shape with a string answer.
//!
//! Any number of permissions and questions may be outstanding at once; they
//! resolve independently in any order. No timeout is imposed; a pending
//! entry lives until resolved or the session is aborted (tearing down the
//! engine that holds the receiving half).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::channel::PushSender;
use crate::error::{Error, Result};
use crate::protocol::{AgentEvent, PermissionBehavior, QuestionOption};

/// Outcome handed back to the engine's tool-gate callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum PermissionResult {
    Allow { updated_input: Value },
    Deny { message: String },
}

/// Optional context supplied by the engine alongside a permission request.
#[derive(Debug, Clone, Default)]
pub struct PermissionContext {
    pub tool_use_id: Option<String>,
    pub reason: Option<String>,
}

struct PendingPermission {
    responder: oneshot::Sender<PermissionResult>,
    /// Original tool input, echoed back on allow when the user supplies no
    /// replacement.
    input: Value,
}

/// Per-session registry of pending approvals and questions.
pub struct PermissionGate {
    pending_permissions: Mutex<HashMap<String, PendingPermission>>,
    pending_questions: Mutex<HashMap<String, oneshot::Sender<String>>>,
    next_id: AtomicU64,
    events: PushSender<AgentEvent>,
}

impl PermissionGate {
    /// Create a gate that emits its events onto the given output channel.
    pub fn new(events: PushSender<AgentEvent>) -> Self {
        Self {
            pending_permissions: Mutex::new(HashMap::new()),
            pending_questions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    fn allocate_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}_{n}")
    }

    /// Register a tool approval and emit `permission_request`.
    ///
    /// Returns the receiver the engine's callback awaits; it completes when
    /// [`resolve`](Self::resolve) is called with the allocated id.
    pub async fn request(
        &self,
        tool_name: &str,
        input: Value,
        context: PermissionContext,
    ) -> oneshot::Receiver<PermissionResult> {
        let (tx, rx) = oneshot::channel();
        let id = self.allocate_id("perm");

        {
            let mut pending = self.pending_permissions.lock().await;
            pending.insert(
                id.clone(),
                PendingPermission {
                    responder: tx,
                    input: input.clone(),
                },
            );
        }

        tracing::debug!(id = %id, tool_name = %tool_name, "Permission requested");
        self.events.push(AgentEvent::PermissionRequest {
            id,
            tool_name: tool_name.to_string(),
            input,
            tool_use_id: context.tool_use_id,
            reason: context.reason,
        });

        rx
    }

    /// Resolve a pending permission, completing the engine's callback.
    ///
    /// On allow, the engine receives `updated_input` when supplied, else the
    /// original input. Fails with [`Error::NoPending`] for an unknown id,
    /// including an id already resolved once.
    pub async fn resolve(
        &self,
        id: &str,
        behavior: PermissionBehavior,
        updated_input: Option<Value>,
    ) -> Result<()> {
        let pending = {
            let mut map = self.pending_permissions.lock().await;
            map.remove(id)
                .ok_or_else(|| Error::NoPending(id.to_string()))?
        };

        tracing::debug!(id = %id, behavior = ?behavior, "Permission resolved");
        self.events.push(AgentEvent::PermissionResolved {
            id: id.to_string(),
            behavior,
        });

        let result = match behavior {
            PermissionBehavior::Allow => PermissionResult::Allow {
                updated_input: updated_input.unwrap_or(pending.input),
            },
            PermissionBehavior::Deny => PermissionResult::Deny {
                message: "User denied".to_string(),
            },
        };
        // The engine may already be gone (aborted session); that's fine.
        let _ = pending.responder.send(result);
        Ok(())
    }

    /// Register a user question and emit `user_question`.
    pub async fn ask_question(
        &self,
        question: &str,
        options: Vec<QuestionOption>,
    ) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        let id = self.allocate_id("question");

        {
            let mut pending = self.pending_questions.lock().await;
            pending.insert(id.clone(), tx);
        }

        tracing::debug!(id = %id, "Question asked");
        self.events.push(AgentEvent::UserQuestion {
            id,
            question: question.to_string(),
            options,
        });

        rx
    }

    /// Answer a pending question, completing the engine's await.
    pub async fn answer_question(&self, id: &str, answer: String) -> Result<()> {
        let responder = {
            let mut map = self.pending_questions.lock().await;
            map.remove(id)
                .ok_or_else(|| Error::NoPending(id.to_string()))?
        };

        tracing::debug!(id = %id, "Question answered");
        self.events.push(AgentEvent::UserQuestionAnswered {
            id: id.to_string(),
            answer: answer.clone(),
        });

        let _ = responder.send(answer);
        Ok(())
    }

    /// Number of unresolved permissions (for status surfaces and tests).
    pub async fn pending_permission_count(&self) -> usize {
        self.pending_permissions.lock().await.len()
    }

    /// Number of unresolved questions.
    pub async fn pending_question_count(&self) -> usize {
        self.pending_questions.lock().await.len()
    }
}
