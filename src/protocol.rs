//! Normalized event protocol and SSE wire codec
//!
//! `AgentEvent` is the single typed protocol delivered to UI consumers:
//! every heterogeneous engine message is folded into this stream by the
//! translator, and out-of-band gate activity (permission requests, question
//! answers) is injected as first-class events. On the wire each event is one
//! SSE frame, `data: <json>\n\n`, and a stream always terminates with the
//! `[DONE]` marker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Stream termination marker, matching the OpenAI-compatible SSE convention.
pub const SSE_DONE: &str = "[DONE]";

/// A normalized event on a session's output stream.
///
/// Tagged `type` on the wire with snake_case variant names and camelCase
/// fields, e.g. `{"type":"tool_start","toolCallId":"tc-1","toolName":"Read"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AgentEvent {
    /// Engine announced its session id; consumers reset state on this.
    SessionInit { session_id: String },
    /// A new assistant message began.
    MessageStart {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    /// Incremental assistant text.
    TextDelta { text: String },
    /// Incremental assistant thinking.
    ThinkingDelta { text: String },
    /// A tool invocation was declared.
    ToolStart {
        tool_call_id: String,
        tool_name: String,
    },
    /// Partial JSON accumulating the current tool's input.
    ToolInputDelta { tool_call_id: String, text: String },
    /// Finalized tool invocation with its decoded input.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: serde_json::Map<String, Value>,
    },
    /// Completion of a tool invocation.
    ToolResult {
        tool_call_id: String,
        result: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// The engine is waiting on an out-of-band approval.
    PermissionRequest {
        id: String,
        tool_name: String,
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// An approval was answered.
    PermissionResolved {
        id: String,
        behavior: PermissionBehavior,
    },
    /// The engine asked the user a question.
    UserQuestion {
        id: String,
        question: String,
        options: Vec<QuestionOption>,
    },
    /// A question was answered.
    UserQuestionAnswered { id: String, answer: String },
    /// The engine run completed successfully.
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// The engine run failed.
    Error { message: String },
}

/// Approval outcome for a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionBehavior {
    Allow,
    Deny,
}

/// One selectable answer offered with a [`AgentEvent::UserQuestion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    pub description: String,
}

/// Encode an event as a single SSE frame: `data: <json>\n\n`.
pub fn encode_event(event: &AgentEvent) -> Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Encode the stream terminator frame.
pub fn encode_done() -> String {
    format!("data: {}\n\n", SSE_DONE)
}

/// Decode one SSE line back into an event.
///
/// Returns `Ok(None)` when the payload is the `[DONE]` terminator. Fails
/// when the line lacks the `data: ` prefix or the payload is malformed JSON.
pub fn decode_event(line: &str) -> Result<Option<AgentEvent>> {
    let payload = line
        .trim()
        .strip_prefix("data: ")
        .ok_or_else(|| Error::Protocol(format!("missing 'data: ' prefix: {line:?}")))?;

    if payload == SSE_DONE {
        return Ok(None);
    }

    let event = serde_json::from_str(payload)
        .map_err(|e| Error::Protocol(format!("malformed event payload: {e}")))?;
    Ok(Some(event))
}
