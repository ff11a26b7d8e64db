//! Engine contract: the upstream message shapes and invocation handle
//!
//! The relay treats the engine as an opaque async message source. An
//! [`Engine`] turns a query (a lazy stream of user turns plus a permission
//! gate handle) into an invocation: a stream of [`EngineMessage`]s and a
//! control handle for interrupt/abort. Messages decode at this edge into a
//! tagged model; unknown discriminators and block kinds land in catch-all
//! variants so downstream translation can ignore them without failing.

pub mod subprocess;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::channel::PushReceiver;
use crate::error::Result;
use crate::gate::PermissionGate;

pub use subprocess::SubprocessEngine;

/// A message emitted by (or pushed into) the engine, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineMessage {
    /// Fine-grained streaming event wrapping a [`StreamEvent`].
    StreamEvent {
        event: StreamEvent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    /// Aggregated assistant message with complete content blocks.
    Assistant {
        message: MessageBody,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    /// User-side message: outgoing turns, and incoming tool results.
    User {
        message: MessageBody,
        #[serde(default)]
        parent_tool_use_id: Option<String>,
        #[serde(default)]
        session_id: String,
    },
    /// Engine housekeeping; `init` carries the engine's session id.
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Terminal outcome of an engine run.
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    #[serde(other)]
    Other,
}

/// Role plus content of an assistant or user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: MessageContent,
}

/// Message content: a bare string for outgoing user turns, content blocks
/// everywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

/// One block within an aggregated message's `content` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Option<Value>,
    },
    ServerToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Option<Value>,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Other,
}

/// Inner payload of a `stream_event` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {},
    ContentBlockStart {
        #[serde(default)]
        index: Option<u64>,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        #[serde(default)]
        index: Option<u64>,
        delta: ContentDelta,
    },
    #[serde(other)]
    Other,
}

/// Incremental change to an open content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

/// Build the engine-shaped user message for a text turn.
///
/// `session_id` is left empty; the engine fills it in on its side.
pub fn user_message(text: impl Into<String>) -> EngineMessage {
    EngineMessage::User {
        message: MessageBody {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        },
        parent_tool_use_id: None,
        session_id: String::new(),
    }
}

/// Inputs handed to an engine when a session starts.
pub struct EngineQuery {
    /// Lazy stream of user turns; the engine suspends reading it between
    /// turns, which is what makes multi-turn sessions work.
    pub prompt: PushReceiver<EngineMessage>,
    /// Tool-gate handle; the engine awaits `permissions.request(..)` before
    /// running a gated tool.
    pub permissions: Arc<PermissionGate>,
}

/// A running engine: its message stream plus a control handle.
pub struct EngineInvocation {
    /// Engine output. An `Err` item means the engine itself failed; the
    /// session driver converts it into a single `error` event.
    pub messages: mpsc::Receiver<Result<EngineMessage>>,
    pub control: Arc<dyn EngineControl>,
}

/// Cancellation surface of a running engine.
#[async_trait]
pub trait EngineControl: Send + Sync {
    /// Ask the engine to stop the current generation but keep the session.
    async fn interrupt(&self);
    /// Tear the engine down entirely.
    async fn abort(&self);
}

/// Factory for engine invocations; one session holds exactly one.
pub trait Engine: Send + Sync {
    fn query(&self, query: EngineQuery) -> Result<EngineInvocation>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_message_wire_shape() {
        let msg = user_message("Hello");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "user",
                "message": {"role": "user", "content": "Hello"},
                "parent_tool_use_id": null,
                "session_id": "",
            })
        );
    }

    #[test]
    fn test_decode_stream_event_text_delta() {
        let msg: EngineMessage = serde_json::from_value(json!({
            "type": "stream_event",
            "event": {
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": "Hi"},
            },
        }))
        .unwrap();

        match msg {
            EngineMessage::StreamEvent {
                event:
                    StreamEvent::ContentBlockDelta {
                        delta: ContentDelta::TextDelta { text },
                        ..
                    },
                ..
            } => assert_eq!(text, "Hi"),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_decode_assistant_blocks() {
        let msg: EngineMessage = serde_json::from_value(json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "content": [
                    {"type": "thinking", "thinking": "let me see"},
                    {"type": "tool_use", "id": "tc-1", "name": "Read",
                     "input": {"file_path": "/tmp/x"}},
                ],
            },
        }))
        .unwrap();

        match msg {
            EngineMessage::Assistant { message, .. } => match message.content {
                MessageContent::Blocks(blocks) => {
                    assert_eq!(blocks.len(), 2);
                    assert!(matches!(blocks[0], ContentBlock::Thinking { .. }));
                    assert!(matches!(blocks[1], ContentBlock::ToolUse { .. }));
                }
                other => panic!("expected blocks, got {other:?}"),
            },
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_shapes_fall_through() {
        let msg: EngineMessage =
            serde_json::from_value(json!({"type": "telemetry", "data": 42})).unwrap();
        assert_eq!(msg, EngineMessage::Other);

        let msg: EngineMessage = serde_json::from_value(json!({
            "type": "stream_event",
            "event": {"type": "message_stop"},
        }))
        .unwrap();
        assert!(matches!(
            msg,
            EngineMessage::StreamEvent {
                event: StreamEvent::Other,
                ..
            }
        ));

        let block: ContentBlock =
            serde_json::from_value(json!({"type": "redacted_thinking", "data": "x"})).unwrap();
        assert_eq!(block, ContentBlock::Other);
    }

    #[test]
    fn test_decode_tool_result_block() {
        let msg: EngineMessage = serde_json::from_value(json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [
                    {"type": "tool_result", "tool_use_id": "tc-1", "content": "ok"},
                ],
            },
        }))
        .unwrap();

        match msg {
            EngineMessage::User { message, .. } => match message.content {
                MessageContent::Blocks(blocks) => match &blocks[0] {
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => {
                        assert_eq!(tool_use_id, "tc-1");
                        assert_eq!(content, &Some(json!("ok")));
                    }
                    other => panic!("expected tool_result, got {other:?}"),
                },
                other => panic!("expected blocks, got {other:?}"),
            },
            other => panic!("unexpected decode: {other:?}"),
        }
    }
}
