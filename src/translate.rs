//! Stream translator: engine messages in, normalized events out
//!
//! The engine interleaves two partially-overlapping encodings of the same
//! turn: fine-grained streaming deltas, and aggregated messages repeating the
//! finished blocks. The translator keeps the useful union (streaming text,
//! thinking, and tool input as they arrive, plus the finalized structured
//! tool input and tool results) and drops the rest.
//!
//! State is per session: the insertion-ordered tool registry (input deltas
//! carry no tool id and attribute to the most recently introduced tool) and
//! the `had_stream_thinking` flag. The flag suppresses the aggregated
//! thinking block when its content already arrived as deltas, and is cleared
//! on every `message_start` so the next turn streams thinking again.

use serde_json::Value;

use crate::engine::{ContentBlock, ContentDelta, EngineMessage, MessageContent, StreamEvent};
use crate::protocol::AgentEvent;

/// Stateful per-session reducer from [`EngineMessage`] to [`AgentEvent`]s.
#[derive(Default)]
pub struct Translator {
    /// `(tool_call_id, tool_name)` in introduction order.
    tools: Vec<(String, String)>,
    had_stream_thinking: bool,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one engine message into zero or more events.
    pub fn translate(&mut self, message: &EngineMessage) -> Vec<AgentEvent> {
        match message {
            EngineMessage::StreamEvent {
                event,
                parent_tool_use_id,
            } => self.translate_stream_event(event, parent_tool_use_id.clone()),
            EngineMessage::Assistant { message, .. } => self.translate_assistant(&message.content),
            EngineMessage::User { message, .. } => translate_user(&message.content),
            EngineMessage::System {
                subtype,
                session_id,
            } => match (subtype.as_str(), session_id) {
                ("init", Some(id)) => vec![AgentEvent::SessionInit {
                    session_id: id.clone(),
                }],
                _ => vec![],
            },
            EngineMessage::Result { subtype, result } => {
                if subtype == "success" {
                    vec![AgentEvent::Result {
                        result: result.clone(),
                    }]
                } else {
                    let message = if subtype.is_empty() {
                        "unknown_error".to_string()
                    } else {
                        subtype.clone()
                    };
                    vec![AgentEvent::Error { message }]
                }
            }
            EngineMessage::Other => vec![],
        }
    }

    fn translate_stream_event(
        &mut self,
        event: &StreamEvent,
        parent_tool_use_id: Option<String>,
    ) -> Vec<AgentEvent> {
        match event {
            StreamEvent::MessageStart {} => {
                self.had_stream_thinking = false;
                vec![AgentEvent::MessageStart {
                    role: "assistant".to_string(),
                    parent_tool_use_id,
                }]
            }
            StreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                ContentBlock::ToolUse { id, name, .. }
                | ContentBlock::ServerToolUse { id, name, .. } => {
                    self.record_tool(id, name);
                    vec![AgentEvent::ToolStart {
                        tool_call_id: id.clone(),
                        tool_name: name.clone(),
                    }]
                }
                _ => vec![],
            },
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                ContentDelta::TextDelta { text } => {
                    vec![AgentEvent::TextDelta { text: text.clone() }]
                }
                ContentDelta::ThinkingDelta { thinking } => {
                    self.had_stream_thinking = true;
                    vec![AgentEvent::ThinkingDelta {
                        text: thinking.clone(),
                    }]
                }
                ContentDelta::InputJsonDelta { partial_json } => match self.tools.last() {
                    Some((id, _)) => vec![AgentEvent::ToolInputDelta {
                        tool_call_id: id.clone(),
                        text: partial_json.clone(),
                    }],
                    None => vec![],
                },
                ContentDelta::Other => vec![],
            },
            StreamEvent::Other => vec![],
        }
    }

    /// Aggregated assistant message: the text blocks are already covered by
    /// streaming deltas; only thinking (when not streamed) and the finalized
    /// tool inputs matter here.
    fn translate_assistant(&mut self, content: &MessageContent) -> Vec<AgentEvent> {
        let MessageContent::Blocks(blocks) = content else {
            return vec![];
        };

        let mut events = Vec::new();
        for block in blocks {
            match block {
                ContentBlock::Thinking { thinking } => {
                    if !self.had_stream_thinking {
                        events.push(AgentEvent::ThinkingDelta {
                            text: thinking.clone(),
                        });
                    }
                }
                ContentBlock::ToolUse { id, name, input }
                | ContentBlock::ServerToolUse { id, name, input } => {
                    self.record_tool(id, name);
                    let input = input
                        .as_ref()
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    events.push(AgentEvent::ToolCall {
                        tool_call_id: id.clone(),
                        tool_name: name.clone(),
                        input,
                    });
                }
                _ => {}
            }
        }
        events
    }

    fn record_tool(&mut self, id: &str, name: &str) {
        if !self.tools.iter().any(|(known, _)| known == id) {
            self.tools.push((id.to_string(), name.to_string()));
        }
    }
}

fn translate_user(content: &MessageContent) -> Vec<AgentEvent> {
    let MessageContent::Blocks(blocks) = content else {
        return vec![];
    };

    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some(AgentEvent::ToolResult {
                tool_call_id: tool_use_id.clone(),
                result: Value::String(extract_tool_result_text(content.as_ref())),
                is_error: *is_error,
            }),
            _ => None,
        })
        .collect()
}

/// Flatten a tool result's `content` into display text.
///
/// A string passes through; an array contributes the `text` fields of its
/// text-typed sub-blocks, falling back to the array's JSON when it has none;
/// anything else becomes the empty string.
fn extract_tool_result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => {
            let texts: Vec<&str> = items
                .iter()
                .filter(|item| item["type"] == "text")
                .filter_map(|item| item["text"].as_str())
                .collect();
            if texts.is_empty() {
                serde_json::to_string(items).unwrap_or_default()
            } else {
                texts.concat()
            }
        }
        _ => String::new(),
    }
}
