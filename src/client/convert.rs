//! Projection of reduced state into UI-shaped messages
//!
//! The UI consumes an ordered list of assistant messages, each a list of
//! parts: reasoning first, then text, then tool calls in declaration order.
//! Messages that would render nothing are dropped. Only the last surviving
//! message of a running session is marked running.

use serde::Serialize;
use serde_json::{Map, Value};

use super::reduce::{AgentState, ToolCallInfo};

/// UI-shaped message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiMessage {
    pub role: String,
    pub content: Vec<UiPart>,
    pub status: UiStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<UiMetadata>,
}

/// One renderable part of a UI message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum UiPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "reasoning")]
    Reasoning { text: String },
    #[serde(rename = "tool-call", rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        args: Option<Map<String, Value>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        args_text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Message completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UiStatus {
    Running,
    Complete,
}

/// Metadata envelope carrying the subagent parent linkage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiMetadata {
    pub custom: UiCustomMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiCustomMetadata {
    pub parent_tool_use_id: String,
}

/// Project the reduced state into the UI message list.
pub fn to_ui_messages(state: &AgentState) -> Vec<UiMessage> {
    let mut messages: Vec<UiMessage> = state
        .messages
        .iter()
        .filter_map(|message| {
            let mut parts = Vec::new();
            if !message.current_thinking.is_empty() {
                parts.push(UiPart::Reasoning {
                    text: message.current_thinking.clone(),
                });
            }
            if !message.current_text.is_empty() {
                parts.push(UiPart::Text {
                    text: message.current_text.clone(),
                });
            }
            for tool_call in &message.tool_calls {
                parts.push(tool_call_part(tool_call));
            }
            if parts.is_empty() {
                return None;
            }

            Some(UiMessage {
                role: "assistant".to_string(),
                content: parts,
                status: UiStatus::Complete,
                metadata: message.parent_tool_use_id.as_ref().map(|id| UiMetadata {
                    custom: UiCustomMetadata {
                        parent_tool_use_id: id.clone(),
                    },
                }),
            })
        })
        .collect();

    if state.is_running {
        if let Some(last) = messages.last_mut() {
            last.status = UiStatus::Running;
        }
    }
    messages
}

fn tool_call_part(tool_call: &ToolCallInfo) -> UiPart {
    let args_text = match &tool_call.input {
        Some(input) => serde_json::to_string(input).ok(),
        None if !tool_call.input_text.is_empty() => Some(tool_call.input_text.clone()),
        None => None,
    };

    UiPart::ToolCall {
        tool_call_id: tool_call.tool_call_id.clone(),
        tool_name: tool_call.tool_name.clone(),
        args: tool_call.input.clone(),
        args_text,
        result: tool_call.result.clone(),
        is_error: tool_call.is_error,
    }
}
