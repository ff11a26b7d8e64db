//! Pure event-to-state fold
//!
//! Mirrors the stream's invariants: tool input deltas and finalized tool
//! calls only touch tools declared on the current (latest) message, while
//! tool results search newest-first: a result can arrive on the turn after
//! a subagent produced the call. Unknown tool ids are dropped rather than
//! invented, keeping the fold robust against out-of-order engine output.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::protocol::{AgentEvent, QuestionOption};

/// One tool invocation as the client sees it, possibly still streaming.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCallInfo {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Partial JSON accumulated from `tool_input_delta` events.
    pub input_text: String,
    /// Finalized decoded input; may arrive independently of the deltas.
    pub input: Option<Map<String, Value>>,
    pub result: Option<Value>,
    pub is_error: Option<bool>,
}

/// One assistant message accumulated from stream events.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentMessage {
    pub role: String,
    pub parent_tool_use_id: Option<String>,
    pub current_text: String,
    pub current_thinking: String,
    /// Tool calls in declaration order.
    pub tool_calls: Vec<ToolCallInfo>,
}

impl AgentMessage {
    fn new(parent_tool_use_id: Option<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            parent_tool_use_id,
            current_text: String::new(),
            current_thinking: String::new(),
            tool_calls: Vec::new(),
        }
    }

    fn tool_call_mut(&mut self, id: &str) -> Option<&mut ToolCallInfo> {
        self.tool_calls.iter_mut().find(|tc| tc.tool_call_id == id)
    }
}

/// A permission awaiting an out-of-band response.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPermission {
    pub id: String,
    pub tool_name: String,
    pub input: Value,
    pub tool_use_id: Option<String>,
    pub reason: Option<String>,
}

/// A question awaiting an out-of-band answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<QuestionOption>,
}

/// Full client-side view of one session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentState {
    pub session_id: Option<String>,
    pub is_running: bool,
    pub messages: Vec<AgentMessage>,
    pub pending_permissions: HashMap<String, PendingPermission>,
    pub pending_questions: HashMap<String, PendingQuestion>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl AgentState {
    /// Fold one event into the state.
    pub fn apply(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::SessionInit { session_id } => {
                *self = AgentState {
                    session_id: Some(session_id.clone()),
                    is_running: true,
                    ..AgentState::default()
                };
            }
            AgentEvent::MessageStart {
                parent_tool_use_id, ..
            } => {
                self.messages
                    .push(AgentMessage::new(parent_tool_use_id.clone()));
            }
            AgentEvent::TextDelta { text } => {
                if let Some(message) = self.messages.last_mut() {
                    message.current_text.push_str(text);
                }
            }
            AgentEvent::ThinkingDelta { text } => {
                if let Some(message) = self.messages.last_mut() {
                    message.current_thinking.push_str(text);
                }
            }
            AgentEvent::ToolStart {
                tool_call_id,
                tool_name,
            } => {
                if let Some(message) = self.messages.last_mut() {
                    message.tool_calls.push(ToolCallInfo {
                        tool_call_id: tool_call_id.clone(),
                        tool_name: tool_name.clone(),
                        ..ToolCallInfo::default()
                    });
                }
            }
            AgentEvent::ToolInputDelta { tool_call_id, text } => {
                if let Some(tc) = self
                    .messages
                    .last_mut()
                    .and_then(|m| m.tool_call_mut(tool_call_id))
                {
                    tc.input_text.push_str(text);
                }
            }
            AgentEvent::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => {
                if let Some(tc) = self
                    .messages
                    .last_mut()
                    .and_then(|m| m.tool_call_mut(tool_call_id))
                {
                    tc.tool_name = tool_name.clone();
                    tc.input = Some(input.clone());
                }
            }
            AgentEvent::ToolResult {
                tool_call_id,
                result,
                is_error,
            } => {
                // Newest-first: the owning message may be several turns back.
                for message in self.messages.iter_mut().rev() {
                    if let Some(tc) = message.tool_call_mut(tool_call_id) {
                        tc.result = Some(result.clone());
                        tc.is_error = *is_error;
                        break;
                    }
                }
            }
            AgentEvent::PermissionRequest {
                id,
                tool_name,
                input,
                tool_use_id,
                reason,
            } => {
                self.pending_permissions.insert(
                    id.clone(),
                    PendingPermission {
                        id: id.clone(),
                        tool_name: tool_name.clone(),
                        input: input.clone(),
                        tool_use_id: tool_use_id.clone(),
                        reason: reason.clone(),
                    },
                );
            }
            AgentEvent::PermissionResolved { id, .. } => {
                self.pending_permissions.remove(id);
            }
            AgentEvent::UserQuestion {
                id,
                question,
                options,
            } => {
                self.pending_questions.insert(
                    id.clone(),
                    PendingQuestion {
                        id: id.clone(),
                        question: question.clone(),
                        options: options.clone(),
                    },
                );
            }
            AgentEvent::UserQuestionAnswered { id, .. } => {
                self.pending_questions.remove(id);
            }
            AgentEvent::Result { result } => {
                self.is_running = false;
                self.result = result.clone();
            }
            AgentEvent::Error { message } => {
                self.is_running = false;
                self.error = Some(message.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PermissionBehavior;
    use serde_json::json;

    fn fold(events: &[AgentEvent]) -> AgentState {
        let mut state = AgentState::default();
        for event in events {
            state.apply(event);
        }
        state
    }

    fn init() -> AgentEvent {
        AgentEvent::SessionInit {
            session_id: "sess-1".into(),
        }
    }

    fn message_start() -> AgentEvent {
        AgentEvent::MessageStart {
            role: "assistant".into(),
            parent_tool_use_id: None,
        }
    }

    #[test]
    fn test_session_init_resets_state() {
        let mut state = fold(&[
            init(),
            message_start(),
            AgentEvent::TextDelta {
                text: "stale".into(),
            },
            AgentEvent::Result { result: None },
        ]);
        assert!(!state.is_running);

        state.apply(&AgentEvent::SessionInit {
            session_id: "sess-2".into(),
        });
        assert_eq!(state.session_id.as_deref(), Some("sess-2"));
        assert!(state.is_running);
        assert!(state.messages.is_empty());
        assert!(state.result.is_none());
    }

    #[test]
    fn test_text_and_thinking_accumulate() {
        let state = fold(&[
            init(),
            message_start(),
            AgentEvent::ThinkingDelta { text: "hm ".into() },
            AgentEvent::ThinkingDelta { text: "ok".into() },
            AgentEvent::TextDelta {
                text: "Hello ".into(),
            },
            AgentEvent::TextDelta {
                text: "world!".into(),
            },
        ]);
        let message = &state.messages[0];
        assert_eq!(message.current_thinking, "hm ok");
        assert_eq!(message.current_text, "Hello world!");
    }

    #[test]
    fn test_tool_call_merging_on_current_message() {
        let state = fold(&[
            init(),
            message_start(),
            AgentEvent::ToolStart {
                tool_call_id: "tc-1".into(),
                tool_name: "Read".into(),
            },
            AgentEvent::ToolInputDelta {
                tool_call_id: "tc-1".into(),
                text: "{\"file_path\":".into(),
            },
            AgentEvent::ToolInputDelta {
                tool_call_id: "tc-1".into(),
                text: "\"/tmp/test.ts\"}".into(),
            },
            AgentEvent::ToolCall {
                tool_call_id: "tc-1".into(),
                tool_name: "Read".into(),
                input: json!({"file_path": "/tmp/test.ts"})
                    .as_object()
                    .unwrap()
                    .clone(),
            },
        ]);

        let tc = &state.messages[0].tool_calls[0];
        assert_eq!(tc.input_text, "{\"file_path\":\"/tmp/test.ts\"}");
        assert_eq!(
            tc.input,
            Some(json!({"file_path": "/tmp/test.ts"}).as_object().unwrap().clone())
        );
        assert!(tc.result.is_none());
    }

    #[test]
    fn test_tool_result_searches_newest_first_across_messages() {
        let state = fold(&[
            init(),
            message_start(),
            AgentEvent::ToolStart {
                tool_call_id: "tc-1".into(),
                tool_name: "Bash".into(),
            },
            // Next assistant turn begins before the result lands.
            message_start(),
            AgentEvent::ToolResult {
                tool_call_id: "tc-1".into(),
                result: json!("done"),
                is_error: None,
            },
        ]);

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].tool_calls[0].result, Some(json!("done")));
        assert!(state.messages[1].tool_calls.is_empty());
    }

    #[test]
    fn test_tool_events_for_unknown_ids_are_noops() {
        let state = fold(&[
            init(),
            message_start(),
            AgentEvent::ToolInputDelta {
                tool_call_id: "ghost".into(),
                text: "{}".into(),
            },
            AgentEvent::ToolCall {
                tool_call_id: "ghost".into(),
                tool_name: "Bash".into(),
                input: Map::new(),
            },
            AgentEvent::ToolResult {
                tool_call_id: "ghost".into(),
                result: json!("x"),
                is_error: None,
            },
        ]);
        assert!(state.messages[0].tool_calls.is_empty());
    }

    #[test]
    fn test_tool_events_do_not_touch_older_messages() {
        // tc-1 lives on message 0; a delta arriving while message 1 is
        // current must not append to it.
        let state = fold(&[
            init(),
            message_start(),
            AgentEvent::ToolStart {
                tool_call_id: "tc-1".into(),
                tool_name: "Bash".into(),
            },
            message_start(),
            AgentEvent::ToolInputDelta {
                tool_call_id: "tc-1".into(),
                text: "{\"cmd\":1}".into(),
            },
        ]);
        assert_eq!(state.messages[0].tool_calls[0].input_text, "");
    }

    #[test]
    fn test_pending_maps_append_and_delete() {
        let mut state = fold(&[
            init(),
            AgentEvent::PermissionRequest {
                id: "perm_1".into(),
                tool_name: "Bash".into(),
                input: json!({"command": "ls"}),
                tool_use_id: None,
                reason: None,
            },
            AgentEvent::UserQuestion {
                id: "question_1".into(),
                question: "Proceed?".into(),
                options: vec![],
            },
        ]);
        assert_eq!(state.pending_permissions.len(), 1);
        assert_eq!(state.pending_questions.len(), 1);

        state.apply(&AgentEvent::PermissionResolved {
            id: "perm_1".into(),
            behavior: PermissionBehavior::Allow,
        });
        state.apply(&AgentEvent::UserQuestionAnswered {
            id: "question_1".into(),
            answer: "Yes".into(),
        });
        assert!(state.pending_permissions.is_empty());
        assert!(state.pending_questions.is_empty());
    }

    #[test]
    fn test_terminal_events_stop_running_but_keep_state() {
        let state = fold(&[
            init(),
            message_start(),
            AgentEvent::TextDelta { text: "hi".into() },
            AgentEvent::PermissionRequest {
                id: "perm_1".into(),
                tool_name: "Bash".into(),
                input: json!({}),
                tool_use_id: None,
                reason: None,
            },
            AgentEvent::Result {
                result: Some(json!("final")),
            },
        ]);
        assert!(!state.is_running);
        assert_eq!(state.result, Some(json!("final")));
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.pending_permissions.len(), 1);

        let state = fold(&[
            init(),
            AgentEvent::Error {
                message: "boom".into(),
            },
        ]);
        assert!(!state.is_running);
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_subagent_parent_is_recorded() {
        let state = fold(&[
            init(),
            AgentEvent::MessageStart {
                role: "assistant".into(),
                parent_tool_use_id: Some("tc-parent".into()),
            },
        ]);
        assert_eq!(
            state.messages[0].parent_tool_use_id.as_deref(),
            Some("tc-parent")
        );
    }
}
