//! Client-side consumption of the event stream
//!
//! - [`reduce`]: pure event-to-state fold producing the ordered message list
//! - [`convert`]: projection of reduced state into UI-shaped messages
//! - [`runtime`]: EventSource + HTTP POST orchestration with
//!   snapshot/subscribe semantics

pub mod convert;
pub mod reduce;
pub mod runtime;

pub use convert::{to_ui_messages, UiMessage, UiPart, UiStatus};
pub use reduce::{AgentMessage, AgentState, PendingPermission, PendingQuestion, ToolCallInfo};
pub use runtime::ClientRuntime;
