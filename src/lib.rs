//! agent-relay: streaming adapter between agent engines and chat UIs
//!
//! Sits between an upstream agent engine (an opaque async message source
//! with tool use and human-in-the-loop approval) and a downstream chat UI.
//! The engine's heterogeneous, partially-buffered message stream is
//! normalized into a single typed event protocol delivered over SSE, and
//! out-of-band user responses (tool approvals, question answers) are carried
//! back into the engine while it is suspended inside a tool-gate callback.
//!
//! ```text
//! UI ──POST /sessions──────────▶ SessionManager ──▶ Engine (subprocess)
//! UI ◀──SSE /sessions/:id/events── output channel ◀── Translator ◀── driver
//! UI ──POST /sessions/:id/respond─▶ PermissionGate ──▶ engine tool-gate
//! ```
//!
//! ## Modules
//!
//! - [`channel`]: push channel, an SPSC async FIFO with close semantics
//! - [`protocol`]: typed [`protocol::AgentEvent`] stream + SSE wire codec
//! - [`engine`]: engine contract and the NDJSON subprocess engine
//! - [`translate`]: stateful engine-message → event reducer
//! - [`gate`]: deferred-resolution registry for approvals and questions
//! - [`session`]: per-conversation wiring and the session registry
//! - [`api`]: axum HTTP surface
//! - [`client`]: event-stream consumer (reducer, UI projection, runtime)
//! - [`config`]: TOML configuration

pub mod api;
pub mod channel;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod protocol;
pub mod session;
pub mod translate;

pub use api::{build_router, AppState};
pub use client::{to_ui_messages, AgentState, ClientRuntime};
pub use config::RelayConfig;
pub use engine::{Engine, EngineMessage, SubprocessEngine};
pub use error::{Error, Result};
pub use gate::{PermissionGate, PermissionResult};
pub use protocol::{AgentEvent, PermissionBehavior};
pub use session::{Session, SessionManager};
pub use translate::Translator;
