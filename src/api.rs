//! HTTP surface for the relay
//!
//! ## Endpoint Map
//!
//! | Method | Path                      | Description                        |
//! |--------|---------------------------|------------------------------------|
//! | GET    | `/health`                 | Load balancer health probe         |
//! | POST   | `/sessions`               | Create a session from a first turn |
//! | GET    | `/sessions`               | List live sessions                 |
//! | GET    | `/sessions/:id/events`    | Subscribe to the SSE event stream  |
//! | POST   | `/sessions/:id/messages`  | Push a follow-up user turn         |
//! | POST   | `/sessions/:id/respond`   | Resolve a permission or question   |
//! | POST   | `/sessions/:id/interrupt` | Interrupt the current generation   |
//! | DELETE | `/sessions/:id`           | Abort and remove a session         |

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::protocol::{PermissionBehavior, SSE_DONE};
use crate::session::SessionManager;

/// Shared application state accessible to all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    /// SSE keep-alive interval for event subscriptions.
    pub keep_alive: Duration,
}

/// Build the complete axum router.
///
/// An empty origin list yields a permissive CORS policy, matching local
/// development against a browser UI on another port.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:id", delete(delete_session))
        .route("/sessions/:id/events", get(subscribe_events))
        .route("/sessions/:id/messages", post(push_message))
        .route("/sessions/:id/respond", post(respond))
        .route("/sessions/:id/interrupt", post(interrupt))
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| o.parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: String,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse> {
    let session = state.sessions.create(&request.message).await?;
    Ok(Json(CreateSessionResponse {
        session_id: session.id().to_string(),
    }))
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sessions.list().await)
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.sessions.delete(&id).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

/// Subscribe to a session's normalized event stream.
///
/// Every event drained from the output channel becomes one `data:` frame;
/// the stream always finishes with the `[DONE]` marker, whether the engine
/// completed, failed (a single `error` event precedes the close), or the
/// session was aborted.
async fn subscribe_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let session = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| Error::SessionNotFound(id.clone()))?;
    let events = session.events()?;

    let frames = events
        .filter_map(|event| async move { serde_json::to_string(&event).ok() })
        .chain(futures::stream::once(async { SSE_DONE.to_string() }))
        .map(|payload| Ok::<_, Infallible>(Event::default().data(payload)));

    Ok((
        [(axum::http::header::CACHE_CONTROL, "no-cache")],
        Sse::new(frames).keep_alive(KeepAlive::new().interval(state.keep_alive)),
    ))
}

#[derive(Deserialize)]
struct PushMessageRequest {
    message: String,
}

async fn push_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PushMessageRequest>,
) -> Result<impl IntoResponse> {
    let session = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| Error::SessionNotFound(id.clone()))?;
    session.push_message(&request.message);
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Deserialize)]
struct RespondRequest {
    kind: String,
    id: String,
    behavior: Option<PermissionBehavior>,
    #[serde(rename = "updatedInput")]
    updated_input: Option<Value>,
    answer: Option<String>,
}

/// Resolve an out-of-band permission or question by id.
async fn respond(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RespondRequest>,
) -> Result<impl IntoResponse> {
    let session = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| Error::SessionNotFound(id.clone()))?;

    match request.kind.as_str() {
        "permission" => {
            let behavior = request
                .behavior
                .ok_or_else(|| Error::InvalidRequest("missing behavior".into()))?;
            session
                .gate()
                .resolve(&request.id, behavior, request.updated_input)
                .await?;
        }
        "question" => {
            let answer = request
                .answer
                .ok_or_else(|| Error::InvalidRequest("missing answer".into()))?;
            session.gate().answer_question(&request.id, answer).await?;
        }
        other => {
            return Err(Error::InvalidRequest(format!(
                "unknown respond kind: {other}"
            )));
        }
    }

    Ok(Json(serde_json::json!({"ok": true})))
}

async fn interrupt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let session = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| Error::SessionNotFound(id.clone()))?;
    session.interrupt().await;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineControl, EngineInvocation, EngineMessage, EngineQuery};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    struct NoopControl;

    #[async_trait]
    impl EngineControl for NoopControl {
        async fn interrupt(&self) {}
        async fn abort(&self) {}
    }

    /// Engine replaying a fixed script once the first turn arrives.
    struct ScriptedEngine {
        script: Vec<serde_json::Value>,
    }

    impl Engine for ScriptedEngine {
        fn query(&self, query: EngineQuery) -> crate::error::Result<EngineInvocation> {
            let (tx, rx) = mpsc::channel(16);
            let script: Vec<EngineMessage> = self
                .script
                .iter()
                .map(|v| serde_json::from_value(v.clone()).unwrap())
                .collect();
            let mut prompt = query.prompt;
            tokio::spawn(async move {
                let _ = prompt.recv().await;
                for message in script {
                    if tx.send(Ok(message)).await.is_err() {
                        return;
                    }
                }
            });
            Ok(EngineInvocation {
                messages: rx,
                control: Arc::new(NoopControl),
            })
        }
    }

    fn test_app(script: Vec<serde_json::Value>) -> Router {
        let state = AppState {
            sessions: Arc::new(SessionManager::new(Arc::new(ScriptedEngine { script }))),
            keep_alive: Duration::from_secs(15),
        };
        build_router(state, &[])
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(vec![]);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_session_returns_id() {
        let app = test_app(vec![]);
        let response = app
            .oneshot(post_json("/sessions", json!({"message": "Hello"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["sessionId"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let app = test_app(vec![]);

        let response = app
            .clone()
            .oneshot(
                Request::get("/sessions/nope/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(post_json("/sessions/nope/messages", json!({"message": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(post_json(
                "/sessions/nope/respond",
                json!({"kind": "permission", "id": "perm_1", "behavior": "allow"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::delete("/sessions/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_respond_rejects_bad_kind_and_unknown_pending() {
        let app = test_app(vec![]);
        let created = app
            .clone()
            .oneshot(post_json("/sessions", json!({"message": "Hello"})))
            .await
            .unwrap();
        let session_id = body_json(created).await["sessionId"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/sessions/{session_id}/respond"),
                json!({"kind": "telepathy", "id": "perm_1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json(
                &format!("/sessions/{session_id}/respond"),
                json!({"kind": "permission", "id": "perm_99", "behavior": "allow"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sse_stream_ends_with_done() {
        let app = test_app(vec![
            json!({"type": "system", "subtype": "init", "session_id": "int-1"}),
            json!({"type": "stream_event", "event": {"type": "message_start"}}),
            json!({"type": "stream_event", "event": {
                "type": "content_block_delta", "index": 0,
                "delta": {"type": "text_delta", "text": "Hello!"},
            }}),
            json!({"type": "result", "subtype": "success"}),
        ]);

        let created = app
            .clone()
            .oneshot(post_json("/sessions", json!({"message": "Hello"})))
            .await
            .unwrap();
        let session_id = body_json(created).await["sessionId"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(
                Request::get(format!("/sessions/{session_id}/events"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("data: {\"type\":\"session_init\",\"sessionId\":\"int-1\"}"));
        assert!(body.contains("\"type\":\"text_delta\""));
        assert!(body.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_second_event_subscription_conflicts() {
        let app = test_app(vec![json!({"type": "result", "subtype": "success"})]);
        let created = app
            .clone()
            .oneshot(post_json("/sessions", json!({"message": "Hello"})))
            .await
            .unwrap();
        let session_id = body_json(created).await["sessionId"]
            .as_str()
            .unwrap()
            .to_string();

        let uri = format!("/sessions/{session_id}/events");
        let first = app
            .clone()
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_delete_session() {
        let app = test_app(vec![]);
        let created = app
            .clone()
            .oneshot(post_json("/sessions", json!({"message": "Hello"})))
            .await
            .unwrap();
        let session_id = body_json(created).await["sessionId"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/sessions/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let listed = app
            .oneshot(Request::get("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(listed).await;
        assert_eq!(body.as_array().unwrap().len(), 0);
    }
}
