use std::sync::Arc;
use std::time::Duration;
use serde_json::json;
use tokio::sync::mpsc;
use async_trait::async_trait;
use agent_relay::api::{build_router, AppState};
use agent_relay::engine::{Engine, EngineControl, EngineInvocation, EngineMessage, EngineQuery};
use agent_relay::session::SessionManager;
use agent_relay::Result;
use futures::StreamExt;

struct NoopControl;
#[async_trait]
impl EngineControl for NoopControl {
    async fn interrupt(&self) {}
    async fn abort(&self) {}
}

struct Simple;
impl Engine for Simple {
    fn query(&self, query: EngineQuery) -> Result<EngineInvocation> {
        let (tx, rx) = mpsc::channel(32);
        let mut prompt = query.prompt;
        tokio::spawn(async move {
            let _ = prompt.recv().await;
            let v = json!({"type":"system","subtype":"init","session_id":"x"});
            let msg: EngineMessage = serde_json::from_value(v).unwrap();
            let _ = tx.send(Ok(msg)).await;
        });
        Ok(EngineInvocation{messages: rx, control: Arc::new(NoopControl)})
    }
}

#[tokio::main]
async fn main() {
    let state = AppState {
        sessions: Arc::new(SessionManager::new(Arc::new(Simple))),
        keep_alive: Duration::from_secs(15),
    };
    let app = build_router(state, &[]);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { let _ = axum::serve(listener, app).await; });

    let http = reqwest::Client::new();
    let created: serde_json::Value = http.post(format!("http://{addr}/sessions"))
        .json(&json!({"message":"hi"})).send().await.unwrap().json().await.unwrap();
    println!("created: {created:?}");
    let id = created["sessionId"].as_str().unwrap();
    println!("id={id}");

    let resp = http.get(format!("http://{addr}/sessions/{id}/events")).send().await.unwrap();
    println!("status: {}", resp.status());
    let mut stream = resp.bytes_stream();
    let deadline = tokio::time::sleep(Duration::from_secs(3));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            chunk = stream.next() => {
                match chunk {
                    Some(Ok(b)) => println!("chunk: {:?}", String::from_utf8_lossy(&b)),
                    Some(Err(e)) => { println!("err: {e}"); break; }
                    None => { println!("stream ended"); break; }
                }
            }
            _ = &mut deadline => { println!("timeout"); break; }
        }
    }
}
