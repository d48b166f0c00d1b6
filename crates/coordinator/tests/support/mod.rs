// Fake inference backend for integration tests

#![allow(dead_code)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use sharegrid_common::config::NodeClientConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How the fake backend answers chat calls
#[derive(Debug, Clone)]
pub enum Behavior {
    /// `{"message": {"content": ...}}`
    Message(&'static str),
    /// `{"response": ...}`
    Flat(&'static str),
    /// Non-2xx status with a text body
    Status(u16),
    /// 200 with a body that is not JSON
    Garbage,
    /// Answer after a delay
    Slow(u64, &'static str),
}

#[derive(Clone)]
struct BackendState {
    behavior: Behavior,
    models: Vec<String>,
    chat_calls: Arc<AtomicUsize>,
    last_auth: Arc<Mutex<Option<String>>>,
    last_request: Arc<Mutex<Option<Value>>>,
}

/// A running fake backend
pub struct FakeBackend {
    pub addr: SocketAddr,
    chat_calls: Arc<AtomicUsize>,
    last_auth: Arc<Mutex<Option<String>>>,
    last_request: Arc<Mutex<Option<Value>>>,
}

impl FakeBackend {
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn last_auth(&self) -> Option<String> {
        self.last_auth.lock().clone()
    }

    pub fn last_request(&self) -> Option<Value> {
        self.last_request.lock().clone()
    }
}

async fn chat(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_auth.lock() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *state.last_request.lock() = Some(body);

    match state.behavior {
        Behavior::Message(text) => Json(json!({
            "model": "test",
            "message": {"role": "assistant", "content": text},
            "done": true
        }))
        .into_response(),
        Behavior::Flat(text) => Json(json!({"response": text, "done": true})).into_response(),
        Behavior::Status(code) => (
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            "backend failure",
        )
            .into_response(),
        Behavior::Garbage => (StatusCode::OK, "definitely not json").into_response(),
        Behavior::Slow(ms, text) => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Json(json!({"message": {"role": "assistant", "content": text}})).into_response()
        }
    }
}

async fn tags(State(state): State<BackendState>) -> Json<Value> {
    let models: Vec<Value> = state.models.iter().map(|m| json!({"name": m})).collect();
    Json(json!({ "models": models }))
}

/// Start a fake backend on an ephemeral port
pub async fn spawn_backend(behavior: Behavior, models: &[&str]) -> FakeBackend {
    let state = BackendState {
        behavior,
        models: models.iter().map(|m| m.to_string()).collect(),
        chat_calls: Arc::new(AtomicUsize::new(0)),
        last_auth: Arc::new(Mutex::new(None)),
        last_request: Arc::new(Mutex::new(None)),
    };

    let backend = FakeBackend {
        addr: "127.0.0.1:0".parse().unwrap(),
        chat_calls: Arc::clone(&state.chat_calls),
        last_auth: Arc::clone(&state.last_auth),
        last_request: Arc::clone(&state.last_request),
    };

    let app = Router::new()
        .route("/api/chat", post(chat))
        .route("/api/tags", get(tags))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeBackend { addr, ..backend }
}

/// An address nothing listens on
pub async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Client settings small enough for tests
pub fn fast_client_config() -> NodeClientConfig {
    NodeClientConfig {
        connect_timeout_ms: 200,
        request_timeout_ms: 300,
        max_retries: 2,
        retry_backoff_ms: 10,
        pool_max_idle_per_host: 4,
        probe_timeout_ms: 300,
    }
}
