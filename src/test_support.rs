//! In-process stand-ins for the chat and embedding APIs used by unit tests.

use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::config::{EmbeddingConfig, LlmConfig};

/// Serve `app` on a free local port and return its base URL.
pub(crate) async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ============ Chat completions ============

#[derive(Clone)]
struct ChatState {
    replies: Arc<Mutex<VecDeque<String>>>,
    requests: Arc<Mutex<Vec<Value>>>,
}

/// `/v1/chat/completions` answering with scripted replies in order. The
/// last reply repeats once the script runs out.
pub(crate) struct ChatStub {
    pub base: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl ChatStub {
    pub(crate) async fn start(replies: &[&str]) -> Self {
        let state = ChatState {
            replies: Arc::new(Mutex::new(replies.iter().map(|r| r.to_string()).collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let requests = state.requests.clone();
        let app = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .with_state(state);
        Self {
            base: spawn_app(app).await,
            requests,
        }
    }

    pub(crate) fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            provider: "openai".to_string(),
            api_base: self.base.clone(),
            model: "stub-model".to_string(),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    pub(crate) fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// Content of the final message of every request received so far.
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r["messages"].as_array()?.last()?["content"].as_str().map(str::to_string))
            .collect()
    }
}

async fn chat_completions(State(state): State<ChatState>, Json(body): Json<Value>) -> Json<Value> {
    state.requests.lock().unwrap().push(body);
    let reply = {
        let mut replies = state.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap_or_default()
        } else {
            replies.front().cloned().unwrap_or_default()
        }
    };
    Json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": reply},
            "finish_reason": "stop"
        }]
    }))
}

// ============ Embeddings ============

#[derive(Clone)]
struct EmbedState {
    dims: usize,
    gated: bool,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

/// Ollama-style `/api/embed` returning unit vectors of a fixed width.
///
/// A gated stub signals `entered` on each request and then holds the
/// response until `release` is notified.
pub(crate) struct EmbedStub {
    pub base: String,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl EmbedStub {
    pub(crate) async fn start(dims: usize, gated: bool) -> Self {
        let state = EmbedState {
            dims,
            gated,
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        let entered = state.entered.clone();
        let release = state.release.clone();
        let app = Router::new()
            .route("/api/embed", post(embed))
            .with_state(state);
        Self {
            base: spawn_app(app).await,
            entered,
            release,
        }
    }

    pub(crate) fn embedding_config(&self, dims: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("stub-embed".to_string()),
            dims: Some(dims),
            url: Some(self.base.clone()),
            max_retries: 0,
            timeout_secs: 10,
            ..Default::default()
        }
    }
}

async fn embed(State(state): State<EmbedState>, Json(body): Json<Value>) -> Json<Value> {
    let inputs = body["input"].as_array().map(Vec::len).unwrap_or(1);
    state.entered.notify_one();
    if state.gated {
        state.release.notified().await;
    }
    let mut vector = vec![0.0f32; state.dims];
    if let Some(first) = vector.first_mut() {
        *first = 1.0;
    }
    Json(json!({ "embeddings": vec![vector; inputs] }))
}
