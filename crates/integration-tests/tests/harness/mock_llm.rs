//! Mock upstream provider for integration tests
//!
//! Speaks the Gemini `generateContent` / `streamGenerateContent` API and the
//! `OpenAI` chat completions API with a canned answer. Streams send the
//! answer one word per event.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::{StreamExt, stream};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Mock provider returning a predictable answer
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    reply: String,
    delay: Duration,
    fail_status: Option<StatusCode>,
    /// Stop sending after this many stream events, keeping the connection open
    stall_after: Option<usize>,
    completion_count: AtomicU32,
    stream_count: AtomicU32,
    prompts: Mutex<Vec<String>>,
    models: Mutex<Vec<String>>,
}

/// Options for a mock server
#[derive(Default)]
pub struct MockOptions {
    pub reply: Option<String>,
    pub delay: Duration,
    pub fail_status: Option<StatusCode>,
    pub stall_after: Option<usize>,
}

impl MockLlm {
    /// Start a mock answering "Hello from the mock."
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(MockOptions::default()).await
    }

    /// Start a mock with a custom answer
    pub async fn start_with_response(reply: &str) -> anyhow::Result<Self> {
        Self::start_with(MockOptions {
            reply: Some(reply.to_owned()),
            ..MockOptions::default()
        })
        .await
    }

    pub async fn start_with(options: MockOptions) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            reply: options.reply.unwrap_or_else(|| "Hello from the mock.".to_owned()),
            delay: options.delay,
            fail_status: options.fail_status,
            stall_after: options.stall_after,
            completion_count: AtomicU32::new(0),
            stream_count: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
            models: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1beta/models/{model_action}", routing::post(handle_gemini))
            .route("/v1/chat/completions", routing::post(handle_openai))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for a Gemini provider
    pub fn gemini_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    /// Base URL for an `OpenAI`-compatible provider
    pub fn openai_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// One-shot requests received
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Streaming requests received
    pub fn stream_count(&self) -> u32 {
        self.state.stream_count.load(Ordering::Relaxed)
    }

    /// Prompts received, in arrival order
    pub fn prompts(&self) -> Vec<String> {
        self.state.prompts.lock().unwrap().clone()
    }

    /// Backend models requested, in arrival order
    pub fn models(&self) -> Vec<String> {
        self.state.models.lock().unwrap().clone()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl MockState {
    fn record(&self, model: &str, prompt: Option<&str>, stream: bool) {
        let counter = if stream {
            &self.stream_count
        } else {
            &self.completion_count
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.models.lock().unwrap().push(model.to_owned());
        self.prompts
            .lock()
            .unwrap()
            .push(prompt.unwrap_or_default().to_owned());
    }

    fn failure(&self) -> Option<Response> {
        self.fail_status.map(|status| {
            (
                status,
                Json(json!({"error": {"message": "mock server intentional failure"}})),
            )
                .into_response()
        })
    }

    fn words(&self) -> Vec<String> {
        self.reply.split_inclusive(' ').map(ToOwned::to_owned).collect()
    }

    /// SSE body sending one frame per word, then optional trailing frames
    fn sse(&self, frames: Vec<String>) -> Response {
        let stall_after = self.stall_after;
        let frames = stream::iter(frames.into_iter().enumerate()).then(move |(idx, data)| async move {
            if stall_after.is_some_and(|limit| idx >= limit) {
                std::future::pending::<()>().await;
            }
            Ok::<_, Infallible>(Event::default().data(data))
        });

        Sse::new(frames).into_response()
    }
}

async fn handle_gemini(
    State(state): State<Arc<MockState>>,
    Path(model_action): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some((model, action)) = model_action.split_once(':') else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let prompt = body["contents"][0]["parts"][0]["text"].as_str();
    let streaming = action == "streamGenerateContent";
    state.record(model, prompt, streaming);

    tokio::time::sleep(state.delay).await;

    if let Some(failure) = state.failure() {
        return failure;
    }

    if streaming {
        let frames = state
            .words()
            .into_iter()
            .map(|word| json!({"candidates": [{"content": {"role": "model", "parts": [{"text": word}]}}]}).to_string())
            .collect();
        return state.sse(frames);
    }

    Json(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": state.reply}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 5, "totalTokenCount": 10}
    }))
    .into_response()
}

async fn handle_openai(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let model = body["model"].as_str().unwrap_or_default();
    let prompt = body["messages"][0]["content"].as_str();
    let streaming = body["stream"].as_bool().unwrap_or(false);
    state.record(model, prompt, streaming);

    tokio::time::sleep(state.delay).await;

    if let Some(failure) = state.failure() {
        return failure;
    }

    if streaming {
        let mut frames: Vec<String> = state
            .words()
            .into_iter()
            .map(|word| {
                json!({
                    "id": "chatcmpl-mock",
                    "object": "chat.completion.chunk",
                    "created": 0,
                    "model": model,
                    "choices": [{"index": 0, "delta": {"content": word}, "finish_reason": null}]
                })
                .to_string()
            })
            .collect();
        frames.push("[DONE]".to_owned());
        return state.sse(frames);
    }

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 0,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": state.reply},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 5, "total_tokens": 10}
    }))
    .into_response()
}
