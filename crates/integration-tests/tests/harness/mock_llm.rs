//! Mock upstream speaking the OpenAI, Anthropic and Gemini wire formats
//!
//! One instance serves all three APIs. Its [`Behavior`] decides whether
//! answers are well formed, broken, cut short or endless.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::stream;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Well-formed answers
    Normal,
    /// Every request fails with this status
    Status(u16),
    /// Streams carry an unparseable frame after the first event
    Malformed,
    /// Streams start with an unparseable frame
    MalformedFirst,
    /// Streams close without their terminal event
    SilentClose,
    /// Streams close without sending anything
    Empty,
    /// Streams never end
    Endless,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

struct MockState {
    behavior: Behavior,
    requests: Mutex<Vec<RecordedRequest>>,
    open_streams: Arc<AtomicU32>,
}

impl MockState {
    fn record(&self, uri: &Uri, headers: HeaderMap, body: Value) {
        let request = RecordedRequest {
            path: uri.to_string(),
            headers,
            body,
        };
        self.requests.lock().expect("mock lock").push(request);
    }
}

pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockLlm {
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(Behavior::Normal).await
    }

    pub async fn start_with(behavior: Behavior) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            behavior,
            requests: Mutex::new(Vec::new()),
            open_streams: Arc::new(AtomicU32::new(0)),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(openai))
            .route("/v1/messages", routing::post(anthropic))
            .route("/v1beta/models/{action}", routing::post(gemini))
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

    /// Base URL for OpenAI and Anthropic providers
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Base URL for Google providers
    pub fn gemini_base_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().expect("mock lock").clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("mock received a request")
    }

    /// Streams whose body is still being read
    pub fn open_streams(&self) -> u32 {
        self.state.open_streams.load(Ordering::SeqCst)
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Handlers --

async fn openai(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let stream = body["stream"].as_bool().unwrap_or(false);
    let model = body["model"].as_str().unwrap_or_default().to_owned();
    state.record(&uri, headers, body);

    if let Behavior::Status(code) = state.behavior {
        return failure(code);
    }

    if !stream {
        let mut response = Json(openai_completion(&model)).into_response();
        response
            .headers_mut()
            .insert("x-request-id", "mock-req-1".parse().expect("valid header"));
        return response;
    }

    let chunk = {
        let model = model.clone();
        move |delta: Value| {
            format!(
                "data: {}\n\n",
                json!({
                    "id": "chatcmpl-mock", "object": "chat.completion.chunk", "created": 1, "model": model,
                    "choices": [{"index": 0, "delta": delta, "finish_reason": null}]
                })
            )
        }
    };

    let mut frames = vec![
        ": keep-alive\n\n".to_owned(),
        chunk(json!({"role": "assistant", "content": ""})),
        chunk(json!({"content": "Hello"})),
    ];
    if matches!(state.behavior, Behavior::Malformed | Behavior::MalformedFirst) {
        frames.push("data: {oops\n\n".to_owned());
    }
    frames.push(chunk(json!({"content": " world"})));
    frames.push(format!(
        "data: {}\n\n",
        json!({
            "id": "chatcmpl-mock", "object": "chat.completion.chunk", "created": 1, "model": model,
            "choices": [], "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        })
    ));
    if state.behavior != Behavior::SilentClose {
        frames.push("data: [DONE]\n\n".to_owned());
    }

    let endless = move |n: u32| chunk(json!({"content": format!("tick {n}")}));
    sse(&state, frames, endless)
}

async fn anthropic(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let stream = body["stream"].as_bool().unwrap_or(false);
    state.record(&uri, headers, body);

    if let Behavior::Status(code) = state.behavior {
        return failure(code);
    }

    if !stream {
        return Json(json!({
            "id": "msg_01", "type": "message", "role": "assistant", "model": "claude-3-5-haiku-20241022",
            "content": [{"type": "text", "text": "Hello world"}],
            "stop_reason": "end_turn", "stop_sequence": null,
            "usage": {"input_tokens": 10, "output_tokens": 3}
        }))
        .into_response();
    }

    let mut frames = Vec::new();
    if state.behavior == Behavior::MalformedFirst {
        frames.push("event: message_start\ndata: {oops\n\n".to_owned());
    }
    frames.push(event(
        "message_start",
        json!({"type": "message_start", "message": {
            "id": "msg_01", "type": "message", "role": "assistant", "model": "claude-3-5-haiku-20241022",
            "content": [], "stop_reason": null, "usage": {"input_tokens": 10, "output_tokens": 1}
        }}),
    ));
    frames.push(event(
        "content_block_start",
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
    ));
    frames.push(event("ping", json!({"type": "ping"})));
    frames.push(text_delta("Hello"));
    if state.behavior == Behavior::Malformed {
        frames.push("event: content_block_delta\ndata: {oops\n\n".to_owned());
    }
    frames.push(text_delta(" world"));
    frames.push(event(
        "content_block_stop",
        json!({"type": "content_block_stop", "index": 0}),
    ));
    if state.behavior != Behavior::SilentClose {
        frames.push(event(
            "message_delta",
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn", "stop_sequence": null},
                   "usage": {"output_tokens": 3}}),
        ));
        frames.push(event("message_stop", json!({"type": "message_stop"})));
    }

    sse(&state, frames, |n| text_delta(&format!("tick {n}")))
}

async fn gemini(
    State(state): State<Arc<MockState>>,
    Path(action): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(&uri, headers, body);

    if let Behavior::Status(code) = state.behavior {
        return failure(code);
    }

    let candidate = |text: &str, finish: Option<&str>| {
        let mut candidate = json!({"content": {"role": "model", "parts": [{"text": text}]}, "index": 0});
        if let Some(finish) = finish {
            candidate["finishReason"] = json!(finish);
        }
        candidate
    };
    let usage = json!({"promptTokenCount": 10, "candidatesTokenCount": 3, "totalTokenCount": 13});

    if !action.ends_with(":streamGenerateContent") {
        return Json(json!({
            "candidates": [candidate("Hello world", Some("STOP"))],
            "usageMetadata": usage,
            "modelVersion": "gemini-2.0-flash"
        }))
        .into_response();
    }

    let frame = |value: Value| format!("data: {value}\r\n\r\n");

    let mut frames = Vec::new();
    if state.behavior == Behavior::MalformedFirst {
        frames.push("data: {oops\r\n\r\n".to_owned());
    }
    frames.push(frame(json!({"candidates": [candidate("Hello", None)], "modelVersion": "gemini-2.0-flash"})));
    if state.behavior == Behavior::Malformed {
        frames.push("data: {oops\r\n\r\n".to_owned());
    }
    frames.push(frame(json!({
        "candidates": [candidate(" world", Some("STOP"))],
        "usageMetadata": usage,
        "modelVersion": "gemini-2.0-flash"
    })));

    sse(&state, frames, move |n| {
        frame(json!({"candidates": [candidate(&format!("tick {n}"), None)]}))
    })
}

// -- Helpers --

fn event(name: &str, data: Value) -> String {
    format!("event: {name}\ndata: {data}\n\n")
}

fn text_delta(text: &str) -> String {
    event(
        "content_block_delta",
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}}),
    )
}

fn failure(code: u16) -> Response {
    let status = StatusCode::from_u16(code).expect("valid status");
    (
        status,
        Json(json!({"error": {"message": "mock failure", "type": "mock_error"}})),
    )
        .into_response()
}

fn openai_completion(model: &str) -> Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello world"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
    })
}

/// Decrements the open stream count when the body is dropped
struct StreamGuard(Arc<AtomicU32>);

impl StreamGuard {
    fn new(count: &Arc<AtomicU32>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Feed<F> {
    frames: VecDeque<String>,
    endless: Option<(F, u32)>,
    _guard: StreamGuard,
}

/// SSE response sending `frames` with a short pause between each
///
/// With [`Behavior::Endless`] the canned frames are replaced by an
/// infinite sequence built with `tick`.
fn sse<F>(state: &MockState, frames: Vec<String>, tick: F) -> Response
where
    F: Fn(u32) -> String + Send + 'static,
{
    let endless = state.behavior == Behavior::Endless;
    let frames = match state.behavior {
        Behavior::Empty | Behavior::Endless => VecDeque::new(),
        _ => frames.into(),
    };

    let feed = Feed {
        frames,
        endless: endless.then_some((tick, 0)),
        _guard: StreamGuard::new(&state.open_streams),
    };

    let body = stream::unfold(feed, |mut feed| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;

        let frame = match feed.frames.pop_front() {
            Some(frame) => frame,
            None => {
                let (tick, n) = feed.endless.as_mut()?;
                *n += 1;
                tick(*n)
            }
        };

        Some((Ok::<_, Infallible>(frame), feed))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(body))
        .expect("valid response")
}
