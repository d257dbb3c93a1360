//! Axum routes for the OpenAI-compatible surface

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, Router, routing};
use conduit_core::{HttpError, RequestContext};
use futures_util::stream;
use serde::Serialize;

use crate::adaptor::SyncOutcome;
use crate::convert::unix_now;
use crate::error::RelayError;
use crate::sse::{SseEncoder, event_stream_headers};
use crate::state::LlmState;
use crate::transport::UpstreamResponse;
use crate::types::ChatRequest;

/// Routes for chat completions and the model list
pub fn llm_router(state: LlmState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/models", routing::get(list_models))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
///
/// The body is parsed by hand so malformed input gets the same JSON error
/// shape as every other failure.
async fn chat_completions(
    State(state): State<LlmState>,
    Extension(context): Extension<RequestContext>,
    body: Bytes,
) -> Response {
    let request = match ChatRequest::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    if request.stream {
        stream_completion(&state, &request, &context).await
    } else {
        match state.complete(&request, &context).await {
            Ok(SyncOutcome::Passthrough(upstream)) => passthrough_response(upstream),
            Ok(SyncOutcome::Unified(response)) => Json(response).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

async fn stream_completion(state: &LlmState, request: &ChatRequest, context: &RequestContext) -> Response {
    let relay = match state.complete_stream(request, context).await {
        Ok(relay) => relay,
        Err(e) => return error_response(&e),
    };

    let (encoder, frames) = SseEncoder::channel(state.stream_buffer());
    tokio::spawn(relay.run(encoder));

    // the receiver closes when the client goes away, which the encoder sees
    let body = stream::unfold(frames, |mut frames| async move {
        frames.recv().await.map(|frame| (Ok::<_, Infallible>(frame), frames))
    });

    (event_stream_headers(), Body::from_stream(body)).into_response()
}

/// Relay an upstream answer unchanged, minus connection-level headers
fn passthrough_response(upstream: UpstreamResponse) -> Response {
    let UpstreamResponse { status, headers, body } = upstream;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = end_to_end_headers(headers);
    response
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn end_to_end_headers(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    // recomputed from the buffered body
    headers.remove(header::CONTENT_LENGTH);
    headers
}

#[derive(Debug, Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelEntry>,
}

#[derive(Debug, Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    created: u64,
    owned_by: String,
}

/// Handle `GET /v1/models`
async fn list_models(State(state): State<LlmState>) -> Response {
    let created = unix_now();

    let data = state
        .registry()
        .models()
        .into_iter()
        .map(|(model, provider)| ModelEntry {
            id: model.to_owned(),
            object: "model",
            created,
            owned_by: provider.to_owned(),
        })
        .collect();

    Json(ModelList { object: "list", data }).into_response()
}

/// Unified JSON error body with the mapped status
fn error_response(error: &RelayError) -> Response {
    (error.status_code(), Json(error.to_json_body())).into_response()
}
