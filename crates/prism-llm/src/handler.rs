//! Axum route handlers for the `OpenAI`-compatible endpoints

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, Router, routing};
use futures_util::{Stream, StreamExt};
use prism_core::{HttpError, RequestContext};

use crate::convert::openai::{chunk_to_openai, usage_to_openai_chunk};
use crate::error::LlmError;
use crate::gateway::{LlmState, unix_now};
use crate::protocol::openai::{OpenAiErrorResponse, OpenAiModel, OpenAiModelList, OpenAiRequest, OpenAiResponse};
use crate::stream::EventStream;
use crate::types::{ChatRequest, StreamEvent};

/// Build the LLM router with all endpoints
pub fn llm_router(state: LlmState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/models", routing::get(list_models))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
async fn chat_completions(
    State(state): State<LlmState>,
    Extension(context): Extension<RequestContext>,
    payload: Result<Json<OpenAiRequest>, JsonRejection>,
) -> Response {
    let Json(wire_request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(&rejection),
    };

    let request = match ChatRequest::try_from(wire_request) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    if request.stream {
        match state.complete_stream(request, context).await {
            Ok((model, events)) => stream_response(events, model).into_response(),
            Err(e) => error_response(&e),
        }
    } else {
        match state.complete(request, context).await {
            Ok(response) => Json(OpenAiResponse::from(response)).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

/// Handle `GET /v1/models`
async fn list_models(State(state): State<LlmState>) -> Json<OpenAiModelList> {
    let created = unix_now();

    let data = state
        .list_models()
        .into_iter()
        .map(|entry| OpenAiModel {
            id: entry.id,
            object: "model".to_owned(),
            created,
            owned_by: entry.owned_by.as_str().to_owned(),
        })
        .collect();

    Json(OpenAiModelList {
        object: "list".to_owned(),
        data,
    })
}

/// Render events as `data:` frames, ending with `[DONE]`
///
/// A failure after the stream started becomes one error frame; the event
/// stream itself supplies the closing [`StreamEvent::Done`].
fn stream_response(events: EventStream, model: String) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let created = unix_now();
    let mut response_id = String::new();

    let frames = events.map(move |result| {
        let data = match result {
            Ok(StreamEvent::Chunk(chunk)) => {
                if response_id.is_empty() {
                    response_id.clone_from(&chunk.id);
                }
                serde_json::to_string(&chunk_to_openai(chunk, &model, created)).unwrap_or_default()
            }
            Ok(StreamEvent::Usage(usage)) => {
                serde_json::to_string(&usage_to_openai_chunk(usage, &response_id, &model, created)).unwrap_or_default()
            }
            Ok(StreamEvent::Done) => "[DONE]".to_owned(),
            Err(e) => {
                tracing::warn!(error = %e, "stream aborted");
                serde_json::to_string(&error_body(&e)).unwrap_or_default()
            }
        };

        Ok(Event::default().data(data))
    });

    Sse::new(frames).keep_alive(KeepAlive::default())
}

fn error_body(error: &LlmError) -> OpenAiErrorResponse {
    OpenAiErrorResponse::new(error.client_message(), error.error_type())
}

/// Convert an LLM error to an `OpenAI`-style JSON error response
fn error_response(error: &LlmError) -> Response {
    if error.status_code().is_server_error() {
        tracing::error!(error = %error, "chat completion failed");
    }

    (error.status_code(), Json(error_body(error))).into_response()
}

fn rejection_response(rejection: &JsonRejection) -> Response {
    let body = OpenAiErrorResponse::new(rejection.body_text(), "invalid_request_error");
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn timeout_renders_gateway_timeout() {
        let response = error_response(&LlmError::UpstreamTimeout {
            provider: "gemini",
            after: Duration::from_secs(30),
        });

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "timeout_error");
        assert_eq!(body["error"]["message"], "the upstream provider timed out");
        assert!(body["error"]["code"].is_null());
    }

    #[tokio::test]
    async fn internal_details_are_not_exposed() {
        let response = error_response(&LlmError::Internal(anyhow::anyhow!("secret stack detail")));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "an internal error occurred");
    }

    #[tokio::test]
    async fn invalid_request_is_bad_request() {
        let response = error_response(&LlmError::InvalidRequest("messages must not be empty".to_owned()));

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }
}
