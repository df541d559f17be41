//! OpenAI-compatible access gateway for Amazon Bedrock.
//!
//! Exposes the Chat Completions and Embeddings surface and translates every
//! request into the JSON dialect of the backing Bedrock model family, in
//! both unary and streaming mode.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::{get, post},
};
use axum_serde::Sonic;
use futures::StreamExt;

mod bedrock;
mod embeddings;
mod error;
mod images;
mod messages;
mod provider;
mod server;
mod tokens;

pub use error::{LlmError, LlmResult as Result};
use messages::openai::{ChatCompletionChunk, ChatCompletionRequest, EmbeddingsRequest};
use server::GatewayServer;

/// Creates an axum router exposing the OpenAI-compatible endpoints.
pub async fn router(config: &config::Config) -> anyhow::Result<Router> {
    let server = Arc::new(
        GatewayServer::new(config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize the gateway: {e}"))?,
    );

    Ok(Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/embeddings", post(embeddings))
        .route("/v1/models", get(list_models))
        .route("/health", get(health))
        .with_state(server))
}

/// Handle chat completion requests.
///
/// With `stream: true` the response is sent as Server-Sent Events ending in
/// a `data: [DONE]` frame; otherwise a standard JSON response is returned.
async fn chat_completions(
    State(server): State<Arc<GatewayServer>>,
    Sonic(request): Sonic<ChatCompletionRequest>,
) -> Result<Response> {
    log::debug!("Chat completions handler called for model: {}", request.model);
    log::debug!("Request has {} messages", request.messages.len());

    if request.stream.unwrap_or(false) {
        let include_usage = request
            .stream_options
            .as_ref()
            .is_some_and(|options| options.include_usage);

        let stream = server.completions_stream(request).await?;

        let event_stream = stream
            .filter_map(move |result| {
                let frame = frame_payload(result, include_usage)
                    .map(|payload| payload.map(|json| Event::default().data(json)));

                futures::future::ready(frame)
            })
            .chain(futures::stream::once(async {
                Ok(Event::default().data("[DONE]"))
            }));

        Ok(Sse::new(event_stream).into_response())
    } else {
        let response = server.completions(request).await?;

        Ok(Json(response).into_response())
    }
}

/// Convert one parsed chunk into its SSE frame payload.
///
/// Usage-only chunks (empty `choices`) pass only when the client opted in
/// via `stream_options.include_usage`. A mid-stream error is forwarded as a
/// body error, terminating the response without the `[DONE]` frame.
fn frame_payload(
    result: Result<ChatCompletionChunk>,
    include_usage: bool,
) -> Option<std::result::Result<String, LlmError>> {
    match result {
        Ok(chunk) if chunk.choices.is_empty() && !include_usage => None,
        Ok(chunk) => {
            let json = sonic_rs::to_string(&chunk).unwrap_or_else(|e| {
                log::error!("Failed to serialize chunk: {e}");
                r#"{"error":"serialization failed"}"#.to_string()
            });

            Some(Ok(json))
        }
        Err(e) => {
            log::error!("Stream error: {e}");
            Some(Err(e))
        }
    }
}

/// Handle embeddings requests.
async fn embeddings(
    State(server): State<Arc<GatewayServer>>,
    Sonic(request): Sonic<EmbeddingsRequest>,
) -> Result<impl IntoResponse> {
    log::debug!("Embeddings handler called for model: {}", request.model);

    let response = server.embeddings(request).await?;

    Ok(Json(response))
}

/// Handle list models requests.
async fn list_models() -> impl IntoResponse {
    Json(server::models())
}

/// Liveness probe.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
