//! Request orchestration: adapter selection, backend invocation, and the
//! streaming plumbing between the Bedrock event source and the SSE handler.

use std::pin::Pin;

use aws_sdk_bedrockruntime::{
    primitives::event_stream::EventReceiver,
    types::{ResponseStream, error::ResponseStreamError},
};
use futures::{Stream, StreamExt, stream};

use crate::{
    bedrock::BedrockRuntime,
    embeddings,
    error::{LlmError, LlmResult},
    images::ImageResolver,
    messages::openai::{
        ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, EmbeddingsRequest, EmbeddingsResponse,
        Model, ModelsResponse, ObjectType,
    },
    provider::{self, StreamParser},
};

/// Stream of translated OpenAI chunks for one request.
pub(crate) type ChatCompletionStream = Pin<Box<dyn Stream<Item = LlmResult<ChatCompletionChunk>> + Send>>;

/// Chat model ids served by the gateway, with display names.
pub(crate) const SUPPORTED_CHAT_MODELS: &[(&str, &str)] = &[
    ("anthropic.claude-instant-v1", "Claude Instant"),
    ("anthropic.claude-v2:1", "Claude"),
    ("anthropic.claude-v2", "Claude"),
    ("anthropic.claude-3-sonnet-20240229-v1:0", "Claude 3 Sonnet"),
    ("anthropic.claude-3-opus-20240229-v1:0", "Claude 3 Opus"),
    ("anthropic.claude-3-haiku-20240307-v1:0", "Claude 3 Haiku"),
    ("meta.llama2-13b-chat-v1", "Llama 2 Chat 13B"),
    ("meta.llama2-70b-chat-v1", "Llama 2 Chat 70B"),
    ("meta.llama3-8b-instruct-v1:0", "Llama 3 8B Instruct"),
    ("meta.llama3-70b-instruct-v1:0", "Llama 3 70B Instruct"),
    ("mistral.mistral-7b-instruct-v0:2", "Mistral 7B Instruct"),
    ("mistral.mixtral-8x7b-instruct-v0:1", "Mixtral 8x7B Instruct"),
    ("mistral.mistral-large-2402-v1:0", "Mistral Large"),
    ("cohere.command-r-v1:0", "Command R"),
    ("cohere.command-r-plus-v1:0", "Command R+"),
];

/// Embedding model ids served by the gateway, with display names.
pub(crate) const SUPPORTED_EMBEDDING_MODELS: &[(&str, &str)] = &[
    ("cohere.embed-multilingual-v3", "Cohere Embed Multilingual"),
    ("cohere.embed-english-v3", "Cohere Embed English"),
];

/// Shared per-process gateway state.
///
/// Adapters themselves are stateless statics; this owns the two shared
/// resources, the Bedrock client handle and the image fetcher.
pub(crate) struct GatewayServer {
    bedrock: BedrockRuntime,
    images: ImageResolver,
}

impl GatewayServer {
    pub async fn new(config: &config::Config) -> anyhow::Result<Self> {
        Ok(Self {
            bedrock: BedrockRuntime::new(&config.bedrock).await?,
            images: ImageResolver::new(),
        })
    }

    /// Process a unary chat completion request.
    pub async fn completions(&self, request: ChatCompletionRequest) -> LlmResult<ChatCompletionResponse> {
        log::debug!("Chat completion for model: {}", request.model);

        let adapter = provider::chat_adapter(&request.model);
        let body = adapter.compose_request(&request, &self.images).await?;
        log::debug!("Bedrock request body: {body}");

        let response = self.bedrock.invoke(&request.model, encode_body(&body)?).await?;
        let message_id = provider::generate_message_id();

        adapter.parse_response(&request, &response, &message_id)
    }

    /// Process a streaming chat completion request.
    pub async fn completions_stream(&self, request: ChatCompletionRequest) -> LlmResult<ChatCompletionStream> {
        log::debug!("Streaming chat completion for model: {}", request.model);

        let adapter = provider::chat_adapter(&request.model);
        let body = adapter.compose_request(&request, &self.images).await?;
        log::debug!("Bedrock request body: {body}");

        let output = self.bedrock.invoke_stream(&request.model, encode_body(&body)?).await?;
        let parser = adapter.stream_parser(&request, provider::generate_message_id());

        Ok(event_chunk_stream(output.body, parser))
    }

    /// Process an embeddings request.
    pub async fn embeddings(&self, request: EmbeddingsRequest) -> LlmResult<EmbeddingsResponse> {
        log::debug!("Embeddings for model: {}", request.model);

        let adapter = embeddings::embeddings_adapter(&request.model)?;
        let body = adapter.compose_request(&request)?;
        log::debug!("Bedrock request body: {body}");

        let response = self.bedrock.invoke(&request.model, encode_body(&body)?).await?;

        adapter.parse_response(&request, &response)
    }
}

/// List the supported chat and embedding models.
///
/// The tables are static; the gateway performs no model discovery.
pub(crate) fn models() -> ModelsResponse {
    let data = SUPPORTED_CHAT_MODELS
        .iter()
        .chain(SUPPORTED_EMBEDDING_MODELS)
        .map(|(id, display_name)| Model {
            id: (*id).to_string(),
            object: ObjectType::Model,
            created: 0,
            owned_by: id.split('.').next().unwrap_or("bedrock").to_string(),
            display_name: (*display_name).to_string(),
        })
        .collect();

    ModelsResponse {
        object: ObjectType::List,
        data,
    }
}

fn encode_body(body: &serde_json::Value) -> LlmResult<Vec<u8>> {
    serde_json::to_vec(body).map_err(|e| LlmError::Internal(format!("Failed to encode request body: {e}")))
}

/// Drive the backend event receiver through the per-request parser.
///
/// Event payloads arrive as `{chunk: {bytes}}` parts; each part may expand
/// to zero or more OpenAI chunks. The first error is terminal: nothing is
/// produced after it, so a truncated stream is the failure signal on the
/// wire.
fn event_chunk_stream(
    events: EventReceiver<ResponseStream, ResponseStreamError>,
    parser: Box<dyn StreamParser>,
) -> ChatCompletionStream {
    let batches = stream::unfold((events, parser), |(mut events, mut parser)| async move {
        loop {
            match events.recv().await {
                Ok(Some(ResponseStream::Chunk(part))) => {
                    let Some(payload) = part.bytes else {
                        continue;
                    };

                    match parser.process_chunk(payload.as_ref()) {
                        Ok(chunks) if chunks.is_empty() => continue,
                        result => return Some((result, (events, parser))),
                    }
                }
                Ok(Some(_)) => continue,
                Ok(None) => return None,
                Err(e) => {
                    log::error!("Bedrock stream error: {e:?}");
                    return Some((Err(LlmError::Internal(format!("Stream error: {e:?}"))), (events, parser)));
                }
            }
        }
    });

    let terminal_error = batches.scan(false, |errored, batch| {
        if *errored {
            return futures::future::ready(None);
        }

        *errored = batch.is_err();
        futures::future::ready(Some(batch))
    });

    Box::pin(terminal_error.flat_map(|batch| match batch {
        Ok(chunks) => stream::iter(chunks.into_iter().map(Ok)).boxed(),
        Err(e) => stream::once(async move { Err(e) }).boxed(),
    }))
}
