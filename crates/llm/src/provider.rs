//! Chat model-family adapters.
//!
//! Every Bedrock chat family speaks its own JSON dialect: different prompt
//! templates, role taxonomies, streaming chunk shapes and usage accounting.
//! An adapter translates one family's dialect from and to the OpenAI format.
//! Adapters are stateless statics; anything per-request lives in the stream
//! parser an adapter hands out.

pub(crate) mod claude;
pub(crate) mod cohere;
pub(crate) mod imported;
pub(crate) mod llama;
pub(crate) mod mistral;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::LlmResult,
    images::ImageResolver,
    messages::openai::{
        ChatChoice, ChatChoiceDelta, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
        ChatResponseMessage, ChatRole, MessageDelta, ObjectType, ToolCall, Usage,
    },
};

/// Capability set every chat model family implements.
///
/// `compose_request` builds the family-specific backend body. Unary and
/// streaming parsing have default implementations driven by the two
/// field-name hooks; families with more exotic response shapes override the
/// accessors or the whole parse path.
#[async_trait]
pub(crate) trait ChatAdapter: Send + Sync {
    /// Compose the backend request body for this family.
    ///
    /// Async because multimodal content may require fetching remote images.
    async fn compose_request(&self, request: &ChatCompletionRequest, images: &ImageResolver) -> LlmResult<Value>;

    /// JSON field carrying the response text.
    fn text_field(&self) -> &'static str {
        "text"
    }

    /// JSON field carrying the finish reason.
    fn finish_reason_field(&self) -> &'static str {
        "finish_reason"
    }

    /// Extract the message text from a response or chunk body.
    fn message_text(&self, body: &Value) -> Option<String> {
        body.get(self.text_field()).and_then(Value::as_str).map(str::to_string)
    }

    /// Extract the finish reason from a response or chunk body.
    fn message_finish_reason(&self, body: &Value) -> Option<String> {
        body.get(self.finish_reason_field())
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Extract `(input tokens, output tokens)` from a unary response body.
    fn message_usage(&self, body: &Value) -> (u32, u32) {
        (
            count_field(body, "prompt_token_count"),
            count_field(body, "generation_token_count"),
        )
    }

    /// Parse a unary backend response into an OpenAI response.
    fn parse_response(
        &self,
        request: &ChatCompletionRequest,
        body: &[u8],
        message_id: &str,
    ) -> LlmResult<ChatCompletionResponse> {
        let body: Value = serde_json::from_slice(body)
            .map_err(|e| crate::error::LlmError::Internal(format!("Invalid backend response: {e}")))?;
        log::debug!("Bedrock response body: {body}");

        let (input_tokens, output_tokens) = self.message_usage(&body);

        Ok(chat_response(
            request.model.clone(),
            message_id.to_string(),
            self.message_text(&body),
            None,
            self.message_finish_reason(&body),
            input_tokens,
            output_tokens,
        ))
    }

    /// Create the per-request parser reassembling OpenAI chunks from the
    /// backend event stream.
    fn stream_parser(&self, request: &ChatCompletionRequest, message_id: String) -> Box<dyn StreamParser>;
}

/// Per-request streaming translation state.
pub(crate) trait StreamParser: Send {
    /// Translate one backend event payload into zero or more OpenAI chunks.
    fn process_chunk(&mut self, payload: &[u8]) -> LlmResult<Vec<ChatCompletionChunk>>;
}

/// Select the adapter for a chat model id.
///
/// Custom imports take precedence since their ids embed the account-chosen
/// name; unknown families fall back to the generic imported dialect.
pub(crate) fn chat_adapter(model_id: &str) -> &'static dyn ChatAdapter {
    if model_id.contains("imported-model") {
        &imported::IMPORTED
    } else if model_id.starts_with("anthropic.claude") {
        &claude::CLAUDE
    } else if model_id.starts_with("meta.llama") {
        &llama::LLAMA
    } else if model_id.starts_with("mistral.mistral") || model_id.starts_with("mistral.mixtral") {
        &mistral::MISTRAL
    } else if model_id.starts_with("cohere.command-r") {
        &cohere::COHERE_COMMAND
    } else {
        &imported::IMPORTED
    }
}

/// Generate a fresh OpenAI-style message id.
pub(crate) fn generate_message_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Build a unary chat response with a single choice.
///
/// A present tool-call list forces `finish_reason` to `tool_calls` and nulls
/// the content, regardless of what the backend reported.
pub(crate) fn chat_response(
    model: String,
    message_id: String,
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
    finish_reason: Option<String>,
    input_tokens: u32,
    output_tokens: u32,
) -> ChatCompletionResponse {
    let (content, finish_reason) = if tool_calls.is_some() {
        (None, Some("tool_calls".to_string()))
    } else {
        (content, finish_reason)
    };

    ChatCompletionResponse {
        id: message_id,
        object: ObjectType::ChatCompletion,
        created: unix_timestamp(),
        model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatResponseMessage {
                role: ChatRole::Assistant,
                content,
                tool_calls,
            },
            finish_reason,
        }],
        usage: Usage {
            prompt_tokens: input_tokens,
            completion_tokens: output_tokens,
            total_tokens: input_tokens + output_tokens,
        },
    }
}

/// Build a streamed chunk carrying a content delta, tool calls or a finish
/// reason. Tool calls force `finish_reason` to `tool_calls`.
pub(crate) fn chunk_response(
    model: String,
    message_id: String,
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
    finish_reason: Option<String>,
) -> ChatCompletionChunk {
    let (content, finish_reason) = if tool_calls.is_some() {
        (None, Some("tool_calls".to_string()))
    } else {
        (content, finish_reason)
    };

    ChatCompletionChunk {
        id: message_id,
        object: ObjectType::ChatCompletionChunk,
        created: unix_timestamp(),
        model,
        choices: vec![ChatChoiceDelta {
            index: 0,
            delta: MessageDelta {
                role: Some(ChatRole::Assistant),
                content,
                tool_calls,
            },
            finish_reason,
        }],
        usage: None,
    }
}

/// Build the terminal usage-only chunk with empty choices.
pub(crate) fn usage_chunk(model: String, message_id: String, input_tokens: u32, output_tokens: u32) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: message_id,
        object: ObjectType::ChatCompletionChunk,
        created: unix_timestamp(),
        model,
        choices: Vec::new(),
        usage: Some(Usage {
            prompt_tokens: input_tokens,
            completion_tokens: output_tokens,
            total_tokens: input_tokens + output_tokens,
        }),
    }
}

/// Read a token count that backends report as either a JSON number or a
/// numeric string. Missing or malformed counts read as zero.
pub(crate) fn count_field(body: &Value, field: &str) -> u32 {
    match body.get(field) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as u32,
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Stream parser shared by every family without a bespoke event protocol.
///
/// Each backend event is a standalone JSON chunk; the adapter's field
/// accessors pull text and finish reason out of it, and the synthetic
/// `amazon-bedrock-invocationMetrics` envelope key produces a trailing
/// usage-only chunk.
pub(crate) struct GenericStreamParser {
    adapter: &'static dyn ChatAdapter,
    model: String,
    message_id: String,
}

impl GenericStreamParser {
    pub fn new(adapter: &'static dyn ChatAdapter, model: String, message_id: String) -> Self {
        Self {
            adapter,
            model,
            message_id,
        }
    }
}

impl StreamParser for GenericStreamParser {
    fn process_chunk(&mut self, payload: &[u8]) -> LlmResult<Vec<ChatCompletionChunk>> {
        let chunk: Value = serde_json::from_slice(payload)
            .map_err(|e| crate::error::LlmError::Internal(format!("Invalid backend chunk: {e}")))?;
        log::debug!("Bedrock response chunk: {chunk}");

        let mut responses = vec![chunk_response(
            self.model.clone(),
            self.message_id.clone(),
            self.adapter.message_text(&chunk),
            None,
            self.adapter.message_finish_reason(&chunk),
        )];

        if let Some(metrics) = chunk.get("amazon-bedrock-invocationMetrics") {
            responses.push(usage_chunk(
                self.model.clone(),
                self.message_id.clone(),
                count_field(metrics, "inputTokenCount"),
                count_field(metrics, "outputTokenCount"),
            ));
        }

        Ok(responses)
    }
}
