//! Generic adapter for custom imported models.
//!
//! Imported models have no published dialect, so the prompt uses a plain
//! `<|role|>` template and the body carries conservative default knobs. This
//! adapter is also the fallback for unrecognized model ids.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::{LlmError, LlmResult},
    images::ImageResolver,
    messages::openai::{ChatCompletionRequest, MessageContent},
    provider::{ChatAdapter, GenericStreamParser, StreamParser},
};

pub(crate) struct ImportedAdapter;

pub(crate) static IMPORTED: ImportedAdapter = ImportedAdapter;

const DEFAULT_MAX_TOKENS: u32 = 512;
const DEFAULT_TEMPERATURE: f32 = 0.5;
const DEFAULT_TOP_P: f32 = 0.9;
const DEFAULT_TOP_K: u32 = 200;

#[derive(Debug, Serialize)]
struct ImportedRequest {
    prompt: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    stop: Vec<String>,
}

#[async_trait]
impl ChatAdapter for ImportedAdapter {
    async fn compose_request(&self, request: &ChatCompletionRequest, _images: &ImageResolver) -> LlmResult<Value> {
        let mut prompt = String::new();

        for message in &request.messages {
            let content = message
                .content
                .as_ref()
                .and_then(MessageContent::as_text)
                .unwrap_or_default();

            prompt.push_str(&format!("<|{}|>{content}</s>", message.role.as_str()));
        }

        prompt.push_str("<|assistant|>");

        let body = ImportedRequest {
            prompt,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: request.top_p.unwrap_or(DEFAULT_TOP_P),
            top_k: DEFAULT_TOP_K,
            stop: Vec::new(),
        };

        serde_json::to_value(&body).map_err(|e| LlmError::Internal(format!("Failed to compose request body: {e}")))
    }

    fn text_field(&self) -> &'static str {
        "generation"
    }

    fn finish_reason_field(&self) -> &'static str {
        "stop_reason"
    }

    fn stream_parser(&self, request: &ChatCompletionRequest, message_id: String) -> Box<dyn StreamParser> {
        Box::new(GenericStreamParser::new(&IMPORTED, request.model.clone(), message_id))
    }
}
