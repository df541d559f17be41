//! Mistral / Mixtral family adapter.
//!
//! Same `[INST]` turn structure as Llama 2 but without the `<<SYS>>`
//! wrapping; system text is inlined raw at the head of the first turn.
//! Responses nest under `outputs[0]` and the backend reports no usage.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::{LlmError, LlmResult},
    images::ImageResolver,
    messages::openai::{ChatCompletionRequest, ChatRole, MessageContent},
    provider::{ChatAdapter, GenericStreamParser, StreamParser},
};

pub(crate) struct MistralAdapter;

pub(crate) static MISTRAL: MistralAdapter = MistralAdapter;

#[derive(Debug, Serialize)]
struct MistralRequest {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[async_trait]
impl ChatAdapter for MistralAdapter {
    async fn compose_request(&self, request: &ChatCompletionRequest, _images: &ImageResolver) -> LlmResult<Value> {
        let prompt = convert_prompt(request)?;
        log::debug!("Converted prompt: {}", prompt.replace('\n', "\\n"));

        let body = MistralRequest {
            prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        };

        serde_json::to_value(&body).map_err(|e| LlmError::Internal(format!("Failed to compose request body: {e}")))
    }

    fn finish_reason_field(&self) -> &'static str {
        "stop_reason"
    }

    fn message_text(&self, body: &Value) -> Option<String> {
        body.pointer("/outputs/0")
            .and_then(|output| output.get(self.text_field()))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn message_finish_reason(&self, body: &Value) -> Option<String> {
        body.pointer("/outputs/0")
            .and_then(|output| output.get(self.finish_reason_field()))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    // The backend does not report usage for this family.
    fn message_usage(&self, _body: &Value) -> (u32, u32) {
        (0, 0)
    }

    fn stream_parser(&self, request: &ChatCompletionRequest, message_id: String) -> Box<dyn StreamParser> {
        Box::new(GenericStreamParser::new(&MISTRAL, request.model.clone(), message_id))
    }
}

/// Render the prompt:
///
/// ```text
/// <s>[INST] {{ system_text }}{{ user_message }} [/INST] {{ reply }}</s>
/// <s>[INST] {{ user_message_2 }} [/INST]
/// ```
fn convert_prompt(request: &ChatCompletionRequest) -> LlmResult<String> {
    let mut prompt = String::new();
    let mut system_prompt = String::new();
    let mut end_turn = false;

    for message in &request.messages {
        if message.role == ChatRole::Tool {
            return Err(LlmError::BadRequest(
                "Tool prompt is not supported for Mistral/Mixtral model".to_string(),
            ));
        }

        let content = message
            .content
            .as_ref()
            .and_then(MessageContent::as_text)
            .ok_or_else(|| LlmError::BadRequest("Content must be a string for Mistral/Mixtral model".to_string()))?;

        match message.role {
            ChatRole::System => {
                system_prompt.push('\n');
                system_prompt.push_str(content);
                system_prompt.push('\n');
            }
            ChatRole::User => {
                if end_turn {
                    prompt.push_str("<s>[INST] ");
                }
                prompt.push_str(content);
                prompt.push_str(" [/INST] ");
                end_turn = false;
            }
            _ => {
                prompt.push_str(content);
                prompt.push_str("</s>");
                end_turn = true;
            }
        }
    }

    Ok(format!("<s>[INST] {system_prompt}{prompt}"))
}
