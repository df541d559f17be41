//! Meta Llama family adapter.
//!
//! Llama models take a single rendered prompt string. Llama 3 uses the
//! header-tag template, Llama 2 the `[INST]` turn structure; the model id
//! prefix picks the template.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::{LlmError, LlmResult},
    images::ImageResolver,
    messages::openai::{ChatCompletionRequest, ChatRole, MessageContent},
    provider::{ChatAdapter, GenericStreamParser, StreamParser},
};

pub(crate) struct LlamaAdapter;

pub(crate) static LLAMA: LlamaAdapter = LlamaAdapter;

#[derive(Debug, Serialize)]
struct LlamaRequest {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_gen_len: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[async_trait]
impl ChatAdapter for LlamaAdapter {
    async fn compose_request(&self, request: &ChatCompletionRequest, _images: &ImageResolver) -> LlmResult<Value> {
        let prompt = if request.model.starts_with("meta.llama2") {
            llama2_prompt(request)?
        } else {
            llama3_prompt(request)?
        };
        log::debug!("Converted prompt: {}", prompt.replace('\n', "\\n"));

        let body = LlamaRequest {
            prompt,
            max_gen_len: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
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
        Box::new(GenericStreamParser::new(&LLAMA, request.model.clone(), message_id))
    }
}

/// Render the Llama 3 prompt:
///
/// ```text
/// <|begin_of_text|><|start_header_id|>system<|end_header_id|>
///
/// {{ system_prompt }}<|eot_id|><|start_header_id|>user<|end_header_id|>
///
/// {{ user_message }}<|eot_id|><|start_header_id|>assistant<|end_header_id|>
/// ```
fn llama3_prompt(request: &ChatCompletionRequest) -> LlmResult<String> {
    let mut prompt = String::from("<|begin_of_text|>");

    for message in &request.messages {
        let content = message
            .content
            .as_ref()
            .and_then(MessageContent::as_text)
            .ok_or_else(|| LlmError::BadRequest("Content must be a string for Llama 3 model".to_string()))?;

        prompt.push_str(&format!(
            "<|start_header_id|>{}<|end_header_id|>\n\n{content}<|eot_id|>",
            message.role.as_str()
        ));
    }

    prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");

    Ok(prompt)
}

/// Render the Llama 2 prompt:
///
/// ```text
/// <s>[INST] <<SYS>>\n{{ system_prompt }}\n<</SYS>>{{ user_message }} [/INST] {{ reply }}</s>
/// <s>[INST] {{ user_message_2 }} [/INST]
/// ```
///
/// System messages collapse into a single `<<SYS>>` block inlined at the
/// first user turn.
fn llama2_prompt(request: &ChatCompletionRequest) -> LlmResult<String> {
    let mut prompt = String::new();
    let mut system_prompt = String::new();
    let mut end_turn = false;

    for message in &request.messages {
        if message.role == ChatRole::Tool {
            return Err(LlmError::BadRequest(
                "Tool prompt is not supported for Llama 2 model".to_string(),
            ));
        }

        let content = message
            .content
            .as_ref()
            .and_then(MessageContent::as_text)
            .ok_or_else(|| LlmError::BadRequest("Content must be a string for Llama 2 model".to_string()))?;

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

    let system_block = if system_prompt.is_empty() {
        String::new()
    } else {
        format!("<<SYS>>{system_prompt}<</SYS>>")
    };

    Ok(format!("<s>[INST] {system_block}{prompt}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::tests::request;

    #[tokio::test]
    async fn renders_the_llama3_template() {
        let req = request(
            "meta.llama3-8b-instruct-v1:0",
            vec![(ChatRole::System, "be terse"), (ChatRole::User, "hi")],
        );

        let body = LLAMA.compose_request(&req, &ImageResolver::new()).await.unwrap();

        assert_eq!(
            body["prompt"].as_str().unwrap(),
            "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\nbe terse<|eot_id|>\
             <|start_header_id|>user<|end_header_id|>\n\nhi<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>\n\n"
        );
    }

    #[tokio::test]
    async fn renders_the_llama2_template_over_multiple_turns() {
        let req = request(
            "meta.llama2-13b-chat-v1",
            vec![
                (ChatRole::System, "S"),
                (ChatRole::User, "U1"),
                (ChatRole::Assistant, "A1"),
                (ChatRole::User, "U2"),
            ],
        );

        let body = LLAMA.compose_request(&req, &ImageResolver::new()).await.unwrap();

        assert_eq!(
            body["prompt"].as_str().unwrap(),
            "<s>[INST] <<SYS>>\nS\n<</SYS>>U1 [/INST] A1</s><s>[INST] U2 [/INST] "
        );
    }

    #[tokio::test]
    async fn generation_knobs_land_in_the_body() {
        let req = request("meta.llama3-70b-instruct-v1:0", vec![(ChatRole::User, "hi")]);

        let body = LLAMA.compose_request(&req, &ImageResolver::new()).await.unwrap();

        assert_eq!(body["max_gen_len"], serde_json::json!(512));
        assert_eq!(body["temperature"], serde_json::json!(0.5));
        assert_eq!(body["top_p"], serde_json::json!(0.75));
    }

    #[tokio::test]
    async fn llama2_rejects_tool_messages() {
        let req = request(
            "meta.llama2-70b-chat-v1",
            vec![(ChatRole::User, "hi"), (ChatRole::Tool, "result")],
        );

        let error = LLAMA.compose_request(&req, &ImageResolver::new()).await.unwrap_err();

        assert!(matches!(
            error,
            LlmError::BadRequest(message) if message == "Tool prompt is not supported for Llama 2 model"
        ));
    }

    #[test]
    fn parses_unary_response_with_usage() {
        let req = request("meta.llama3-8b-instruct-v1:0", vec![(ChatRole::User, "hi")]);

        let body = serde_json::json!({
            "generation": "Hello!",
            "stop_reason": "stop",
            "prompt_token_count": 12,
            "generation_token_count": 3
        });

        let response = LLAMA
            .parse_response(&req, body.to_string().as_bytes(), "chatcmpl-test")
            .unwrap();

        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hello!"));
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage.prompt_tokens, 12);
        assert_eq!(response.usage.completion_tokens, 3);
        assert_eq!(response.usage.total_tokens, 15);
    }
}
