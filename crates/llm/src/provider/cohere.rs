//! Cohere Command R family adapter.
//!
//! The dialect separates the current message from the chat history and uses
//! its own role taxonomy (`USER`/`CHATBOT`). Response text and finish reason
//! use the default field names.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::{LlmError, LlmResult},
    images::ImageResolver,
    messages::openai::{ChatCompletionRequest, ChatMessage, ChatRole, MessageContent},
    provider::{ChatAdapter, GenericStreamParser, StreamParser},
};

pub(crate) struct CohereCommandAdapter;

pub(crate) static COHERE_COMMAND: CohereCommandAdapter = CohereCommandAdapter;

#[derive(Debug, Serialize)]
struct CohereCommandRequest {
    message: String,
    chat_history: Vec<CohereChatTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct CohereChatTurn {
    role: &'static str,
    message: String,
}

#[async_trait]
impl ChatAdapter for CohereCommandAdapter {
    async fn compose_request(&self, request: &ChatCompletionRequest, _images: &ImageResolver) -> LlmResult<Value> {
        let Some((last, history)) = request.messages.split_last() else {
            return Err(LlmError::BadRequest(
                "Last message should be a valid user message".to_string(),
            ));
        };

        if last.role != ChatRole::User {
            return Err(LlmError::BadRequest(
                "Last message should be a valid user message".to_string(),
            ));
        }

        let chat_history = history.iter().map(convert_turn).collect::<LlmResult<Vec<_>>>()?;

        let body = CohereCommandRequest {
            message: message_text(last)?,
            chat_history,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            p: request.top_p,
        };

        serde_json::to_value(&body).map_err(|e| LlmError::Internal(format!("Failed to compose request body: {e}")))
    }

    fn stream_parser(&self, request: &ChatCompletionRequest, message_id: String) -> Box<dyn StreamParser> {
        Box::new(GenericStreamParser::new(
            &COHERE_COMMAND,
            request.model.clone(),
            message_id,
        ))
    }
}

fn convert_turn(message: &ChatMessage) -> LlmResult<CohereChatTurn> {
    let role = match message.role {
        ChatRole::User => "USER",
        ChatRole::Assistant => "CHATBOT",
        _ => {
            return Err(LlmError::BadRequest(
                "Only user or assistant message is supported".to_string(),
            ));
        }
    };

    Ok(CohereChatTurn {
        role,
        message: message_text(message)?,
    })
}

fn message_text(message: &ChatMessage) -> LlmResult<String> {
    message
        .content
        .as_ref()
        .and_then(MessageContent::as_text)
        .map(str::to_string)
        .ok_or_else(|| LlmError::BadRequest("Content must be a string".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::tests::request;

    #[tokio::test]
    async fn splits_history_from_the_last_message() {
        let req = request(
            "cohere.command-r-v1:0",
            vec![
                (ChatRole::User, "U1"),
                (ChatRole::Assistant, "A1"),
                (ChatRole::User, "U2"),
            ],
        );

        let body = COHERE_COMMAND.compose_request(&req, &ImageResolver::new()).await.unwrap();

        assert_eq!(body["message"], "U2");
        assert_eq!(
            body["chat_history"],
            serde_json::json!([
                {"role": "USER", "message": "U1"},
                {"role": "CHATBOT", "message": "A1"}
            ])
        );
        assert_eq!(body["p"], serde_json::json!(0.75));
    }

    #[tokio::test]
    async fn rejects_a_non_user_final_message() {
        let req = request(
            "cohere.command-r-plus-v1:0",
            vec![(ChatRole::User, "U1"), (ChatRole::Assistant, "A1")],
        );

        let error = COHERE_COMMAND
            .compose_request(&req, &ImageResolver::new())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            LlmError::BadRequest(message) if message == "Last message should be a valid user message"
        ));
    }

    #[tokio::test]
    async fn rejects_system_messages_in_history() {
        let req = request(
            "cohere.command-r-v1:0",
            vec![(ChatRole::System, "S"), (ChatRole::User, "U1")],
        );

        let error = COHERE_COMMAND
            .compose_request(&req, &ImageResolver::new())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            LlmError::BadRequest(message) if message == "Only user or assistant message is supported"
        ));
    }

    #[test]
    fn uses_default_response_fields() {
        let body = serde_json::json!({"text": "Hello", "finish_reason": "COMPLETE"});

        assert_eq!(COHERE_COMMAND.message_text(&body).as_deref(), Some("Hello"));
        assert_eq!(COHERE_COMMAND.message_finish_reason(&body).as_deref(), Some("COMPLETE"));
    }
}
