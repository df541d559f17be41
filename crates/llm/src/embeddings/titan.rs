//! Amazon Titan embeddings adapter.
//!
//! Titan embeds one document per invocation; the image variant additionally
//! takes an embedding configuration block.

use serde::Deserialize;
use serde_json::Value;

use crate::{
    embeddings::{EmbeddingsAdapter, embeddings_response},
    error::{LlmError, LlmResult},
    messages::openai::{EmbeddingsInput, EmbeddingsRequest, EmbeddingsResponse},
};

#[derive(Debug)]
pub(crate) struct TitanEmbeddingsAdapter;

pub(crate) static TITAN_EMBED: TitanEmbeddingsAdapter = TitanEmbeddingsAdapter;

const IMAGE_MODEL_ID: &str = "amazon.titan-embed-image-v1";
const DEFAULT_OUTPUT_EMBEDDING_LENGTH: u32 = 1024;

#[derive(Debug, Deserialize)]
struct TitanEmbedResponse {
    embedding: Vec<f32>,
    #[serde(rename = "inputTextTokenCount", default)]
    input_text_token_count: u32,
}

impl EmbeddingsAdapter for TitanEmbeddingsAdapter {
    fn compose_request(&self, request: &EmbeddingsRequest) -> LlmResult<Value> {
        let input_text = match &request.input {
            EmbeddingsInput::Text(text) => text.clone(),
            EmbeddingsInput::Texts(texts) if texts.len() == 1 => texts[0].clone(),
            _ => {
                return Err(LlmError::BadRequest(
                    "Amazon Titan embeddings models support only single strings as input".to_string(),
                ));
            }
        };

        let mut body = serde_json::json!({ "inputText": input_text });

        if request.model == IMAGE_MODEL_ID {
            body["embeddingConfig"] = request
                .embedding_config
                .clone()
                .unwrap_or_else(|| serde_json::json!({ "outputEmbeddingLength": DEFAULT_OUTPUT_EMBEDDING_LENGTH }));
        }

        Ok(body)
    }

    fn parse_response(&self, request: &EmbeddingsRequest, body: &[u8]) -> LlmResult<EmbeddingsResponse> {
        let response: TitanEmbedResponse = serde_json::from_slice(body)
            .map_err(|e| LlmError::Internal(format!("Invalid backend response: {e}")))?;

        Ok(embeddings_response(
            request.model.clone(),
            vec![response.embedding],
            request.encoding_format,
            response.input_text_token_count,
            0,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::openai::EncodingFormat;

    fn embeddings_request(model: &str, input: EmbeddingsInput) -> EmbeddingsRequest {
        EmbeddingsRequest {
            model: model.into(),
            input,
            encoding_format: EncodingFormat::Float,
            embedding_config: None,
        }
    }

    #[test]
    fn accepts_a_single_string() {
        let request = embeddings_request("amazon.titan-embed-text-v1", EmbeddingsInput::Text("hello".into()));
        let body = TITAN_EMBED.compose_request(&request).unwrap();

        assert_eq!(body, serde_json::json!({"inputText": "hello"}));
    }

    #[test]
    fn accepts_a_single_element_list() {
        let request = embeddings_request(
            "amazon.titan-embed-text-v1",
            EmbeddingsInput::Texts(vec!["hello".into()]),
        );
        let body = TITAN_EMBED.compose_request(&request).unwrap();

        assert_eq!(body["inputText"], "hello");
    }

    #[test]
    fn rejects_multiple_documents() {
        let request = embeddings_request(
            "amazon.titan-embed-text-v1",
            EmbeddingsInput::Texts(vec!["a".into(), "b".into()]),
        );

        let error = TITAN_EMBED.compose_request(&request).unwrap_err();
        assert!(matches!(error, LlmError::BadRequest(_)));
    }

    #[test]
    fn image_model_gets_a_default_embedding_config() {
        let request = embeddings_request(IMAGE_MODEL_ID, EmbeddingsInput::Text("hello".into()));
        let body = TITAN_EMBED.compose_request(&request).unwrap();

        assert_eq!(
            body["embeddingConfig"],
            serde_json::json!({"outputEmbeddingLength": 1024})
        );
    }

    #[test]
    fn explicit_embedding_config_wins() {
        let mut request = embeddings_request(IMAGE_MODEL_ID, EmbeddingsInput::Text("hello".into()));
        request.embedding_config = Some(serde_json::json!({"outputEmbeddingLength": 256}));

        let body = TITAN_EMBED.compose_request(&request).unwrap();

        assert_eq!(
            body["embeddingConfig"],
            serde_json::json!({"outputEmbeddingLength": 256})
        );
    }

    #[test]
    fn parses_the_single_embedding() {
        let request = embeddings_request("amazon.titan-embed-text-v1", EmbeddingsInput::Text("hello".into()));

        let body = serde_json::json!({
            "embedding": [0.5, -0.25],
            "inputTextTokenCount": 2
        });

        let response = TITAN_EMBED.parse_response(&request, body.to_string().as_bytes()).unwrap();

        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0].index, 0);
        assert_eq!(response.usage.prompt_tokens, 2);
        assert_eq!(response.usage.total_tokens, 2);
    }
}
