//! Cohere Embed family adapter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    embeddings::{EmbeddingsAdapter, embeddings_response},
    error::{LlmError, LlmResult},
    messages::openai::{EmbeddingsInput, EmbeddingsRequest, EmbeddingsResponse},
    tokens,
};

#[derive(Debug)]
pub(crate) struct CohereEmbeddingsAdapter;

pub(crate) static COHERE_EMBED: CohereEmbeddingsAdapter = CohereEmbeddingsAdapter;

/// Request body for the Cohere Embed dialect.
///
/// Documents over the backend limit are truncated at the end rather than
/// rejected.
#[derive(Debug, Serialize)]
struct CohereEmbedRequest {
    texts: Vec<String>,
    input_type: &'static str,
    truncate: &'static str,
}

#[derive(Debug, Deserialize)]
struct CohereEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddingsAdapter for CohereEmbeddingsAdapter {
    fn compose_request(&self, request: &EmbeddingsRequest) -> LlmResult<Value> {
        // Pre-tokenized input is decoded back to text; the backend only
        // accepts strings.
        let texts = match &request.input {
            EmbeddingsInput::Text(text) => vec![text.clone()],
            EmbeddingsInput::Texts(texts) => texts.clone(),
            EmbeddingsInput::Tokens(tokens) => vec![tokens::decode(tokens)?],
            EmbeddingsInput::TokenBatches(batches) => batches
                .iter()
                .map(|batch| tokens::decode(batch))
                .collect::<LlmResult<Vec<_>>>()?,
        };

        let body = CohereEmbedRequest {
            texts,
            input_type: "search_document",
            truncate: "END",
        };

        serde_json::to_value(&body).map_err(|e| LlmError::Internal(format!("Failed to compose request body: {e}")))
    }

    fn parse_response(&self, request: &EmbeddingsRequest, body: &[u8]) -> LlmResult<EmbeddingsResponse> {
        let response: CohereEmbedResponse = serde_json::from_slice(body)
            .map_err(|e| LlmError::Internal(format!("Invalid backend response: {e}")))?;
        log::debug!("Bedrock returned {} embeddings", response.embeddings.len());

        // The backend reports no token counts for this family.
        Ok(embeddings_response(
            request.model.clone(),
            response.embeddings,
            request.encoding_format,
            0,
            0,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::openai::EncodingFormat;

    fn embeddings_request(input: EmbeddingsInput) -> EmbeddingsRequest {
        EmbeddingsRequest {
            model: "cohere.embed-english-v3".into(),
            input,
            encoding_format: EncodingFormat::Float,
            embedding_config: None,
        }
    }

    #[test]
    fn wraps_a_single_string() {
        let request = embeddings_request(EmbeddingsInput::Text("hello".into()));
        let body = COHERE_EMBED.compose_request(&request).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "texts": ["hello"],
                "input_type": "search_document",
                "truncate": "END"
            })
        );
    }

    #[test]
    fn passes_through_a_string_list() {
        let request = embeddings_request(EmbeddingsInput::Texts(vec!["a".into(), "b".into()]));
        let body = COHERE_EMBED.compose_request(&request).unwrap();

        assert_eq!(body["texts"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn decodes_pre_tokenized_input() {
        let request = embeddings_request(EmbeddingsInput::Tokens(vec![15339, 1917]));
        let body = COHERE_EMBED.compose_request(&request).unwrap();

        assert_eq!(body["texts"], serde_json::json!(["hello world"]));
    }

    #[test]
    fn decodes_each_pre_tokenized_batch() {
        let request = embeddings_request(EmbeddingsInput::TokenBatches(vec![vec![15339], vec![15339, 1917]]));
        let body = COHERE_EMBED.compose_request(&request).unwrap();

        assert_eq!(body["texts"], serde_json::json!(["hello", "hello world"]));
    }

    #[test]
    fn parses_parallel_embeddings() {
        let request = embeddings_request(EmbeddingsInput::Texts(vec!["a".into(), "b".into()]));

        let body = serde_json::json!({
            "embeddings": [[0.25, 0.5], [0.75, 1.0]],
            "texts": ["a", "b"]
        });

        let response = COHERE_EMBED.parse_response(&request, body.to_string().as_bytes()).unwrap();

        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[1].index, 1);
        assert_eq!(response.usage.prompt_tokens, 0);
        assert_eq!(response.usage.total_tokens, 0);
    }
}
