//! Embeddings model adapters.
//!
//! Same seam as the chat adapters, but the dispatch table is closed: only
//! ids listed here reach the backend, everything else is rejected up front.

pub(crate) mod cohere;
pub(crate) mod titan;

use serde_json::Value;

use crate::{
    error::{LlmError, LlmResult},
    messages::openai::{
        Embedding, EmbeddingVector, EmbeddingsRequest, EmbeddingsResponse, EmbeddingsUsage, EncodingFormat, ObjectType,
    },
};

/// Capability set every embeddings model family implements.
pub(crate) trait EmbeddingsAdapter: Send + Sync + std::fmt::Debug {
    /// Compose the backend request body.
    fn compose_request(&self, request: &EmbeddingsRequest) -> LlmResult<Value>;

    /// Parse the backend response into an OpenAI embeddings response.
    fn parse_response(&self, request: &EmbeddingsRequest, body: &[u8]) -> LlmResult<EmbeddingsResponse>;
}

/// Look up the adapter for an embeddings model id in the closed table.
///
/// The Titan ids are not advertised in the models listing but stay routable;
/// they accept the image-embedding configuration the Cohere family lacks.
pub(crate) fn embeddings_adapter(model_id: &str) -> LlmResult<&'static dyn EmbeddingsAdapter> {
    match model_id {
        "cohere.embed-multilingual-v3" | "cohere.embed-english-v3" => Ok(&cohere::COHERE_EMBED),
        "amazon.titan-embed-text-v1" | "amazon.titan-embed-image-v1" => Ok(&titan::TITAN_EMBED),
        _ => {
            log::error!("Unsupported embedding model id {model_id}");
            Err(LlmError::UnsupportedModel(model_id.to_string()))
        }
    }
}

/// Build an embeddings response, applying the requested vector encoding.
///
/// Indices follow input positions; base64 output is the little-endian
/// float32 byte image of the vector.
pub(crate) fn embeddings_response(
    model: String,
    embeddings: Vec<Vec<f32>>,
    encoding_format: EncodingFormat,
    input_tokens: u32,
    output_tokens: u32,
) -> EmbeddingsResponse {
    let data = embeddings
        .into_iter()
        .enumerate()
        .map(|(index, embedding)| Embedding {
            object: ObjectType::Embedding,
            index: index as u32,
            embedding: encode_embedding(embedding, encoding_format),
        })
        .collect();

    EmbeddingsResponse {
        object: ObjectType::List,
        data,
        model,
        usage: EmbeddingsUsage {
            prompt_tokens: input_tokens,
            total_tokens: input_tokens + output_tokens,
        },
    }
}

fn encode_embedding(values: Vec<f32>, encoding_format: EncodingFormat) -> EmbeddingVector {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match encoding_format {
        EncodingFormat::Float => EmbeddingVector::Float(values),
        EncodingFormat::Base64 => {
            let mut bytes = Vec::with_capacity(values.len() * 4);

            for value in &values {
                bytes.extend_from_slice(&value.to_le_bytes());
            }

            EmbeddingVector::Base64(STANDARD.encode(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    #[test]
    fn rejects_models_outside_the_table() {
        let error = embeddings_adapter("anthropic.claude-v2").unwrap_err();

        assert!(matches!(error, LlmError::UnsupportedModel(id) if id == "anthropic.claude-v2"));
        assert!(embeddings_adapter("cohere.embed-english-v3").is_ok());
        assert!(embeddings_adapter("amazon.titan-embed-image-v1").is_ok());
    }

    #[test]
    fn indices_follow_input_positions() {
        let response = embeddings_response(
            "cohere.embed-english-v3".into(),
            vec![vec![0.1, 0.2], vec![0.3], vec![0.4]],
            EncodingFormat::Float,
            0,
            0,
        );

        let indices: Vec<_> = response.data.iter().map(|e| e.index).collect();
        assert_eq!(indices, [0, 1, 2]);
    }

    #[test]
    fn base64_round_trips_to_the_same_floats() {
        let values = vec![0.5f32, -1.25, 3.75, f32::MIN_POSITIVE];
        let response = embeddings_response(
            "cohere.embed-english-v3".into(),
            vec![values.clone()],
            EncodingFormat::Base64,
            0,
            0,
        );

        let EmbeddingVector::Base64(encoded) = &response.data[0].embedding else {
            unreachable!("expected base64 output");
        };

        let bytes = STANDARD.decode(encoded).unwrap();
        let decoded: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        assert_eq!(decoded, values);
    }

    #[test]
    fn usage_totals_include_both_sides() {
        let response = embeddings_response("m".into(), Vec::new(), EncodingFormat::Float, 7, 3);

        assert_eq!(response.usage.prompt_tokens, 7);
        assert_eq!(response.usage.total_tokens, 10);
    }
}
