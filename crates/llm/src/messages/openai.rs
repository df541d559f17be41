//! OpenAI-compatible wire types.
//!
//! These types mirror the Chat Completions and Embeddings request/response
//! shapes closely enough that off-the-shelf OpenAI clients work against the
//! gateway unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A chat completion request in the OpenAI wire format.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /// Bedrock model identifier, e.g. `anthropic.claude-3-sonnet-20240229-v1:0`.
    pub model: String,

    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,

    /// Maximum tokens to generate in the response.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Nucleus sampling cutoff.
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Whether to stream the response as Server-Sent Events.
    #[serde(default)]
    pub stream: Option<bool>,

    /// Streaming options; currently only `include_usage`.
    #[serde(default)]
    pub stream_options: Option<StreamOptions>,

    /// Tool catalog the model may call into.
    #[serde(default)]
    pub tools: Option<Vec<Tool>>,
}

impl ChatCompletionRequest {
    /// Whether the request carries a non-empty tool catalog.
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }
}

/// Options for streaming responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamOptions {
    /// When set, a final usage-only chunk is streamed before `[DONE]`.
    #[serde(default)]
    pub include_usage: bool,
}

/// A single conversation message.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: ChatRole,

    /// Message content: a plain string, or content parts for multimodal
    /// user messages. Absent for assistant messages that only carry
    /// tool calls.
    #[serde(default)]
    pub content: Option<MessageContent>,

    /// Tool calls previously made by the assistant.
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// For tool messages, the id of the call this message responds to.
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

/// Message sender role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Message content container.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content.
    Text(String),
    /// Ordered multimodal content parts.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Get the content as text, if this is a simple string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Parts(_) => None,
        }
    }
}

/// A single part of a multimodal message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text part.
    Text { text: String },
    /// Image reference, either a `data:` URI or a remote URL.
    ImageUrl { image_url: ImageUrl },
}

/// Image reference in a content part.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    /// Detail level hint; accepted for wire compatibility, not forwarded.
    #[serde(default)]
    #[allow(dead_code)]
    pub detail: Option<String>,
}

/// A tool definition in the request catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct Tool {
    #[serde(rename = "type", default)]
    #[allow(dead_code)]
    pub tool_type: ToolCallType,
    pub function: FunctionDefinition,
}

/// Function specification for a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// A tool call made by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub tool_type: ToolCallType,
    pub function: FunctionCall,
}

/// Tool call discriminator. Only functions exist today.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallType {
    #[default]
    Function,
}

/// A function invocation with JSON-encoded arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a JSON-encoded string, per the OpenAI wire format.
    pub arguments: String,
}

/// Object type discriminators used across responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ObjectType {
    #[serde(rename = "chat.completion")]
    ChatCompletion,
    #[serde(rename = "chat.completion.chunk")]
    ChatCompletionChunk,
    #[serde(rename = "embedding")]
    Embedding,
    #[serde(rename = "list")]
    List,
    #[serde(rename = "model")]
    Model,
}

/// A unary chat completion response.
#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: ObjectType,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

/// A single response choice. The gateway always produces exactly one.
#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatResponseMessage,
    pub finish_reason: Option<String>,
}

/// Assistant message in a unary response.
///
/// `content` serializes as an explicit `null` when the message carries tool
/// calls instead of text.
#[derive(Debug, Serialize)]
pub struct ChatResponseMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// A streamed chat completion chunk.
#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: ObjectType,
    pub created: u64,
    pub model: String,
    /// Empty when the chunk only carries terminal usage.
    pub choices: Vec<ChatChoiceDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A single streamed choice delta.
#[derive(Debug, Serialize)]
pub struct ChatChoiceDelta {
    pub index: u32,
    pub delta: MessageDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Incremental message content in a streamed chunk.
#[derive(Debug, Default, Serialize)]
pub struct MessageDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Token accounting for a request.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Response for the models listing endpoint.
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub object: ObjectType,
    pub data: Vec<Model>,
}

/// A single model listing entry.
#[derive(Debug, Serialize)]
pub struct Model {
    pub id: String,
    pub object: ObjectType,
    pub created: u64,
    pub owned_by: String,
    pub display_name: String,
}

/// An embeddings request in the OpenAI wire format.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsRequest {
    pub model: String,

    /// Input documents; see [`EmbeddingsInput`] for the accepted shapes.
    pub input: EmbeddingsInput,

    /// Output encoding for the embedding vectors.
    #[serde(default)]
    pub encoding_format: EncodingFormat,

    /// Backend-specific embedding configuration, passed through verbatim.
    #[serde(default)]
    pub embedding_config: Option<Value>,
}

/// The four accepted embedding input shapes.
///
/// Pre-tokenized forms carry cl100k_base token ids and are decoded back to
/// text before being sent to the backend. Mixed shapes are rejected by serde
/// since no variant matches them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingsInput {
    /// A single document.
    Text(String),
    /// Multiple documents.
    Texts(Vec<String>),
    /// A single pre-tokenized document.
    Tokens(Vec<u32>),
    /// Multiple pre-tokenized documents.
    TokenBatches(Vec<Vec<u32>>),
}

/// Embedding vector encoding requested by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    #[default]
    Float,
    Base64,
}

/// An embeddings response.
#[derive(Debug, Serialize)]
pub struct EmbeddingsResponse {
    pub object: ObjectType,
    pub data: Vec<Embedding>,
    pub model: String,
    pub usage: EmbeddingsUsage,
}

/// A single embedding, indexed by input position.
#[derive(Debug, Serialize)]
pub struct Embedding {
    pub object: ObjectType,
    pub index: u32,
    pub embedding: EmbeddingVector,
}

/// Embedding payload: raw floats, or base64 over the little-endian float32
/// byte representation.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EmbeddingVector {
    Float(Vec<f32>),
    Base64(String),
}

/// Token accounting for an embeddings request.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EmbeddingsUsage {
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn parses_multimodal_user_message() {
        let json = indoc! {r#"
            {
                "model": "anthropic.claude-3-sonnet-20240229-v1:0",
                "messages": [
                    {
                        "role": "user",
                        "content": [
                            {"type": "text", "text": "What is in this image?"},
                            {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}}
                        ]
                    }
                ]
            }
        "#};

        let request: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        let Some(MessageContent::Parts(parts)) = &request.messages[0].content else {
            unreachable!("content should parse as parts");
        };

        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[1], ContentPart::ImageUrl { image_url } if image_url.url.ends_with("cat.png")));
    }

    #[test]
    fn parses_tool_history_message() {
        let json = indoc! {r#"
            {
                "model": "anthropic.claude-v2",
                "messages": [
                    {
                        "role": "assistant",
                        "tool_calls": [
                            {"id": "call_0", "type": "function", "function": {"name": "f", "arguments": "{}"}}
                        ]
                    },
                    {"role": "tool", "tool_call_id": "call_0", "content": "42"}
                ]
            }
        "#};

        let request: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        assert!(request.messages[0].content.is_none());
        assert_eq!(request.messages[1].tool_call_id.as_deref(), Some("call_0"));
    }

    #[test]
    fn embeddings_input_shapes() {
        let text: EmbeddingsInput = serde_json::from_str(r#""hello""#).unwrap();
        assert!(matches!(text, EmbeddingsInput::Text(_)));

        let texts: EmbeddingsInput = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert!(matches!(texts, EmbeddingsInput::Texts(ref v) if v.len() == 2));

        let tokens: EmbeddingsInput = serde_json::from_str("[15339, 1917]").unwrap();
        assert!(matches!(tokens, EmbeddingsInput::Tokens(ref v) if v == &[15339, 1917]));

        let batches: EmbeddingsInput = serde_json::from_str("[[15339], [1917]]").unwrap();
        assert!(matches!(batches, EmbeddingsInput::TokenBatches(ref v) if v.len() == 2));

        let mixed = serde_json::from_str::<EmbeddingsInput>(r#"["a", 2]"#);
        assert!(mixed.is_err());
    }

    #[test]
    fn null_content_serializes_for_tool_call_messages() {
        let message = ChatResponseMessage {
            role: ChatRole::Assistant,
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: None,
                tool_type: ToolCallType::Function,
                function: FunctionCall {
                    name: "f".into(),
                    arguments: "{}".into(),
                },
            }]),
        };

        insta::assert_json_snapshot!(message, @r#"
        {
          "role": "assistant",
          "content": null,
          "tool_calls": [
            {
              "type": "function",
              "function": {
                "name": "f",
                "arguments": "{}"
              }
            }
          ]
        }
        "#);
    }
}
