//! Anthropic Claude family adapter.
//!
//! Claude on the InvokeModel surface has no native function-calling, so tool
//! support rides on an in-band envelope: a prompt primes the model to answer
//! `Y</tool><function>{…}</function>` or `N</tool>` before anything else, a
//! priming assistant turn of `<tool>` forces the envelope open, and the
//! `</function>` stop sequence closes it. The adapter reconstructs OpenAI
//! tool calls from that envelope, in both unary and streaming mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{LlmError, LlmResult},
    images::ImageResolver,
    messages::openai::{
        ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatRole, FunctionCall, MessageContent,
        ToolCall, ToolCallType,
    },
    provider::{ChatAdapter, StreamParser, chat_response, chunk_response, usage_chunk},
};

pub(crate) struct ClaudeAdapter;

pub(crate) static CLAUDE: ClaudeAdapter = ClaudeAdapter;

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// The dialect requires max_tokens; applied when the client omits it.
const DEFAULT_MAX_TOKENS: u32 = 4096;

const FUNCTION_TAG: &str = "<function>";

/// Tool priming prompt appended to the system prompt, with `{tools}`
/// substituted by the JSON-encoded function specs. The wording is load
/// bearing: the parsers key on the exact `Y</tool>` / `N</tool>` prefixes it
/// induces.
const TOOL_PROMPT: &str = r#"You have access to the following tools:
{tools}

Please think if you need to use a tool or not for user's question, you must:
1. Respond Y or N within <tool></tool> tags first to indicate that.
2. If a tool is needed, MUST respond a JSON object matching the following schema within <function></function> tags:
   {"name": $TOOL_NAME, "arguments": {"$PARAMETER_NAME": "$PARAMETER_VALUE", ...}}
3. If no tools is needed, respond with normal text."#;

/// Request body for the Anthropic messages dialect on Bedrock.
///
/// Unlike the direct Anthropic API the body carries no `model` field (the
/// model id travels in the invocation) and requires `anthropic_version`.
#[derive(Debug, Serialize)]
struct ClaudeRequest {
    anthropic_version: &'static str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
struct ClaudeMessage {
    role: &'static str,
    content: ClaudeContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum ClaudeContent {
    Text(String),
    Blocks(Vec<ClaudeContentBlock>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, Serialize)]
struct ImageSource {
    r#type: &'static str,
    media_type: String,
    data: String,
}

#[async_trait]
impl ChatAdapter for ClaudeAdapter {
    async fn compose_request(&self, request: &ChatCompletionRequest, images: &ImageResolver) -> LlmResult<Value> {
        let mut system_prompt = String::new();
        let mut converted = Vec::new();

        for message in &request.messages {
            match (message.role, &message.content) {
                (ChatRole::System, content) => {
                    let text = content
                        .as_ref()
                        .and_then(MessageContent::as_text)
                        .ok_or_else(|| LlmError::BadRequest("System message content must be a string".to_string()))?;

                    system_prompt.push_str(text);
                    system_prompt.push('\n');
                }
                (ChatRole::User, Some(MessageContent::Parts(parts))) => {
                    let mut blocks = Vec::with_capacity(parts.len());

                    for part in parts {
                        blocks.push(convert_content_part(part, images).await?);
                    }

                    converted.push(ClaudeMessage {
                        role: "user",
                        content: ClaudeContent::Blocks(blocks),
                    });
                }
                (ChatRole::Assistant, content)
                    if content.as_ref().and_then(MessageContent::as_text).is_none_or(str::is_empty) =>
                {
                    // The assistant turn only carries tool calls; rebuild it
                    // as text so the model sees its own envelope history.
                    let Some(call) = message.tool_calls.as_ref().and_then(|calls| calls.first()) else {
                        return Err(LlmError::BadRequest(
                            "Assistant message must carry content or tool calls".to_string(),
                        ));
                    };

                    let text = format!(
                        "[Tool use for `{}` with id `{}` with the following `input`]\n{}",
                        call.function.name,
                        call.id.as_deref().unwrap_or_default(),
                        call.function.arguments,
                    );

                    converted.push(ClaudeMessage {
                        role: "assistant",
                        content: ClaudeContent::Text(text),
                    });
                }
                (ChatRole::Tool, content) => {
                    // Bedrock has no tool role; replay the result as a user turn.
                    let text = format!(
                        "[Tool result with matching id `{}` of `{}`] ",
                        message.tool_call_id.as_deref().unwrap_or_default(),
                        content.as_ref().and_then(MessageContent::as_text).unwrap_or_default(),
                    );

                    converted.push(ClaudeMessage {
                        role: "user",
                        content: ClaudeContent::Text(text),
                    });
                }
                (role, content) => {
                    let text = content
                        .as_ref()
                        .and_then(MessageContent::as_text)
                        .ok_or_else(|| LlmError::BadRequest("Content must be a string".to_string()))?;

                    converted.push(ClaudeMessage {
                        role: if role == ChatRole::Assistant { "assistant" } else { "user" },
                        content: ClaudeContent::Text(text.to_string()),
                    });
                }
            }
        }

        let mut stop_sequences = None;

        if let Some(tools) = &request.tools
            && !tools.is_empty()
        {
            let specs: Vec<_> = tools.iter().map(|tool| &tool.function).collect();
            let tools_json = serde_json::to_string(&specs)
                .map_err(|e| LlmError::Internal(format!("Failed to serialize tool specs: {e}")))?;

            system_prompt.push_str(&TOOL_PROMPT.replace("{tools}", &tools_json));

            // Prime the envelope open and cut generation at its close.
            converted.push(ClaudeMessage {
                role: "assistant",
                content: ClaudeContent::Text("<tool>".to_string()),
            });
            stop_sequences = Some(vec!["</function>".to_string()]);
        }

        let body = ClaudeRequest {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            top_p: request.top_p,
            messages: merge_messages(converted),
            system: (!system_prompt.is_empty()).then_some(system_prompt),
            stop_sequences,
        };

        serde_json::to_value(&body).map_err(|e| LlmError::Internal(format!("Failed to compose request body: {e}")))
    }

    fn parse_response(
        &self,
        request: &ChatCompletionRequest,
        body: &[u8],
        message_id: &str,
    ) -> LlmResult<ChatCompletionResponse> {
        let response: ClaudeResponse = serde_json::from_slice(body)
            .map_err(|e| LlmError::Internal(format!("Invalid backend response: {e}")))?;
        log::debug!("Bedrock response body: {response:?}");

        let mut message = response
            .content
            .first()
            .and_then(|content| content.text.clone())
            .unwrap_or_default();
        let mut tools = None;

        if request.has_tools() {
            if message.starts_with("Y</tool>") {
                tools = Some(parse_tool_message(&message)?);
            } else if let Some(rest) = message.strip_prefix("N</tool>") {
                message = rest.trim_start_matches('\n').to_string();
            }
        }

        Ok(chat_response(
            request.model.clone(),
            message_id.to_string(),
            Some(message),
            tools,
            response.stop_reason,
            response.usage.input_tokens,
            response.usage.output_tokens,
        ))
    }

    fn stream_parser(&self, request: &ChatCompletionRequest, message_id: String) -> Box<dyn StreamParser> {
        let state = if request.has_tools() {
            ToolStreamState::Probing
        } else {
            ToolStreamState::Disabled
        };

        Box::new(ClaudeStreamParser {
            model: request.model.clone(),
            message_id,
            state,
        })
    }
}

async fn convert_content_part(
    part: &crate::messages::openai::ContentPart,
    images: &ImageResolver,
) -> LlmResult<ClaudeContentBlock> {
    use crate::messages::openai::ContentPart;

    match part {
        ContentPart::Text { text } => Ok(ClaudeContentBlock::Text { text: text.clone() }),
        ContentPart::ImageUrl { image_url } => {
            let (data, media_type) = images.resolve(&image_url.url).await?;

            Ok(ClaudeContentBlock::Image {
                source: ImageSource {
                    r#type: "base64",
                    media_type,
                    data,
                },
            })
        }
    }
}

/// Merge consecutive same-role text messages with a newline between them.
///
/// The dialect rejects back-to-back turns for one role. Adjacent exact
/// duplicates are dropped; a block-content message always forces a merge
/// boundary.
fn merge_messages(messages: Vec<ClaudeMessage>) -> Vec<ClaudeMessage> {
    let mut merged: Vec<ClaudeMessage> = Vec::new();
    let mut prev_role: Option<&'static str> = None;
    let mut merged_content = String::new();

    for message in messages {
        match message.content {
            ClaudeContent::Text(content) => {
                if prev_role != Some(message.role) {
                    if let Some(role) = prev_role.take() {
                        merged.push(ClaudeMessage {
                            role,
                            content: ClaudeContent::Text(std::mem::take(&mut merged_content)),
                        });
                    }

                    merged_content = content;
                    prev_role = Some(message.role);
                } else {
                    if content == merged_content {
                        // ignore duplicates
                        continue;
                    }

                    merged_content.push('\n');
                    merged_content.push_str(&content);
                }
            }
            blocks => {
                if let Some(role) = prev_role.take() {
                    merged.push(ClaudeMessage {
                        role,
                        content: ClaudeContent::Text(std::mem::take(&mut merged_content)),
                    });
                }

                merged.push(ClaudeMessage {
                    role: message.role,
                    content: blocks,
                });
            }
        }
    }

    if let Some(role) = prev_role
        && !merged_content.is_empty()
    {
        merged.push(ClaudeMessage {
            role,
            content: ClaudeContent::Text(merged_content),
        });
    }

    merged
}

/// Extract OpenAI tool calls from a complete tool envelope.
///
/// Takes the substring after the last `<function>`, tolerating a trailing
/// `</function>` for the unary case where the stop sequence did not fire.
fn parse_tool_message(tool_message: &str) -> LlmResult<Vec<ToolCall>> {
    log::debug!("Tool message: {}", tool_message.replace('\n', " "));

    let parsed = tool_message
        .rfind(FUNCTION_TAG)
        .map(|index| &tool_message[index + FUNCTION_TAG.len()..])
        .and_then(|payload| {
            let payload = payload.replace('\n', " ");
            let payload = payload.trim_end();
            let payload = payload.strip_suffix("</function>").unwrap_or(payload);

            serde_json::from_str::<ToolEnvelope>(payload).ok()
        });

    let Some(envelope) = parsed else {
        log::error!("Failed to parse tool response: {tool_message}");
        return Err(LlmError::Internal("Failed to parse tool response".to_string()));
    };

    let arguments = serde_json::to_string(&envelope.arguments)
        .map_err(|_| LlmError::Internal("Failed to parse tool response".to_string()))?;

    Ok(vec![ToolCall {
        id: None,
        tool_type: ToolCallType::Function,
        function: FunctionCall {
            name: envelope.name,
            arguments,
        },
    }])
}

#[derive(Debug, Deserialize)]
struct ToolEnvelope {
    name: String,
    #[serde(default = "empty_arguments")]
    arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(serde_json::Map::new())
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeResponseContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponseContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// Streaming.

/// Streaming events for the Anthropic messages dialect.
///
/// `message_stop` may carry the synthetic `amazon-bedrock-invocationMetrics`
/// envelope key with the final token counts.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeStreamEvent {
    MessageStart,
    ContentBlockStart,
    ContentBlockDelta {
        delta: ClaudeBlockDelta,
    },
    ContentBlockStop,
    MessageDelta {
        delta: ClaudeMessageDelta,
    },
    MessageStop {
        #[serde(rename = "amazon-bedrock-invocationMetrics")]
        invocation_metrics: Option<InvocationMetrics>,
    },
    Ping,
}

#[derive(Debug, Deserialize)]
struct ClaudeBlockDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvocationMetrics {
    #[serde(rename = "inputTokenCount", default)]
    input_token_count: u32,
    #[serde(rename = "outputTokenCount", default)]
    output_token_count: u32,
}

/// Tool-envelope sub-state over the token stream.
///
/// With a tool catalog present the first text delta decides the path: an
/// exact `"Y"` switches to buffering the whole envelope, anything else means
/// the `N</tool>` sentinel is being emitted and its three deltas are
/// swallowed before normal streaming resumes.
#[derive(Debug, PartialEq)]
enum ToolStreamState {
    /// No tool catalog; deltas stream through untouched.
    Disabled,
    /// Waiting for the first text delta to decide Y or N.
    Probing,
    /// Accumulating the tool envelope; nothing streams until message_delta.
    Buffering(String),
    /// Discarding the `N</tool>` sentinel deltas.
    Stripping { skipped: u8 },
    /// Normal text streaming after the sentinel.
    Streaming { first_token: bool },
}

/// Number of text deltas the `N</tool>` sentinel occupies.
///
/// This bakes in the observed tokenizer boundaries (`N`, `</tool>`, and one
/// trailing whitespace delta); `sentinel_spans_three_deltas` pins it.
const NO_TOOL_SENTINEL_DELTAS: u8 = 3;

pub(crate) struct ClaudeStreamParser {
    model: String,
    message_id: String,
    state: ToolStreamState,
}

impl StreamParser for ClaudeStreamParser {
    fn process_chunk(&mut self, payload: &[u8]) -> LlmResult<Vec<ChatCompletionChunk>> {
        let event: ClaudeStreamEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Skipping unrecognized Claude stream event: {e}");
                return Ok(Vec::new());
            }
        };

        match event {
            ClaudeStreamEvent::ContentBlockDelta { delta } => {
                let Some(text) = delta.text else {
                    return Ok(Vec::new());
                };

                Ok(self.handle_text(text))
            }
            ClaudeStreamEvent::MessageDelta { delta } => self.handle_message_delta(delta.stop_reason),
            ClaudeStreamEvent::MessageStop { invocation_metrics } => Ok(invocation_metrics
                .map(|metrics| {
                    vec![usage_chunk(
                        self.model.clone(),
                        self.message_id.clone(),
                        metrics.input_token_count,
                        metrics.output_token_count,
                    )]
                })
                .unwrap_or_default()),
            _ => Ok(Vec::new()),
        }
    }
}

impl ClaudeStreamParser {
    fn handle_text(&mut self, text: String) -> Vec<ChatCompletionChunk> {
        let state = std::mem::replace(&mut self.state, ToolStreamState::Disabled);

        let (next, emit) = match state {
            ToolStreamState::Disabled => (ToolStreamState::Disabled, Some(text)),
            ToolStreamState::Probing => {
                if text == "Y" {
                    (ToolStreamState::Buffering("Y".to_string()), None)
                } else {
                    (ToolStreamState::Stripping { skipped: 1 }, None)
                }
            }
            ToolStreamState::Buffering(mut buffer) => {
                buffer.push_str(&text);
                (ToolStreamState::Buffering(buffer), None)
            }
            ToolStreamState::Stripping { skipped } if skipped < NO_TOOL_SENTINEL_DELTAS => {
                (ToolStreamState::Stripping { skipped: skipped + 1 }, None)
            }
            ToolStreamState::Stripping { .. } | ToolStreamState::Streaming { first_token: true } => (
                ToolStreamState::Streaming { first_token: false },
                Some(text.trim_start_matches('\n').to_string()),
            ),
            ToolStreamState::Streaming { first_token: false } => {
                (ToolStreamState::Streaming { first_token: false }, Some(text))
            }
        };

        self.state = next;

        emit.map(|content| {
            vec![chunk_response(
                self.model.clone(),
                self.message_id.clone(),
                Some(content),
                None,
                None,
            )]
        })
        .unwrap_or_default()
    }

    fn handle_message_delta(&mut self, stop_reason: Option<String>) -> LlmResult<Vec<ChatCompletionChunk>> {
        if let ToolStreamState::Buffering(buffer) = &self.state {
            let tools = parse_tool_message(buffer)?;

            return Ok(vec![chunk_response(
                self.model.clone(),
                self.message_id.clone(),
                None,
                Some(tools),
                None,
            )]);
        }

        Ok(vec![chunk_response(
            self.model.clone(),
            self.message_id.clone(),
            None,
            None,
            stop_reason,
        )])
    }
}
