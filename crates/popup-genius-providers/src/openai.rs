//! OpenAI Chat Completions API provider.
//!
//! Implements streaming chat completions via OpenAI's `/v1/chat/completions` API.
//! Also serves OpenRouter, Ollama, and other OpenAI-compatible endpoints.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace};

use crate::sse::{SseEvent, parse_sse_stream};
use crate::{
    ChatTurn, ChunkStream, ChunkUsage, CompletionChunk, CompletionRequest, Credentials,
    LlmProvider, ModelApi, ToolDefinition, ToolUseChunk,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// API style; determines minor behavior differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStyle {
    OpenAi,
    OpenRouter,
    Ollama,
}

pub struct OpenAiProvider {
    pub base_url: String,
    pub api_style: ApiStyle,
    provider_id: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    fn with_style(base_url: Option<&str>, default_url: &str, api_style: ApiStyle, id: &str) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(default_url)
                .trim_end_matches('/')
                .to_string(),
            api_style,
            provider_id: id.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn openai(base_url: Option<&str>) -> Self {
        Self::with_style(base_url, OPENAI_BASE_URL, ApiStyle::OpenAi, "openai")
    }

    pub fn openrouter(base_url: Option<&str>) -> Self {
        Self::with_style(base_url, OPENROUTER_BASE_URL, ApiStyle::OpenRouter, "openrouter")
    }

    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::with_style(base_url, OLLAMA_BASE_URL, ApiStyle::Ollama, "ollama")
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Accumulates tool call data across streaming deltas.
#[derive(Debug, Clone, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    fn api(&self) -> ModelApi {
        ModelApi::OpenAiCompletions
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect()
    }

    fn format_messages(&self, turns: &[ChatTurn]) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();

        for turn in turns {
            match turn {
                ChatTurn::User { text } => {
                    messages.push(json!({ "role": "user", "content": text }));
                }
                ChatTurn::Assistant { text, tool_calls } => {
                    let mut msg = json!({ "role": "assistant" });
                    if !text.is_empty() {
                        msg["content"] = json!(text);
                    }
                    if !tool_calls.is_empty() {
                        let calls: Vec<serde_json::Value> = tool_calls
                            .iter()
                            .map(|tc| {
                                json!({
                                    "id": tc.id,
                                    "type": "function",
                                    "function": {
                                        "name": tc.name,
                                        "arguments": tc.input_json,
                                    }
                                })
                            })
                            .collect();
                        msg["tool_calls"] = json!(calls);
                    }
                    if msg.get("content").is_some() || msg.get("tool_calls").is_some() {
                        messages.push(msg);
                    }
                }
                ChatTurn::ToolResult { call_id, content } => {
                    messages.push(json!({
                        "role": "tool",
                        "tool_call_id": call_id,
                        "content": content,
                    }));
                }
            }
        }

        messages
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<ChunkStream> {
        let api_key = match (credentials, self.api_style) {
            (Credentials::ApiKey { api_key }, _) => Some(api_key.clone()),
            (Credentials::None, ApiStyle::Ollama) => None,
            (Credentials::None, _) => {
                anyhow::bail!("Provider '{}' requires an API key", self.provider_id)
            }
        };

        // Build system message if present
        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(request.messages.iter().cloned());

        let body = OpenAiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            stream: true,
            temperature: request.temperature,
            tools: request.tools.clone().filter(|t| !t.is_empty()),
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        };

        debug!(model = %body.model, base_url = %self.base_url, "Streaming OpenAI-compatible API");

        let mut req_builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("content-type", "application/json");

        if let Some(api_key) = api_key {
            req_builder = req_builder.header("authorization", format!("Bearer {api_key}"));
        }
        if self.api_style == ApiStyle::OpenRouter {
            req_builder = req_builder.header("X-Title", "PopupGenius");
        }

        let response = req_builder.json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {status}: {body}");
        }

        Ok(Box::pin(chunks_from_sse(parse_sse_stream(response))))
    }
}

/// Turn an OpenAI SSE stream into completion chunks.
///
/// Tool call fragments are accumulated by index and released together once
/// the model finishes (or the stream ends).
fn chunks_from_sse<S>(sse: S) -> impl Stream<Item = anyhow::Result<CompletionChunk>> + Send
where
    S: Stream<Item = anyhow::Result<SseEvent>> + Send + 'static,
{
    futures::stream::unfold(
        OpenAiChunkState {
            sse: Box::pin(sse),
            tool_calls: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(chunk) = state.pending.pop_front() {
                    return Some((Ok(chunk), state));
                }
                if state.done {
                    return None;
                }

                match state.sse.next().await {
                    Some(Ok(sse_event)) => {
                        let data = sse_event.data.trim();

                        // OpenAI terminates with "data: [DONE]"
                        if data == "[DONE]" {
                            state.release_tool_calls(None);
                            state.done = true;
                            continue;
                        }

                        let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
                            Ok(c) => c,
                            Err(e) => {
                                trace!(%e, data, "Failed to parse OpenAI chunk");
                                continue;
                            }
                        };
                        state.absorb(chunk);
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                    None => {
                        state.release_tool_calls(None);
                        state.done = true;
                    }
                }
            }
        },
    )
}

struct OpenAiChunkState {
    sse: Pin<Box<dyn Stream<Item = anyhow::Result<SseEvent>> + Send>>,
    tool_calls: Vec<ToolCallAccumulator>,
    pending: VecDeque<CompletionChunk>,
    done: bool,
}

impl OpenAiChunkState {
    fn absorb(&mut self, chunk: ChatCompletionChunk) {
        // Usage (sent with stream_options.include_usage)
        if let Some(usage) = chunk.usage {
            self.pending.push_back(CompletionChunk {
                usage: Some(ChunkUsage {
                    input_tokens: Some(usage.prompt_tokens),
                    output_tokens: Some(usage.completion_tokens),
                }),
                ..CompletionChunk::default()
            });
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(tc_deltas) = choice.delta.tool_calls {
            for tc in tc_deltas {
                if self.tool_calls.len() <= tc.index {
                    self.tool_calls
                        .resize_with(tc.index + 1, ToolCallAccumulator::default);
                }
                let acc = &mut self.tool_calls[tc.index];
                if let Some(id) = tc.id {
                    acc.id = id;
                }
                if let Some(f) = tc.function {
                    if let Some(name) = f.name {
                        acc.name = name;
                    }
                    if let Some(args) = f.arguments {
                        acc.arguments.push_str(&args);
                    }
                }
            }
        }

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                self.pending.push_back(CompletionChunk::text(content));
            }
        }

        if let Some(reason) = choice.finish_reason {
            self.release_tool_calls(Some(reason));
        }
    }

    /// Queue every accumulated tool call, tagging the last chunk with the
    /// stop reason.
    fn release_tool_calls(&mut self, stop_reason: Option<String>) {
        for tc in self.tool_calls.drain(..).filter(|tc| !tc.name.is_empty()) {
            self.pending.push_back(CompletionChunk::tool_call(ToolUseChunk {
                id: tc.id,
                name: tc.name,
                input_json: tc.arguments,
            }));
        }
        if let Some(reason) = stop_reason {
            self.pending.push_back(CompletionChunk {
                stop_reason: Some(reason),
                ..CompletionChunk::default()
            });
        }
    }
}
