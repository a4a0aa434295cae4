//! LLM provider abstraction.
//!
//! Each provider implements the [`LlmProvider`] trait to stream chat
//! completions. The OpenAI-compatible provider covers OpenAI, OpenRouter and
//! Ollama; the scripted provider replays a canned reply for offline runs.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use popup_genius_core::config::ProviderConfig;
use popup_genius_core::error::{PopupGeniusError, Result};

pub mod openai;
pub mod scripted;
pub mod sse;

pub use openai::OpenAiProvider;
pub use scripted::ScriptedProvider;

/// Supported LLM API protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelApi {
    OpenAiCompletions,
    Scripted,
}

/// Credentials for authenticating with an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credentials {
    #[serde(rename = "api_key")]
    ApiKey { api_key: String },
    #[serde(rename = "none")]
    None,
}

impl Credentials {
    /// Credentials for the configured provider, resolved once at startup.
    pub fn from_config(config: &ProviderConfig) -> Self {
        match config.resolve_api_key() {
            Some(api_key) => Self::ApiKey { api_key },
            None => Self::None,
        }
    }
}

/// A tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// One entry in the conversation sent upstream.
#[derive(Debug, Clone)]
pub enum ChatTurn {
    User {
        text: String,
    },
    Assistant {
        text: String,
        tool_calls: Vec<ToolUseChunk>,
    },
    ToolResult {
        call_id: String,
        content: String,
    },
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<serde_json::Value>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub tools: Option<Vec<serde_json::Value>>,
    pub system: Option<String>,
}

/// A streamed chunk from the LLM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub delta: Option<String>,
    pub tool_use: Option<ToolUseChunk>,
    pub usage: Option<ChunkUsage>,
    pub stop_reason: Option<String>,
}

impl CompletionChunk {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
            ..Self::default()
        }
    }

    pub fn tool_call(tool: ToolUseChunk) -> Self {
        Self {
            tool_use: Some(tool),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseChunk {
    pub id: String,
    pub name: String,
    pub input_json: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// A boxed stream of completion chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<CompletionChunk>> + Send>>;

/// The core LLM provider trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g., "openai", "scripted").
    fn id(&self) -> &str;

    /// API protocol used by this provider.
    fn api(&self) -> ModelApi;

    /// Convert tool definitions into the provider's wire format.
    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value>;

    /// Convert a conversation into the provider's message format.
    fn format_messages(&self, turns: &[ChatTurn]) -> Vec<serde_json::Value>;

    /// Stream a chat completion. Connection and HTTP status failures are
    /// returned here; failures after the first byte arrive in the stream.
    async fn stream(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<ChunkStream>;
}

/// Build the provider named in the config.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let base_url = config.base_url.as_deref();
    let provider: Arc<dyn LlmProvider> = match config.id.as_str() {
        "openai" => Arc::new(OpenAiProvider::openai(base_url)),
        "openrouter" => Arc::new(OpenAiProvider::openrouter(base_url)),
        "ollama" => Arc::new(OpenAiProvider::ollama(base_url)),
        "scripted" => Arc::new(ScriptedProvider::demo()),
        other => {
            return Err(PopupGeniusError::Provider(format!(
                "Unknown provider '{other}'"
            )));
        }
    };
    Ok(provider)
}
