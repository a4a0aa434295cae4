//! Offline provider that replays a canned reply.
//!
//! Useful for demos without credentials and for exercising the streaming
//! pipeline in tests: text is cut into small deltas, tool calls can be
//! scripted, and failures can be injected before or during the stream.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use crate::{
    ChatTurn, ChunkStream, CompletionChunk, CompletionRequest, Credentials, LlmProvider, ModelApi,
    ToolDefinition, ToolUseChunk,
};

const DEMO_REPLY: &str = "🔄 Reviewing your popup data now.\n\
📊 Your opt-in rate trails the 16.8% benchmark, so there is clear headroom.\n\
🎯 Recommendation: an exit-intent popup with a countdown timer and a single email field.\n\
💰 Offer 20-25% off orders above $400 to lift average order value.\n\
🚀 Expected result: conversion moving toward 16.8% within one quarter.";

pub struct ScriptedProvider {
    reply: String,
    chunk_chars: usize,
    tool_calls: Vec<ToolUseChunk>,
    fail_on_open: Option<String>,
    fail_after: Option<(usize, String)>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            chunk_chars: 7,
            tool_calls: Vec::new(),
            fail_on_open: None,
            fail_after: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// The canned optimization answer used by `provider.id = "scripted"`.
    pub fn demo() -> Self {
        Self::new(DEMO_REPLY)
    }

    /// Size of each text delta, in characters.
    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    /// Request a tool call on the first turn, before any text.
    pub fn with_tool_call(mut self, name: &str, arguments: serde_json::Value) -> Self {
        let id = format!("call_{}", self.tool_calls.len() + 1);
        self.tool_calls.push(ToolUseChunk {
            id,
            name: name.to_string(),
            input_json: arguments.to_string(),
        });
        self
    }

    /// Fail when the stream is opened.
    pub fn failing_on_open(mut self, message: impl Into<String>) -> Self {
        self.fail_on_open = Some(message.into());
        self
    }

    /// Yield `chunks` text deltas, then a stream error.
    pub fn failing_after(mut self, chunks: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((chunks, message.into()));
        self
    }

    /// Number of upstream calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn text_deltas(&self) -> Vec<String> {
        let chars: Vec<char> = self.reply.chars().collect();
        chars
            .chunks(self.chunk_chars)
            .map(|c| c.iter().collect())
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn api(&self) -> ModelApi {
        ModelApi::Scripted
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| json!({ "name": t.name, "description": t.description }))
            .collect()
    }

    fn format_messages(&self, turns: &[ChatTurn]) -> Vec<serde_json::Value> {
        turns
            .iter()
            .map(|turn| match turn {
                ChatTurn::User { text } => json!({ "role": "user", "content": text }),
                ChatTurn::Assistant { text, .. } => json!({ "role": "assistant", "content": text }),
                ChatTurn::ToolResult { call_id, content } => {
                    json!({ "role": "tool", "tool_call_id": call_id, "content": content })
                }
            })
            .collect()
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        _credentials: &Credentials,
    ) -> anyhow::Result<ChunkStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.fail_on_open {
            anyhow::bail!("{message}");
        }

        let follow_up = request.messages.iter().any(|m| m["role"] == "tool");
        let mut items: Vec<anyhow::Result<CompletionChunk>> = Vec::new();

        if !follow_up && !self.tool_calls.is_empty() {
            items.extend(
                self.tool_calls
                    .iter()
                    .cloned()
                    .map(|tc| Ok(CompletionChunk::tool_call(tc))),
            );
            items.push(Ok(CompletionChunk {
                stop_reason: Some("tool_calls".into()),
                ..CompletionChunk::default()
            }));
        } else {
            let deltas = self.text_deltas();
            let limit = self.fail_after.as_ref().map(|(n, _)| *n);
            for (i, delta) in deltas.into_iter().enumerate() {
                if limit == Some(i) {
                    break;
                }
                items.push(Ok(CompletionChunk::text(delta)));
            }
            match &self.fail_after {
                Some((_, message)) => items.push(Err(anyhow::anyhow!("{message}"))),
                None => items.push(Ok(CompletionChunk {
                    stop_reason: Some("stop".into()),
                    ..CompletionChunk::default()
                })),
            }
        }

        Ok(Box::pin(futures::stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn request(messages: Vec<serde_json::Value>) -> CompletionRequest {
        CompletionRequest {
            model: "scripted".into(),
            messages,
            max_tokens: 64,
            temperature: None,
            tools: None,
            system: None,
        }
    }

    async fn collect(provider: &ScriptedProvider, req: &CompletionRequest) -> Vec<anyhow::Result<CompletionChunk>> {
        provider
            .stream(req, &Credentials::None)
            .await
            .unwrap()
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_replays_reply_in_small_deltas() {
        let provider = ScriptedProvider::new("Hello, popup world!").with_chunk_chars(5);
        let chunks = collect(&provider, &request(vec![])).await;
        let text: String = chunks
            .iter()
            .filter_map(|c| c.as_ref().unwrap().delta.clone())
            .collect();
        assert_eq!(text, "Hello, popup world!");
        assert_eq!(chunks.len(), 5); // 4 deltas + stop
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_tool_calls_only_on_first_turn() {
        let provider = ScriptedProvider::new("Done.")
            .with_tool_call("analyze_competitors", json!({"business_description": "bats"}));

        let first = collect(&provider, &request(vec![json!({"role": "user", "content": "hi"})])).await;
        assert!(first[0].as_ref().unwrap().tool_use.is_some());

        let second = collect(
            &provider,
            &request(vec![json!({"role": "tool", "tool_call_id": "call_1", "content": "{}"})]),
        )
        .await;
        assert!(second.iter().all(|c| c.as_ref().unwrap().tool_use.is_none()));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_failing_after_yields_error_last() {
        let provider = ScriptedProvider::new("abcdefghij")
            .with_chunk_chars(2)
            .failing_after(2, "connection reset");
        let chunks = collect(&provider, &request(vec![])).await;
        assert_eq!(chunks.len(), 3);
        assert!(chunks[2].is_err());
    }

    #[tokio::test]
    async fn test_failing_on_open() {
        let provider = ScriptedProvider::demo().failing_on_open("401 Unauthorized");
        let result = provider.stream(&request(vec![]), &Credentials::None).await;
        assert!(result.is_err());
    }
}
