//! Agent session: one agent definition bound to a provider and credentials.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

use popup_genius_core::error::PopupGeniusError;
use popup_genius_providers::{
    ChatTurn, ChunkStream, CompletionRequest, Credentials, LlmProvider, ToolUseChunk,
};
use popup_genius_tools::ToolContext;

use crate::{AgentDefinition, RawEvent, RunItem};

/// The raw event stream of a single run. Ends after the final turn or after
/// one terminal `Err`.
pub type RawEventStream = Pin<Box<dyn Stream<Item = anyhow::Result<RawEvent>> + Send>>;

type RawSender = mpsc::Sender<anyhow::Result<RawEvent>>;
type SendFailed = mpsc::error::SendError<anyhow::Result<RawEvent>>;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AgentSession {
    definition: Arc<AgentDefinition>,
    provider: Arc<dyn LlmProvider>,
    credentials: Arc<Credentials>,
    tool_context: Arc<ToolContext>,
    channel_capacity: usize,
}

impl AgentSession {
    pub fn new(
        definition: AgentDefinition,
        provider: Arc<dyn LlmProvider>,
        credentials: Credentials,
        tool_context: ToolContext,
    ) -> Self {
        Self {
            definition: Arc::new(definition),
            provider,
            credentials: Arc::new(credentials),
            tool_context: Arc::new(tool_context),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    pub fn agent_name(&self) -> &str {
        &self.definition.name
    }

    /// Start a run for `input`.
    ///
    /// The first upstream call is opened before this returns, so connection
    /// and authentication failures come back as `Err`. Everything after that
    /// arrives through the stream. Dropping the stream stops the run at its
    /// next send.
    pub async fn run(&self, input: &str) -> anyhow::Result<RawEventStream> {
        let turns = vec![ChatTurn::User {
            text: input.to_string(),
        }];
        let first = self.open(&turns).await.map_err(|e| self.agent_error(&e))?;
        info!(agent = %self.definition.name, model = %self.definition.model, "Agent run started");

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let session = self.clone();
        tokio::spawn(async move {
            if session.drive(turns, first, &tx).await.is_err() {
                debug!(agent = %session.definition.name, "Run consumer dropped, stopping");
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn open(&self, turns: &[ChatTurn]) -> anyhow::Result<ChunkStream> {
        let request = self.request(turns);
        self.provider.stream(&request, &self.credentials).await
    }

    fn agent_error(&self, e: &anyhow::Error) -> anyhow::Error {
        PopupGeniusError::Agent(format!("{}: {e}", self.definition.name)).into()
    }

    fn request(&self, turns: &[ChatTurn]) -> CompletionRequest {
        let definition = &self.definition;
        let tools = if definition.tools.is_empty() {
            None
        } else {
            Some(self.provider.format_tools(&definition.tool_definitions()))
        };
        CompletionRequest {
            model: definition.model.clone(),
            messages: self.provider.format_messages(turns),
            max_tokens: definition.max_tokens,
            temperature: definition.temperature,
            tools,
            system: Some(definition.system_prompt()),
        }
    }

    /// Turn loop. Returns `Err` only when the consumer has gone away.
    async fn drive(
        &self,
        mut turns: Vec<ChatTurn>,
        first: ChunkStream,
        tx: &RawSender,
    ) -> Result<(), SendFailed> {
        tx.send(Ok(RawEvent::AgentUpdated {
            agent_name: self.definition.name.clone(),
        }))
        .await?;

        let max_turns = self.definition.max_turns.max(1);
        let mut stream = first;

        for turn in 1..=max_turns {
            debug!(turn, "Agent turn");
            let mut text = String::new();
            let mut tool_calls: Vec<ToolUseChunk> = Vec::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        error!(%e, "Upstream stream error");
                        return tx.send(Err(e)).await;
                    }
                };
                if let Some(delta) = chunk.delta.filter(|d| !d.is_empty()) {
                    text.push_str(&delta);
                    tx.send(Ok(RawEvent::TextDelta { delta })).await?;
                }
                if let Some(tool_use) = chunk.tool_use {
                    tool_calls.push(tool_use);
                }
                if chunk.usage.is_some() {
                    tx.send(Ok(RawEvent::Other {
                        kind: "usage".into(),
                    }))
                    .await?;
                }
                if let Some(reason) = chunk.stop_reason {
                    tx.send(Ok(RawEvent::Other {
                        kind: format!("stop:{reason}"),
                    }))
                    .await?;
                }
            }

            let mut results = Vec::with_capacity(tool_calls.len());
            for call in &tool_calls {
                results.push(self.run_tool(call, tx).await?);
            }

            if tool_calls.is_empty() || turn == max_turns {
                if !text.is_empty() {
                    tx.send(Ok(RawEvent::item(RunItem::MessageOutput { text })))
                        .await?;
                }
                break;
            }

            turns.push(ChatTurn::Assistant { text, tool_calls });
            turns.extend(results);
            stream = match self.open(&turns).await {
                Ok(s) => s,
                Err(e) => {
                    error!(%e, turn, "Follow-up upstream call failed");
                    return tx.send(Err(self.agent_error(&e))).await;
                }
            };
        }

        info!(agent = %self.definition.name, "Agent run finished");
        Ok(())
    }

    /// Echo a requested tool call, execute it locally, and report the output.
    async fn run_tool(&self, call: &ToolUseChunk, tx: &RawSender) -> Result<ChatTurn, SendFailed> {
        tx.send(Ok(RawEvent::item(RunItem::ToolCall {
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.input_json.clone(),
        })))
        .await?;

        let params = serde_json::from_str(&call.input_json).unwrap_or_else(|_| json!({}));
        info!(tool = %call.name, "Executing tool");
        let output = self
            .definition
            .tools
            .execute(&call.name, params, &self.tool_context)
            .await;
        let content = output.to_text();

        tx.send(Ok(RawEvent::item(RunItem::ToolOutput {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output: output.content,
        })))
        .await?;

        Ok(ChatTurn::ToolResult {
            call_id: call.id.clone(),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use popup_genius_core::config::Config;
    use popup_genius_providers::ScriptedProvider;

    fn session(provider: Arc<ScriptedProvider>, max_turns: u32) -> AgentSession {
        let definition = AgentDefinition::popup_genius(&Config::default()).with_max_turns(max_turns);
        AgentSession::new(definition, provider, Credentials::None, ToolContext::default())
    }

    async fn collect(stream: RawEventStream) -> Vec<anyhow::Result<RawEvent>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_open_failure_is_err() {
        let provider = Arc::new(ScriptedProvider::new("x").failing_on_open("401 Unauthorized"));
        let result = session(provider, 1).run("hi").await;
        let err = result.err().unwrap();
        assert!(err.to_string().contains("401"));
        match err.downcast_ref::<PopupGeniusError>() {
            Some(PopupGeniusError::Agent(message)) => assert!(message.starts_with("PopupGenius: ")),
            other => panic!("expected an agent error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_run_event_order() {
        let provider = Arc::new(ScriptedProvider::new("Exit-intent wins. Use red CTAs!"));
        let events = collect(session(provider.clone(), 1).run("store").await.unwrap()).await;
        let events: Vec<RawEvent> = events.into_iter().map(Result::unwrap).collect();

        assert_eq!(
            events[0],
            RawEvent::AgentUpdated {
                agent_name: "PopupGenius".into()
            }
        );
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                RawEvent::TextDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Exit-intent wins. Use red CTAs!");
        assert!(events.contains(&RawEvent::Other {
            kind: "stop:stop".into()
        }));
        assert_eq!(
            events.last(),
            Some(&RawEvent::item(RunItem::MessageOutput {
                text: "Exit-intent wins. Use red CTAs!".into()
            }))
        );
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_turn_executes_tools_without_follow_up() {
        let provider = Arc::new(
            ScriptedProvider::new("Done.")
                .with_tool_call("analyze_competitors", json!({"business_description": "baseball bats"})),
        );
        let events = collect(session(provider.clone(), 1).run("store").await.unwrap()).await;
        let events: Vec<RawEvent> = events.into_iter().map(Result::unwrap).collect();

        assert_eq!(provider.calls(), 1);
        assert_eq!(
            events[1],
            RawEvent::Other {
                kind: "stop:tool_calls".into()
            }
        );
        assert!(matches!(
            &events[2],
            RawEvent::Item { item: RunItem::ToolCall { name, call_id, .. } }
                if name == "analyze_competitors" && call_id == "call_1"
        ));
        match &events[3] {
            RawEvent::Item {
                item: RunItem::ToolOutput { name, output, .. },
            } => {
                assert_eq!(name, "analyze_competitors");
                assert_eq!(output["market_overview"]["industry"], "Sports Equipment");
            }
            other => panic!("expected tool output, got {other:?}"),
        }
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn test_multi_turn_feeds_tool_results_back() {
        let provider = Arc::new(
            ScriptedProvider::new("Final answer.")
                .with_tool_call("analyze_popup_history", json!({"business_description": "x"})),
        );
        let events = collect(session(provider.clone(), 2).run("store").await.unwrap()).await;
        let events: Vec<RawEvent> = events.into_iter().map(Result::unwrap).collect();

        assert_eq!(provider.calls(), 2);
        let outputs = events
            .iter()
            .filter(|e| matches!(e, RawEvent::Item { item: RunItem::ToolOutput { .. } }))
            .count();
        assert_eq!(outputs, 1);
        assert_eq!(
            events.last(),
            Some(&RawEvent::item(RunItem::MessageOutput {
                text: "Final answer.".into()
            }))
        );
    }

    #[tokio::test]
    async fn test_mid_stream_error_is_terminal() {
        let provider = Arc::new(
            ScriptedProvider::new("abcdefghijklmnop")
                .with_chunk_chars(4)
                .failing_after(2, "connection reset"),
        );
        let events = collect(session(provider, 1).run("store").await.unwrap()).await;
        assert_eq!(events.len(), 4); // agent update, 2 deltas, error
        let last = events.last().unwrap();
        assert!(last.as_ref().unwrap_err().to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_request_carries_definition() {
        let provider = Arc::new(ScriptedProvider::new("x"));
        let session = session(provider, 1);
        let request = session.request(&[ChatTurn::User { text: "hi".into() }]);
        assert_eq!(request.model, "gpt-4.1");
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(3));
        assert!(request.system.unwrap().starts_with("You are PopupGenius"));
        assert_eq!(request.messages[0]["role"], "user");
    }
}
