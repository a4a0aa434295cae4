//! Translate agent runs into client-facing [`StreamEvent`] sequences.
//!
//! A run has two phases. The progress simulation plays a fixed tool
//! timeline while the upstream call is being opened; the live phase then
//! forwards the agent's output, buffering text deltas into readable chunks.
//! When the live phase fails the configured [`FailurePolicy`] decides
//! between the canned fallback narrative and a single `error` event.

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, trace, warn};

use popup_genius_core::config::{FailurePolicy, StreamConfig};
use popup_genius_core::protocol::{EventKind, StreamEvent};
use popup_genius_core::types::truncate_chars;

use crate::session::{AgentSession, RawEventStream};
use crate::{RawEvent, RunItem};

pub const START_MESSAGE: &str = "🚀 Starting PopupGenius analysis...";

/// Characters of user input echoed into tool arguments and the fallback.
const INPUT_PREVIEW_CHARS: usize = 100;

/// The tool timeline played by the progress simulation.
const SIMULATED_TOOLS: [&str; 3] = [
    "analyze_popup_history",
    "analyze_transaction_data",
    "analyze_competitors",
];

/// User-facing description of a tool.
pub fn describe_tool(name: &str) -> String {
    match name {
        "analyze_popup_history" => "📊 Analyzing Historical Popup Performance".into(),
        "analyze_transaction_data" => "💰 Analyzing Customer Transaction Patterns".into(),
        "analyze_competitors" => "🌐 Conducting Competitive Intelligence Scan".into(),
        other => format!("🔧 Running {other}"),
    }
}

fn simulated_insight(name: &str) -> String {
    match name {
        "analyze_popup_history" => {
            "Found 62% improvement opportunity - current 10.4% vs industry 16.8%".into()
        }
        "analyze_transaction_data" => {
            "Discovered $495+ purchases have 340% higher intent signals".into()
        }
        "analyze_competitors" => "Identified urgency tactics increasing conversions by 2.3x".into(),
        other => format!("Analysis complete for {other}"),
    }
}

/// The canned narrative emitted in place of a failed answer.
pub fn fallback_chunks(input: &str) -> Vec<String> {
    let mut chunks = vec![format!(
        "🚀 **PopupGenius Analysis for:** {}...\n\n",
        truncate_chars(input, INPUT_PREVIEW_CHARS)
    )];
    chunks.extend(
        [
            "📊 **Historical Performance Analysis**\n",
            "• Current conversion rate: 10.4%\n",
            "• Industry average: 16.8%\n",
            "• **Improvement opportunity: +62%**\n\n",
            "💰 **Revenue Impact Analysis**\n",
            "• Potential revenue increase: $127,000 annually\n",
            "• ROI on optimization: 340%\n",
            "• Payback period: 2.1 months\n\n",
            "🌐 **Competitive Intelligence**\n",
            "• Top competitors using urgency tactics\n",
            "• Exit-intent popups show 2.3x better performance\n",
            "• Discount thresholds: 20-25% optimal for $400+ items\n\n",
            "✨ **Final Recommendations**\n",
            "🎯 **Popup Strategy:** Exit-intent popup with urgency timer\n",
            "💰 **Offer:** '25% OFF Your $400+ Purchase - Limited Time!'\n",
            "⏰ **Timing:** Trigger after 45 seconds or scroll 70%\n",
            "📱 **Design:** Mobile-first, single field email capture\n",
            "🚀 **Expected Results:** 16.8% conversion rate (+62% improvement)",
        ]
        .map(String::from),
    );
    chunks
}

/// Accumulates text deltas until they are worth sending.
///
/// Flushes when the buffer holds more than `threshold` characters or any
/// sentence break (`.`, `!`, `?`, newline).
#[derive(Debug)]
pub struct TextBuffer {
    buf: String,
    threshold: usize,
}

impl TextBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            buf: String::new(),
            threshold,
        }
    }

    /// Append a delta; returns the whole buffer if it should be flushed now.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        self.buf.push_str(delta);
        if self.should_flush() {
            self.take()
        } else {
            None
        }
    }

    /// Drain whatever is pending.
    pub fn take(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    fn should_flush(&self) -> bool {
        self.buf.chars().count() > self.threshold
            || self.buf.contains(['.', '!', '?', '\n'])
    }
}

/// The consumer went away; the run should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed;

struct Emitter {
    tx: mpsc::Sender<StreamEvent>,
}

impl Emitter {
    async fn send(&self, event: StreamEvent) -> Result<(), Closed> {
        self.tx.send(event).await.map_err(|_| Closed)
    }

    async fn emit(&self, kind: EventKind) -> Result<(), Closed> {
        self.send(StreamEvent::new(kind)).await
    }
}

/// Drives one [`AgentSession`] per request and yields [`StreamEvent`]s.
#[derive(Clone)]
pub struct EventTranslator {
    session: AgentSession,
    config: StreamConfig,
}

impl EventTranslator {
    pub fn new(session: AgentSession, config: StreamConfig) -> Self {
        Self { session, config }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Start translating a run for `input`. The returned stream closes after
    /// the live phase or the fallback sequence; dropping it cancels the run.
    pub fn stream(&self, input: impl Into<String>) -> ReceiverStream<StreamEvent> {
        let input = input.into();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let translator = self.clone();
        tokio::spawn(async move {
            let emitter = Emitter { tx };
            match translator.translate(&input, &emitter).await {
                Ok(()) => debug!("Analysis stream finished"),
                Err(Closed) => info!("Client disconnected, analysis cancelled"),
            }
        });
        ReceiverStream::new(rx)
    }

    async fn translate(&self, input: &str, out: &Emitter) -> Result<(), Closed> {
        let (opened, simulated) =
            tokio::join!(self.session.run(input), self.simulate_progress(input, out));
        simulated?;

        let failure = match opened {
            Ok(stream) => self.live_phase(stream, out).await?,
            Err(e) => Some(e),
        };

        if let Some(e) = failure {
            self.handle_failure(input, e, out).await?;
        }
        Ok(())
    }

    async fn simulate_progress(&self, input: &str, out: &Emitter) -> Result<(), Closed> {
        out.send(StreamEvent::analysis_start(START_MESSAGE)).await?;
        if !self.config.simulate_tools {
            return Ok(());
        }

        let preview = truncate_chars(input, INPUT_PREVIEW_CHARS);
        for name in SIMULATED_TOOLS {
            out.emit(EventKind::ToolStart {
                tool_name: name.to_string(),
                tool_description: describe_tool(name),
                arguments: json!({ "business_description": preview }),
            })
            .await?;
            tokio::time::sleep(Duration::from_millis(self.config.tool_delay_ms)).await;
            out.emit(EventKind::ToolComplete {
                tool_name: name.to_string(),
                tool_output: simulated_insight(name).into(),
            })
            .await?;
        }
        Ok(())
    }

    /// Forward the live run. Returns the failure that ended it, if any.
    async fn live_phase(
        &self,
        mut stream: RawEventStream,
        out: &Emitter,
    ) -> Result<Option<anyhow::Error>, Closed> {
        let mut buffer = TextBuffer::new(self.config.flush_threshold);

        while let Some(next) = stream.next().await {
            let event = match next {
                Ok(event) => event,
                Err(e) => {
                    if let Some(text) = buffer.take() {
                        out.send(StreamEvent::text_chunk(text)).await?;
                    }
                    return Ok(Some(e));
                }
            };

            match event {
                RawEvent::TextDelta { delta } => {
                    if let Some(text) = buffer.push(&delta) {
                        out.send(StreamEvent::text_chunk(text)).await?;
                    }
                }
                other => {
                    let Some(kind) = translate_event(other) else {
                        continue;
                    };
                    if let Some(text) = buffer.take() {
                        out.send(StreamEvent::text_chunk(text)).await?;
                    }
                    out.emit(kind).await?;
                }
            }
        }

        if let Some(text) = buffer.take() {
            out.send(StreamEvent::text_chunk(text)).await?;
        }
        Ok(None)
    }

    async fn handle_failure(
        &self,
        input: &str,
        error: anyhow::Error,
        out: &Emitter,
    ) -> Result<(), Closed> {
        match self.config.failure_policy {
            FailurePolicy::Mask => {
                warn!(%error, "Analysis failed, streaming fallback narrative");
                let pace = Duration::from_millis(self.config.fallback_delay_ms);
                for chunk in fallback_chunks(input) {
                    out.send(StreamEvent::text_chunk(chunk)).await?;
                    tokio::time::sleep(pace).await;
                }
                Ok(())
            }
            FailurePolicy::Surface => {
                warn!(%error, "Analysis failed, surfacing error");
                out.send(StreamEvent::error(error.to_string())).await
            }
        }
    }
}

/// Map a raw event onto its wire counterpart. Bookkeeping events have none.
fn translate_event(event: RawEvent) -> Option<EventKind> {
    let kind = match event {
        RawEvent::AgentUpdated { agent_name } => EventKind::AgentUpdate { agent_name },
        RawEvent::Item {
            item: RunItem::ToolCall {
                name, arguments, ..
            },
        } => EventKind::ToolStart {
            tool_description: describe_tool(&name),
            arguments: serde_json::from_str(&arguments).unwrap_or_else(|_| json!({})),
            tool_name: name,
        },
        RawEvent::Item {
            item: RunItem::ToolOutput { name, output, .. },
        } => EventKind::ToolComplete {
            tool_name: name,
            tool_output: output,
        },
        RawEvent::Item {
            item: RunItem::MessageOutput { text },
        } => EventKind::MessageComplete { content: text },
        RawEvent::TextDelta { delta } => EventKind::TextChunk { content: delta },
        RawEvent::Other { kind } => {
            trace!(%kind, "Ignoring raw event");
            return None;
        }
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use popup_genius_core::config::Config;
    use popup_genius_providers::{Credentials, ScriptedProvider};
    use popup_genius_tools::ToolContext;

    use crate::AgentDefinition;

    fn fast_config() -> StreamConfig {
        StreamConfig {
            tool_delay_ms: 0,
            fallback_delay_ms: 0,
            ..StreamConfig::default()
        }
    }

    fn translator(provider: ScriptedProvider, config: StreamConfig, max_turns: u32) -> EventTranslator {
        let definition = AgentDefinition::popup_genius(&Config::default()).with_max_turns(max_turns);
        let session = AgentSession::new(
            definition,
            Arc::new(provider),
            Credentials::None,
            ToolContext::default(),
        );
        EventTranslator::new(session, config)
    }

    async fn run(translator: &EventTranslator, input: &str) -> Vec<StreamEvent> {
        translator.stream(input).collect().await
    }

    fn types(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.kind.type_name()).collect()
    }

    fn text(events: &[StreamEvent]) -> String {
        events.iter().filter_map(StreamEvent::as_text_chunk).collect()
    }

    #[test]
    fn test_buffer_flushes_on_sentence_break() {
        let mut buffer = TextBuffer::new(50);
        assert_eq!(buffer.push("Exit"), None);
        assert_eq!(buffer.push("-intent"), None);
        assert_eq!(buffer.push(" wins. Next"), Some("Exit-intent wins. Next".into()));
        assert_eq!(buffer.take(), None);
        assert_eq!(buffer.push("line\n"), Some("line\n".into()));
    }

    #[test]
    fn test_buffer_flushes_past_threshold() {
        let mut buffer = TextBuffer::new(5);
        assert_eq!(buffer.push("abcde"), None);
        assert_eq!(buffer.push("f"), Some("abcdef".into()));
        // counts characters, not bytes
        assert_eq!(buffer.push("🎯🎯🎯"), None);
        assert_eq!(buffer.take(), Some("🎯🎯🎯".into()));
    }

    #[test]
    fn test_fallback_has_nineteen_chunks() {
        let long = "x".repeat(150);
        let chunks = fallback_chunks(&long);
        assert_eq!(chunks.len(), 19);
        assert_eq!(
            chunks[0],
            format!("🚀 **PopupGenius Analysis for:** {}...\n\n", "x".repeat(100))
        );
        assert!(chunks[18].starts_with("🚀 **Expected Results:**"));
    }

    #[test]
    fn test_describe_tool() {
        assert_eq!(
            describe_tool("analyze_competitors"),
            "🌐 Conducting Competitive Intelligence Scan"
        );
        assert_eq!(describe_tool("lookup"), "🔧 Running lookup");
    }

    #[tokio::test]
    async fn test_full_stream_order_and_text() {
        let reply = "📊 Your opt-in rate is 10.4%. Add an exit-intent popup! Expect a lift";
        let t = translator(ScriptedProvider::new(reply), fast_config(), 1);
        let events = run(&t, "Baseball bat store").await;

        assert_eq!(
            &types(&events)[..8],
            &[
                "analysis_start",
                "tool_start",
                "tool_complete",
                "tool_start",
                "tool_complete",
                "tool_start",
                "tool_complete",
                "agent_update",
            ]
        );
        assert_eq!(types(&events).last(), Some(&"message_complete"));
        assert_eq!(text(&events), reply);

        match &events[1].kind {
            EventKind::ToolStart {
                tool_name,
                arguments,
                ..
            } => {
                assert_eq!(tool_name, "analyze_popup_history");
                assert_eq!(arguments["business_description"], "Baseball bat store");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &events[2].kind {
            EventKind::ToolComplete {
                tool_name,
                tool_output,
            } => {
                assert_eq!(tool_name, "analyze_popup_history");
                assert!(tool_output.as_str().unwrap().contains("62%"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_every_tool_start_has_matching_complete() {
        let provider = ScriptedProvider::new("Done.")
            .with_tool_call("analyze_competitors", json!({"business_description": "shop"}))
            .with_tool_call("analyze_popup_history", json!({}));
        let t = translator(provider, fast_config(), 2);
        let events = run(&t, "shop").await;

        let mut open: Option<String> = None;
        let mut pairs = 0;
        for event in &events {
            match &event.kind {
                EventKind::ToolStart { tool_name, .. } => {
                    assert!(open.is_none(), "nested tool_start");
                    open = Some(tool_name.clone());
                }
                EventKind::ToolComplete { tool_name, .. } => {
                    assert_eq!(open.take().as_deref(), Some(tool_name.as_str()));
                    pairs += 1;
                }
                _ => {}
            }
        }
        assert!(open.is_none());
        assert_eq!(pairs, 5);
        assert_eq!(text(&events), "Done.");
    }

    #[tokio::test]
    async fn test_live_tool_output_is_structured() {
        let provider = ScriptedProvider::new("ok")
            .with_tool_call("analyze_competitors", json!({"business_description": "dress shop"}));
        let config = StreamConfig {
            simulate_tools: false,
            ..fast_config()
        };
        let events = run(&translator(provider, config, 10), "dress shop").await;

        assert_eq!(
            types(&events),
            vec![
                "analysis_start",
                "agent_update",
                "tool_start",
                "tool_complete",
                "text_chunk",
                "message_complete"
            ]
        );
        assert_eq!(text(&events), "ok");
        match &events[2].kind {
            EventKind::ToolStart {
                tool_description,
                arguments,
                ..
            } => {
                assert_eq!(tool_description, "🌐 Conducting Competitive Intelligence Scan");
                assert_eq!(arguments["business_description"], "dress shop");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &events[3].kind {
            EventKind::ToolComplete { tool_output, .. } => {
                assert_eq!(tool_output["market_overview"]["industry"], "Fashion");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_failure_masked_with_fallback() {
        let provider = ScriptedProvider::new("unused").failing_on_open("invalid api key");
        let events = run(&translator(provider, fast_config(), 1), "Candle shop").await;

        assert_eq!(types(&events)[0], "analysis_start");
        let chunks: Vec<&str> = events.iter().filter_map(StreamEvent::as_text_chunk).collect();
        assert_eq!(chunks.len(), 19);
        assert!(chunks[0].contains("Candle shop"));
        assert!(!types(&events).contains(&"error"));
    }

    #[tokio::test]
    async fn test_open_failure_surfaced() {
        let provider = ScriptedProvider::new("unused").failing_on_open("invalid api key");
        let config = StreamConfig {
            failure_policy: FailurePolicy::Surface,
            ..fast_config()
        };
        let events = run(&translator(provider, config, 1), "Candle shop").await;

        let last = events.last().unwrap();
        assert_eq!(
            last.kind,
            EventKind::Error {
                message: "invalid api key".into()
            }
        );
        assert!(text(&events).is_empty());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_flushes_pending_text_first() {
        let provider = ScriptedProvider::new("Hello world this is long")
            .with_chunk_chars(7)
            .failing_after(2, "connection reset");
        let config = StreamConfig {
            simulate_tools: false,
            ..fast_config()
        };
        let events = run(&translator(provider, config, 1), "shop").await;

        let chunks: Vec<&str> = events.iter().filter_map(StreamEvent::as_text_chunk).collect();
        assert_eq!(chunks[0], "Hello world th");
        assert!(chunks[1].starts_with("🚀 **PopupGenius Analysis for:** shop"));
        assert_eq!(chunks.len(), 20);
    }

    #[tokio::test]
    async fn test_simulation_disabled_skips_tool_timeline() {
        let config = StreamConfig {
            simulate_tools: false,
            ..fast_config()
        };
        let events = run(&translator(ScriptedProvider::new("Hi."), config, 1), "x").await;
        assert_eq!(
            types(&events),
            vec!["analysis_start", "agent_update", "text_chunk", "message_complete"]
        );
    }

    #[tokio::test]
    async fn test_single_call_bound_leaves_tools_unanswered() {
        let provider = ScriptedProvider::new("ok")
            .with_tool_call("analyze_competitors", json!({"business_description": "dress shop"}));
        let config = StreamConfig {
            simulate_tools: false,
            ..fast_config()
        };
        let events = run(&translator(provider, config, 1), "dress shop").await;
        assert_eq!(
            types(&events),
            vec!["analysis_start", "agent_update", "tool_start", "tool_complete"]
        );
    }

    #[tokio::test]
    async fn test_bookkeeping_events_are_dropped() {
        let t = translator(ScriptedProvider::new("unused"), fast_config(), 1);
        let raw: Vec<anyhow::Result<RawEvent>> = vec![
            Ok(RawEvent::AgentUpdated {
                agent_name: "PopupGenius".into(),
            }),
            Ok(RawEvent::TextDelta {
                delta: "Use red".into(),
            }),
            Ok(RawEvent::Other {
                kind: "usage".into(),
            }),
            Ok(RawEvent::TextDelta {
                delta: " CTAs.".into(),
            }),
            Ok(RawEvent::Other {
                kind: "stop:stop".into(),
            }),
            Ok(RawEvent::item(RunItem::MessageOutput {
                text: "Use red CTAs.".into(),
            })),
        ];

        let (tx, rx) = mpsc::channel(16);
        let failure = t
            .live_phase(Box::pin(tokio_stream::iter(raw)), &Emitter { tx })
            .await
            .unwrap();
        assert!(failure.is_none());

        let events: Vec<StreamEvent> = ReceiverStream::new(rx).collect().await;
        assert_eq!(
            types(&events),
            vec!["agent_update", "text_chunk", "message_complete"]
        );
        assert_eq!(text(&events), "Use red CTAs.");
        assert!(
            translate_event(RawEvent::Other {
                kind: "stop:length".into()
            })
            .is_none()
        );
    }

    #[tokio::test]
    async fn test_closed_consumer_stops_translation() {
        let t = translator(ScriptedProvider::new("Hi."), fast_config(), 1);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let result = t.translate("x", &Emitter { tx }).await;
        assert_eq!(result, Err(Closed));
    }
}
