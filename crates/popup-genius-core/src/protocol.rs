//! PopupGenius streaming wire protocol.
//!
//! Every structured stream is a sequence of [`StreamEvent`]s, serialized as
//! flat JSON objects tagged by `type`:
//!
//! ```json
//! {"type":"text_chunk","content":"Exit-intent works.","timestamp":"2025-06-01T12:00:00Z"}
//! ```
//!
//! The simple WebSocket endpoint uses the smaller [`SimpleFrame`] envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event in a structured analysis stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

/// The type-specific payload of a [`StreamEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// First event of every stream.
    AnalysisStart { message: String },

    /// A tool began running (simulated or requested by the model).
    ToolStart {
        tool_name: String,
        tool_description: String,
        arguments: serde_json::Value,
    },

    /// The tool named in the preceding `tool_start` finished.
    ToolComplete {
        tool_name: String,
        tool_output: serde_json::Value,
    },

    /// A flushed slice of generated text.
    TextChunk { content: String },

    /// The full assistant message, once the model has finished.
    MessageComplete { content: String },

    /// The agent driving the run changed.
    AgentUpdate { agent_name: String },

    /// A surfaced failure.
    Error { message: String },
}

impl StreamEvent {
    /// Stamp an event with the current time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn analysis_start(message: impl Into<String>) -> Self {
        Self::new(EventKind::AnalysisStart {
            message: message.into(),
        })
    }

    pub fn text_chunk(content: impl Into<String>) -> Self {
        Self::new(EventKind::TextChunk {
            content: content.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error {
            message: message.into(),
        })
    }

    /// Text content if this is a `text_chunk`.
    pub fn as_text_chunk(&self) -> Option<&str> {
        match &self.kind {
            EventKind::TextChunk { content } => Some(content),
            _ => None,
        }
    }
}

impl EventKind {
    /// The wire `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AnalysisStart { .. } => "analysis_start",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolComplete { .. } => "tool_complete",
            Self::TextChunk { .. } => "text_chunk",
            Self::MessageComplete { .. } => "message_complete",
            Self::AgentUpdate { .. } => "agent_update",
            Self::Error { .. } => "error",
        }
    }
}

/// Frames sent by the simple WebSocket endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimpleFrame {
    AnalysisStart { message: String },
    AnalysisChunk { content: String },
    AnalysisComplete { message: String },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_flat() {
        let event = StreamEvent::text_chunk("Hello.");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "text_chunk");
        assert_eq!(value["content"], "Hello.");
        assert!(value["timestamp"].is_string());
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_every_variant_round_trips() {
        let kinds = vec![
            EventKind::AnalysisStart {
                message: "🚀 Starting".into(),
            },
            EventKind::ToolStart {
                tool_name: "analyze_competitors".into(),
                tool_description: "🌐 Scan".into(),
                arguments: json!({"business_description": "Baseball bats"}),
            },
            EventKind::ToolComplete {
                tool_name: "analyze_competitors".into(),
                tool_output: json!({"analysis_type": "Competitive Intelligence Analysis"}),
            },
            EventKind::TextChunk {
                content: "line\n".into(),
            },
            EventKind::MessageComplete {
                content: "full text".into(),
            },
            EventKind::AgentUpdate {
                agent_name: "PopupGenius".into(),
            },
            EventKind::Error {
                message: "upstream failed".into(),
            },
        ];

        for kind in kinds {
            let event = StreamEvent::new(kind);
            let encoded = serde_json::to_string(&event).unwrap();
            let decoded: StreamEvent = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, event, "round trip changed {encoded}");
        }
    }

    #[test]
    fn test_parse_client_shaped_event() {
        let raw = r#"{"type":"tool_complete","tool_name":"analyze_popup_history","tool_output":"Found 62%","timestamp":"2025-06-01T12:00:00Z"}"#;
        let event: StreamEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind.type_name(), "tool_complete");
        match event.kind {
            EventKind::ToolComplete {
                tool_name,
                tool_output,
            } => {
                assert_eq!(tool_name, "analyze_popup_history");
                assert_eq!(tool_output, json!("Found 62%"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_simple_frame_shape() {
        let frame = SimpleFrame::AnalysisChunk {
            content: "abc".into(),
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "analysis_chunk", "content": "abc"})
        );
    }
}
