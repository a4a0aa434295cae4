//! Agent runtime for PopupGenius.
//!
//! An [`AgentSession`] drives one agent definition against an LLM provider
//! and yields a stream of [`RawEvent`]s. The [`EventTranslator`] turns that
//! raw stream into the client-facing [`StreamEvent`] sequence, adding the
//! progress simulation, text buffering, and the failure policy.
//!
//! [`StreamEvent`]: popup_genius_core::protocol::StreamEvent

use serde::{Deserialize, Serialize};

pub mod definition;
pub mod modification;
pub mod prompt;
pub mod session;
pub mod translator;

pub use definition::AgentDefinition;
pub use modification::ModificationService;
pub use session::{AgentSession, RawEventStream};
pub use translator::EventTranslator;

/// Events produced by an agent session. This is the only shape the rest of
/// the system sees of the upstream model protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    /// The agent driving the run. Always the first event.
    AgentUpdated { agent_name: String },

    /// An incremental fragment of generated text.
    TextDelta { delta: String },

    /// A completed unit of work.
    Item { item: RunItem },

    /// Upstream bookkeeping such as `usage` and `stop:<reason>`; ignored
    /// downstream.
    Other { kind: String },
}

/// A completed unit of work inside a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum RunItem {
    /// The model asked for a tool. `arguments` is the raw JSON text.
    ToolCall {
        call_id: String,
        name: String,
        arguments: String,
    },

    /// A requested tool finished.
    ToolOutput {
        call_id: String,
        name: String,
        output: serde_json::Value,
    },

    /// The final assistant message.
    MessageOutput { text: String },
}

impl RawEvent {
    pub fn item(item: RunItem) -> Self {
        Self::Item { item }
    }
}
