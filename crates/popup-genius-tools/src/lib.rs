//! Analysis tools exposed to the PopupGenius agents.
//!
//! Each tool implements the [`Tool`] trait and returns structured JSON. The
//! analysis tools never fail on bad data: they fall back to built-in figures
//! and log a warning.

pub mod competitors;
pub mod data;
pub mod industry;
pub mod popup_history;
pub mod random_number;
pub mod transactions;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use popup_genius_core::config::ToolsConfig;

pub use competitors::{CompetitorTool, analyze_competitors};
pub use data::DataSources;
pub use industry::Industry;
pub use popup_history::{PopupHistoryTool, analyze_popup_history};
pub use random_number::{RandomNumberTool, generate_random_number};
pub use transactions::{TransactionDataTool, analyze_transaction_data};

/// Context provided to tools during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub data: DataSources,
}

impl ToolContext {
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self {
            data: DataSources::from_config(config),
        }
    }
}

/// Output from a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: serde_json::Value,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn json(content: serde_json::Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: serde_json::Value::String(message.into()),
            is_error: true,
        }
    }

    /// Render the content for a model transcript. Strings are passed through
    /// unquoted; everything else is compact JSON.
    pub fn to_text(&self) -> String {
        match &self.content {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// The core tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to the LLM (e.g., "analyze_competitors").
    fn name(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Human-readable description for the LLM.
    fn description(&self) -> &str;

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolOutput>;
}

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the three marketing analysis tools.
    pub fn analysis_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PopupHistoryTool));
        registry.register(Box::new(TransactionDataTool));
        registry.register(Box::new(CompetitorTool));
        registry
    }

    /// Later registrations with the same name replace earlier ones.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run a tool by name. Unknown tools and execution errors come back as
    /// error outputs rather than `Err`, so the model can see what went wrong.
    pub async fn execute(
        &self,
        name: &str,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            warn!(tool = %name, "Unknown tool requested");
            return ToolOutput::error(format!("Unknown tool: {name}"));
        };
        debug!(tool = %name, "Executing tool");
        match tool.execute(params, context).await {
            Ok(output) => output,
            Err(e) => {
                warn!(%e, tool = %name, "Tool execution error");
                ToolOutput::error(format!("Tool error: {e}"))
            }
        }
    }
}
