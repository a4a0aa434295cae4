//! Agent definitions: name, instructions, model, and tool list.

use std::sync::Arc;

use popup_genius_core::config::Config;
use popup_genius_providers::ToolDefinition;
use popup_genius_tools::{RandomNumberTool, ToolRegistry};

use crate::prompt::{
    HYPOTHESIS_INSTRUCTIONS, HYPOTHESIS_NAME, POPUP_GENIUS_INSTRUCTIONS, POPUP_GENIUS_NAME,
    build_system_prompt,
};

#[derive(Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    /// Upper bound on upstream calls per run.
    pub max_turns: u32,
    pub tools: Arc<ToolRegistry>,
}

impl AgentDefinition {
    /// The popup optimization agent with the three analysis tools.
    pub fn popup_genius(config: &Config) -> Self {
        Self::from_config(
            config,
            POPUP_GENIUS_NAME,
            POPUP_GENIUS_INSTRUCTIONS,
            ToolRegistry::analysis_tools(),
        )
    }

    /// The legacy chat agent behind `/chat`.
    pub fn hypothesis(config: &Config) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(RandomNumberTool));
        Self::from_config(config, HYPOTHESIS_NAME, HYPOTHESIS_INSTRUCTIONS, tools)
    }

    fn from_config(config: &Config, name: &str, instructions: &str, tools: ToolRegistry) -> Self {
        Self {
            name: name.to_string(),
            instructions: instructions.to_string(),
            model: config.model(),
            max_tokens: config.max_tokens(),
            temperature: config.temperature(),
            max_turns: config.max_turns(),
            tools: Arc::new(tools),
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Full system prompt, including the tool roster.
    pub fn system_prompt(&self) -> String {
        build_system_prompt(&self.instructions, &self.tools)
    }

    /// Tool definitions for the completion request.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .tools()
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters_schema: t.parameters_schema(),
            })
            .collect()
    }
}

impl std::fmt::Debug for AgentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDefinition")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("max_turns", &self.max_turns)
            .field("tools", &self.tools.list())
            .finish()
    }
}
