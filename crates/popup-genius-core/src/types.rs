//! Request bodies accepted by the HTTP and WebSocket endpoints.

use serde::{Deserialize, Serialize};

/// An optimization request from the storefront UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub business_description: String,
    #[serde(default)]
    pub optimization_goals: String,
}

impl OptimizationRequest {
    /// The text handed to the agent: the description, then the goals in
    /// their own paragraph when present.
    pub fn agent_input(&self) -> String {
        let goals = self.optimization_goals.trim();
        if goals.is_empty() {
            self.business_description.clone()
        } else {
            format!(
                "{}\n\nOptimization goals: {goals}",
                self.business_description
            )
        }
    }
}

/// Legacy chat body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
}

/// Request to rewrite a popup configuration from natural-language instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationRequest {
    pub instructions: String,
    pub current_config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationResponse {
    pub config: serde_json::Value,
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
