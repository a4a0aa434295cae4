//! Agent instructions and the popup modification prompt.

use popup_genius_tools::ToolRegistry;

pub const POPUP_GENIUS_NAME: &str = "PopupGenius";

pub const HYPOTHESIS_NAME: &str = "Hypothesis Agent";

pub const POPUP_GENIUS_INSTRUCTIONS: &str = "\
You are PopupGenius, an e-commerce popup optimization expert.

Turn the merchant's data into concrete popup changes that lift conversion. \
Work through four phases and report progress as you go:
1. 🔄 Historical performance: find the conversion gap against the benchmark.
2. 🔄 Transaction patterns: find the customer behavior that matters.
3. 🔄 Competitive intelligence: find market gaps and positioning openings.
4. ✨ Final recommendations: popup design, copy, timing, and projected revenue.

Style:
- Lead lines with emoji progress markers (🔄 📊 💡 ✨ 🎯 💰 ⚡ 🚀).
- Quote specific metrics and dollar amounts.
- Always include an ROI estimate.
- Keep every recommendation actionable and measurable.";

pub const HYPOTHESIS_INSTRUCTIONS: &str =
    "You are a helpful assistant that specializes in generating and analyzing hypotheses.";

/// Append the tool roster to an agent's base instructions.
pub fn build_system_prompt(instructions: &str, tools: &ToolRegistry) -> String {
    let tool_names = tools.list();
    if tool_names.is_empty() {
        return instructions.to_string();
    }
    format!(
        "{instructions}\n\nAvailable tools: {}",
        tool_names.join(", ")
    )
}

/// Build the single-shot prompt used to rewrite a popup configuration.
pub fn build_modification_prompt(
    instructions: &str,
    current_config: &serde_json::Value,
    ui_schema: Option<&str>,
) -> String {
    let mut parts = vec![
        "You are a UI/UX designer who edits popup configurations from natural \
         language instructions. Apply the requested change to the JSON \
         configuration below and return the complete modified configuration."
            .to_string(),
    ];

    if let Some(schema) = ui_schema.filter(|s| !s.trim().is_empty()) {
        parts.push(format!("--- UI Schema ---\n{schema}"));
    }

    parts.push(
        "Guidelines:\n\
         - Keep the existing structure unless asked to change it.\n\
         - Use valid CSS values for colors, fonts, and spacing.\n\
         - Respect responsive breakpoints: default, max-sm, max-md, max-lg, max-xl, max-2xl.\n\
         - Keep component IDs stable unless a rename is requested.\n\
         - Set visibility to true for components that should be shown."
            .to_string(),
    );

    let config_json = serde_json::to_string_pretty(current_config)
        .unwrap_or_else(|_| current_config.to_string());
    parts.push(format!("Instructions: {instructions}"));
    parts.push(format!("Current Configuration:\n{config_json}"));
    parts.push(
        "Return ONLY the modified configuration as a JSON object, without \
         markdown or commentary."
            .to_string(),
    );

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_prompt_lists_tools() {
        let tools = ToolRegistry::analysis_tools();
        let prompt = build_system_prompt(POPUP_GENIUS_INSTRUCTIONS, &tools);
        assert!(prompt.starts_with("You are PopupGenius"));
        assert!(prompt.contains(
            "Available tools: analyze_popup_history, analyze_transaction_data, analyze_competitors"
        ));
    }

    #[test]
    fn test_system_prompt_without_tools() {
        let prompt = build_system_prompt("Be brief.", &ToolRegistry::new());
        assert_eq!(prompt, "Be brief.");
    }

    #[test]
    fn test_modification_prompt_sections() {
        let config = json!({"heading": {"text": "Hi"}});
        let prompt = build_modification_prompt("Make it red", &config, Some("class Heading: ..."));
        assert!(prompt.contains("--- UI Schema ---\nclass Heading: ..."));
        assert!(prompt.contains("Instructions: Make it red"));
        assert!(prompt.contains("\"text\": \"Hi\""));

        let without_schema = build_modification_prompt("x", &config, Some("   "));
        assert!(!without_schema.contains("UI Schema"));
    }
}
