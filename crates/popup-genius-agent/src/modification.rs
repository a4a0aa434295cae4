//! Natural-language edits to popup configurations.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use regex::Regex;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use popup_genius_providers::{ChatTurn, CompletionRequest, Credentials, LlmProvider};

use crate::prompt::build_modification_prompt;

/// Rewrites popup configurations with a single model call.
#[derive(Clone)]
pub struct ModificationService {
    provider: Arc<dyn LlmProvider>,
    credentials: Arc<Credentials>,
    model: String,
    max_tokens: u32,
    ui_schema: Option<Arc<str>>,
}

impl ModificationService {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        credentials: Credentials,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            credentials: Arc::new(credentials),
            model: model.into(),
            max_tokens,
            ui_schema: None,
        }
    }

    /// Attach UI schema text to every prompt.
    pub fn with_ui_schema(mut self, schema: Option<String>) -> Self {
        self.ui_schema = schema.map(Arc::from);
        self
    }

    /// Read the UI schema file; a missing or unreadable file yields `None`.
    pub fn load_ui_schema(path: &Path) -> Option<String> {
        match std::fs::read_to_string(path) {
            Ok(schema) => Some(schema),
            Err(e) => {
                warn!(path = %path.display(), %e, "UI schema unavailable");
                None
            }
        }
    }

    /// Apply `instructions` to `current_config`.
    ///
    /// Never fails: any model or parse error returns `current_config`
    /// unchanged.
    pub async fn modify(
        &self,
        instructions: &str,
        current_config: &serde_json::Value,
    ) -> serde_json::Value {
        match self.try_modify(instructions, current_config).await {
            Ok(config) => {
                info!("Popup configuration modified");
                config
            }
            Err(e) => {
                warn!(%e, "Popup modification failed, returning current config");
                current_config.clone()
            }
        }
    }

    async fn try_modify(
        &self,
        instructions: &str,
        current_config: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let prompt =
            build_modification_prompt(instructions, current_config, self.ui_schema.as_deref());
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: self
                .provider
                .format_messages(&[ChatTurn::User { text: prompt }]),
            max_tokens: self.max_tokens,
            temperature: None,
            tools: None,
            system: None,
        };

        let mut stream = self.provider.stream(&request, &self.credentials).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            if let Some(delta) = chunk?.delta {
                reply.push_str(&delta);
            }
        }
        debug!(chars = reply.len(), "Modification reply received");

        parse_config_reply(&reply)
    }
}

/// Parse a model reply as a JSON object, falling back to the outermost
/// `{...}` span when the reply has surrounding prose.
pub fn parse_config_reply(reply: &str) -> anyhow::Result<serde_json::Value> {
    let direct = serde_json::from_str::<serde_json::Value>(reply.trim());
    if let Ok(value @ serde_json::Value::Object(_)) = direct {
        return Ok(value);
    }

    let span = Regex::new(r"(?s)\{.*\}")?;
    let found = span
        .find(reply)
        .context("no JSON object found in model reply")?;
    let value: serde_json::Value =
        serde_json::from_str(found.as_str()).context("model reply is not valid JSON")?;
    anyhow::ensure!(value.is_object(), "model reply is not a JSON object");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use popup_genius_providers::ScriptedProvider;
    use serde_json::json;

    fn service(provider: ScriptedProvider) -> ModificationService {
        ModificationService::new(Arc::new(provider), Credentials::None, "o4-mini", 1024)
    }

    #[test]
    fn test_parse_plain_json() {
        let value = parse_config_reply(r#" {"heading": {"color": "red"}} "#).unwrap();
        assert_eq!(value["heading"]["color"], "red");
    }

    #[test]
    fn test_parse_json_wrapped_in_prose() {
        let reply = "Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```\nEnjoy!";
        assert_eq!(parse_config_reply(reply).unwrap(), json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(parse_config_reply("no json here").is_err());
        assert!(parse_config_reply("[1, 2]").is_err());
        assert!(parse_config_reply("{not json}").is_err());
    }

    #[tokio::test]
    async fn test_modify_returns_model_config() {
        let reply = r#"{"heading": {"text": "Special Offer!", "color": "red"}}"#;
        let modified = service(ScriptedProvider::new(reply))
            .modify("Make the heading red", &json!({"heading": {"text": "Hi"}}))
            .await;
        assert_eq!(modified["heading"]["text"], "Special Offer!");
    }

    #[tokio::test]
    async fn test_modify_returns_current_on_failure() {
        let current = json!({"heading": {"text": "Hi"}});

        let failing = service(ScriptedProvider::new("{}").failing_on_open("boom"));
        assert_eq!(failing.modify("x", &current).await, current);

        let garbage = service(ScriptedProvider::new("I cannot help with that."));
        assert_eq!(garbage.modify("x", &current).await, current);

        let broken = service(ScriptedProvider::new(r#"{"a": 1}"#).failing_after(1, "reset"));
        assert_eq!(broken.modify("x", &current).await, current);
    }

    #[test]
    fn test_load_ui_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ui.py");
        std::fs::write(&path, "class Popup: ...").unwrap();
        assert_eq!(
            ModificationService::load_ui_schema(&path).as_deref(),
            Some("class Popup: ...")
        );
        assert!(ModificationService::load_ui_schema(&dir.path().join("missing.py")).is_none());
    }
}
