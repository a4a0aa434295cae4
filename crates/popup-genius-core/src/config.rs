//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Provider ids the server knows how to build.
pub const KNOWN_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "scripted"];

/// Upstream calls allowed per agent run unless `agent.max_turns` says otherwise.
pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Top-level PopupGenius configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Free-form deployment label ("dev", "prod").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Configuration for the upstream LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_id")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_provider_id() -> String {
    "openai".into()
}

impl ProviderConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env`
    /// (falling back to `OPENAI_API_KEY`).
    pub fn resolve_api_key(&self) -> Option<String> {
        let env = self
            .api_key_env
            .clone()
            .or_else(|| Some("OPENAI_API_KEY".to_string()));
        resolve_secret_field(&self.api_key, &env)
    }

    /// Whether this provider talks to a hosted API that needs a key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self.id.as_str(), "ollama" | "scripted")
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: default_provider_id(),
            api_key_env: None,
            api_key: None,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Upper bound on upstream calls per run. Tool results are fed back to
    /// the model until it answers without tools or the bound is reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,

    /// Model used by the popup modification endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_model: Option<String>,
}

/// What the translator does when the live phase fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Replace the failed answer with the canned fallback narrative.
    #[default]
    Mask,
    /// Emit a single `error` event carrying the failure message.
    Surface,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Run the scripted tool timeline before the live answer.
    #[serde(default = "default_true")]
    pub simulate_tools: bool,

    #[serde(default = "default_tool_delay_ms")]
    pub tool_delay_ms: u64,

    #[serde(default = "default_fallback_delay_ms")]
    pub fallback_delay_ms: u64,

    /// Buffered text longer than this many characters is flushed.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_tool_delay_ms() -> u64 {
    500
}

fn default_fallback_delay_ms() -> u64 {
    300
}

fn default_flush_threshold() -> usize {
    50
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            simulate_tools: true,
            tool_delay_ms: default_tool_delay_ms(),
            fallback_delay_ms: default_fallback_delay_ms(),
            flush_threshold: default_flush_threshold(),
            failure_policy: FailurePolicy::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Sample data locations for the analysis tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_popup_data_path")]
    pub popup_data_path: String,

    #[serde(default = "default_transaction_data_path")]
    pub transaction_data_path: String,

    /// UI schema text handed to the modification model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_schema_path: Option<String>,
}

fn default_popup_data_path() -> String {
    "data/mock_popup_data.json".into()
}

fn default_transaction_data_path() -> String {
    "data/mock_transaction_data.csv".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            popup_data_path: default_popup_data_path(),
            transaction_data_path: default_transaction_data_path(),
            ui_schema_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Origins allowed by the CORS layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_origins: Option<Vec<String>>,
}

fn default_port() -> u16 {
    8000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "popup_genius_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_log_format() -> String {
    "plain".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::PopupGeniusError::Io)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::PopupGeniusError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Provider section, or the OpenAI defaults.
    pub fn provider_config(&self) -> ProviderConfig {
        self.provider.clone().unwrap_or_default()
    }

    /// Model used by the optimization and chat agents.
    pub fn model(&self) -> String {
        self.agent
            .as_ref()
            .and_then(|a| a.model.clone())
            .unwrap_or_else(|| "gpt-4.1".to_string())
    }

    /// Get the default max_tokens.
    pub fn max_tokens(&self) -> u32 {
        self.agent
            .as_ref()
            .and_then(|a| a.max_tokens)
            .unwrap_or(4096)
    }

    /// Get temperature setting.
    pub fn temperature(&self) -> Option<f64> {
        self.agent.as_ref().and_then(|a| a.temperature)
    }

    pub fn max_turns(&self) -> u32 {
        self.agent
            .as_ref()
            .and_then(|a| a.max_turns)
            .unwrap_or(DEFAULT_MAX_TURNS)
            .max(1)
    }

    pub fn modification_model(&self) -> String {
        self.agent
            .as_ref()
            .and_then(|a| a.modification_model.clone())
            .unwrap_or_else(|| "o4-mini".to_string())
    }

    /// Stream settings, or defaults.
    pub fn stream_config(&self) -> StreamConfig {
        self.stream.clone().unwrap_or_default()
    }

    /// Tool data settings with `~` expanded in every path.
    pub fn tools_config(&self) -> ToolsConfig {
        let tools = self.tools.clone().unwrap_or_default();
        ToolsConfig {
            popup_data_path: expand_path(&tools.popup_data_path),
            transaction_data_path: expand_path(&tools.transaction_data_path),
            ui_schema_path: tools.ui_schema_path.as_deref().map(expand_path),
        }
    }

    /// Gateway port.
    pub fn gateway_port(&self) -> u16 {
        self.gateway
            .as_ref()
            .map(|g| g.port)
            .unwrap_or(8000)
    }

    /// Gateway bind address.
    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    /// Origins allowed to call the API from a browser.
    pub fn cors_origins(&self) -> Vec<String> {
        self.gateway
            .as_ref()
            .and_then(|g| g.cors_origins.clone())
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:3001".to_string(),
                ]
            })
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "stream.tool_delay_ms").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let provider = self.provider_config();
        if !KNOWN_PROVIDERS.contains(&provider.id.as_str()) {
            errors.push(format!(
                "Unknown provider '{}' (expected one of: {})",
                provider.id,
                KNOWN_PROVIDERS.join(", ")
            ));
        } else if provider.requires_api_key() && provider.resolve_api_key().is_none() {
            warnings.push(format!(
                "Provider '{}' has no API key configured; responses will use the fallback narrative",
                provider.id
            ));
        }

        if let Some(stream) = &self.stream {
            if stream.flush_threshold == 0 {
                errors.push("stream.flush_threshold must be at least 1".to_string());
            }
            if stream.channel_capacity == 0 {
                errors.push("stream.channel_capacity must be at least 1".to_string());
            }
        }

        let tools = self.tools_config();
        for path in [&tools.popup_data_path, &tools.transaction_data_path] {
            if !Path::new(path).exists() {
                warnings.push(format!(
                    "Sample data file not found: {path} (tools will use built-in defaults)"
                ));
            }
        }

        // Check port is non-zero
        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                warnings.push(format!(
                    "Unknown logging format '{}', using plain",
                    logging.format
                ));
            }
        }

        (warnings, errors)
    }
}

fn expand_path(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

/// Base directory for PopupGenius data: `~/.popup_genius/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".popup_genius")
}
