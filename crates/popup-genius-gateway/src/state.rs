//! Gateway shared state.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

use popup_genius_agent::{AgentDefinition, AgentSession, EventTranslator, ModificationService};
use popup_genius_core::config::Config;
use popup_genius_core::error::{PopupGeniusError, Result};
use popup_genius_providers::{Credentials, LlmProvider, build_provider};
use popup_genius_tools::ToolContext;

/// Shared gateway state accessible from all handlers and connections.
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Drives the PopupGenius agent for the optimization endpoints.
    pub optimizer: EventTranslator,
    /// The hypothesis agent behind `/chat`.
    pub chat: AgentSession,
    pub modifier: ModificationService,
    /// Open WebSocket sessions, for logging.
    pub active_sockets: AtomicUsize,
}

impl GatewayState {
    /// Build state with the provider named in the config.
    pub fn from_config(config: Config) -> Result<Self> {
        let provider = build_provider(&config.provider_config())
            .map_err(|e| PopupGeniusError::Gateway(format!("cannot build provider: {e}")))?;
        Ok(Self::with_provider(config, provider))
    }

    pub fn with_provider(config: Config, provider: Arc<dyn LlmProvider>) -> Self {
        let provider_config = config.provider_config();
        let credentials = Credentials::from_config(&provider_config);
        if provider_config.requires_api_key() && matches!(credentials, Credentials::None) {
            warn!(
                provider = %provider_config.id,
                "No API key configured; analysis requests will use the fallback narrative"
            );
        }

        let tools_config = config.tools_config();
        let tool_context = ToolContext::from_config(&tools_config);
        let stream_config = config.stream_config();

        let optimizer_session = AgentSession::new(
            AgentDefinition::popup_genius(&config),
            provider.clone(),
            credentials.clone(),
            tool_context.clone(),
        )
        .with_channel_capacity(stream_config.channel_capacity);
        let optimizer = EventTranslator::new(optimizer_session, stream_config);

        let chat = AgentSession::new(
            AgentDefinition::hypothesis(&config),
            provider.clone(),
            credentials.clone(),
            tool_context,
        );

        let ui_schema = tools_config
            .ui_schema_path
            .as_deref()
            .and_then(|path| ModificationService::load_ui_schema(Path::new(path)));
        let modifier = ModificationService::new(
            provider,
            credentials,
            config.modification_model(),
            config.max_tokens(),
        )
        .with_ui_schema(ui_schema);

        Self {
            config: Arc::new(config),
            optimizer,
            chat,
            modifier,
            active_sockets: AtomicUsize::new(0),
        }
    }

    /// Record a new WebSocket session; returns the number now open.
    pub fn socket_opened(&self) -> usize {
        self.active_sockets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record a closed WebSocket session; returns the number still open.
    pub fn socket_closed(&self) -> usize {
        self.active_sockets
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1)
    }
}
