//! HTTP handlers: SSE analysis streams, popup modification, chat, health.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tracing::{info, warn};

use popup_genius_agent::{RawEvent, RawEventStream};
use popup_genius_core::types::{
    ChatMessage, ModificationRequest, ModificationResponse, OptimizationRequest,
};

use crate::state::GatewayState;

pub const SERVICE_NAME: &str = "PopupGenius API";

/// A plain-text SSE event. Line breaks become separate `data:` lines;
/// carriage returns cannot travel over SSE and are normalized away.
fn text_event(text: &str) -> Event {
    if text.contains('\r') {
        Event::default().data(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Event::default().data(text)
    }
}

/// `GET|POST /health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
    }))
}

/// `POST /popup-optimization`: text chunks only, one `data:` event each.
pub async fn popup_optimization(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<OptimizationRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(chars = request.business_description.len(), "Popup optimization requested");
    let events = state
        .optimizer
        .stream(request.agent_input())
        .filter_map(|event| {
            event
                .as_text_chunk()
                .map(|text| Ok(text_event(text)))
        });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// `POST /popup-optimization-structured`: every event as JSON.
pub async fn popup_optimization_structured(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<OptimizationRequest>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    info!(chars = request.business_description.len(), "Structured optimization requested");
    let events = state
        .optimizer
        .stream(request.agent_input())
        .map(|event| Event::default().json_data(event));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// `POST /popup-modification`
pub async fn popup_modification(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<ModificationRequest>,
) -> Json<ModificationResponse> {
    let config = state
        .modifier
        .modify(&request.instructions, &request.current_config)
        .await;
    Json(ModificationResponse { config })
}

/// `POST /chat`: raw text deltas from the hypothesis agent. An upstream
/// failure ends the stream after logging.
pub async fn chat(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<ChatMessage>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let run: RawEventStream = match state.chat.run(&body.message).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(%e, "Chat run failed to start");
            Box::pin(tokio_stream::empty())
        }
    };

    let deltas = run
        .map_while(|item| match item {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(%e, "Chat stream failed");
                None
            }
        })
        .filter_map(|event| match event {
            RawEvent::TextDelta { delta } => Some(Ok(text_event(&delta))),
            _ => None,
        });
    Sse::new(deltas).keep_alive(KeepAlive::default())
}
