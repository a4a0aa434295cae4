//! WebSocket sessions: one analysis run per incoming request message.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use futures::stream::SplitSink;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use popup_genius_core::protocol::{EventKind, SimpleFrame, StreamEvent};
use popup_genius_core::types::OptimizationRequest;

use crate::state::GatewayState;

pub const COMPLETE_MESSAGE: &str = "✅ Analysis complete";

/// Framing used on a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketMode {
    /// Every [`StreamEvent`] as its own JSON frame.
    Structured,
    /// [`SimpleFrame`]s, closed by `analysis_complete`.
    Simple,
}

type WsSink = SplitSink<WebSocket, Message>;

/// The peer is gone; stop serving the socket.
struct Disconnected;

/// Serve a single WebSocket until the client disconnects.
pub async fn handle_socket(state: Arc<GatewayState>, socket: WebSocket, mode: SocketMode) {
    let conn_id = Uuid::new_v4().to_string();
    let open = state.socket_opened();
    info!(conn_id = %conn_id, ?mode, open, "WebSocket connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    while let Some(msg_result) = ws_rx.next().await {
        let text = match msg_result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "Client sent close");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        };

        let request: OptimizationRequest = match serde_json::from_str(text.as_str()) {
            Ok(request) => request,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Malformed optimization request");
                let message = format!("Invalid request: {e}");
                let sent = match mode {
                    SocketMode::Structured => {
                        send_json(&mut ws_tx, &StreamEvent::error(message)).await
                    }
                    SocketMode::Simple => {
                        send_json(&mut ws_tx, &SimpleFrame::Error { message }).await
                    }
                };
                if sent.is_err() {
                    break;
                }
                continue;
            }
        };

        info!(conn_id = %conn_id, "Optimization requested over WebSocket");
        let served = match mode {
            SocketMode::Structured => serve_structured(&state, &request, &mut ws_tx).await,
            SocketMode::Simple => serve_simple(&state, &request, &mut ws_tx).await,
        };
        if served.is_err() {
            debug!(conn_id = %conn_id, "Client went away mid-stream");
            break;
        }
    }

    let open = state.socket_closed();
    info!(conn_id = %conn_id, open, "WebSocket disconnected");
}

async fn serve_structured(
    state: &GatewayState,
    request: &OptimizationRequest,
    ws_tx: &mut WsSink,
) -> Result<(), Disconnected> {
    let mut events = state.optimizer.stream(request.agent_input());
    while let Some(event) = events.next().await {
        send_json(ws_tx, &event).await?;
    }
    Ok(())
}

async fn serve_simple(
    state: &GatewayState,
    request: &OptimizationRequest,
    ws_tx: &mut WsSink,
) -> Result<(), Disconnected> {
    let mut events = state.optimizer.stream(request.agent_input());
    while let Some(event) = events.next().await {
        if let Some(frame) = simple_frame(event.kind) {
            send_json(ws_tx, &frame).await?;
        }
    }
    send_json(
        ws_tx,
        &SimpleFrame::AnalysisComplete {
            message: COMPLETE_MESSAGE.to_string(),
        },
    )
    .await
}

/// Project a structured event onto the simple envelope. Tool and agent
/// events have no simple counterpart.
fn simple_frame(kind: EventKind) -> Option<SimpleFrame> {
    match kind {
        EventKind::AnalysisStart { message } => Some(SimpleFrame::AnalysisStart { message }),
        EventKind::TextChunk { content } => Some(SimpleFrame::AnalysisChunk { content }),
        EventKind::Error { message } => Some(SimpleFrame::Error { message }),
        _ => None,
    }
}

async fn send_json<T: Serialize>(ws_tx: &mut WsSink, frame: &T) -> Result<(), Disconnected> {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Failed to serialize frame");
            return Ok(());
        }
    };
    ws_tx
        .send(Message::Text(text.into()))
        .await
        .map_err(|_| Disconnected)
}
