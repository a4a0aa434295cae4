//! Axum server: router, CORS, and graceful shutdown.

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::HeaderValue,
    response::IntoResponse,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::connection::{SocketMode, handle_socket};
use crate::routes;
use crate::state::GatewayState;

/// Build the full application router.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins());

    Router::new()
        .route("/chat", post(routes::chat))
        .route("/popup-optimization", post(routes::popup_optimization))
        .route(
            "/popup-optimization-structured",
            post(routes::popup_optimization_structured),
        )
        .route("/popup-modification", post(routes::popup_modification))
        .route("/health", get(routes::health).post(routes::health))
        .route("/ws/popup-optimization", get(ws_structured))
        .route("/ws/popup-optimization-simple", get(ws_simple))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the gateway and serve until Ctrl+C.
pub async fn start_gateway(state: Arc<GatewayState>, bind: &str, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("PopupGenius API listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn ws_structured(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket, SocketMode::Structured))
}

async fn ws_simple(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket, SocketMode::Simple))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
