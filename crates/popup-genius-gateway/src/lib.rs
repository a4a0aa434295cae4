//! HTTP and WebSocket gateway for PopupGenius.
//!
//! The gateway hosts the analysis endpoints: SSE streams over HTTP, two
//! WebSocket protocols, the popup modification endpoint, and the legacy chat
//! endpoint. Every request drives its own agent run through the shared
//! [`GatewayState`].

pub mod connection;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{build_router, start_gateway};
pub use state::GatewayState;
