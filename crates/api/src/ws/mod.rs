//! WebSocket infrastructure for the realtime change feed.
//!
//! Provides connection and subscription management, heartbeat monitoring,
//! and the HTTP upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::{SubscribeError, WsManager};
