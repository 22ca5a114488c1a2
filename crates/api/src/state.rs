use std::sync::Arc;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: inner data is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: curator_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Realtime change feed connections.
    pub ws_manager: Arc<WsManager>,
    /// Committed row changes, fanned out to realtime subscribers.
    pub event_bus: Arc<curator_events::EventBus>,
}
