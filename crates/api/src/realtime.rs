//! Fan-out of committed row changes to realtime subscribers.
//!
//! [`ChangeRouter`] subscribes to the event bus and hands every change to
//! the [`WsManager`], which forwards it to the owner's matching topics.

use std::sync::Arc;

use axum::extract::ws::close_code;
use curator_events::ChangeEvent;
use tokio::sync::broadcast;

use crate::ws::WsManager;

pub struct ChangeRouter {
    ws_manager: Arc<WsManager>,
}

impl ChangeRouter {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run the routing loop until the event bus is dropped.
    ///
    /// A lag means some changes were never delivered. Every socket is then
    /// closed with "try again later"; clients fall back to polling, which
    /// picks up the missed rows, and reconnect.
    pub async fn run(self, mut receiver: broadcast::Receiver<ChangeEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let delivered = self.ws_manager.dispatch_change(&event.change).await;
                    tracing::debug!(
                        table = %event.change.table(),
                        event_type = %event.change.event_type,
                        owner_id = event.change.owner_id,
                        delivered,
                        "Routed row change"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    let closed = self
                        .ws_manager
                        .close_all(close_code::AGAIN, "missed changes, resubscribe")
                        .await;
                    tracing::warn!(skipped = n, closed, "Change router lagged, closed sockets");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, change router shutting down");
                    break;
                }
            }
        }
    }
}
