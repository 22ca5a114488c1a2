//! Keep-alive for realtime sockets.
//!
//! Idle proxies drop quiet WebSocket connections, and a socket whose task
//! has ended leaves its entry in [`WsManager`] until someone notices. Each
//! tick pings every connection and prunes the ones that can no longer
//! receive.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// Spawn the ping loop. It stops when `cancel` fires.
///
/// The first ping goes out one `every` after start, not immediately.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let pruned = ws_manager.ping_all().await;
                    let live = ws_manager.connection_count().await;
                    tracing::trace!(live, pruned, "Realtime keep-alive");
                    if pruned > 0 {
                        tracing::debug!(pruned, "Dropped realtime connections with no socket");
                    }
                }
            }
        }
        tracing::debug!("Realtime keep-alive stopped");
    })
}
