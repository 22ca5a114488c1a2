use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use curator_core::realtime::{ClientFrame, ServerFrame, Subscription};
use futures::{SinkExt, StreamExt};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// GET /api/v1/ws
///
/// Upgrade an authenticated request to the realtime change feed.
pub async fn ws_handler(
    auth: AuthUser,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, auth.user_id, state.ws_manager))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Processes subscribe/unsubscribe frames on the current task.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, user_id: i64, ws_manager: Arc<WsManager>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, user_id, "WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone(), user_id).await;

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(Message::Text(text)) => {
                handle_client_frame(&ws_manager, &conn_id, text.as_str()).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Apply one inbound frame and acknowledge it.
async fn handle_client_frame(ws_manager: &WsManager, conn_id: &str, text: &str) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            let topic = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("topic").and_then(|t| t.as_str()).map(str::to_string))
                .unwrap_or_default();
            tracing::debug!(conn_id, error = %e, "Malformed client frame");
            ws_manager
                .send_frame(
                    conn_id,
                    &ServerFrame::SubscriptionError {
                        topic,
                        reason: format!("Malformed frame: {e}"),
                    },
                )
                .await;
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe {
            topic,
            table,
            event,
        } => {
            let reply = match ws_manager
                .subscribe(conn_id, &topic, Subscription::new(table, event))
                .await
            {
                Ok(()) => {
                    tracing::debug!(conn_id, topic = %topic, %table, "Subscribed");
                    ServerFrame::Subscribed { topic }
                }
                Err(e) => ServerFrame::SubscriptionError {
                    topic,
                    reason: e.to_string(),
                },
            };
            ws_manager.send_frame(conn_id, &reply).await;
        }
        ClientFrame::Unsubscribe { topic } => {
            let existed = ws_manager.unsubscribe(conn_id, &topic).await;
            tracing::debug!(conn_id, topic = %topic, existed, "Unsubscribed");
        }
    }
}
