use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message};
use curator_core::realtime::{RowChange, ServerFrame, Subscription};
use curator_core::types::DbId;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Maximum number of topics a single connection may subscribe to.
pub const MAX_SUBSCRIPTIONS_PER_CONNECTION: usize = 32;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Authenticated owner of the connection. Only their rows are delivered.
    pub user_id: DbId,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// Active subscriptions keyed by client-chosen topic.
    pub subscriptions: HashMap<String, Subscription>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    #[error("connection is not registered")]
    UnknownConnection,
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("too many subscriptions (limit {})", MAX_SUBSCRIPTIONS_PER_CONNECTION)]
    TooManySubscriptions,
}

/// Manages all active WebSocket connections and their subscriptions.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection for an authenticated user.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: String, user_id: DbId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            user_id,
            sender: tx,
            subscriptions: HashMap::new(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Add or replace a topic subscription on a connection.
    pub async fn subscribe(
        &self,
        conn_id: &str,
        topic: &str,
        subscription: Subscription,
    ) -> Result<(), SubscribeError> {
        if topic.trim().is_empty() {
            return Err(SubscribeError::EmptyTopic);
        }
        let mut conns = self.connections.write().await;
        let conn = conns
            .get_mut(conn_id)
            .ok_or(SubscribeError::UnknownConnection)?;
        if !conn.subscriptions.contains_key(topic)
            && conn.subscriptions.len() >= MAX_SUBSCRIPTIONS_PER_CONNECTION
        {
            return Err(SubscribeError::TooManySubscriptions);
        }
        conn.subscriptions.insert(topic.to_string(), subscription);
        Ok(())
    }

    /// Drop a topic subscription. Returns `true` if it existed.
    pub async fn unsubscribe(&self, conn_id: &str, topic: &str) -> bool {
        self.connections
            .write()
            .await
            .get_mut(conn_id)
            .is_some_and(|conn| conn.subscriptions.remove(topic).is_some())
    }

    /// Send a frame to one connection.
    pub async fn send_frame(&self, conn_id: &str, frame: &ServerFrame) -> bool {
        let Some(message) = encode_frame(frame) else {
            return false;
        };
        self.connections
            .read()
            .await
            .get(conn_id)
            .is_some_and(|conn| conn.sender.send(message).is_ok())
    }

    /// Deliver a row change to every matching subscription of its owner.
    ///
    /// Returns the number of frames queued.
    pub async fn dispatch_change(&self, change: &RowChange) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for conn in conns.values().filter(|c| c.user_id == change.owner_id) {
            for (topic, subscription) in &conn.subscriptions {
                if !subscription.matches(change) {
                    continue;
                }
                let frame = ServerFrame::Change {
                    topic: topic.clone(),
                    change: change.clone(),
                };
                if let Some(message) = encode_frame(&frame) {
                    if conn.sender.send(message).is_ok() {
                        count += 1;
                    }
                }
            }
        }
        count
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame with `code` to every connection and forget them.
    ///
    /// Returns the number of connections closed. Clients see an ordinary
    /// close and go through their reconnect path.
    pub async fn close_all(&self, code: u16, reason: &'static str) -> usize {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })));
        }
        conns.clear();
        count
    }

    /// Queue a Ping on every connection, dropping those whose socket task
    /// has already gone away. Returns how many were dropped.
    pub async fn ping_all(&self) -> usize {
        let mut conns = self.connections.write().await;
        let before = conns.len();
        conns.retain(|_, conn| conn.sender.send(Message::Ping(Bytes::new())).is_ok());
        before - conns.len()
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_frame(frame: &ServerFrame) -> Option<Message> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server frame");
            None
        }
    }
}
