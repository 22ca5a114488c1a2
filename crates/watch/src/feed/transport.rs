//! Live change transport.
//!
//! A [`LiveTransport`] opens one [`LiveSession`] per feed generation. The
//! session is a stream of [`LiveSignal`]s; dropping it tears the
//! underlying channel down. [`WsTransport`] implements the transport over
//! the curator API's WebSocket endpoint.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use curator_core::realtime::{ClientFrame, RowChange, ServerFrame};

use super::{Source, SourceId};

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Terminal subscription outcomes reported for a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeFailure {
    /// The server rejected or dropped the subscription.
    ChannelError,
    /// No acknowledgement arrived within the subscribe timeout.
    TimedOut,
}

impl std::fmt::Display for SubscribeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SubscribeFailure::ChannelError => "CHANNEL_ERROR",
            SubscribeFailure::TimedOut => "TIMED_OUT",
        })
    }
}

/// What a live session reports to the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveSignal {
    Subscribed(SourceId),
    SubscriptionFailed(SourceId, SubscribeFailure),
    Change(SourceId, RowChange),
    /// The channel is gone. No further signals follow.
    Closed,
}

/// Errors opening a live session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server refused the handshake, e.g. an expired token.
    #[error("Connection rejected with status {status}")]
    Rejected { status: u16 },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether retrying with the same credentials is pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Rejected { .. })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One generation's live channel.
///
/// Dropping the session closes it: its [`SignalSender`] stops accepting
/// signals and transport tasks waiting on [`SignalSender::closed`] wake up.
pub struct LiveSession {
    generation: u64,
    signals: mpsc::UnboundedReceiver<LiveSignal>,
    close: CancellationToken,
}

impl LiveSession {
    /// Create a session and the sender its transport task feeds.
    pub fn channel(generation: u64) -> (LiveSession, SignalSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let close = CancellationToken::new();
        let session = LiveSession {
            generation,
            signals: rx,
            close: close.clone(),
        };
        let sender = SignalSender {
            generation,
            tx,
            close,
        };
        (session, sender)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Next signal, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<LiveSignal> {
        self.signals.recv().await
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.close.cancel();
    }
}

/// Producer half of a [`LiveSession`].
#[derive(Clone)]
pub struct SignalSender {
    generation: u64,
    tx: mpsc::UnboundedSender<LiveSignal>,
    close: CancellationToken,
}

impl SignalSender {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a signal. Returns `false` once the session has been closed.
    pub fn send(&self, signal: LiveSignal) -> bool {
        !self.close.is_cancelled() && self.tx.send(signal).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Resolves when the feed drops the session.
    pub async fn closed(&self) {
        self.close.cancelled().await
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LiveTransport: Send + Sync + 'static {
    /// Open a channel and request a subscription for every source.
    ///
    /// Acknowledgements arrive later as [`LiveSignal::Subscribed`].
    async fn connect(
        &self,
        generation: u64,
        sources: &[Source],
    ) -> Result<LiveSession, TransportError>;
}

// ---------------------------------------------------------------------------
// WebSocket transport
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live transport over the API's `/api/v1/ws` endpoint.
pub struct WsTransport {
    ws_url: String,
    token: String,
}

impl WsTransport {
    /// * `ws_url` - WebSocket URL, e.g. `ws://host:3000/api/v1/ws`.
    /// * `token`  - bearer token of the watching user.
    pub fn new(ws_url: String, token: String) -> Self {
        Self { ws_url, token }
    }
}

#[async_trait]
impl LiveTransport for WsTransport {
    async fn connect(
        &self,
        generation: u64,
        sources: &[Source],
    ) -> Result<LiveSession, TransportError> {
        let mut request = self.ws_url.as_str().into_client_request().map_err(|e| {
            TransportError::Connection(format!("Invalid feed URL {}: {e}", self.ws_url))
        })?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| TransportError::Connection(format!("Invalid token header: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws_stream, _response) = connect_async(request).await.map_err(|e| match e {
            WsError::Http(response) => TransportError::Rejected {
                status: response.status().as_u16(),
            },
            other => TransportError::Connection(format!(
                "Failed to connect to {}: {other}",
                self.ws_url
            )),
        })?;

        let (mut sink, stream) = ws_stream.split();
        for source in sources {
            let frame = ClientFrame::Subscribe {
                topic: source.id.to_string(),
                table: source.subscription.table,
                event: source.subscription.event,
            };
            let text = serde_json::to_string(&frame)
                .map_err(|e| TransportError::Protocol(e.to_string()))?;
            sink.send(Message::Text(text)).await.map_err(|e| {
                TransportError::Connection(format!("Failed to send subscription: {e}"))
            })?;
        }

        tracing::info!(
            generation,
            url = %self.ws_url,
            sources = sources.len(),
            "Change feed socket connected",
        );

        let (session, signals) = LiveSession::channel(generation);
        tokio::spawn(pump(sink, stream, signals));
        Ok(session)
    }
}

/// Forward decoded server frames until the socket or the session closes.
async fn pump(
    mut sink: SplitSink<WsStream, Message>,
    mut stream: SplitStream<WsStream>,
    signals: SignalSender,
) {
    loop {
        tokio::select! {
            _ = signals.closed() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(signal) = decode_frame(&text) {
                        if !signals.send(signal) {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Change feed socket closed by server");
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by tungstenite; binary frames unused.
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Change feed socket error");
                    break;
                }
                None => break,
            }
        }
    }
    signals.send(LiveSignal::Closed);
}

fn decode_frame(text: &str) -> Option<LiveSignal> {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(ServerFrame::Subscribed { topic }) => Some(LiveSignal::Subscribed(topic.into())),
        Ok(ServerFrame::SubscriptionError { topic, reason }) => {
            tracing::warn!(topic = %topic, reason = %reason, "Subscription rejected");
            Some(LiveSignal::SubscriptionFailed(
                topic.into(),
                SubscribeFailure::ChannelError,
            ))
        }
        Ok(ServerFrame::Change { topic, change }) => Some(LiveSignal::Change(topic.into(), change)),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring undecodable change feed frame");
            None
        }
    }
}
