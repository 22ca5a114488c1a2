//! Change feed with a live transport and a polling fallback.
//!
//! [`ChangeFeed::start`] spawns one actor task that owns all feed state.
//! The actor subscribes every configured [`Source`] through a
//! [`LiveTransport`]. Once every source is acknowledged the feed is
//! `Connected`. A rejected or unacknowledged subscription, or a channel
//! that closes underneath us, flips the feed to `Polling`: the [`Poller`]
//! runs on a fixed interval and a reconnect is scheduled with exponential
//! backoff. A successful reconnect stops polling and resets the backoff.
//!
//! Every connection attempt starts a new generation. Consumers read events
//! through [`FeedHandle::next_event`], which drops live events from a
//! superseded generation.

mod backoff;
pub mod poller;
pub mod transport;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use curator_core::realtime::{ChangeKind, EventFilter, RowChange, Subscription, Table};

use crate::api::ApiClientError;

pub use backoff::{next_delay, Backoff, BackoffConfig};
pub use poller::{Poller, Snapshot, SnapshotPoller};
pub use transport::{
    LiveSession, LiveSignal, LiveTransport, SignalSender, SubscribeFailure, TransportError,
    WsTransport,
};

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Identifier of a configured source; doubles as the subscription topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(String);

impl SourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A table and event filter the feed watches. Owner scoping is applied
/// by the server for both transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: SourceId,
    pub subscription: Subscription,
}

impl Source {
    pub fn new(id: impl Into<SourceId>, table: Table, event: EventFilter) -> Self {
        Self {
            id: id.into(),
            subscription: Subscription::new(table, event),
        }
    }
}

/// Jobs and steps (any event) plus newly reported workflow errors.
pub fn default_sources() -> Vec<Source> {
    vec![
        Source::new("jobs", Table::Jobs, EventFilter::All),
        Source::new("job_steps", Table::JobSteps, EventFilter::All),
        Source::new(
            "workflow_errors",
            Table::WorkflowErrors,
            EventFilter::Only(ChangeKind::Insert),
        ),
    ]
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Fixed interval between fallback polls.
    pub poll_interval: Duration,
    pub reconnect: BackoffConfig,
    /// How long every source has to acknowledge its subscription.
    pub subscribe_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            reconnect: BackoffConfig::default(),
            subscribe_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Initializing,
    /// Every source is live; polling is stopped.
    Connected,
    /// Live delivery is degraded; the poller is running.
    Polling,
    /// The transport refused our credentials. Polling continues.
    Error,
}

/// One change delivered to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub source: SourceId,
    pub change: RowChange,
    /// `true` when fabricated by diffing polled snapshots.
    pub is_synthetic: bool,
    pub generation: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Poll failed: {0}")]
    Poll(#[from] ApiClientError),
}

#[derive(Debug, Clone, Copy)]
enum Command {
    ForceReconnect,
    Online,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Consumer side of a running feed. Dropping the handle tears the feed
/// down.
pub struct FeedHandle {
    events: mpsc::UnboundedReceiver<FeedEvent>,
    status: watch::Receiver<FeedStatus>,
    generation: Arc<AtomicU64>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Next event from the current generation, or `None` after teardown.
    ///
    /// Synthetic events are never stale: the poller outlives reconnects.
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                event = self.events.recv() => event?,
            };
            if event.is_synthetic || self.is_current(event.generation) {
                return Some(event);
            }
            tracing::debug!(
                generation = event.generation,
                source = %event.source,
                "Dropping event from a superseded subscription",
            );
        }
    }

    /// Watch the feed status.
    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> FeedStatus {
        *self.status.borrow()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation()
    }

    /// Forget previous failures and reconnect immediately.
    pub fn force_reconnect(&self) {
        let _ = self.commands.send(Command::ForceReconnect);
    }

    /// Report that the network came back. Reconnects now if degraded.
    pub fn notify_online(&self) {
        let _ = self.commands.send(Command::Online);
    }

    /// Stop the feed and wait for the actor to release its channels.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

pub struct ChangeFeed;

impl ChangeFeed {
    /// Spawn the feed actor. Must be called within a tokio runtime.
    pub fn start<T, P>(
        config: FeedConfig,
        sources: Vec<Source>,
        transport: T,
        poller: P,
    ) -> FeedHandle
    where
        T: LiveTransport,
        P: Poller,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(FeedStatus::Initializing);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();

        let actor = FeedActor {
            backoff: Backoff::new(config.reconnect.clone()),
            config,
            sources,
            transport,
            poller,
            events: events_tx,
            status: status_tx,
            generation: Arc::clone(&generation),
            commands: commands_rx,
            cancel: cancel.clone(),
            session: None,
            pending_acks: HashSet::new(),
            subscribe_deadline: None,
            reconnect_at: None,
            poll_timer: None,
        };
        let task = tokio::spawn(actor.run());

        FeedHandle {
            events: events_rx,
            status: status_rx,
            generation,
            commands: commands_tx,
            cancel,
            task: Some(task),
        }
    }
}

struct FeedActor<T, P> {
    config: FeedConfig,
    sources: Vec<Source>,
    transport: T,
    poller: P,
    events: mpsc::UnboundedSender<FeedEvent>,
    status: watch::Sender<FeedStatus>,
    generation: Arc<AtomicU64>,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    backoff: Backoff,
    session: Option<LiveSession>,
    /// Sources of the current session not yet acknowledged.
    pending_acks: HashSet<SourceId>,
    subscribe_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
    poll_timer: Option<Interval>,
}

impl<T: LiveTransport, P: Poller> FeedActor<T, P> {
    async fn run(mut self) {
        self.connect().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(Command::ForceReconnect) => {
                        tracing::info!("Forced change feed reconnect");
                        self.backoff.reset();
                        self.connect().await;
                    }
                    Some(Command::Online) => {
                        if self.is_degraded() {
                            tracing::info!("Network online, reconnecting change feed");
                            self.connect().await;
                        }
                    }
                    None => break,
                },
                signal = next_signal(&mut self.session) => self.on_signal(signal),
                _ = wait_until(self.subscribe_deadline) => self.on_subscribe_timeout(),
                _ = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.connect().await;
                }
                _ = tick(&mut self.poll_timer) => self.poll().await,
            }
        }

        self.session = None;
        self.poll_timer = None;
        tracing::debug!("Change feed stopped");
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_degraded(&self) -> bool {
        matches!(
            *self.status.borrow(),
            FeedStatus::Polling | FeedStatus::Error
        )
    }

    fn set_status(&self, status: FeedStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Tear down the current session and open a new generation.
    async fn connect(&mut self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.session = None;
        self.reconnect_at = None;
        self.subscribe_deadline = None;
        self.pending_acks = self.sources.iter().map(|s| s.id.clone()).collect();

        tracing::debug!(generation, "Connecting change feed");
        let attempt = tokio::select! {
            _ = self.cancel.cancelled() => return,
            attempt = self.transport.connect(generation, &self.sources) => attempt,
        };

        match attempt {
            Ok(session) => {
                self.session = Some(session);
                if self.pending_acks.is_empty() {
                    self.on_connected();
                } else {
                    self.subscribe_deadline = Some(Instant::now() + self.config.subscribe_timeout);
                }
            }
            Err(e) => {
                tracing::warn!(generation, error = %e, "Change feed connection failed");
                let status = if e.is_fatal() {
                    FeedStatus::Error
                } else {
                    FeedStatus::Polling
                };
                self.fall_back(status);
            }
        }
    }

    fn on_signal(&mut self, signal: LiveSignal) {
        match signal {
            LiveSignal::Subscribed(source) => {
                if self.pending_acks.remove(&source) && self.pending_acks.is_empty() {
                    self.on_connected();
                }
            }
            LiveSignal::SubscriptionFailed(source, failure) => {
                tracing::warn!(source = %source, %failure, "Subscription failed");
                self.session = None;
                self.pending_acks.clear();
                self.fall_back(FeedStatus::Polling);
            }
            LiveSignal::Change(source, change) => self.deliver_live(source, change),
            LiveSignal::Closed => {
                self.session = None;
                if self.is_degraded() {
                    tracing::debug!("Degraded change feed channel closed");
                } else {
                    tracing::warn!("Change feed channel closed unexpectedly");
                    self.fall_back(FeedStatus::Polling);
                }
            }
        }
    }

    fn on_subscribe_timeout(&mut self) {
        self.subscribe_deadline = None;
        if self.pending_acks.is_empty() {
            return;
        }
        for source in &self.pending_acks {
            tracing::warn!(
                source = %source,
                failure = %SubscribeFailure::TimedOut,
                "Subscription not acknowledged",
            );
        }
        self.fall_back(FeedStatus::Polling);
    }

    fn on_connected(&mut self) {
        self.subscribe_deadline = None;
        self.reconnect_at = None;
        self.backoff.reset();
        if self.poll_timer.take().is_some() {
            tracing::info!("Live change feed restored, polling stopped");
        }
        tracing::info!(generation = self.current_generation(), "Change feed connected");
        self.set_status(FeedStatus::Connected);
    }

    /// Start polling (if not already) and schedule a reconnect.
    fn fall_back(&mut self, status: FeedStatus) {
        self.subscribe_deadline = None;
        self.set_status(status);

        if self.poll_timer.is_none() {
            let mut timer = tokio::time::interval(self.config.poll_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.poll_timer = Some(timer);
            tracing::info!(
                interval_ms = self.config.poll_interval.as_millis() as u64,
                "Polling fallback started",
            );
        }

        if self.reconnect_at.is_none() {
            let delay = self.backoff.next_delay();
            self.reconnect_at = Some(Instant::now() + delay);
            tracing::info!(delay_ms = delay.as_millis() as u64, "Change feed reconnect scheduled");
        }
    }

    fn deliver_live(&self, source: SourceId, change: RowChange) {
        let Some(configured) = self.sources.iter().find(|s| s.id == source) else {
            tracing::debug!(source = %source, "Change for unknown source dropped");
            return;
        };
        if !configured.subscription.matches(&change) {
            return;
        }
        self.emit(FeedEvent {
            source,
            change,
            is_synthetic: false,
            generation: self.current_generation(),
        });
    }

    async fn poll(&mut self) {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = self.poller.poll() => result,
        };

        match result {
            Ok(changes) => {
                let generation = self.current_generation();
                for change in changes {
                    for source in self
                        .sources
                        .iter()
                        .filter(|s| s.subscription.matches(&change))
                    {
                        self.emit(FeedEvent {
                            source: source.id.clone(),
                            change: change.clone(),
                            is_synthetic: true,
                            generation,
                        });
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Poll failed, retrying next interval"),
        }
    }

    fn emit(&self, event: FeedEvent) {
        let _ = self.events.send(event);
    }
}

/// Next signal of the current session; `Closed` once its senders are gone.
async fn next_signal(session: &mut Option<LiveSession>) -> LiveSignal {
    match session {
        Some(session) => session.recv().await.unwrap_or(LiveSignal::Closed),
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
