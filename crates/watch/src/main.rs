//! `curator-watch` -- follows a user's processing jobs from the terminal.
//!
//! Subscribes to the curator API's realtime change feed (falling back to
//! polling the REST API while the live channel is unavailable) and prints
//! one notification per job/step transition.
//!
//! # Environment variables
//!
//! | Variable                 | Required | Default                 |
//! |--------------------------|----------|-------------------------|
//! | `CURATOR_TOKEN`          | yes      | --                      |
//! | `CURATOR_API_URL`        | no       | `http://localhost:3000` |
//! | `CURATOR_WS_URL`         | no       | derived from the API URL |
//! | `POLL_INTERVAL_MS`       | no       | `5000`                  |
//! | `SUBSCRIBE_TIMEOUT_SECS` | no       | `10`                    |
//!
//! Send `SIGHUP` to force a reconnect of the live channel.

use std::sync::Arc;

use curator_watch::api::ApiClient;
use curator_watch::config::WatchConfig;
use curator_watch::feed::{
    default_sources, ChangeFeed, FeedStatus, Snapshot, SnapshotPoller, WsTransport,
};
use curator_watch::notify::{NotificationDispatcher, TerminalSink};
use curator_watch::tracker::JobTracker;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curator_watch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WatchConfig::from_env();
    tracing::info!(
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Starting curator-watch",
    );

    let api = Arc::new(ApiClient::new(config.api_url.clone(), config.token.clone()));

    // --- Initial snapshot ---
    let mut tracker = JobTracker::new();
    let poller = match tokio::try_join!(api.list_jobs(), api.list_workflow_errors()) {
        Ok((jobs, errors)) => {
            tracker.load(jobs.clone());
            tracing::info!(jobs = tracker.len(), "Loaded current jobs");
            SnapshotPoller::with_baseline(Arc::clone(&api), Snapshot::new(jobs, errors))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Initial job listing failed, first poll sets the baseline");
            SnapshotPoller::new(Arc::clone(&api))
        }
    };

    // --- Change feed ---
    let transport = WsTransport::new(config.ws_url.clone(), config.token.clone());
    let mut feed = ChangeFeed::start(config.feed_config(), default_sources(), transport, poller);
    let mut status = feed.status();

    let mut dispatcher = NotificationDispatcher::new(Arc::clone(&api), TerminalSink);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut hangup = hangup_stream();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = feed.next_event() => {
                let Some(event) = event else { break };
                tracing::debug!(
                    source = %event.source,
                    synthetic = event.is_synthetic,
                    event_type = %event.change.event_type,
                    "Change received",
                );
                if let Some(job_id) = tracker.apply(&event.change) {
                    if let Some(summary) = tracker.summary(job_id) {
                        tracing::info!("{summary}");
                    }
                }
                dispatcher.handle(&event.change).await;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                match current {
                    FeedStatus::Connected => tracing::info!("Live updates active"),
                    FeedStatus::Polling => tracing::info!("Live updates unavailable, polling"),
                    FeedStatus::Error => tracing::error!("Live updates rejected, check CURATOR_TOKEN"),
                    FeedStatus::Initializing => {}
                }
            }
            _ = next_hangup(&mut hangup) => feed.force_reconnect(),
        }
    }

    tracing::info!("Shutting down");
    feed.shutdown().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

#[cfg(unix)]
type Hangup = Option<tokio::signal::unix::Signal>;

#[cfg(not(unix))]
type Hangup = ();

#[cfg(unix)]
fn hangup_stream() -> Hangup {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(signal) => Some(signal),
        Err(e) => {
            tracing::warn!(error = %e, "SIGHUP handler unavailable");
            None
        }
    }
}

#[cfg(not(unix))]
fn hangup_stream() -> Hangup {}

#[cfg(unix)]
async fn next_hangup(hangup: &mut Hangup) {
    match hangup {
        Some(signal) => {
            if signal.recv().await.is_none() {
                *hangup = None;
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn next_hangup(_hangup: &mut Hangup) {
    std::future::pending().await
}
