//! Unit tests for `WsManager`.
//!
//! These exercise the connection manager directly, without HTTP upgrades:
//! add/remove semantics, topic subscriptions, owner-scoped change delivery,
//! keep-alive pruning and closing.

use axum::extract::ws::{close_code, Message};
use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;

use curator_api::ws::{SubscribeError, WsManager};
use curator_api::ws::manager::MAX_SUBSCRIPTIONS_PER_CONNECTION;
use curator_core::job::Job;
use curator_core::realtime::{ChangeKind, EventFilter, RowChange, ServerFrame, Subscription, Table};
use curator_core::status::JobStatus;

fn job(id: i64, user_id: i64, status: JobStatus) -> Job {
    let now = Utc::now();
    Job {
        id,
        user_id,
        workflow_name: "ingest_link".to_string(),
        status,
        resource_id: None,
        metadata: serde_json::json!({}),
        error_message: None,
        created_at: now,
        started_at: None,
        completed_at: None,
        updated_at: now,
    }
}

fn jobs_all() -> Subscription {
    Subscription::new(Table::Jobs, EventFilter::All)
}

fn next_frame(rx: &mut UnboundedReceiver<Message>) -> Option<ServerFrame> {
    match rx.try_recv().ok()? {
        Message::Text(text) => Some(serde_json::from_str(text.as_str()).unwrap()),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test: add and remove track the connection count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_track_connection_count() {
    let manager = WsManager::new();
    assert_eq!(manager.connection_count().await, 0);

    let _rx = manager.add("conn-1".to_string(), 7).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("nonexistent").await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("conn-1").await;
    assert_eq!(manager.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: changes reach only the owner's matching topics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatch_is_scoped_to_owner() {
    let manager = WsManager::new();
    let mut owner_rx = manager.add("owner".to_string(), 7).await;
    let mut other_rx = manager.add("other".to_string(), 8).await;
    manager.subscribe("owner", "jobs", jobs_all()).await.unwrap();
    manager.subscribe("other", "jobs", jobs_all()).await.unwrap();

    let delivered = manager
        .dispatch_change(&RowChange::job_inserted(job(1, 7, JobStatus::Pending)))
        .await;

    assert_eq!(delivered, 1);
    match next_frame(&mut owner_rx) {
        Some(ServerFrame::Change { topic, change }) => {
            assert_eq!(topic, "jobs");
            assert_eq!(change.owner_id, 7);
            assert_eq!(change.event_type, ChangeKind::Insert);
        }
        other => panic!("expected a change frame, got {other:?}"),
    }
    assert!(next_frame(&mut other_rx).is_none());
}

// ---------------------------------------------------------------------------
// Test: event filters and tables are honoured
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatch_respects_table_and_event_filter() {
    let manager = WsManager::new();
    let mut rx = manager.add("conn".to_string(), 7).await;
    manager
        .subscribe(
            "conn",
            "job-updates",
            Subscription::new(Table::Jobs, EventFilter::Only(ChangeKind::Update)),
        )
        .await
        .unwrap();
    manager
        .subscribe(
            "conn",
            "errors",
            Subscription::new(Table::WorkflowErrors, EventFilter::All),
        )
        .await
        .unwrap();

    let inserted = manager
        .dispatch_change(&RowChange::job_inserted(job(1, 7, JobStatus::Pending)))
        .await;
    assert_eq!(inserted, 0);

    let updated = manager
        .dispatch_change(&RowChange::job_updated(
            None,
            job(1, 7, JobStatus::Running),
        ))
        .await;
    assert_eq!(updated, 1);
    match next_frame(&mut rx) {
        Some(ServerFrame::Change { topic, .. }) => assert_eq!(topic, "job-updates"),
        other => panic!("expected a change frame, got {other:?}"),
    }
    assert!(next_frame(&mut rx).is_none());
}

// ---------------------------------------------------------------------------
// Test: unsubscribe stops delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let manager = WsManager::new();
    let mut rx = manager.add("conn".to_string(), 7).await;
    manager.subscribe("conn", "jobs", jobs_all()).await.unwrap();

    assert!(manager.unsubscribe("conn", "jobs").await);
    assert!(!manager.unsubscribe("conn", "jobs").await);

    let delivered = manager
        .dispatch_change(&RowChange::job_inserted(job(1, 7, JobStatus::Pending)))
        .await;
    assert_eq!(delivered, 0);
    assert!(next_frame(&mut rx).is_none());
}

// ---------------------------------------------------------------------------
// Test: subscription errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribe_rejects_unknown_connection_and_empty_topic() {
    let manager = WsManager::new();
    let _rx = manager.add("conn".to_string(), 7).await;

    assert_eq!(
        manager.subscribe("ghost", "jobs", jobs_all()).await,
        Err(SubscribeError::UnknownConnection)
    );
    assert_eq!(
        manager.subscribe("conn", "  ", jobs_all()).await,
        Err(SubscribeError::EmptyTopic)
    );
}

#[tokio::test]
async fn subscribe_enforces_per_connection_limit() {
    let manager = WsManager::new();
    let _rx = manager.add("conn".to_string(), 7).await;

    for i in 0..MAX_SUBSCRIPTIONS_PER_CONNECTION {
        manager
            .subscribe("conn", &format!("topic-{i}"), jobs_all())
            .await
            .unwrap();
    }

    assert_eq!(
        manager.subscribe("conn", "one-too-many", jobs_all()).await,
        Err(SubscribeError::TooManySubscriptions)
    );
    // Replacing an existing topic is still allowed.
    assert!(manager.subscribe("conn", "topic-0", jobs_all()).await.is_ok());
}

// ---------------------------------------------------------------------------
// Test: send_frame targets one connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_frame_reaches_only_the_target() {
    let manager = WsManager::new();
    let mut rx = manager.add("conn".to_string(), 7).await;

    let sent = manager
        .send_frame(
            "conn",
            &ServerFrame::Subscribed {
                topic: "jobs".to_string(),
            },
        )
        .await;

    assert!(sent);
    assert_eq!(
        next_frame(&mut rx),
        Some(ServerFrame::Subscribed {
            topic: "jobs".to_string()
        })
    );
    assert!(
        !manager
            .send_frame(
                "ghost",
                &ServerFrame::Subscribed {
                    topic: "jobs".to_string()
                }
            )
            .await
    );
}

// ---------------------------------------------------------------------------
// Test: close_all sends Close and clears connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_all_sends_close_and_clears() {
    let manager = WsManager::new();
    let mut a = manager.add("a".to_string(), 7).await;
    let mut b = manager.add("b".to_string(), 8).await;

    let closed = manager.close_all(close_code::AWAY, "server shutting down").await;

    assert_eq!(closed, 2);
    assert_eq!(manager.connection_count().await, 0);
    for rx in [&mut a, &mut b] {
        match rx.recv().await {
            Some(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, close_code::AWAY);
                assert_eq!(frame.reason.as_str(), "server shutting down");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }
}

// ---------------------------------------------------------------------------
// Test: ping_all prunes connections whose socket is gone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_all_prunes_closed_connections() {
    let manager = WsManager::new();
    let mut live = manager.add("live".to_string(), 7).await;
    drop(manager.add("gone".to_string(), 7).await);

    assert_eq!(manager.ping_all().await, 1);
    assert_eq!(manager.connection_count().await, 1);
    assert!(matches!(live.try_recv(), Ok(Message::Ping(_))));
}
