//! Stream flows through the session: shared connections, failure and
//! lazy reopen, teardown while an open is in flight.

use std::time::Duration;

use serde_json::json;

use switchboard::stream::mock::MockTransport;
use switchboard::{Config, ConnectionState, ContextId, StreamUpdate};

use super::common::fixtures::{next_update, wait_for_state, wait_open, TestSession};

#[tokio::test]
async fn test_two_views_share_one_connection() {
    let t = TestSession::new();
    let r1 = ContextId::from("r1");

    let mut left = t.session.ensure_connected(&r1);
    let mut right = t.session.ensure_connected(&r1);
    wait_open(&mut left).await;
    wait_open(&mut right).await;
    assert_eq!(t.transport.open_count_for(&r1), 1);

    left.dispose();
    assert!(t.transport.emit(&r1, json!({"seq": 1})).await);
    match next_update(&mut right).await {
        Some(StreamUpdate::Event { payload }) => assert_eq!(payload, json!({"seq": 1})),
        other => panic!("expected event, got {:?}", other),
    }
    assert_eq!(t.transport.close_count(), 0);

    right.dispose();
    assert_eq!(t.transport.close_count(), 1);
    assert_eq!(t.session.stream_state(&r1), None);
}

#[tokio::test]
async fn test_failed_open_reopens_on_next_subscribe() {
    let t = TestSession::new();
    let r1 = ContextId::from("r1");
    t.transport.fail_next_open(&r1, "503");

    let mut first = t.session.ensure_connected(&r1);
    wait_for_state(&mut first, |s| matches!(s, ConnectionState::Errored { .. })).await;

    let mut second = t.session.ensure_connected(&r1);
    wait_open(&mut second).await;
    wait_open(&mut first).await;
    assert_eq!(t.transport.open_count_for(&r1), 2);
    assert_eq!(t.transport.live_count(), 1);
}

#[tokio::test]
async fn test_server_error_then_explicit_reconnect() {
    let t = TestSession::new();
    let r1 = ContextId::from("r1");
    let mut handle = t.session.ensure_connected(&r1);
    wait_open(&mut handle).await;

    t.transport.server_error(&r1, "connection reset").await;
    wait_for_state(&mut handle, |s| matches!(s, ConnectionState::Errored { .. })).await;
    assert_eq!(t.transport.live_count(), 0);

    assert!(t.session.reconnect(&r1));
    wait_open(&mut handle).await;
    assert_eq!(t.transport.open_count_for(&r1), 2);
}

#[tokio::test]
async fn test_unsubscribe_during_open_leaves_no_connection() {
    let transport = MockTransport::new().with_open_delay(Duration::from_millis(30));
    let t = TestSession::with_transport(Config::default(), transport);
    let r1 = ContextId::from("r1");

    let handle = t.session.ensure_connected(&r1);
    drop(handle);
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(t.transport.open_count(), 1);
    assert_eq!(t.transport.live_count(), 0);
    assert_eq!(t.session.streams().connection_count(), 0);
}

#[tokio::test]
async fn test_shutdown_closes_every_subscriber() {
    let t = TestSession::new();
    let mut rooms = Vec::new();
    for id in ["r1", "r2", "r3"] {
        let mut handle = t.session.ensure_connected(&ContextId::from(id));
        wait_open(&mut handle).await;
        rooms.push(handle);
    }
    assert_eq!(t.session.streams().connection_count(), 3);

    t.session.shutdown();
    assert_eq!(t.transport.close_count(), 3);
    for handle in rooms.iter_mut() {
        assert!(matches!(
            next_update(handle).await,
            Some(StreamUpdate::State(ConnectionState::Closed { .. }))
        ));
        assert!(next_update(handle).await.is_none());
    }
}
