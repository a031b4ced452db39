//! Tool invocation flows: correlation, deadlines, abandonment and the
//! loopback echo host.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_test::{assert_pending, assert_ready};

use switchboard::tools::host::spawn_echo_host;
use switchboard::{ChannelExecutor, ToolBridge, ToolError, ToolResponse};

use super::common::fixtures::TestSession;

#[tokio::test]
async fn test_invoke_stays_pending_until_delivered() {
    let (executor, mut requests) = ChannelExecutor::channel(4);
    let bridge = ToolBridge::new(Arc::new(executor), Duration::from_secs(5));

    let mut call = tokio_test::task::spawn(bridge.invoke_default(
        "github",
        "list_repos",
        json!({"org": "acme"}),
    ));
    assert_pending!(call.poll());

    let request = requests.try_recv().unwrap();
    assert_eq!(request.args, json!({"org": "acme"}));
    assert!(bridge.deliver(ToolResponse::success(request.correlation_id, json!(["api"]))));

    assert!(call.is_woken());
    let result = assert_ready!(call.poll());
    assert_eq!(result.unwrap(), json!(["api"]));
}

#[tokio::test]
async fn test_dropped_call_is_abandoned() {
    let (executor, mut requests) = ChannelExecutor::channel(4);
    let bridge = ToolBridge::new(Arc::new(executor), Duration::from_secs(5));

    let mut call = tokio_test::task::spawn(bridge.invoke_default("fs", "read", json!({})));
    assert_pending!(call.poll());
    assert_eq!(bridge.pending_count(), 1);

    drop(call);
    assert_eq!(bridge.pending_count(), 0);

    let request = requests.try_recv().unwrap();
    assert!(!bridge.deliver(ToolResponse::success(request.correlation_id, json!(null))));
}

#[tokio::test(start_paused = true)]
async fn test_session_invoke_times_out_then_discards_late_result() {
    let mut t = TestSession::new();
    let session = t.session.clone();
    let call = tokio::spawn(async move {
        session
            .invoke(
                "github",
                "list_repos",
                json!({}),
                Some(Duration::from_millis(1000)),
            )
            .await
    });

    let request = t.next_request().await;
    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, ToolError::Timeout { timeout_ms: 1000, .. }));

    assert!(!t
        .session
        .deliver_tool_response(ToolResponse::success(request.correlation_id, json!([]))));
    assert!(t.session.pending_tools().is_empty());
}

#[tokio::test]
async fn test_echo_host_round_trip_through_session() {
    let t = TestSession::new();
    let TestSession {
        session, requests, ..
    } = t;
    let (responses_tx, responses_rx) = mpsc::channel(8);
    let host = spawn_echo_host(requests, responses_tx);
    let pump = session.spawn_tool_responses(responses_rx);

    let ok = session
        .invoke("echo", "say", json!({"text": "hi"}), None)
        .await
        .unwrap();
    assert_eq!(ok["args"]["text"], "hi");
    assert_eq!(ok["tool"], "say");

    let err = session
        .invoke("echo", "say", json!({"error": "denied"}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Execution { ref message, .. } if message == "denied"));

    host.abort();
    pump.abort();
}

#[tokio::test]
async fn test_interleaved_calls_resolve_independently() {
    let mut t = TestSession::new();
    let mut calls = Vec::new();
    for n in 0..3 {
        let session = t.session.clone();
        calls.push(tokio::spawn(async move {
            session.invoke("github", "get_issue", json!({"n": n}), None).await
        }));
    }

    let mut requests = Vec::new();
    for _ in 0..3 {
        requests.push(t.next_request().await);
    }
    for request in requests.iter().rev() {
        let n = request.args["n"].clone();
        t.session
            .deliver_tool_response(ToolResponse::success(&request.correlation_id, n));
    }

    for (n, call) in calls.into_iter().enumerate() {
        assert_eq!(call.await.unwrap().unwrap(), json!(n));
    }
}
