//! End-to-end session flows: tab switching drives unread clearing and
//! stream activity drives unread counts.

use serde_json::json;

use switchboard::{Config, Context, ContextId, TabError, UnreadStore};

use super::common::fixtures::{next_update, wait_open, TestSession};

#[tokio::test]
async fn test_background_activity_then_switch_clears_unread() {
    let t = TestSession::new();
    let general = ContextId::from("general");
    let random = ContextId::from("random");

    let first = t.session.open_tab(Context::room("general", "General")).unwrap();
    let second = t.session.open_tab(Context::room("random", "Random")).unwrap();
    assert_eq!(t.session.active_tab_id(), Some(first));

    let mut feed = t.session.ensure_connected(&random);
    wait_open(&mut feed).await;
    for n in 0..3 {
        t.transport.emit(&random, json!({"n": n})).await;
        next_update(&mut feed).await;
    }
    assert_eq!(t.session.unread(&random), 3);

    // Entering random does not clear it; leaving it does
    t.session.activate(second).unwrap();
    assert_eq!(t.session.unread(&random), 3);
    t.session.activate(first).unwrap();
    assert_eq!(t.session.unread(&random), 0);
    assert!(t.store.state(&random).last_cleared_at.is_some());
    assert_eq!(t.session.unread(&general), 0);
}

#[tokio::test]
async fn test_switching_between_tabs_of_same_context_does_not_clear() {
    let t = TestSession::new();
    let room = ContextId::from("A");
    t.store.record_activity(&room);

    let a1 = t.session.open_tab(Context::room("A", "")).unwrap();
    let a2 = t.session.open_tab(Context::room("A", "")).unwrap();
    t.session.activate(a2).unwrap();
    t.session.activate(a1).unwrap();

    assert_eq!(t.session.unread(&room), 1);
}

#[tokio::test]
async fn test_closing_last_tab_marks_context_read() {
    let t = TestSession::new();
    let room = ContextId::from("A");
    t.store.record_activity(&room);

    let tab = t.session.open_tab(Context::room("A", "")).unwrap();
    t.session.close_tab(tab).unwrap();

    assert_eq!(t.session.selected_context(), None);
    assert_eq!(t.session.unread(&room), 0);
}

#[tokio::test]
async fn test_tab_cycling_and_limits() {
    let t = TestSession::with_config(Config::default().with_max_tabs(3));
    let ids: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|id| t.session.open_tab(Context::room(id, "")).unwrap())
        .collect();
    assert!(matches!(
        t.session.open_tab(Context::room("d", "")),
        Err(TabError::LimitReached(3))
    ));

    let change = t.session.next_tab();
    assert_eq!(change.next_tab, Some(ids[1]));
    t.session.prev_tab();
    let change = t.session.prev_tab();
    assert_eq!(change.next_tab, Some(ids[2]));
    assert_eq!(t.session.tab_titles(), vec!["room:a", "room:b", "room:c"]);
}

#[tokio::test]
async fn test_sub_view_of_inactive_tab_still_opens() {
    let t = TestSession::new();
    let parent = t.session.open_tab(Context::workspace("w1", "api")).unwrap();
    let other = t.session.open_tab(Context::room("r1", "")).unwrap();
    t.session.activate(other).unwrap();

    let child = t
        .session
        .open_sub_view(Context::agent("a1", "reviewer"), parent)
        .unwrap();
    let tabs = t.session.tabs();
    let child_tab = tabs.iter().find(|tab| tab.id() == child).unwrap();
    assert_eq!(child_tab.parent_id(), Some(parent));
    assert_eq!(t.session.active_tab_id(), Some(other));
}
