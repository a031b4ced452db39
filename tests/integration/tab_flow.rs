//! Tab registry flows: cascades, fallback selection and structural
//! invariants under arbitrary operation sequences.

use proptest::prelude::*;

use switchboard::{Context, ContextKind, TabError, TabId, TabRegistry};

fn context(n: u8) -> Context {
    let kind = match n % 4 {
        0 => ContextKind::Room,
        1 => ContextKind::DirectMessage,
        2 => ContextKind::Workspace,
        _ => ContextKind::Agent,
    };
    Context::new(kind, format!("c{n}"), format!("Context {n}"))
}

#[test]
fn test_close_root_with_nested_sub_views() {
    let mut registry = TabRegistry::new(10);
    let root = registry.open_tab(context(0), None).unwrap().id;
    let child = registry.open_tab(context(1), Some(root)).unwrap().id;
    registry.activate(child).unwrap();
    let grandchild = registry.open_tab(context(2), Some(child)).unwrap().id;
    let other = registry.open_tab(context(3), None).unwrap().id;

    let closed = registry.close_tab(root).unwrap();
    assert_eq!(closed.removed, vec![grandchild, child, root]);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.active_tab_id(), Some(other));
    assert_eq!(closed.change.next, Some(context(3)));
}

#[test]
fn test_two_tabs_same_context_then_close_all() {
    let room = Context::room("A", "Room A");
    let mut registry = TabRegistry::new(10);
    let t1 = registry.open_tab(room.clone(), None).unwrap().id;
    let t2 = registry.open_tab(Context::room("B", "Room B"), None).unwrap().id;
    let t3 = registry.open_tab(room.clone(), None).unwrap().id;

    assert_eq!(registry.contexts().len(), 2);
    registry.close_tab(t1).unwrap();
    assert_eq!(registry.selected_context(), Some(&room));
    assert_eq!(registry.active_tab_id(), Some(t3));

    registry.close_tab(t3).unwrap();
    let last = registry.close_tab(t2).unwrap();
    assert!(registry.is_empty());
    assert_eq!(registry.selected_context(), None);
    assert!(last.change.is_context_transition());
}

#[test]
fn test_limit_and_unknown_ids_leave_state_untouched() {
    let mut registry = TabRegistry::new(2);
    let a = registry.open_tab(context(0), None).unwrap().id;
    registry.open_tab(context(1), None).unwrap();

    assert_eq!(
        registry.open_tab(context(2), None).unwrap_err(),
        TabError::LimitReached(2)
    );
    let ghost = TabId::new();
    assert_eq!(registry.activate(ghost).unwrap_err(), TabError::UnknownTab(ghost));
    assert_eq!(
        registry.open_tab(context(2), Some(ghost)).unwrap_err(),
        TabError::InvalidParent(ghost)
    );

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.active_tab_id(), Some(a));
    assert_eq!(registry.audit(), 0);
}

#[derive(Debug, Clone)]
enum Op {
    Open(u8),
    Sub(u8, usize),
    Activate(usize),
    Close(usize),
    Next,
    Prev,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6).prop_map(Op::Open),
        (0u8..6, any::<usize>()).prop_map(|(c, p)| Op::Sub(c, p)),
        any::<usize>().prop_map(Op::Activate),
        any::<usize>().prop_map(Op::Close),
        Just(Op::Next),
        Just(Op::Prev),
    ]
}

fn pick(registry: &TabRegistry, index: usize) -> Option<TabId> {
    let tabs = registry.tabs();
    if tabs.is_empty() {
        None
    } else {
        Some(tabs[index % tabs.len()].id())
    }
}

proptest! {
    #[test]
    fn prop_registry_never_dangles(ops in prop::collection::vec(op(), 1..80)) {
        let mut registry = TabRegistry::new(8);

        for op in ops {
            let change = match op {
                Op::Open(c) => registry.open_tab(context(c), None).ok().map(|o| o.change),
                Op::Sub(c, p) => pick(&registry, p)
                    .and_then(|parent| registry.open_tab(context(c), Some(parent)).ok())
                    .map(|o| o.change),
                Op::Activate(i) => pick(&registry, i).and_then(|id| registry.activate(id).ok()),
                Op::Close(i) => pick(&registry, i)
                    .and_then(|id| registry.close_tab(id).ok())
                    .map(|c| c.change),
                Op::Next => Some(registry.next_tab()),
                Op::Prev => Some(registry.prev_tab()),
            };

            prop_assert!(registry.len() <= 8);
            for tab in registry.tabs() {
                if let Some(parent) = tab.parent_id() {
                    prop_assert!(registry.tab(parent).is_some(), "dangling parent {}", parent);
                }
            }
            match registry.active_tab_id() {
                Some(id) => prop_assert!(registry.tab(id).is_some()),
                None => prop_assert!(registry.is_empty()),
            }
            if let Some(change) = change {
                prop_assert_eq!(change.next.as_ref(), registry.selected_context());
            }
            prop_assert_eq!(registry.audit(), 0);
        }
    }
}
