//! Unread state coordination driven by context-selection transitions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::{Context, ContextId};
use crate::tabs::ActivationChange;

/// Owner of raw unread counts
pub trait UnreadStore: Send + Sync {
    /// Clear unread state for a context
    fn mark_context_read(&self, context_id: &ContextId);

    /// Current unread count for a context
    fn get_unread(&self, context_id: &ContextId) -> u64;

    /// Count new activity for a context. Stores that track unread
    /// elsewhere can ignore this.
    fn record_activity(&self, _context_id: &ContextId) {}
}

/// Per-context unread projection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationState {
    pub unread_count: u64,
    pub last_cleared_at: Option<DateTime<Utc>>,
}

/// Unread store kept in process memory
#[derive(Default)]
pub struct InMemoryUnreadStore {
    states: Mutex<HashMap<ContextId, NotificationState>>,
}

impl InMemoryUnreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, context_id: &ContextId) -> NotificationState {
        self.states
            .lock()
            .get(context_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Total unread across all contexts
    pub fn total_unread(&self) -> u64 {
        self.states.lock().values().map(|s| s.unread_count).sum()
    }
}

impl UnreadStore for InMemoryUnreadStore {
    fn mark_context_read(&self, context_id: &ContextId) {
        let mut states = self.states.lock();
        let state = states.entry(context_id.clone()).or_default();
        state.unread_count = 0;
        state.last_cleared_at = Some(Utc::now());
    }

    fn get_unread(&self, context_id: &ContextId) -> u64 {
        self.states
            .lock()
            .get(context_id)
            .map(|s| s.unread_count)
            .unwrap_or(0)
    }

    fn record_activity(&self, context_id: &ContextId) {
        let mut states = self.states.lock();
        states.entry(context_id.clone()).or_default().unread_count += 1;
    }
}

/// Clears unread state for the context being left whenever the selected
/// context changes.
pub struct NotificationCoordinator {
    store: Arc<dyn UnreadStore>,
    /// Context selected as of the last processed transition
    reference: Mutex<Option<Context>>,
}

impl NotificationCoordinator {
    pub fn new(store: Arc<dyn UnreadStore>) -> Self {
        Self {
            store,
            reference: Mutex::new(None),
        }
    }

    /// React to a selection transition. Returns true when unread state was touched.
    ///
    /// Transitions are compared against the last processed context rather than
    /// `change.previous`, so replaying a transition is a no-op.
    pub fn observe(&self, change: &ActivationChange) -> bool {
        let mut reference = self.reference.lock();
        if *reference == change.next {
            return false;
        }

        let previous = std::mem::replace(&mut *reference, change.next.clone());
        drop(reference);

        match previous {
            Some(left) => {
                tracing::debug!(
                    left = %left,
                    entered = ?change.next.as_ref().map(|c| c.to_string()),
                    "Marking context read on switch"
                );
                self.store.mark_context_read(left.id());
                true
            }
            None => false,
        }
    }

    /// Record incoming activity for a context. The selected context never
    /// accumulates unread.
    pub fn note_activity(&self, context_id: &ContextId) {
        let is_selected = self
            .reference
            .lock()
            .as_ref()
            .is_some_and(|ctx| ctx.id() == context_id);
        if !is_selected {
            self.store.record_activity(context_id);
        }
    }

    pub fn unread(&self, context_id: &ContextId) -> u64 {
        self.store.get_unread(context_id)
    }

    pub fn reference(&self) -> Option<Context> {
        self.reference.lock().clone()
    }
}
