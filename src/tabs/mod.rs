pub mod registry;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::Context;

pub use registry::{TabClosed, TabOpened, TabRegistry};

/// Unique identifier of an open tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A UI session slot bound to one context, optionally opened from another tab
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tab {
    id: TabId,
    context: Context,
    parent_id: Option<TabId>,
    opened_at: DateTime<Utc>,
}

impl Tab {
    pub(crate) fn new(context: Context, parent_id: Option<TabId>) -> Self {
        Self {
            id: TabId::new(),
            context,
            parent_id,
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn parent_id(&self) -> Option<TabId> {
        self.parent_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Whether this tab is a sub-view of another tab
    pub fn is_sub_view(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// Selected-context transition produced by a registry mutation.
///
/// Every mutating registry call returns one of these, even when nothing
/// changed, so callers can forward it unconditionally.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActivationChange {
    pub previous_tab: Option<TabId>,
    pub next_tab: Option<TabId>,
    pub previous: Option<Context>,
    pub next: Option<Context>,
}

impl ActivationChange {
    /// True when the selected context differs between `previous` and `next`
    pub fn is_context_transition(&self) -> bool {
        self.previous != self.next
    }

    /// True when the active tab pointer moved
    pub fn is_tab_switch(&self) -> bool {
        self.previous_tab != self.next_tab
    }
}
