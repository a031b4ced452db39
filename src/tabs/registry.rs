use std::collections::HashSet;

use crate::context::Context;
use crate::error::TabError;
use crate::tabs::{ActivationChange, Tab, TabId};

/// Result of opening a tab
#[derive(Debug, Clone)]
pub struct TabOpened {
    pub id: TabId,
    pub change: ActivationChange,
}

/// Result of closing a tab
#[derive(Debug, Clone)]
pub struct TabClosed {
    /// Removed tab ids, descendants first and the requested tab last
    pub removed: Vec<TabId>,
    pub change: ActivationChange,
}

/// Owns the open tabs and the active selection
pub struct TabRegistry {
    /// Open tabs in the order they were opened
    tabs: Vec<Tab>,
    /// Currently active tab
    active_tab: Option<TabId>,
    /// Activation history, most recent last, no duplicates
    history: Vec<TabId>,
    /// Maximum number of tabs allowed
    max_tabs: usize,
}

impl TabRegistry {
    pub fn new(max_tabs: usize) -> Self {
        Self {
            tabs: Vec::new(),
            active_tab: None,
            history: Vec::new(),
            max_tabs,
        }
    }

    /// Open a tab for `context`. It becomes active only if no tab is active.
    pub fn open_tab(
        &mut self,
        context: Context,
        parent_id: Option<TabId>,
    ) -> Result<TabOpened, TabError> {
        if let Some(parent) = parent_id {
            if self.position(parent).is_none() {
                return Err(TabError::InvalidParent(parent));
            }
        }

        if !self.can_add_tab() {
            return Err(TabError::LimitReached(self.max_tabs));
        }

        if let Some(parent) = parent_id.filter(|parent| self.active_tab != Some(*parent)) {
            tracing::warn!(
                parent = %parent,
                active = ?self.active_tab.map(|id| id.to_string()),
                context = %context,
                "Tab relationship anomaly: sub-view opened from a tab that is not active"
            );
        }

        let before = self.snapshot();
        let tab = Tab::new(context, parent_id);
        let id = tab.id();
        tracing::debug!(tab = %id, context = %tab.context(), parent = ?parent_id, "Opened tab");
        self.tabs.push(tab);

        if self.active_tab.is_none() {
            self.set_active(id);
        }

        Ok(TabOpened {
            id,
            change: self.change_since(before),
        })
    }

    /// Make `id` the active tab
    pub fn activate(&mut self, id: TabId) -> Result<ActivationChange, TabError> {
        if self.position(id).is_none() {
            return Err(TabError::UnknownTab(id));
        }

        let before = self.snapshot();
        self.set_active(id);
        Ok(self.change_since(before))
    }

    /// Close a tab and, transitively, every tab opened from it
    pub fn close_tab(&mut self, id: TabId) -> Result<TabClosed, TabError> {
        if self.position(id).is_none() {
            return Err(TabError::UnknownTab(id));
        }

        let before = self.snapshot();
        let mut removed = Vec::new();
        self.collect_subtree(id, &mut removed);

        // Children leave before their parent so no survivor ever points at a
        // removed tab.
        for tab_id in &removed {
            if let Some(index) = self.position(*tab_id) {
                self.tabs.remove(index);
            }
            self.history.retain(|h| h != tab_id);
        }

        if self
            .active_tab
            .is_some_and(|active| removed.contains(&active))
        {
            self.active_tab = None;
            let fallback = self
                .history
                .last()
                .copied()
                .or_else(|| self.tabs.last().map(Tab::id));
            if let Some(next) = fallback {
                self.set_active(next);
            }
        }

        tracing::debug!(tab = %id, removed = removed.len(), "Closed tab");

        Ok(TabClosed {
            removed,
            change: self.change_since(before),
        })
    }

    /// Switch to the next tab in open order
    pub fn next_tab(&mut self) -> ActivationChange {
        let before = self.snapshot();
        if !self.tabs.is_empty() {
            let next = match self.active_index() {
                Some(index) => (index + 1) % self.tabs.len(),
                None => 0,
            };
            let id = self.tabs[next].id();
            self.set_active(id);
        }
        self.change_since(before)
    }

    /// Switch to the previous tab in open order
    pub fn prev_tab(&mut self) -> ActivationChange {
        let before = self.snapshot();
        if !self.tabs.is_empty() {
            let prev = match self.active_index() {
                Some(0) | None => self.tabs.len() - 1,
                Some(index) => index - 1,
            };
            let id = self.tabs[prev].id();
            self.set_active(id);
        }
        self.change_since(before)
    }

    /// Report structural anomalies without failing. Returns how many were found.
    pub fn audit(&self) -> usize {
        let mut anomalies = 0;
        for tab in &self.tabs {
            match tab.parent_id() {
                Some(parent) if parent == tab.id() => {
                    tracing::warn!(tab = %tab.id(), "Tab relationship anomaly: self-parented tab");
                    anomalies += 1;
                }
                Some(parent) if self.position(parent).is_none() => {
                    tracing::warn!(tab = %tab.id(), parent = %parent, "Tab relationship anomaly: parent is not open");
                    anomalies += 1;
                }
                _ => {}
            }
        }
        if let Some(active) = self.active_tab {
            if self.position(active).is_none() {
                tracing::warn!(tab = %active, "Tab relationship anomaly: active tab is not open");
                anomalies += 1;
            }
        }
        anomalies
    }

    /// Get the active tab id
    pub fn active_tab_id(&self) -> Option<TabId> {
        self.active_tab
    }

    /// Get the context of the active tab
    pub fn selected_context(&self) -> Option<&Context> {
        self.active_tab
            .and_then(|id| self.tab(id))
            .map(Tab::context)
    }

    /// Get the active tab
    pub fn active(&self) -> Option<&Tab> {
        self.active_tab.and_then(|id| self.tab(id))
    }

    /// Get a tab by id
    pub fn tab(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id() == id)
    }

    /// Tabs opened directly from `id`
    pub fn children(&self, id: TabId) -> Vec<&Tab> {
        self.tabs
            .iter()
            .filter(|tab| tab.parent_id() == Some(id))
            .collect()
    }

    /// Get all tabs in open order
    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    /// Distinct contexts referenced by open tabs, in first-open order
    pub fn contexts(&self) -> Vec<&Context> {
        let mut seen = HashSet::new();
        self.tabs
            .iter()
            .map(Tab::context)
            .filter(|ctx| seen.insert(*ctx))
            .collect()
    }

    /// Get tab titles for display
    pub fn tab_titles(&self) -> Vec<String> {
        self.tabs.iter().map(|tab| tab.context().title()).collect()
    }

    /// Get the number of tabs
    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    /// Check if there are no tabs
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Check if we can add more tabs
    pub fn can_add_tab(&self) -> bool {
        self.tabs.len() < self.max_tabs
    }

    fn position(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id() == id)
    }

    fn active_index(&self) -> Option<usize> {
        self.active_tab.and_then(|id| self.position(id))
    }

    fn set_active(&mut self, id: TabId) {
        self.active_tab = Some(id);
        self.history.retain(|h| *h != id);
        self.history.push(id);
    }

    fn collect_subtree(&self, id: TabId, out: &mut Vec<TabId>) {
        let children: Vec<TabId> = self.children(id).into_iter().map(Tab::id).collect();
        for child in children {
            self.collect_subtree(child, out);
        }
        out.push(id);
    }

    fn snapshot(&self) -> (Option<TabId>, Option<Context>) {
        (self.active_tab, self.selected_context().cloned())
    }

    fn change_since(&self, before: (Option<TabId>, Option<Context>)) -> ActivationChange {
        ActivationChange {
            previous_tab: before.0,
            next_tab: self.active_tab,
            previous: before.1,
            next: self.selected_context().cloned(),
        }
    }
}
