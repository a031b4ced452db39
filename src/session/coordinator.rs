use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::context::{Context, ContextId};
use crate::error::{TabError, ToolError};
use crate::notifications::{NotificationCoordinator, UnreadStore};
use crate::stream::{ConnectionState, StreamManager, StreamTransport, SubscriptionHandle};
use crate::tabs::{ActivationChange, Tab, TabId, TabRegistry};
use crate::tools::{ToolBridge, ToolExecutor, ToolInvocation, ToolResponse};

const SHUT_DOWN: &str = "session shut down";

/// Owned session state shared by every view of one client.
///
/// Each tab mutation produces an [`ActivationChange`] that is handed to the
/// notification coordinator while the registry lock is still held, so
/// transitions are observed in the order they happened.
pub struct SessionCoordinator {
    tabs: Mutex<TabRegistry>,
    streams: StreamManager,
    notifications: Arc<NotificationCoordinator>,
    tools: ToolBridge,
    shut_down: AtomicBool,
}

impl SessionCoordinator {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: &Config,
        transport: Arc<dyn StreamTransport>,
        executor: Arc<dyn ToolExecutor>,
        unread_store: Arc<dyn UnreadStore>,
    ) -> Self {
        let notifications = Arc::new(NotificationCoordinator::new(unread_store));
        let streams = StreamManager::new(transport);

        let activity = Arc::clone(&notifications);
        streams.set_activity_hook(Arc::new(move |context_id: &ContextId| {
            activity.note_activity(context_id);
        }));

        tracing::debug!(
            max_tabs = config.max_tabs,
            tool_timeout_ms = config.default_tool_timeout_ms,
            "Session coordinator created"
        );

        Self {
            tabs: Mutex::new(TabRegistry::new(config.max_tabs)),
            streams,
            notifications,
            tools: ToolBridge::new(executor, config.default_tool_timeout()),
            shut_down: AtomicBool::new(false),
        }
    }

    fn with_tabs<T>(
        &self,
        mutate: impl FnOnce(&mut TabRegistry) -> Result<(T, ActivationChange), TabError>,
    ) -> Result<(T, ActivationChange), TabError> {
        let mut tabs = self.tabs.lock();
        let (value, change) = mutate(&mut tabs)?;
        self.notifications.observe(&change);
        Ok((value, change))
    }

    // Tabs

    pub fn open_tab(&self, context: Context) -> Result<TabId, TabError> {
        self.with_tabs(|tabs| {
            let opened = tabs.open_tab(context, None)?;
            Ok((opened.id, opened.change))
        })
        .map(|(id, _)| id)
    }

    /// Open `context` as a sub-view of `parent`
    pub fn open_sub_view(&self, context: Context, parent: TabId) -> Result<TabId, TabError> {
        self.with_tabs(|tabs| {
            let opened = tabs.open_tab(context, Some(parent))?;
            Ok((opened.id, opened.change))
        })
        .map(|(id, _)| id)
    }

    pub fn activate(&self, id: TabId) -> Result<ActivationChange, TabError> {
        self.with_tabs(|tabs| Ok(((), tabs.activate(id)?)))
            .map(|(_, change)| change)
    }

    /// Close a tab and its sub-views. Returns the removed ids, descendants first.
    pub fn close_tab(&self, id: TabId) -> Result<Vec<TabId>, TabError> {
        self.with_tabs(|tabs| {
            let closed = tabs.close_tab(id)?;
            Ok((closed.removed, closed.change))
        })
        .map(|(removed, _)| removed)
    }

    pub fn next_tab(&self) -> ActivationChange {
        let mut tabs = self.tabs.lock();
        let change = tabs.next_tab();
        self.notifications.observe(&change);
        change
    }

    pub fn prev_tab(&self) -> ActivationChange {
        let mut tabs = self.tabs.lock();
        let change = tabs.prev_tab();
        self.notifications.observe(&change);
        change
    }

    pub fn selected_context(&self) -> Option<Context> {
        self.tabs.lock().selected_context().cloned()
    }

    pub fn active_tab_id(&self) -> Option<TabId> {
        self.tabs.lock().active_tab_id()
    }

    pub fn tabs(&self) -> Vec<Tab> {
        self.tabs.lock().tabs().to_vec()
    }

    pub fn tab_titles(&self) -> Vec<String> {
        self.tabs.lock().tab_titles()
    }

    // Streams

    /// After shutdown the handle reports `Closed` and ends without opening
    /// a connection.
    pub fn ensure_connected(&self, context_id: &ContextId) -> SubscriptionHandle {
        if self.is_shut_down() {
            tracing::debug!(context = %context_id, "Subscribe after shutdown refused");
            return self.streams.detached(
                context_id,
                ConnectionState::Closed {
                    detail: Some(SHUT_DOWN.to_string()),
                },
            );
        }
        self.streams.ensure_connected(context_id)
    }

    pub fn disconnect(&self, context_id: &ContextId) -> bool {
        self.streams.disconnect(context_id)
    }

    pub fn reconnect(&self, context_id: &ContextId) -> bool {
        !self.is_shut_down() && self.streams.reconnect(context_id)
    }

    pub fn stream_state(&self, context_id: &ContextId) -> Option<ConnectionState> {
        self.streams.state(context_id)
    }

    pub fn streams(&self) -> &StreamManager {
        &self.streams
    }

    // Tools

    /// Invoke a tool, using the configured default when `timeout` is `None`
    pub async fn invoke(
        &self,
        server_key: &str,
        tool_name: &str,
        args: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, ToolError> {
        if self.is_shut_down() {
            return Err(ToolError::ExecutorUnavailable(SHUT_DOWN.to_string()));
        }
        let timeout = timeout.unwrap_or_else(|| self.tools.default_timeout());
        self.tools.invoke(server_key, tool_name, args, timeout).await
    }

    pub fn deliver_tool_response(&self, response: ToolResponse) -> bool {
        self.tools.deliver(response)
    }

    /// Route executor responses from `responses` to waiting callers
    pub fn spawn_tool_responses(&self, responses: mpsc::Receiver<ToolResponse>) -> JoinHandle<()> {
        self.tools.spawn_response_pump(responses)
    }

    pub fn pending_tools(&self) -> Vec<ToolInvocation> {
        self.tools.pending()
    }

    pub fn tools(&self) -> &ToolBridge {
        &self.tools
    }

    // Notifications

    pub fn unread(&self, context_id: &ContextId) -> u64 {
        self.notifications.unread(context_id)
    }

    pub fn notifications(&self) -> &NotificationCoordinator {
        &self.notifications
    }

    /// Release every stream and reject in-flight tool calls. Runs once.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down session");
        self.streams.disconnect_all();
        self.tools.cancel_all(SHUT_DOWN);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
