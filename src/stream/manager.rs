//! Stream session manager.
//!
//! Keeps at most one transport connection per context id and fans its
//! events out to every subscriber of that context. Connections are shared
//! by reference count: the transport is released when the last
//! [`SubscriptionHandle`] for a context is dropped.
//!
//! Every open attempt carries a generation number. Results and events from
//! a superseded attempt (torn down or reopened meanwhile) are discarded and
//! their connection released, so a slow open can never leave a second live
//! connection behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::ContextId;
use crate::stream::transport::{
    ConnectionHandle, StreamTransport, TransportConnection, TransportEvent, TransportMessage,
};
use crate::stream::{ConnectionState, StreamUpdate};

/// Callback invoked for every payload dispatched on a context
pub type ActivityHook = Arc<dyn Fn(&ContextId) + Send + Sync>;

struct StreamEntry {
    state: ConnectionState,
    subscribers: HashMap<u64, mpsc::UnboundedSender<StreamUpdate>>,
    connection: Option<ConnectionHandle>,
    generation: u64,
    cancel: CancellationToken,
}

impl StreamEntry {
    fn broadcast(&mut self, context_id: &ContextId, update: &StreamUpdate) {
        self.subscribers.retain(|subscriber, tx| {
            if tx.send(update.clone()).is_err() {
                tracing::debug!(
                    context = %context_id,
                    subscriber,
                    "Dropping stream subscriber; receiver already closed"
                );
                false
            } else {
                true
            }
        });
    }

    fn set_state(&mut self, context_id: &ContextId, state: ConnectionState) {
        self.state = state.clone();
        self.broadcast(context_id, &StreamUpdate::State(state));
    }
}

struct Inner {
    transport: Arc<dyn StreamTransport>,
    entries: Mutex<HashMap<ContextId, StreamEntry>>,
    next_subscriber: AtomicU64,
    next_generation: AtomicU64,
    activity_hook: Mutex<Option<ActivityHook>>,
}

/// Owns one push connection per context id
#[derive(Clone)]
pub struct StreamManager {
    inner: Arc<Inner>,
}

impl StreamManager {
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                entries: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
                activity_hook: Mutex::new(None),
            }),
        }
    }

    /// Install a callback run for each dispatched payload
    pub fn set_activity_hook(&self, hook: ActivityHook) {
        *self.inner.activity_hook.lock() = Some(hook);
    }

    /// Subscribe to `context_id`, opening a connection if none exists.
    ///
    /// Never fails synchronously: open failures arrive on the handle as an
    /// `Errored` state. A closed or errored connection is reopened here, which
    /// is the only reconnect path besides [`StreamManager::reconnect`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn ensure_connected(&self, context_id: &ContextId) -> SubscriptionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber_id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);

        {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(context_id) {
                Some(entry) => {
                    entry.subscribers.insert(subscriber_id, tx);
                    if entry.state.is_terminal() {
                        tracing::info!(context = %context_id, "Reopening stream on subscribe");
                        Inner::begin_open(&self.inner, context_id, entry);
                    } else if let Some(tx) = entry.subscribers.get(&subscriber_id) {
                        let _ = tx.send(StreamUpdate::State(entry.state.clone()));
                    }
                    tracing::debug!(
                        context = %context_id,
                        subscribers = entry.subscribers.len(),
                        "Attached stream subscriber"
                    );
                }
                None => {
                    let mut entry = StreamEntry {
                        state: ConnectionState::Connecting,
                        subscribers: HashMap::from([(subscriber_id, tx)]),
                        connection: None,
                        generation: 0,
                        cancel: CancellationToken::new(),
                    };
                    Inner::begin_open(&self.inner, context_id, &mut entry);
                    entries.insert(context_id.clone(), entry);
                }
            }
        }

        SubscriptionHandle {
            context_id: context_id.clone(),
            subscriber_id,
            updates: rx,
            manager: Arc::downgrade(&self.inner),
        }
    }

    /// Handle that reports `state` once and then ends, without touching
    /// any connection
    pub fn detached(&self, context_id: &ContextId, state: ConnectionState) -> SubscriptionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(StreamUpdate::State(state));
        SubscriptionHandle {
            context_id: context_id.clone(),
            subscriber_id: 0,
            updates: rx,
            manager: Weak::new(),
        }
    }

    /// Retry a closed or errored connection that still has subscribers.
    /// Returns false when there is nothing to retry.
    pub fn reconnect(&self, context_id: &ContextId) -> bool {
        let mut entries = self.inner.entries.lock();
        match entries.get_mut(context_id) {
            Some(entry) if entry.state.is_terminal() && !entry.subscribers.is_empty() => {
                Inner::begin_open(&self.inner, context_id, entry);
                true
            }
            _ => false,
        }
    }

    /// Tear down the connection for `context_id` once nobody subscribes to it.
    ///
    /// Returns true when no entry remains for the context. Entries with live
    /// subscribers are left alone.
    pub fn disconnect(&self, context_id: &ContextId) -> bool {
        let removed = {
            let mut entries = self.inner.entries.lock();
            match entries.get(context_id) {
                None => return true,
                Some(entry) if !entry.subscribers.is_empty() => {
                    tracing::debug!(
                        context = %context_id,
                        subscribers = entry.subscribers.len(),
                        "Not disconnecting stream with live subscribers"
                    );
                    return false;
                }
                Some(_) => entries.remove(context_id),
            }
        };

        if let Some(entry) = removed {
            self.inner.release(context_id, entry);
        }
        true
    }

    /// Tear down every connection regardless of subscribers.
    ///
    /// Subscribers receive a final `Closed` state and then see their channel end.
    pub fn disconnect_all(&self) {
        let drained: Vec<(ContextId, StreamEntry)> =
            self.inner.entries.lock().drain().collect();

        tracing::info!(connections = drained.len(), "Disconnecting all streams");

        for (context_id, mut entry) in drained {
            entry.set_state(
                &context_id,
                ConnectionState::Closed {
                    detail: Some("disconnected".to_string()),
                },
            );
            self.inner.release(&context_id, entry);
        }
    }

    /// Current connection state, `None` when absent
    pub fn state(&self, context_id: &ContextId) -> Option<ConnectionState> {
        self.inner
            .entries
            .lock()
            .get(context_id)
            .map(|entry| entry.state.clone())
    }

    pub fn subscriber_count(&self, context_id: &ContextId) -> usize {
        self.inner
            .entries
            .lock()
            .get(context_id)
            .map(|entry| entry.subscribers.len())
            .unwrap_or(0)
    }

    /// Number of entries currently holding a transport connection
    pub fn connection_count(&self) -> usize {
        self.inner
            .entries
            .lock()
            .values()
            .filter(|entry| entry.connection.is_some())
            .count()
    }

    /// Context ids with an entry, sorted
    pub fn contexts(&self) -> Vec<ContextId> {
        let mut ids: Vec<ContextId> = self.inner.entries.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Inner {
    /// Move `entry` to `Connecting` under a fresh generation and spawn the open.
    fn begin_open(inner: &Arc<Inner>, context_id: &ContextId, entry: &mut StreamEntry) {
        entry.cancel.cancel();
        entry.cancel = CancellationToken::new();
        entry.generation = inner.next_generation.fetch_add(1, Ordering::Relaxed);
        if let Some(stale) = entry.connection.take() {
            inner.transport.close(stale);
        }
        entry.set_state(context_id, ConnectionState::Connecting);

        tokio::spawn(run_connection(
            Arc::clone(inner),
            context_id.clone(),
            entry.generation,
            entry.cancel.clone(),
        ));
    }

    /// Stop the pump and close the transport of an entry already removed from the map
    fn release(&self, context_id: &ContextId, entry: StreamEntry) {
        entry.cancel.cancel();
        if let Some(handle) = entry.connection {
            tracing::debug!(context = %context_id, "Closing stream transport");
            self.transport.close(handle);
        }
    }

    fn unsubscribe(&self, context_id: &ContextId, subscriber_id: u64) {
        let removed = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(context_id) else {
                return;
            };
            entry.subscribers.remove(&subscriber_id);
            if !entry.subscribers.is_empty() {
                return;
            }
            entries.remove(context_id)
        };

        if let Some(entry) = removed {
            tracing::debug!(context = %context_id, "Last subscriber left; tearing down stream");
            self.release(context_id, entry);
        }
    }

    fn connection_opened(
        &self,
        context_id: &ContextId,
        generation: u64,
        handle: ConnectionHandle,
    ) -> bool {
        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(context_id) {
                if entry.generation == generation {
                    entry.connection = Some(handle);
                    entry.set_state(context_id, ConnectionState::Open);
                    tracing::info!(context = %context_id, "Stream open");
                    return true;
                }
            }
        }

        tracing::debug!(context = %context_id, generation, "Discarding superseded stream connection");
        self.transport.close(handle);
        false
    }

    /// Put the current generation into a terminal state and release its transport
    fn finish(&self, context_id: &ContextId, generation: u64, state: ConnectionState) {
        let handle = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(context_id) else {
                return;
            };
            if entry.generation != generation {
                return;
            }
            entry.cancel.cancel();
            entry.set_state(context_id, state);
            entry.connection.take()
        };

        if let Some(handle) = handle {
            self.transport.close(handle);
        }
    }

    /// Deliver one transport message. Returns false when the pump should stop.
    fn dispatch(&self, context_id: &ContextId, generation: u64, message: TransportMessage) -> bool {
        if &message.context_id != context_id {
            tracing::error!(
                context = %context_id,
                received = %message.context_id,
                "Stream protocol violation: event tagged with another context"
            );
            self.finish(
                context_id,
                generation,
                ConnectionState::Errored {
                    detail: format!("event for mismatched context {}", message.context_id),
                },
            );
            return false;
        }

        match message.event {
            TransportEvent::Payload(payload) => {
                {
                    let mut entries = self.entries.lock();
                    let Some(entry) = entries.get_mut(context_id) else {
                        return false;
                    };
                    if entry.generation != generation {
                        return false;
                    }
                    entry.broadcast(context_id, &StreamUpdate::Event { payload });
                }
                let hook = self.activity_hook.lock().clone();
                if let Some(hook) = hook {
                    hook(context_id);
                }
                true
            }
            TransportEvent::Closed { detail } => {
                tracing::info!(context = %context_id, detail = ?detail, "Stream closed by server");
                self.finish(context_id, generation, ConnectionState::Closed { detail });
                false
            }
            TransportEvent::Error { detail } => {
                tracing::warn!(context = %context_id, %detail, "Stream error");
                self.finish(context_id, generation, ConnectionState::Errored { detail });
                false
            }
        }
    }
}

async fn run_connection(
    inner: Arc<Inner>,
    context_id: ContextId,
    generation: u64,
    cancel: CancellationToken,
) {
    let TransportConnection { handle, mut events } = match inner.transport.open(&context_id).await
    {
        Ok(connection) => connection,
        Err(err) => {
            tracing::warn!(context = %context_id, error = %err, "Failed to open stream");
            inner.finish(
                &context_id,
                generation,
                ConnectionState::Errored {
                    detail: err.to_string(),
                },
            );
            return;
        }
    };

    if !inner.connection_opened(&context_id, generation, handle) {
        return;
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = events.recv() => match message {
                Some(message) => {
                    if !inner.dispatch(&context_id, generation, message) {
                        break;
                    }
                }
                None => {
                    inner.finish(
                        &context_id,
                        generation,
                        ConnectionState::Closed {
                            detail: Some("transport ended".to_string()),
                        },
                    );
                    break;
                }
            },
        }
    }
}

/// A live subscription to one context's stream.
///
/// Dropping the handle (or calling [`SubscriptionHandle::dispose`])
/// unsubscribes; the last one out releases the transport.
pub struct SubscriptionHandle {
    context_id: ContextId,
    subscriber_id: u64,
    updates: mpsc::UnboundedReceiver<StreamUpdate>,
    manager: Weak<Inner>,
}

impl SubscriptionHandle {
    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    /// Next update, `None` once the stream entry is gone
    pub async fn recv(&mut self) -> Option<StreamUpdate> {
        self.updates.recv().await
    }

    /// Next update if one is already queued
    pub fn try_recv(&mut self) -> Option<StreamUpdate> {
        self.updates.try_recv().ok()
    }

    /// Unsubscribe now
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.manager.upgrade() {
            inner.unsubscribe(&self.context_id, self.subscriber_id);
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("context_id", &self.context_id)
            .field("subscriber_id", &self.subscriber_id)
            .finish()
    }
}
