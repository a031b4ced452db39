//! Mock push-stream transport for deterministic testing
//!
//! Implements [`StreamTransport`] without any network I/O. Tests push
//! events into open connections and inspect how many connections were
//! opened and closed.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use switchboard::context::ContextId;
//! use switchboard::stream::{mock::MockTransport, StreamManager};
//!
//! #[tokio::test]
//! async fn test_stream_flow() {
//!     let transport = Arc::new(MockTransport::new());
//!     let manager = StreamManager::new(transport.clone());
//!     let mut handle = manager.ensure_connected(&ContextId::from("r1"));
//!     transport.emit(&ContextId::from("r1"), serde_json::json!({"text": "hi"})).await;
//!     // Use handle.recv() in tests...
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::context::ContextId;
use crate::error::TransportError;
use crate::stream::transport::{
    ConnectionHandle, StreamTransport, TransportConnection, TransportMessage,
};

struct MockConnection {
    context_id: ContextId,
    tx: mpsc::Sender<TransportMessage>,
}

/// Mock transport for testing
#[derive(Default)]
pub struct MockTransport {
    /// Every open call, in order
    opened: Mutex<Vec<ContextId>>,
    /// Every close call, in order
    closed: Mutex<Vec<ConnectionHandle>>,
    /// Connections not yet closed, by handle
    live: Mutex<HashMap<u64, MockConnection>>,
    /// Pending failures for the next open of a context
    failures: Mutex<HashMap<ContextId, String>>,
    /// Delay before open completes (simulates a handshake)
    open_delay: Duration,
    next_handle: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure a delay before each open completes
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Make the next open for `context_id` fail with `detail`
    pub fn fail_next_open(&self, context_id: &ContextId, detail: impl Into<String>) {
        self.failures
            .lock()
            .insert(context_id.clone(), detail.into());
    }

    /// Number of open calls, including failed ones
    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Number of open calls for one context
    pub fn open_count_for(&self, context_id: &ContextId) -> usize {
        self.opened
            .lock()
            .iter()
            .filter(|id| *id == context_id)
            .count()
    }

    /// Number of close calls
    pub fn close_count(&self) -> usize {
        self.closed.lock().len()
    }

    /// Number of connections opened and not yet closed
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Push a payload into the newest live connection for `context_id`.
    /// Returns false when no connection is live.
    pub async fn emit(&self, context_id: &ContextId, payload: Value) -> bool {
        self.emit_raw(
            context_id,
            TransportMessage::payload(context_id.clone(), payload),
        )
        .await
    }

    /// Simulate a server-initiated close
    pub async fn server_close(&self, context_id: &ContextId) -> bool {
        self.emit_raw(
            context_id,
            TransportMessage::closed(context_id.clone(), Some("server closed".to_string())),
        )
        .await
    }

    /// Simulate a transport error
    pub async fn server_error(&self, context_id: &ContextId, detail: &str) -> bool {
        self.emit_raw(
            context_id,
            TransportMessage::error(context_id.clone(), detail),
        )
        .await
    }

    /// Send an arbitrary message on the connection for `context_id`
    pub async fn emit_raw(&self, context_id: &ContextId, message: TransportMessage) -> bool {
        let tx = {
            let live = self.live.lock();
            live.iter()
                .filter(|(_, conn)| &conn.context_id == context_id)
                .max_by_key(|(handle, _)| **handle)
                .map(|(_, conn)| conn.tx.clone())
        };

        match tx {
            Some(tx) => tx.send(message).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn open(&self, context_id: &ContextId) -> Result<TransportConnection, TransportError> {
        self.opened.lock().push(context_id.clone());

        if self.open_delay > Duration::ZERO {
            tokio::time::sleep(self.open_delay).await;
        }

        if let Some(detail) = self.failures.lock().remove(context_id) {
            return Err(TransportError::Open {
                context_id: context_id.clone(),
                detail,
            });
        }

        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(64);
        self.live.lock().insert(
            raw,
            MockConnection {
                context_id: context_id.clone(),
                tx,
            },
        );

        Ok(TransportConnection {
            handle: ConnectionHandle::new(raw),
            events: rx,
        })
    }

    fn close(&self, handle: ConnectionHandle) {
        self.closed.lock().push(handle);
        self.live.lock().remove(&handle.raw());
    }
}
