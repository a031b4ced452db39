use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::context::ContextId;
use crate::error::TransportError;

/// Opaque handle to a transport connection, owned by one stream entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Event emitted by the transport for one connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Payload(Value),
    Closed { detail: Option<String> },
    Error { detail: String },
}

/// Transport event tagged with the context it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessage {
    pub context_id: ContextId,
    pub event: TransportEvent,
}

impl TransportMessage {
    pub fn payload(context_id: ContextId, payload: Value) -> Self {
        Self {
            context_id,
            event: TransportEvent::Payload(payload),
        }
    }

    pub fn closed(context_id: ContextId, detail: Option<String>) -> Self {
        Self {
            context_id,
            event: TransportEvent::Closed { detail },
        }
    }

    pub fn error(context_id: ContextId, detail: impl Into<String>) -> Self {
        Self {
            context_id,
            event: TransportEvent::Error {
                detail: detail.into(),
            },
        }
    }
}

/// An opened connection: its handle plus the event receiver
pub struct TransportConnection {
    pub handle: ConnectionHandle,
    pub events: mpsc::Receiver<TransportMessage>,
}

/// Push-stream transport owned by the host process
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a connection keyed by `context_id`
    async fn open(&self, context_id: &ContextId) -> Result<TransportConnection, TransportError>;

    /// Release a connection. Must tolerate handles that already ended.
    fn close(&self, handle: ConnectionHandle);
}
