//! Server-sent events transport.
//!
//! Subscribes to `GET {base_url}/contexts/{id}/events` and forwards each
//! message as a payload event. Message data is parsed as JSON
//! and falls back to a JSON string when it is not.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::ContextId;
use crate::error::TransportError;
use crate::stream::transport::{
    ConnectionHandle, StreamTransport, TransportConnection, TransportMessage,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct EventSourceTransport {
    client: Client,
    base_url: String,
    readers: Mutex<HashMap<u64, CancellationToken>>,
    next_handle: AtomicU64,
}

impl EventSourceTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            readers: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn events_url(&self, context_id: &ContextId) -> String {
        format!("{}/contexts/{}/events", self.base_url, context_id)
    }

    fn parse_data(data: &str) -> Value {
        match serde_json::from_str::<Value>(data) {
            Ok(value) => value,
            Err(_) => {
                tracing::trace!("SSE data is not JSON; forwarding as string");
                Value::String(data.to_string())
            }
        }
    }

    async fn pump(
        mut source: EventSource,
        context_id: ContextId,
        tx: mpsc::Sender<TransportMessage>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = source.next() => event,
            };

            let message = match event {
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(message))) => {
                    tracing::trace!(context = %context_id, event = %message.event, "SSE message");
                    TransportMessage::payload(context_id.clone(), Self::parse_data(&message.data))
                }
                Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                    let _ = tx.send(TransportMessage::closed(context_id.clone(), None)).await;
                    break;
                }
                Some(Err(err)) => {
                    let _ = tx
                        .send(TransportMessage::error(context_id.clone(), err.to_string()))
                        .await;
                    break;
                }
            };

            if tx.send(message).await.is_err() {
                // Receiver dropped, exit gracefully
                break;
            }
        }

        source.close();
    }
}

#[async_trait]
impl StreamTransport for EventSourceTransport {
    async fn open(&self, context_id: &ContextId) -> Result<TransportConnection, TransportError> {
        let url = self.events_url(context_id);
        let open_error = |detail: String| TransportError::Open {
            context_id: context_id.clone(),
            detail,
        };

        let mut source = self
            .client
            .get(&url)
            .eventsource()
            .map_err(|err| open_error(err.to_string()))?;

        // Wait for the handshake so open failures are reported as such
        let first = match source.next().await {
            Some(Ok(Event::Open)) => None,
            Some(Ok(Event::Message(message))) => Some(Self::parse_data(&message.data)),
            Some(Err(err)) => {
                source.close();
                return Err(open_error(err.to_string()));
            }
            None => return Err(open_error("stream ended before opening".to_string())),
        };

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        if let Some(payload) = first {
            let _ = tx.try_send(TransportMessage::payload(context_id.clone(), payload));
        }

        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.readers.lock().insert(raw, cancel.clone());
        tokio::spawn(Self::pump(source, context_id.clone(), tx, cancel));

        tracing::debug!(context = %context_id, %url, "SSE stream opened");
        Ok(TransportConnection {
            handle: ConnectionHandle::new(raw),
            events: rx,
        })
    }

    fn close(&self, handle: ConnectionHandle) {
        if let Some(cancel) = self.readers.lock().remove(&handle.raw()) {
            cancel.cancel();
        }
    }
}

impl Drop for EventSourceTransport {
    fn drop(&mut self) {
        for (_, cancel) in self.readers.lock().drain() {
            cancel.cancel();
        }
    }
}
