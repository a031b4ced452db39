//! Correlation-id based tool invocation.
//!
//! Each invocation gets a fresh correlation id and a oneshot reply slot in
//! the pending map. Responses are matched by id only, so they may arrive in
//! any order. A response for an id that already timed out is discarded.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::ToolError;
use crate::tools::{InvocationState, ToolExecutor, ToolInvocation, ToolRequest, ToolResponse};

/// How many expired correlation ids are remembered for late-response logging
const EXPIRED_MEMORY: usize = 256;

struct PendingInvocation {
    invocation: ToolInvocation,
    reply: oneshot::Sender<Result<Value, ToolError>>,
}

#[derive(Default)]
struct ExpiredIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl ExpiredIds {
    fn remember(&mut self, correlation_id: String) {
        if !self.ids.insert(correlation_id.clone()) {
            return;
        }
        self.order.push_back(correlation_id);
        while self.order.len() > EXPIRED_MEMORY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, correlation_id: &str) -> bool {
        self.ids.contains(correlation_id)
    }
}

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<String, PendingInvocation>>,
    expired: Mutex<ExpiredIds>,
}

impl Shared {
    /// Remove a still-pending invocation and remember its id as expired
    fn expire(&self, correlation_id: &str, state: InvocationState) -> Option<ToolInvocation> {
        let entry = self.pending.lock().remove(correlation_id)?;
        self.expired.lock().remember(correlation_id.to_string());

        let mut invocation = entry.invocation;
        invocation.state = state;
        Some(invocation)
    }
}

/// Instant `timeout` from now, clamped for durations tokio cannot represent
fn expiry(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}

/// Removes the pending entry if the invoking future is dropped early
struct PendingGuard {
    shared: Arc<Shared>,
    correlation_id: String,
    armed: bool,
}

impl PendingGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(invocation) = self
            .shared
            .expire(&self.correlation_id, InvocationState::Pending)
        {
            tracing::debug!(
                correlation_id = %invocation.correlation_id,
                server = %invocation.server_key,
                tool = %invocation.tool_name,
                "Tool invocation abandoned by caller"
            );
        }
    }
}

/// Issues tool requests to an executor and resolves callers when matching
/// responses arrive.
#[derive(Clone)]
pub struct ToolBridge {
    executor: Arc<dyn ToolExecutor>,
    shared: Arc<Shared>,
    default_timeout: Duration,
}

impl ToolBridge {
    pub fn new(executor: Arc<dyn ToolExecutor>, default_timeout: Duration) -> Self {
        Self {
            executor,
            shared: Arc::new(Shared::default()),
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Invoke a tool and wait for its result or the timeout.
    ///
    /// Dropping the returned future abandons the invocation locally. The
    /// executor is not told; its eventual response is discarded.
    pub async fn invoke(
        &self,
        server_key: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
        timeout: Duration,
    ) -> Result<Value, ToolError> {
        let correlation_id = Uuid::new_v4().to_string();
        let server_key = server_key.into();
        let tool_name = tool_name.into();
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

        let issued_at = Utc::now();
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|delta| issued_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let request = ToolRequest {
            correlation_id: correlation_id.clone(),
            server_key: server_key.clone(),
            tool_name: tool_name.clone(),
            args: args.clone(),
        };

        let (reply_tx, mut reply_rx) = oneshot::channel();
        self.shared.pending.lock().insert(
            correlation_id.clone(),
            PendingInvocation {
                invocation: ToolInvocation {
                    correlation_id: correlation_id.clone(),
                    server_key: server_key.clone(),
                    tool_name: tool_name.clone(),
                    args,
                    state: InvocationState::Pending,
                    issued_at,
                    deadline,
                },
                reply: reply_tx,
            },
        );
        let mut guard = PendingGuard {
            shared: self.shared.clone(),
            correlation_id: correlation_id.clone(),
            armed: true,
        };

        tracing::debug!(
            correlation_id = %correlation_id,
            server = %server_key,
            tool = %tool_name,
            timeout_ms,
            "Issuing tool invocation"
        );

        // One deadline covers both the hand-off and the reply
        let expires_at = expiry(timeout);

        match tokio::time::timeout_at(expires_at, self.executor.send(request)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                guard.disarm();
                self.shared.pending.lock().remove(&correlation_id);
                tracing::warn!(
                    correlation_id = %correlation_id,
                    tool = %tool_name,
                    error = %err,
                    "Failed to hand tool request to executor"
                );
                return Err(err);
            }
            Err(_) => {
                guard.disarm();
                self.shared.expire(&correlation_id, InvocationState::TimedOut);
                tracing::warn!(
                    correlation_id = %correlation_id,
                    server = %server_key,
                    tool = %tool_name,
                    timeout_ms,
                    "Tool executor did not accept request before the deadline"
                );
                return Err(ToolError::Timeout {
                    correlation_id,
                    tool_name,
                    timeout_ms,
                });
            }
        }

        match tokio::time::timeout_at(expires_at, &mut reply_rx).await {
            Ok(Ok(outcome)) => {
                guard.disarm();
                outcome
            }
            Ok(Err(_)) => {
                guard.disarm();
                Err(ToolError::ExecutorUnavailable(
                    "invocation dropped before completion".to_string(),
                ))
            }
            Err(_) => {
                guard.disarm();
                if self
                    .shared
                    .expire(&correlation_id, InvocationState::TimedOut)
                    .is_none()
                {
                    // Already claimed by deliver, whose send is imminent
                    return match reply_rx.await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ToolError::ExecutorUnavailable(
                            "invocation dropped before completion".to_string(),
                        )),
                    };
                }
                tracing::warn!(
                    correlation_id = %correlation_id,
                    server = %server_key,
                    tool = %tool_name,
                    timeout_ms,
                    "Tool invocation timed out"
                );
                Err(ToolError::Timeout {
                    correlation_id,
                    tool_name,
                    timeout_ms,
                })
            }
        }
    }

    /// Invoke with the configured default timeout
    pub async fn invoke_default(
        &self,
        server_key: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Result<Value, ToolError> {
        self.invoke(server_key, tool_name, args, self.default_timeout)
            .await
    }

    /// Route an executor response to its waiting caller.
    ///
    /// Returns false when no invocation was pending under that id.
    pub fn deliver(&self, response: ToolResponse) -> bool {
        let correlation_id = response.correlation_id().to_string();
        let Some(entry) = self.shared.pending.lock().remove(&correlation_id) else {
            if self.shared.expired.lock().contains(&correlation_id) {
                tracing::debug!(
                    correlation_id = %correlation_id,
                    "Discarding late response for expired tool invocation"
                );
            } else {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    "Discarding tool response with unknown correlation id"
                );
            }
            return false;
        };

        let (state, outcome) = match response {
            ToolResponse::Success { result, .. } => (InvocationState::Resolved, Ok(result)),
            ToolResponse::Failure { error, .. } => (
                InvocationState::Rejected,
                Err(ToolError::Execution {
                    correlation_id: correlation_id.clone(),
                    message: error,
                }),
            ),
        };

        tracing::debug!(
            correlation_id = %correlation_id,
            server = %entry.invocation.server_key,
            tool = %entry.invocation.tool_name,
            state = %state,
            "Tool invocation settled"
        );

        if entry.reply.send(outcome).is_err() {
            tracing::debug!(correlation_id = %correlation_id, "Tool caller went away before result");
        }
        true
    }

    /// Feed every response from `responses` into [`deliver`](Self::deliver)
    pub fn spawn_response_pump(&self, mut responses: mpsc::Receiver<ToolResponse>) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            while let Some(response) = responses.recv().await {
                bridge.deliver(response);
            }
            tracing::debug!("Tool response channel closed");
        })
    }

    /// Reject every pending invocation. Returns how many were rejected.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = self.shared.pending.lock().drain().collect();
        let count = drained.len();
        let mut expired = self.shared.expired.lock();
        for (correlation_id, entry) in drained {
            expired.remember(correlation_id);
            let _ = entry
                .reply
                .send(Err(ToolError::ExecutorUnavailable(reason.to_string())));
        }
        if count > 0 {
            tracing::info!(count, reason, "Cancelled pending tool invocations");
        }
        count
    }

    /// Snapshot of in-flight invocations, oldest first
    pub fn pending(&self) -> Vec<ToolInvocation> {
        let mut invocations: Vec<_> = self
            .shared
            .pending
            .lock()
            .values()
            .map(|entry| entry.invocation.clone())
            .collect();
        invocations.sort_by_key(|invocation| invocation.issued_at);
        invocations
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }
}
