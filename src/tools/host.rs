//! Loopback tool host used by the console and tests.
//!
//! Answers each request with `{"server", "tool", "args"}`. A string `error`
//! argument produces a failure response and a numeric `delay_ms` argument
//! delays the reply.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::tools::{ToolRequest, ToolResponse};

fn respond(request: &ToolRequest) -> ToolResponse {
    match request.args.get("error").and_then(Value::as_str) {
        Some(message) => ToolResponse::failure(&request.correlation_id, message),
        None => ToolResponse::success(
            &request.correlation_id,
            json!({
                "server": request.server_key,
                "tool": request.tool_name,
                "args": request.args,
            }),
        ),
    }
}

pub fn spawn_echo_host(
    mut requests: mpsc::Receiver<ToolRequest>,
    responses: mpsc::Sender<ToolResponse>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let delay = request.args.get("delay_ms").and_then(Value::as_u64);
            let response = respond(&request);
            let responses = responses.clone();

            tokio::spawn(async move {
                if let Some(ms) = delay {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                if responses.send(response).await.is_err() {
                    tracing::debug!("Echo host response channel closed");
                }
            });
        }
        tracing::debug!("Echo host request channel closed");
    })
}
