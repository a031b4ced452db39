pub mod bridge;
pub mod executor;
pub mod host;

pub use bridge::ToolBridge;
pub use executor::{ChannelExecutor, ToolExecutor};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request handed to the external executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub correlation_id: String,
    pub server_key: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
}

/// Response emitted by the executor for one correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResponse {
    Failure {
        #[serde(rename = "correlationId")]
        correlation_id: String,
        error: String,
    },
    Success {
        #[serde(rename = "correlationId")]
        correlation_id: String,
        result: Value,
    },
}

impl ToolResponse {
    pub fn success(correlation_id: impl Into<String>, result: Value) -> Self {
        ToolResponse::Success {
            correlation_id: correlation_id.into(),
            result,
        }
    }

    pub fn failure(correlation_id: impl Into<String>, error: impl Into<String>) -> Self {
        ToolResponse::Failure {
            correlation_id: correlation_id.into(),
            error: error.into(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            ToolResponse::Success { correlation_id, .. }
            | ToolResponse::Failure { correlation_id, .. } => correlation_id,
        }
    }
}

/// Lifecycle of a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Pending,
    Resolved,
    Rejected,
    TimedOut,
}

impl InvocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationState::Pending => "pending",
            InvocationState::Resolved => "resolved",
            InvocationState::Rejected => "rejected",
            InvocationState::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for InvocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping for an issued invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub correlation_id: String,
    pub server_key: String,
    pub tool_name: String,
    pub args: Value,
    pub state: InvocationState,
    pub issued_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}
