//! Error types for the session coordination layer.

use std::path::PathBuf;

use crate::context::ContextId;
use crate::tabs::TabId;

/// Tab registry misuse. Reported synchronously, never corrupts registry state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TabError {
    /// No tab with this id is open.
    #[error("Unknown tab: {0}")]
    UnknownTab(TabId),

    /// The requested parent tab is not open.
    #[error("Invalid parent tab: {0}")]
    InvalidParent(TabId),

    /// The registry already holds the configured maximum number of tabs.
    #[error("Tab limit reached ({0})")]
    LimitReached(usize),
}

/// Failures surfaced to the caller of a tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// The executor reported a failure for this invocation.
    #[error("Tool execution failed: {message}")]
    Execution {
        correlation_id: String,
        message: String,
    },

    /// No response arrived before the deadline.
    #[error("Tool call {tool_name} timed out after {timeout_ms}ms")]
    Timeout {
        correlation_id: String,
        tool_name: String,
        timeout_ms: u64,
    },

    /// The request could not be handed to the executor.
    #[error("Tool executor unavailable: {0}")]
    ExecutorUnavailable(String),
}

impl ToolError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Timeout { .. })
    }
}

/// Failures reported by a push-stream transport while opening a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to open stream for {context_id}: {detail}")]
    Open { context_id: ContextId, detail: String },

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}
