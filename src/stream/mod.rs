pub mod eventsource;
pub mod manager;
pub mod mock;
pub mod transport;

pub use eventsource::EventSourceTransport;
pub use manager::{StreamManager, SubscriptionHandle};
pub use transport::{
    ConnectionHandle, StreamTransport, TransportConnection, TransportEvent, TransportMessage,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a context's push connection. Absence is modelled by the
/// manager holding no entry for the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed { detail: Option<String> },
    Errored { detail: String },
}

impl ConnectionState {
    /// Closed or errored: the connection will not deliver more events until
    /// it is reopened.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Closed { .. } | ConnectionState::Errored { .. }
        )
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed { .. } => "closed",
            ConnectionState::Errored { .. } => "errored",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Closed {
                detail: Some(detail),
            }
            | ConnectionState::Errored { detail } => write!(f, "{} ({})", self.as_str(), detail),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// What a subscriber receives for its context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamUpdate {
    /// Connection state changed
    State(ConnectionState),
    /// Server-pushed payload
    Event { payload: Value },
}

impl StreamUpdate {
    pub fn state(&self) -> Option<&ConnectionState> {
        match self {
            StreamUpdate::State(state) => Some(state),
            StreamUpdate::Event { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            StreamUpdate::Event { payload } => Some(payload),
            StreamUpdate::State(_) => None,
        }
    }
}
