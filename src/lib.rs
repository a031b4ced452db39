pub mod config;
pub mod context;
pub mod error;
pub mod notifications;
pub mod session;
pub mod stream;
pub mod tabs;
pub mod tools;
pub mod util;

pub use config::Config;
pub use context::{Context, ContextId, ContextKind};
pub use error::{ConfigError, TabError, ToolError, TransportError};
pub use notifications::{
    InMemoryUnreadStore, NotificationCoordinator, NotificationState, UnreadStore,
};
pub use session::SessionCoordinator;
pub use stream::{
    ConnectionState, EventSourceTransport, StreamManager, StreamTransport, StreamUpdate,
    SubscriptionHandle,
};
pub use tabs::{ActivationChange, Tab, TabId, TabRegistry};
pub use tools::{
    ChannelExecutor, InvocationState, ToolBridge, ToolExecutor, ToolInvocation, ToolRequest,
    ToolResponse,
};
