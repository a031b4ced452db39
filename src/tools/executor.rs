use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ToolError;
use crate::tools::ToolRequest;

/// External party that performs tool work.
///
/// `send` only hands the request over. Results come back later through
/// [`ToolBridge::deliver`](crate::tools::ToolBridge::deliver).
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn send(&self, request: ToolRequest) -> Result<(), ToolError>;
}

/// Executor backed by an mpsc channel. The receiving half belongs to
/// whatever hosts the tools.
#[derive(Clone)]
pub struct ChannelExecutor {
    tx: mpsc::Sender<ToolRequest>,
}

impl ChannelExecutor {
    pub fn new(tx: mpsc::Sender<ToolRequest>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ToolRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl ToolExecutor for ChannelExecutor {
    async fn send(&self, request: ToolRequest) -> Result<(), ToolError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| ToolError::ExecutorUnavailable("executor channel closed".to_string()))
    }
}
