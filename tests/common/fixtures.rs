use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use switchboard::stream::mock::MockTransport;
use switchboard::{
    ChannelExecutor, Config, ConnectionState, InMemoryUnreadStore, SessionCoordinator,
    StreamUpdate, SubscriptionHandle, ToolRequest,
};

/// Upper bound for any single wait in integration tests
pub const WAIT: Duration = Duration::from_secs(2);

/// A session backed by a mock transport, an in-memory unread store and a
/// channel executor whose requests the test answers by hand.
pub struct TestSession {
    pub session: Arc<SessionCoordinator>,
    pub transport: Arc<MockTransport>,
    pub store: Arc<InMemoryUnreadStore>,
    pub requests: mpsc::Receiver<ToolRequest>,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_transport(config, MockTransport::new())
    }

    pub fn with_transport(config: Config, transport: MockTransport) -> Self {
        let transport = Arc::new(transport);
        let store = Arc::new(InMemoryUnreadStore::new());
        let (executor, requests) = ChannelExecutor::channel(16);
        let session = Arc::new(SessionCoordinator::new(
            &config,
            transport.clone(),
            Arc::new(executor),
            store.clone(),
        ));
        Self {
            session,
            transport,
            store,
            requests,
        }
    }

    pub async fn next_request(&mut self) -> ToolRequest {
        tokio::time::timeout(WAIT, self.requests.recv())
            .await
            .expect("timed out waiting for tool request")
            .expect("executor channel closed")
    }
}

/// Next update on `handle`, failing the test after [`WAIT`]
pub async fn next_update(handle: &mut SubscriptionHandle) -> Option<StreamUpdate> {
    tokio::time::timeout(WAIT, handle.recv())
        .await
        .expect("timed out waiting for stream update")
}

/// Skip updates until the handle reports `wanted`
pub async fn wait_for_state(handle: &mut SubscriptionHandle, wanted: fn(&ConnectionState) -> bool) {
    loop {
        match next_update(handle).await {
            Some(StreamUpdate::State(state)) if wanted(&state) => return,
            Some(_) => continue,
            None => panic!("subscription ended while waiting for state"),
        }
    }
}

pub async fn wait_open(handle: &mut SubscriptionHandle) {
    wait_for_state(handle, |state| *state == ConnectionState::Open).await;
}
