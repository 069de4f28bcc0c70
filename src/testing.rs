//! Shared fixtures for the unit and end-to-end tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::api::{AppState, router};
use crate::broker::memory::MemoryBroker;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::gateway::QueueGateway;

pub const RETRY_DELAY: Duration = Duration::from_millis(50);
pub const OP_TIMEOUT: Duration = Duration::from_millis(200);

/// A relay wired to an in-memory broker, with its reconnect loop running.
pub struct Harness {
    pub broker: MemoryBroker,
    pub gateway: QueueGateway,
    handle: JoinHandle<()>,
}

impl Harness {
    /// A relay whose first connection attempt has succeeded.
    pub async fn connected() -> Self {
        let harness = Self::idle(MemoryBroker::new());
        harness.wait_connected(1).await;
        harness
    }

    /// A relay that has been started against `broker` but not waited on.
    pub fn idle(broker: MemoryBroker) -> Self {
        let manager = Arc::new(ConnectionManager::with_timing(
            Arc::new(broker.clone()),
            RETRY_DELAY,
            OP_TIMEOUT,
        ));
        let handle = manager.spawn();
        let gateway = QueueGateway::new(manager, OP_TIMEOUT);
        Self {
            broker,
            gateway,
            handle,
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        self.gateway.connections()
    }

    pub fn app(&self) -> axum::Router {
        router(AppState::new(self.gateway.clone()))
    }

    /// Wait until the relay is connected after at least `attempts` tries.
    pub async fn wait_connected(&self, attempts: u64) {
        let mut rx = self.manager().subscribe();
        timeout(
            Duration::from_secs(3),
            rx.wait_for(|s| s.state == ConnectionState::Connected && s.attempts >= attempts),
        )
        .await
        .expect("relay never connected")
        .expect("status channel closed");
    }

    pub async fn stop(self) {
        self.manager().shutdown().await;
        self.handle.await.expect("connection loop panicked");
    }
}
