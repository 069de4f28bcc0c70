//! Connection manager
//!
//! Owns the single broker session of the process and keeps it alive:
//! - connects, declares the relay queue, and publishes the channel
//! - waits for the session's close signal and reconnects after a fixed delay
//! - treats a channel closed while its connection stays up the same way
//! - retries failed attempts after the same delay, forever
//! - on shutdown, withdraws and closes the channel and stops reconnecting
//!
//! Concurrency notes:
//! - The channel slot is the only state shared with request handlers. It
//!   sits behind an `RwLock` that is never held across an `.await`; readers
//!   clone the `Arc` and release the lock immediately.
//! - `install` checks the shutdown flag under the write lock, so a connect
//!   racing `shutdown` can never leave a channel behind.
//! - A channel can die without its connection (channel-level broker errors).
//!   The run loop re-checks the channel every `retry_delay`, and sooner
//!   when `current_channel` finds it dead or `invalidate` withdraws it.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerChannel, BrokerConnector, BrokerError, CloseSignal, QueueSpec};
use crate::config::BrokerSettings;

use super::state::{ConnectionEvent, ConnectionState, ConnectionStatus};

type SharedChannel = Arc<dyn BrokerChannel>;

pub struct ConnectionManager {
    connector: Arc<dyn BrokerConnector>,
    queue: QueueSpec,
    retry_delay: Duration,
    connect_timeout: Duration,
    channel: RwLock<Option<SharedChannel>>,
    status: watch::Sender<ConnectionStatus>,
    shutdown: watch::Sender<bool>,
    lost: Notify,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn BrokerConnector>, settings: &BrokerSettings) -> Self {
        Self::with_timing(
            connector,
            settings.retry_delay(),
            settings.connect_timeout(),
        )
    }

    pub fn with_timing(
        connector: Arc<dyn BrokerConnector>,
        retry_delay: Duration,
        connect_timeout: Duration,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (shutdown, _) = watch::channel(false);

        Self {
            connector,
            queue: QueueSpec::relay(),
            retry_delay,
            connect_timeout,
            channel: RwLock::new(None),
            status,
            shutdown,
            lost: Notify::new(),
        }
    }

    pub fn queue(&self) -> &QueueSpec {
        &self.queue
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// The live channel, if any.
    ///
    /// The returned handle is only good for the operation at hand; it may be
    /// invalidated by a close event at any time.
    pub fn current_channel(&self) -> Option<SharedChannel> {
        let slot = self.channel.read().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(channel) if channel.is_open() => Some(channel.clone()),
            Some(_) => {
                self.lost.notify_one();
                None
            }
            None => None,
        }
    }

    /// Withdraw `channel` so the run loop closes it and reconnects.
    ///
    /// Closing the session hands its unacked deliveries back to the queue.
    /// Does nothing if `channel` has already been replaced.
    pub fn invalidate(&self, channel: &SharedChannel, reason: &str) {
        let mut slot = self.channel.write().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, channel)) {
            *slot = None;
            drop(slot);
            warn!(%reason, "Broker channel withdrawn");
            self.lost.notify_one();
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Observe every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Start the reconnect loop on the current tokio runtime.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run())
    }

    /// Connect, wait for the connection to drop, wait `retry_delay`, repeat.
    /// Returns once shutdown has been requested.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let attempt = tokio::select! {
                result = self.connect() => result,
                _ = stopped(&mut shutdown) => break,
            };

            match attempt {
                Ok((channel, closed)) => {
                    tokio::select! {
                        biased;
                        _ = stopped(&mut shutdown) => break,
                        reason = closed.wait() => {
                            self.clear_channel();
                            warn!(
                                %reason,
                                retry_in_ms = self.retry_delay.as_millis() as u64,
                                "Broker connection closed, trying to reconnect"
                            );
                            self.apply(ConnectionEvent::ConnectionClosed(reason));
                        }
                        _ = self.channel_lost(&channel) => {
                            self.clear_channel();
                            warn!(
                                retry_in_ms = self.retry_delay.as_millis() as u64,
                                "Broker channel closed, trying to reconnect"
                            );
                            self.apply(ConnectionEvent::ConnectionClosed(
                                "channel closed".to_string(),
                            ));
                            self.discard(&channel).await;
                        }
                    }
                }
                Err(e) => {
                    error!(
                        error = %e,
                        retry_in_ms = self.retry_delay.as_millis() as u64,
                        "Error connecting to broker"
                    );
                    self.apply(ConnectionEvent::ConnectFailed(e.to_string()));
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = stopped(&mut shutdown) => break,
            }
        }

        debug!("Connection manager loop stopped");
    }

    /// Withdraw and close the current channel and stop reconnecting.
    ///
    /// Idempotent; closing errors are logged, never returned.
    pub async fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        self.apply(ConnectionEvent::ShutdownRequested);

        if let Some(channel) = self.take_channel() {
            match timeout(self.connect_timeout, channel.close()).await {
                Ok(Ok(())) => info!("Broker channel closed"),
                Ok(Err(e)) => warn!(error = %e, "Broker channel did not close cleanly"),
                Err(_) => warn!("Timed out closing broker channel"),
            }
        }

        self.apply(ConnectionEvent::ShutdownComplete);
    }

    /// One connection attempt: open a session, declare the queue, publish
    /// the channel. Yields the channel and the session's close signal.
    async fn connect(&self) -> Result<(SharedChannel, CloseSignal), BrokerError> {
        self.apply(ConnectionEvent::ConnectAttempt);
        debug!(attempt = self.status.borrow().attempts, "Connecting to broker");

        let session = timeout(self.connect_timeout, self.connector.connect())
            .await
            .map_err(|_| BrokerError::Timeout)??;

        let declared = timeout(
            self.connect_timeout,
            session.channel.declare_queue(&self.queue),
        )
        .await
        .map_err(|_| BrokerError::Timeout)
        .and_then(|result| result);

        if let Err(e) = declared {
            self.discard(&session.channel).await;
            return Err(e);
        }

        if !self.install(session.channel.clone()) {
            self.discard(&session.channel).await;
            return Err(BrokerError::ChannelClosed);
        }

        self.apply(ConnectionEvent::ConnectSucceeded);
        info!(queue = %self.queue.name, durable = self.queue.durable, "Connected to broker");

        Ok((session.channel, session.closed))
    }

    /// Resolves once `channel` is closed or no longer the published one.
    async fn channel_lost(&self, channel: &SharedChannel) {
        loop {
            if !channel.is_open() || !self.holds(channel) {
                return;
            }
            tokio::select! {
                _ = self.lost.notified() => {}
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }

    /// Close a session that will not be used again.
    async fn discard(&self, channel: &SharedChannel) {
        match timeout(self.connect_timeout, channel.close()).await {
            Ok(Ok(())) => debug!("Discarded broker session closed"),
            Ok(Err(e)) => debug!(error = %e, "Discarded broker session did not close cleanly"),
            Err(_) => debug!("Timed out closing discarded broker session"),
        }
    }

    fn holds(&self, channel: &SharedChannel) -> bool {
        self.channel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, channel))
    }

    fn install(&self, channel: SharedChannel) -> bool {
        let mut slot = self.channel.write().unwrap_or_else(PoisonError::into_inner);
        if *self.shutdown.borrow() {
            return false;
        }
        *slot = Some(channel);
        true
    }

    fn take_channel(&self) -> Option<SharedChannel> {
        self.channel
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn clear_channel(&self) {
        self.take_channel();
    }

    fn apply(&self, event: ConnectionEvent) {
        self.status.send_if_modified(|status| {
            let Some(next) = status.state.on(&event) else {
                debug!(state = %status.state, ?event, "Ignoring connection event");
                return false;
            };

            debug!(from = %status.state, to = %next, "Connection state changed");
            status.state = next;
            match event {
                ConnectionEvent::ConnectAttempt => status.attempts += 1,
                ConnectionEvent::ConnectFailed(reason)
                | ConnectionEvent::ConnectionClosed(reason) => status.last_error = Some(reason),
                _ => {}
            }
            true
        });
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("queue", &self.queue)
            .field("retry_delay", &self.retry_delay)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
