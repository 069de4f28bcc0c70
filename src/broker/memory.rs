//! In-process broker used by the test suite.
//!
//! Behaves like a single RabbitMQ node for the handful of operations the
//! relay uses, and lets tests take it down (`set_reachable(false)`), cut
//! live connections (`sever`), close channels while their connections
//! stay up (`close_channels`), or make it hang (`set_stalled(true)`).
//!
//! Unacked messages belong to the channel that fetched them and go back to
//! the head of their queue when that channel closes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    BrokerChannel, BrokerConnector, BrokerError, BrokerSession, CloseNotifier, CloseSignal,
    Delivery, QueueSpec,
};

#[derive(Debug, Default)]
struct MemoryQueue {
    durable: bool,
    ready: VecDeque<Vec<u8>>,
    /// delivery tag -> (channel id, payload)
    unacked: HashMap<u64, (u64, Vec<u8>)>,
}

impl MemoryQueue {
    fn requeue(&mut self, mut owned_by: impl FnMut(u64) -> bool) {
        let mut tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, (channel, _))| owned_by(*channel))
            .map(|(tag, _)| *tag)
            .collect();
        tags.sort_unstable_by(|a, b| b.cmp(a));
        for tag in tags {
            if let Some((_, data)) = self.unacked.remove(&tag) {
                self.ready.push_front(data);
            }
        }
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, MemoryQueue>,
    next_tag: u64,
    next_channel: u64,
    sessions: Vec<(Arc<MemoryChannel>, CloseNotifier)>,
}

struct Inner {
    state: Mutex<State>,
    reachable: AtomicBool,
    stalled: AtomicBool,
    ack_failing: AtomicBool,
    connects: AtomicUsize,
    declares: AtomicUsize,
    persistent_publishes: AtomicUsize,
}

#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                reachable: AtomicBool::new(true),
                stalled: AtomicBool::new(false),
                ack_failing: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                declares: AtomicUsize::new(0),
                persistent_publishes: AtomicUsize::new(0),
            }),
        }
    }

    /// A broker that refuses connections until `set_reachable(true)`.
    pub fn unreachable() -> Self {
        let broker = Self::new();
        broker.set_reachable(false);
        broker
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// While stalled, every channel operation hangs forever.
    pub fn set_stalled(&self, stalled: bool) {
        self.inner.stalled.store(stalled, Ordering::SeqCst);
    }

    /// While set, every ack is rejected and the delivery stays unacked.
    pub fn set_ack_failing(&self, failing: bool) {
        self.inner.ack_failing.store(failing, Ordering::SeqCst);
    }

    /// Drop every live connection as a network failure would. Unacked
    /// messages go back to the head of their queue.
    pub fn sever(&self, reason: &str) {
        let mut state = self.inner.lock();
        let sessions = std::mem::take(&mut state.sessions);
        for queue in state.queues.values_mut() {
            queue.requeue(|_| true);
        }
        drop(state);

        for (channel, mut notifier) in sessions {
            channel.open.store(false, Ordering::SeqCst);
            notifier.notify(reason);
        }
    }

    /// Close every live channel the way the broker does after a channel
    /// error, leaving the connections open and their close signals silent.
    pub fn close_channels(&self) {
        let mut state = self.inner.lock();
        let ids: Vec<u64> = state
            .sessions
            .iter()
            .map(|(channel, _)| {
                channel.open.store(false, Ordering::SeqCst);
                channel.id
            })
            .collect();
        for queue in state.queues.values_mut() {
            queue.requeue(|channel| ids.contains(&channel));
        }
    }

    pub fn connect_attempts(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn declare_count(&self) -> usize {
        self.inner.declares.load(Ordering::SeqCst)
    }

    pub fn persistent_publishes(&self) -> usize {
        self.inner.persistent_publishes.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    pub fn unacked_len(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .queues
            .get(queue)
            .map(|q| q.unacked.len())
            .unwrap_or(0)
    }

    pub fn is_durable(&self, queue: &str) -> Option<bool> {
        self.inner.lock().queues.get(queue).map(|q| q.durable)
    }

    /// Enqueue raw bytes as if another producer had written them.
    pub fn inject(&self, queue: &str, payload: &[u8]) {
        self.inner
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back(payload.to_vec());
    }

    /// Channels handed out so far that have not been severed.
    pub fn live_channels(&self) -> Vec<Arc<MemoryChannel>> {
        self.inner
            .lock()
            .sessions
            .iter()
            .map(|(channel, _)| channel.clone())
            .collect()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(&self) -> Result<BrokerSession, BrokerError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(BrokerError::Connect("connection refused".to_string()));
        }

        let mut state = self.inner.lock();
        state.next_channel += 1;
        let channel = Arc::new(MemoryChannel {
            id: state.next_channel,
            broker: self.inner.clone(),
            open: AtomicBool::new(true),
            closed_by_client: AtomicBool::new(false),
        });
        let (notifier, closed) = CloseSignal::pair();
        state.sessions.push((channel.clone(), notifier));
        drop(state);

        Ok(BrokerSession { channel, closed })
    }
}

pub struct MemoryChannel {
    id: u64,
    broker: Arc<Inner>,
    open: AtomicBool,
    closed_by_client: AtomicBool,
}

impl MemoryChannel {
    pub fn closed_by_client(&self) -> bool {
        self.closed_by_client.load(Ordering::SeqCst)
    }

    async fn ready(&self) -> Result<(), BrokerError> {
        if self.broker.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.is_open() {
            Ok(())
        } else {
            Err(BrokerError::ChannelClosed)
        }
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn declare_queue(&self, queue: &QueueSpec) -> Result<(), BrokerError> {
        self.ready().await?;
        self.broker.declares.fetch_add(1, Ordering::SeqCst);

        let mut state = self.broker.lock();
        match state.queues.get(&queue.name) {
            Some(existing) if existing.durable != queue.durable => Err(BrokerError::Protocol(
                format!(
                    "PRECONDITION_FAILED - inequivalent arg 'durable' for queue '{}'",
                    queue.name
                ),
            )),
            Some(_) => Ok(()),
            None => {
                state.queues.insert(
                    queue.name.clone(),
                    MemoryQueue {
                        durable: queue.durable,
                        ..MemoryQueue::default()
                    },
                );
                Ok(())
            }
        }
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        persistent: bool,
    ) -> Result<(), BrokerError> {
        self.ready().await?;
        if persistent {
            self.broker
                .persistent_publishes
                .fetch_add(1, Ordering::SeqCst);
        }

        // The default exchange silently drops messages for unknown queues.
        let mut state = self.broker.lock();
        if let Some(q) = state.queues.get_mut(queue) {
            q.ready.push_back(payload.to_vec());
        }
        Ok(())
    }

    async fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        self.ready().await?;

        let mut state = self.broker.lock();
        state.next_tag += 1;
        let tag = state.next_tag;
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::Protocol(format!("NOT_FOUND - no queue '{queue}'")))?;

        Ok(q.ready.pop_front().map(|data| {
            q.unacked.insert(tag, (self.id, data.clone()));
            Delivery {
                delivery_tag: tag,
                data,
            }
        }))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.ready().await?;
        if self.broker.ack_failing.load(Ordering::SeqCst) {
            return Err(BrokerError::Protocol(format!(
                "PRECONDITION_FAILED - unknown delivery tag {delivery_tag}"
            )));
        }

        let mut state = self.broker.lock();
        for q in state.queues.values_mut() {
            if q.unacked.remove(&delivery_tag).is_some() {
                return Ok(());
            }
        }
        Err(BrokerError::Protocol(format!(
            "PRECONDITION_FAILED - unknown delivery tag {delivery_tag}"
        )))
    }

    /// Closes the channel and its connection. Closing a channel the broker
    /// already closed still tears down the connection.
    async fn close(&self) -> Result<(), BrokerError> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.closed_by_client.store(true, Ordering::SeqCst);
        }

        let mut state = self.broker.lock();
        for queue in state.queues.values_mut() {
            queue.requeue(|channel| channel == self.id);
        }
        state.sessions.retain(|(channel, _)| channel.id != self.id);
        Ok(())
    }
}
