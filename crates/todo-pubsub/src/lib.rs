// In-process pub/sub fan-out for change events.
// One registry per topic; topics are a closed set, so the table is a fixed
// array and the publish hot path never takes a map lock.
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use slab::Slab;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use todo_core::{ChangeEvent, EventPublisher, Topic};
use tokio::sync::mpsc;

pub type Result<T> = std::result::Result<T, PubSubError>;

#[derive(thiserror::Error, Debug)]
pub enum PubSubError {
    #[error("subscriber queue capacity must be non-zero")]
    CapacityTooSmall,
}

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug)]
struct TopicState {
    // Snapshot used by the publish hot path: lock-free read, no per-publish
    // allocation.
    subscribers_snapshot: ArcSwap<Vec<SubscriberEntry>>,
    // Inner registry mutated only on subscribe/unsubscribe paths.
    subscribers: Mutex<Slab<mpsc::Sender<ChangeEvent>>>,
    // Per-subscriber bounded queue depth.
    queue_capacity: usize,
}

#[derive(Debug, Clone)]
struct SubscriberEntry {
    id: usize,
    sender: mpsc::Sender<ChangeEvent>,
}

impl TopicState {
    fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers_snapshot: ArcSwap::from_pointee(Vec::new()),
            subscribers: Mutex::new(Slab::new()),
            queue_capacity,
        }
    }

    fn register_subscriber(&self) -> (u64, mpsc::Receiver<ChangeEvent>) {
        let mut state = self.subscribers.lock();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = state.insert(tx);
        self.rebuild_subscriber_snapshot(&state);
        (id as u64, rx)
    }

    fn remove_subscriber(&self, id: u64) {
        let mut state = self.subscribers.lock();
        let id = id as usize;
        if state.contains(id) {
            state.remove(id);
            self.rebuild_subscriber_snapshot(&state);
        }
    }

    fn remove_subscribers(&self, subscriber_ids: &[u64]) {
        let mut state = self.subscribers.lock();
        let mut removed = false;
        for subscriber_id in subscriber_ids {
            let id = *subscriber_id as usize;
            if state.contains(id) {
                state.remove(id);
                removed = true;
            }
        }
        if removed {
            self.rebuild_subscriber_snapshot(&state);
        }
    }

    fn rebuild_subscriber_snapshot(&self, state: &Slab<mpsc::Sender<ChangeEvent>>) {
        let mut snapshot = Vec::with_capacity(state.len());
        for (id, sender) in state.iter() {
            snapshot.push(SubscriberEntry {
                id,
                sender: sender.clone(),
            });
        }
        self.subscribers_snapshot.store(Arc::new(snapshot));
    }

    #[inline]
    fn subscriber_snapshot(&self) -> Arc<Vec<SubscriberEntry>> {
        self.subscribers_snapshot.load_full()
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// RAII handle that unregisters a topic subscriber on drop.
#[derive(Debug)]
pub struct SubscriptionGuard {
    topic_state: Weak<TopicState>,
    subscriber_id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(topic_state) = self.topic_state.upgrade() {
            topic_state.remove_subscriber(self.subscriber_id);
        }
    }
}

/// Lazy, per-subscriber sequence of change events for one topic.
///
/// The sequence never completes on its own: it yields each event published
/// after subscribe time and otherwise suspends. Dropping the subscription is
/// the only teardown, via the embedded guard. Implements `Stream` so the
/// GraphQL subscription resolvers can return it directly.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<ChangeEvent>,
    _guard: SubscriptionGuard,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> std::result::Result<ChangeEvent, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

impl futures_core::Stream for Subscription {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// In-process publisher and subscriber registry.
///
/// ```
/// use todo_core::{ChangeEvent, Item, Topic};
/// use todo_pubsub::PubSub;
///
/// let pubsub = PubSub::new();
/// let rt = tokio::runtime::Runtime::new().expect("rt");
/// rt.block_on(async {
///     let mut sub = pubsub.subscribe(Topic::ItemCreated);
///     let item = Item::new("buy milk");
///     pubsub.publish(ChangeEvent::Created(item.clone()));
///     assert_eq!(sub.recv().await.expect("recv"), ChangeEvent::Created(item));
/// });
/// ```
#[derive(Debug)]
pub struct PubSub {
    topics: [Arc<TopicState>; Topic::ALL.len()],
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSub {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY).unwrap_or_else(|_| unreachable!())
    }

    pub fn with_queue_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PubSubError::CapacityTooSmall);
        }
        Ok(Self {
            topics: Topic::ALL.map(|_| Arc::new(TopicState::new(capacity))),
        })
    }

    /// Hand the event to every listener currently registered on its topic.
    ///
    /// Synchronous from the caller's perspective: local dispatch only, no
    /// persistence, no retry. With no listeners the event is silently
    /// dropped; subscriptions reflect only events after subscribe time.
    /// A slow subscriber's full queue drops locally instead of stalling the
    /// publisher. Returns the number of queues the event landed in.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let topic = event.topic();
        let topic_state = &self.topics[topic.index()];
        let senders = topic_state.subscriber_snapshot();

        let mut closed_subscribers = Vec::new();
        let mut sent = 0usize;
        for subscriber in senders.iter() {
            match subscriber.sender.try_reserve() {
                Ok(permit) => {
                    permit.send(event.clone());
                    sent += 1;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    metrics::counter!("todo_pubsub_dropped_total", "topic" => topic.as_str())
                        .increment(1);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed_subscribers.push(subscriber.id as u64);
                }
            }
        }
        if !closed_subscribers.is_empty() {
            topic_state.remove_subscribers(&closed_subscribers);
        }
        metrics::counter!("todo_pubsub_delivered_total", "topic" => topic.as_str())
            .increment(sent as u64);
        tracing::trace!(topic = %topic, fanout = senders.len(), sent, "published change event");
        sent
    }

    /// Register a listener on `topic`. The returned handle unregisters
    /// itself when dropped.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let topic_state = &self.topics[topic.index()];
        let (subscriber_id, receiver) = topic_state.register_subscriber();
        Subscription {
            receiver,
            _guard: SubscriptionGuard {
                topic_state: Arc::downgrade(topic_state),
                subscriber_id,
            },
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics[topic.index()].subscriber_count()
    }
}

#[async_trait::async_trait]
impl EventPublisher for PubSub {
    async fn publish(&self, event: ChangeEvent) {
        // Local dispatch never fails; the delivered count is informational.
        PubSub::publish(self, event);
    }
}
