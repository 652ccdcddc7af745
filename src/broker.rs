//! Topic based publish/subscribe channel
//!
//! The broker owns the topic → subscriber mapping. Every subscription has its
//! own bounded queue:
//!
//! ```text
//!                 publish(topic, event)
//!                          │  snapshot of the subscriber list
//!            ┌─────────────┼─────────────┐
//!            ▼             ▼             ▼
//!      [queue: sub-1] [queue: sub-2] [queue: sub-3]   (try_send, full → drop + count)
//!            │             │             │
//!          recv()        recv()        recv()          (pull, ends with BrokerError::Closed)
//! ```
//!
//! Publishing never waits. Mutations of a topic's subscriber list happen under
//! a write lock, publishers clone the list under a read lock and fan out
//! without holding it, so a concurrent unsubscribe cannot break an in-flight
//! publish.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

use crate::actors::messages::Event;
use crate::error::BrokerError;

/// Default capacity of a subscriber queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Identifier of a single subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Slot {
    id: SubscriptionId,
    sender: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
    active: AtomicBool,
}

struct Topic {
    name: String,
    subscribers: RwLock<Vec<Arc<Slot>>>,
}

impl Topic {
    fn remove(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(position) = subscribers.iter().position(|slot| slot.id == id) else {
            return false;
        };
        let slot = subscribers.remove(position);
        slot.active.store(false, Ordering::SeqCst);
        true
    }
}

/// Handle to a named topic
#[derive(Clone)]
pub struct TopicHandle {
    topic: Arc<Topic>,
}

impl TopicHandle {
    pub fn name(&self) -> &str {
        &self.topic.name
    }

    /// Number of currently registered subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.topic.subscribers.read().len()
    }
}

impl std::fmt::Debug for TopicHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicHandle")
            .field("name", &self.topic.name)
            .finish()
    }
}

struct BrokerInner {
    topics: RwLock<HashMap<String, TopicHandle>>,
    closed: AtomicBool,
    next_id: AtomicU64,
    queue_capacity: usize,
}

/// Publish/subscribe broker
///
/// Cheap to clone, all clones share the same topics.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    /// Create a broker whose subscriber queues hold `queue_capacity` events
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                topics: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                queue_capacity: queue_capacity.max(1),
            }),
        }
    }

    /// Get or create the topic with the given name
    pub fn create_topic(&self, name: &str) -> TopicHandle {
        if let Some(handle) = self.inner.topics.read().get(name) {
            return handle.clone();
        }

        let mut topics = self.inner.topics.write();
        topics
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("creating topic {name}");
                TopicHandle {
                    topic: Arc::new(Topic {
                        name: name.to_string(),
                        subscribers: RwLock::new(vec![]),
                    }),
                }
            })
            .clone()
    }

    /// Publish an event to every current subscriber of `topic`
    ///
    /// Returns the number of queues the event was placed in. Subscribers with a
    /// full queue miss this event and get their drop counter incremented.
    /// Publishing on a closed broker is a no-op.
    pub fn publish(&self, topic: &TopicHandle, event: Event) -> usize {
        if self.is_closed() {
            trace!("broker closed, discarding event for {}", topic.name());
            return 0;
        }

        let subscribers = topic.topic.subscribers.read().clone();
        let mut delivered = 0;

        for slot in subscribers {
            if !slot.active.load(Ordering::SeqCst) {
                continue;
            }

            match slot.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    let dropped = slot.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        "{} queue full on {}, dropped event ({dropped} total)",
                        slot.id,
                        topic.name()
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    trace!("{} already gone, skipping", slot.id);
                }
            }
        }

        trace!("published to {delivered} subscribers of {}", topic.name());
        delivered
    }

    /// Subscribe to a topic
    ///
    /// Only events published after this call are delivered. On a closed broker
    /// the returned subscription is already terminated.
    pub fn subscribe(&self, topic: &TopicHandle) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.inner.queue_capacity);
        let dropped = Arc::new(AtomicU64::new(0));

        let slot = Arc::new(Slot {
            id,
            sender,
            dropped: dropped.clone(),
            active: AtomicBool::new(true),
        });

        {
            let mut subscribers = topic.topic.subscribers.write();
            // checked under the lock so a concurrent shutdown cannot miss this slot
            if !self.is_closed() {
                subscribers.push(slot);
            }
        }

        debug!("{id} subscribed to {}", topic.name());

        Subscription {
            id,
            topic: topic.clone(),
            receiver,
            dropped,
        }
    }

    /// Remove a subscription, returns `false` if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let topics: Vec<TopicHandle> = self.inner.topics.read().values().cloned().collect();
        let removed = topics.iter().any(|topic| topic.topic.remove(id));
        if removed {
            debug!("{id} unsubscribed");
        }
        removed
    }

    /// Close every topic
    ///
    /// All pending and future `recv` calls on existing subscriptions resolve to
    /// [`BrokerError::Closed`] once their queues are drained.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let topics: Vec<TopicHandle> = self.inner.topics.read().values().cloned().collect();
        for topic in topics {
            let mut subscribers = topic.topic.subscribers.write();
            for slot in subscribers.iter() {
                slot.active.store(false, Ordering::SeqCst);
            }
            subscribers.clear();
        }

        debug!("broker closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Pull side of a subscription
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: SubscriptionId,
    topic: TopicHandle,
    receiver: mpsc::Receiver<Event>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        self.topic.name()
    }

    /// Next event in publish order
    pub async fn recv(&mut self) -> Result<Event, BrokerError> {
        self.receiver.recv().await.ok_or(BrokerError::Closed)
    }

    /// Next already queued event, `None` if the queue is currently empty
    pub fn try_recv(&mut self) -> Option<Result<Event, BrokerError>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(Err(BrokerError::Closed)),
        }
    }

    /// Number of events dropped because this queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Consume the subscription as a stream that ends when the broker closes
    pub fn into_stream(self) -> impl Stream<Item = Event> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .ok()
                .map(|event| (event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.topic.topic.remove(self.id) {
            trace!("{} released on drop", self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic.name())
            .field("dropped", &self.dropped())
            .finish()
    }
}
