//! Message bus port.
//!
//! The configuration context talks to other processes through a
//! [`MessageBus`]: a topic-based publish/subscribe channel carrying
//! [`Message`]s with a JSON payload. Nothing here assumes a transport;
//! [`InMemoryBus`] fans messages out inside one process.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voxconf_runtime::bus::{InMemoryBus, Message, MessageBus};
//!
//! let bus = InMemoryBus::new();
//! let id = bus.on("configuration.updated", Arc::new(|msg: &Message| {
//!     println!("{}", msg.topic);
//! }));
//! bus.emit(Message::new("configuration.updated"));
//! bus.remove(id);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;
use voxconf_core::ConfigMap;

/// A message exchanged over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Topic the message is published under.
    #[serde(rename = "type")]
    pub topic: String,
    /// Payload.
    #[serde(default)]
    pub data: Value,
    /// Routing metadata, such as the sender.
    #[serde(default)]
    pub context: ConfigMap,
}

impl Message {
    /// A message with an empty payload.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            data: Value::Object(ConfigMap::new()),
            context: ConfigMap::new(),
        }
    }

    /// Replaces the payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Adds a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Handle returned by [`MessageBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Callback invoked for every message on a subscribed topic.
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Topic-based publish/subscribe port.
pub trait MessageBus: Send + Sync {
    /// Delivers `message` to every handler subscribed to its topic.
    fn emit(&self, message: Message);

    /// Subscribes `handler` to `topic`.
    fn on(&self, topic: &str, handler: MessageHandler) -> SubscriptionId;

    /// Removes a subscription. Returns `false` if it was already gone.
    fn remove(&self, id: SubscriptionId) -> bool;
}

struct Subscription {
    id: SubscriptionId,
    topic: String,
    handler: MessageHandler,
}

/// Process-local bus.
///
/// Handlers run synchronously on the emitting thread, outside of the
/// subscription lock, so a handler may emit or (un)subscribe itself.
#[derive(Default)]
pub struct InMemoryBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl InMemoryBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers subscribed to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .lock()
            .iter()
            .filter(|sub| sub.topic == topic)
            .count()
    }

    /// Number of live subscriptions across all topics.
    pub fn total_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

impl MessageBus for InMemoryBus {
    fn emit(&self, message: Message) {
        let handlers: Vec<MessageHandler> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|sub| sub.topic == message.topic)
            .map(|sub| Arc::clone(&sub.handler))
            .collect();

        trace!(topic = %message.topic, handlers = handlers.len(), "Emitting message");
        for handler in handlers {
            handler(&message);
        }
    }

    fn on(&self, topic: &str, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().push(Subscription {
            id,
            topic: topic.to_string(),
            handler,
        });
        id
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|sub| sub.id != id);
        subscriptions.len() != before
    }
}

impl fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("subscriptions", &self.total_subscriptions())
            .finish()
    }
}
