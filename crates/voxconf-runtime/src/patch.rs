//! Cross-process propagation of runtime patches.
//!
//! | topic                         | payload                    | effect                          |
//! |-------------------------------|----------------------------|---------------------------------|
//! | `configuration.patch`         | `{config: {key: value}}`   | set keys in the RuntimePatch    |
//! | `configuration.patch.clear`   |                            | empty the RuntimePatch          |
//! | `configuration.updated`       |                            | reload every file-backed layer  |
//! | `configuration.cache.clear`   |                            | same as `configuration.updated` |
//! | paired / connected topics     |                            | reload the Remote layer         |
//!
//! Incoming patches are applied locally and never re-published. Messages
//! carry the sending channel in `context.source`; a channel ignores patches
//! and update notices it sent itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tracing::{debug, error, info, trace};
use voxconf_core::{ConfigMap, LayerStack};

use crate::bus::{Message, MessageBus, MessageHandler, SubscriptionId};
use crate::settings::BusSettings;

pub const PATCH_TOPIC: &str = "configuration.patch";
pub const PATCH_CLEAR_TOPIC: &str = "configuration.patch.clear";
pub const UPDATED_TOPIC: &str = "configuration.updated";
pub const CACHE_CLEAR_TOPIC: &str = "configuration.cache.clear";

const SOURCE_KEY: &str = "source";

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Subscriptions of one configuration context on a bus.
///
/// Dropping the channel without [`detach`](Self::detach) leaves its
/// handlers subscribed.
pub struct PatchChannel {
    bus: Arc<dyn MessageBus>,
    source: String,
    subscriptions: Vec<SubscriptionId>,
}

impl PatchChannel {
    /// Subscribes the patch handlers for `stack` on `bus`.
    pub fn attach(bus: Arc<dyn MessageBus>, stack: Arc<LayerStack>, topics: &BusSettings) -> Self {
        let source = format!(
            "voxconf-{}-{}",
            std::process::id(),
            NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed)
        );

        let own = |f: fn(&LayerStack, &str, &Message)| -> MessageHandler {
            let stack = stack.clone();
            let source = source.clone();
            Arc::new(move |msg: &Message| f(&stack, &source, msg))
        };

        let subscriptions = vec![
            bus.on(PATCH_TOPIC, own(on_patch)),
            bus.on(PATCH_CLEAR_TOPIC, handler(&stack, on_patch_clear)),
            bus.on(UPDATED_TOPIC, own(on_updated)),
            bus.on(CACHE_CLEAR_TOPIC, own(on_updated)),
            bus.on(&topics.paired_topic, handler(&stack, on_remote_update)),
            bus.on(&topics.connected_topic, handler(&stack, on_remote_update)),
        ];

        debug!(source = %source, "Patch channel attached");
        Self {
            bus,
            source,
            subscriptions,
        }
    }

    /// Removes exactly the subscriptions made by [`attach`](Self::attach).
    pub fn detach(&self) {
        for id in &self.subscriptions {
            self.bus.remove(*id);
        }
        debug!(source = %self.source, "Patch channel detached");
    }

    /// Identifier placed in `context.source` of published messages.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Broadcasts a single-key patch.
    pub fn publish(&self, key: &str, value: &Value) {
        let mut config = ConfigMap::new();
        config.insert(key.to_string(), value.clone());
        self.publish_map(&config);
    }

    /// Broadcasts several keys in one patch message.
    pub fn publish_map(&self, config: &ConfigMap) {
        trace!(keys = config.len(), "Publishing configuration patch");
        self.emit(Message::new(PATCH_TOPIC).with_data(json!({ "config": config })));
    }

    /// Broadcasts that configuration files changed.
    pub fn notify_updated(&self) {
        self.emit(Message::new(UPDATED_TOPIC));
    }

    fn emit(&self, message: Message) {
        self.bus
            .emit(message.with_context(SOURCE_KEY, self.source.clone()));
    }
}

impl std::fmt::Debug for PatchChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchChannel")
            .field("source", &self.source)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn handler(stack: &Arc<LayerStack>, f: fn(&LayerStack, &Message)) -> MessageHandler {
    let stack = stack.clone();
    Arc::new(move |msg: &Message| f(&stack, msg))
}

fn sent_by(message: &Message, source: &str) -> bool {
    message.context.get(SOURCE_KEY).and_then(Value::as_str) == Some(source)
}

/// Applies every key of `data.config` to the RuntimePatch layer.
pub fn on_patch(stack: &LayerStack, own_source: &str, message: &Message) {
    if sent_by(message, own_source) {
        return;
    }
    let Some(config) = message.data.get("config").and_then(Value::as_object) else {
        debug!(topic = %message.topic, "Patch message without config mapping");
        return;
    };
    for (key, value) in config {
        if let Err(e) = stack.patch().set_path(key, value.clone()) {
            error!(key = %key, error = %e, "Failed to apply configuration patch");
        }
    }
    debug!(keys = config.len(), "Configuration patch applied");
}

/// Empties the RuntimePatch layer.
pub fn on_patch_clear(stack: &LayerStack, _message: &Message) {
    if let Err(e) = stack.patch().clear() {
        error!(error = %e, "Failed to clear runtime patch");
    }
    debug!("Runtime patch cleared");
}

/// Reloads the Remote layer.
pub fn on_remote_update(stack: &LayerStack, message: &Message) {
    info!(topic = %message.topic, "Reloading remote configuration");
    stack.reload_remote();
}

/// Reloads every file-backed layer.
pub fn on_updated(stack: &LayerStack, own_source: &str, message: &Message) {
    if sent_by(message, own_source) {
        return;
    }
    debug!(topic = %message.topic, "Reloading configuration layers");
    stack.reload_all();
}
