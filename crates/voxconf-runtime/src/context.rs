//! The merged configuration as seen by the rest of the application.
//!
//! A [`ConfigurationContext`] is built once at startup and shared by
//! cloning. Every read recomputes the merge from the current layer contents;
//! there is no cache to invalidate. Every write lands in the RuntimePatch
//! layer and, when a bus is attached, is broadcast to the other contexts.
//!
//! ```rust,ignore
//! use voxconf_runtime::{ConfigurationContext, settings::SettingsLoader};
//! use voxconf_runtime::watcher::NotifyWatchPort;
//!
//! let settings = SettingsLoader::new().load()?;
//! let config = ConfigurationContext::from_settings(&settings)?;
//! config.start_watcher(Box::new(NotifyWatchPort::new()))?;
//!
//! config.set("tts.module", "ovos-tts-plugin-piper".into())?;
//! assert_eq!(config.get_path("tts.module").unwrap(), "ovos-tts-plugin-piper");
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};
use voxconf_core::value::{self, ConfigMap};
use voxconf_core::{ConfigError, Constraints, LayerKind, LayerStack, LayeredSource};

use crate::bus::MessageBus;
use crate::error::{RuntimeError, RuntimeResult};
use crate::locations;
use crate::patch::PatchChannel;
use crate::settings::{BusSettings, ResolverSettings, validate_settings};
use crate::watcher::{
    CallbackRegistry, ChangeCallback, ChangeHook, ChangeWatcher, FileWatchPort, NotifyWatchPort,
};

/// Builder for [`ConfigurationContext`].
pub struct ContextBuilder {
    stack: LayerStack,
    debounce: Duration,
    topics: BusSettings,
}

impl ContextBuilder {
    /// Sets the watcher debounce window.
    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    /// Sets the topics that refresh the Remote layer.
    pub fn topics(mut self, topics: BusSettings) -> Self {
        self.topics = topics;
        self
    }

    pub fn build(self) -> ConfigurationContext {
        ConfigurationContext {
            inner: Arc::new(Inner {
                stack: Arc::new(self.stack),
                channel: Arc::new(Mutex::new(None)),
                watcher: Mutex::new(None),
                callbacks: CallbackRegistry::new(),
                debounce: self.debounce,
                topics: self.topics,
            }),
        }
    }
}

struct Inner {
    stack: Arc<LayerStack>,
    channel: Arc<Mutex<Option<Arc<PatchChannel>>>>,
    watcher: Mutex<Option<ChangeWatcher>>,
    callbacks: CallbackRegistry,
    debounce: Duration,
    topics: BusSettings,
}

/// Shared handle to the merged configuration of a process.
#[derive(Clone)]
pub struct ConfigurationContext {
    inner: Arc<Inner>,
}

impl ConfigurationContext {
    /// Resolves the layer locations from `settings` and loads every layer.
    pub fn from_settings(settings: &ResolverSettings) -> RuntimeResult<Self> {
        validate_settings(settings)?;
        let paths = locations::layer_paths(settings)?;
        let stack = LayerStack::from_paths(&paths);
        Ok(Self::builder(stack)
            .debounce(settings.watch.debounce())
            .topics(settings.bus.clone())
            .build())
    }

    /// Like [`from_settings`](Self::from_settings), then starts a
    /// [`NotifyWatchPort`] watcher when `watch.enabled` is set. Must be
    /// called within a tokio runtime in that case.
    pub fn open(settings: &ResolverSettings) -> RuntimeResult<Self> {
        let context = Self::from_settings(settings)?;
        if settings.watch.enabled {
            context.start_watcher(Box::new(NotifyWatchPort::new()))?;
        } else {
            debug!("Configuration watcher disabled");
        }
        Ok(context)
    }

    /// A context over an already loaded stack, with default options.
    pub fn new(stack: LayerStack) -> Self {
        Self::builder(stack).build()
    }

    pub fn builder(stack: LayerStack) -> ContextBuilder {
        ContextBuilder {
            stack,
            debounce: Duration::from_secs(1),
            topics: BusSettings::default(),
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Recomputes and returns the whole merged mapping.
    pub fn snapshot(&self) -> ConfigMap {
        self.inner.stack.merged()
    }

    /// Recomputes the merge and returns a top-level value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.snapshot().get(key).cloned()
    }

    /// Recomputes the merge and returns the value at a key path.
    ///
    /// An explicit `null` is returned as `Some(Value::Null)`.
    pub fn get_path(&self, key: &str) -> Option<Value> {
        value::get_path(&self.snapshot(), key).cloned()
    }

    /// Like [`get_path`](Self::get_path), with absence as an error.
    pub fn lookup(&self, key: &str) -> Result<Value, ConfigError> {
        self.get_path(key).ok_or_else(|| ConfigError::not_found(key))
    }

    /// Recomputes the merge and tests for a key path.
    pub fn contains_key(&self, key: &str) -> bool {
        value::get_path(&self.snapshot(), key).is_some()
    }

    /// Recomputes the merge and lists the top-level keys.
    pub fn keys(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    /// Recomputes the merge and lists the top-level entries.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.snapshot().into_iter().collect()
    }

    /// The merged mapping as pretty JSON with sorted keys.
    pub fn to_json_string(&self) -> RuntimeResult<String> {
        let sorted = sort_keys(Value::Object(self.snapshot()));
        serde_json::to_string_pretty(&sorted).map_err(|e| {
            RuntimeError::Config(ConfigError::Serialize {
                reason: e.to_string(),
            })
        })
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Sets a key path in the RuntimePatch layer and broadcasts it.
    pub fn set(&self, key: &str, value: Value) -> RuntimeResult<()> {
        self.inner.stack.patch().set_path(key, value.clone())?;
        if let Some(channel) = self.channel() {
            channel.publish(key, &value);
        }
        Ok(())
    }

    /// Sets several key paths and broadcasts them in one message.
    pub fn update(&self, values: &ConfigMap) -> RuntimeResult<()> {
        for (key, value) in values {
            self.inner.stack.patch().set_path(key, value.clone())?;
        }
        if let Some(channel) = self.channel() {
            channel.publish_map(values);
        }
        Ok(())
    }

    /// Shadows a key with `null` and returns its previous merged value.
    ///
    /// Lower layers are never modified, so the key cannot be removed from
    /// the merged view; it reads as explicit `null` afterwards.
    pub fn pop(&self, key: &str) -> RuntimeResult<Option<Value>> {
        let previous = self.get_path(key);
        if previous.is_some() {
            self.set(key, Value::Null)?;
        }
        Ok(previous)
    }

    /// Clears the RuntimePatch layer and reloads every file-backed layer.
    /// Patches held by other contexts on the bus are left alone.
    pub fn reset(&self) -> RuntimeResult<()> {
        self.inner.stack.patch().clear()?;
        self.inner.stack.reload_all();
        info!("Configuration reset");
        Ok(())
    }

    /// Reloads every file-backed layer whose file changed.
    pub fn reload(&self) {
        self.inner.stack.reload_all();
    }

    /// Merges `mapping` into an on-disk layer and stores it.
    ///
    /// Without a target the most specific user layer is used. A target that
    /// is not a live layer is written through a one-off layer. The mapping
    /// is broadcast as a patch when a bus is attached.
    pub fn persist(&self, mapping: &ConfigMap, target: Option<&Path>) -> RuntimeResult<()> {
        let stack = &self.inner.stack;
        match target {
            None => {
                let layer = stack.user_layer().ok_or(RuntimeError::NoUserLayer)?;
                layer.merge(mapping)?;
                layer.store(None)?;
            }
            Some(path) => {
                let adhoc;
                let layer = match stack.layers().into_iter().find(|l| l.origin() == Some(path)) {
                    Some(layer) => layer.as_ref(),
                    None => {
                        adhoc = LayeredSource::from_path(LayerKind::UserXdg { priority: 0 }, path);
                        &adhoc
                    }
                };
                layer.merge(mapping)?;
                layer.store(None)?;
            }
        }

        debug!(keys = mapping.len(), "Configuration persisted");
        if let Some(channel) = self.channel() {
            channel.publish_map(mapping);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Bus
    // -------------------------------------------------------------------------

    /// Subscribes this context to `bus`, replacing any previous attachment.
    pub fn attach_bus(&self, bus: Arc<dyn MessageBus>) {
        self.detach_bus();
        let channel = Arc::new(PatchChannel::attach(
            bus,
            self.inner.stack.clone(),
            &self.inner.topics,
        ));
        let previous = self.inner.channel.lock().replace(channel);
        if let Some(previous) = previous {
            previous.detach();
        }
    }

    /// Removes the subscriptions made by [`attach_bus`](Self::attach_bus).
    /// Returns `false` if no bus was attached.
    pub fn detach_bus(&self) -> bool {
        let channel = self.inner.channel.lock().take();
        match channel {
            Some(channel) => {
                channel.detach();
                true
            }
            None => false,
        }
    }

    pub fn is_bus_attached(&self) -> bool {
        self.inner.channel.lock().is_some()
    }

    /// The attached channel, cloned so the lock is not held while emitting.
    fn channel(&self) -> Option<Arc<PatchChannel>> {
        self.inner.channel.lock().clone()
    }

    // -------------------------------------------------------------------------
    // Watch
    // -------------------------------------------------------------------------

    /// Starts watching the mutable layer files through `port`, replacing a
    /// running watcher. Must be called within a tokio runtime.
    pub fn start_watcher(&self, port: Box<dyn FileWatchPort>) -> RuntimeResult<()> {
        let channel = Arc::clone(&self.inner.channel);
        let hook: ChangeHook = Arc::new(move || {
            let channel = channel.lock().clone();
            if let Some(channel) = channel {
                channel.notify_updated();
            }
        });

        let watcher = ChangeWatcher::spawn(
            self.inner.stack.clone(),
            port,
            self.inner.callbacks.clone(),
            self.inner.debounce,
            Some(hook),
        )?;
        // the previous watcher, if any, stops when dropped
        *self.inner.watcher.lock() = Some(watcher);
        Ok(())
    }

    /// Stops the watcher. Returns `false` if none was running.
    pub fn stop_watcher(&self) -> bool {
        self.inner.watcher.lock().take().is_some()
    }

    pub fn is_watching(&self) -> bool {
        self.inner.watcher.lock().is_some()
    }

    /// Registers a callback run after a watched file changed. Registering
    /// the same callback twice is a no-op.
    pub fn register_callback(&self, callback: ChangeCallback) -> bool {
        self.inner.callbacks.register(callback)
    }

    pub fn unregister_callback(&self, callback: &ChangeCallback) -> bool {
        self.inner.callbacks.unregister(callback)
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Constraints currently declared by the administrator layers.
    pub fn constraints(&self) -> Constraints {
        self.inner.stack.constraints()
    }

    /// The layer stack, for inspection tools.
    pub fn layers(&self) -> &LayerStack {
        &self.inner.stack
    }
}

impl std::fmt::Debug for ConfigurationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationContext")
            .field("stack", &self.inner.stack)
            .field("bus_attached", &self.is_bus_attached())
            .field("watching", &self.is_watching())
            .finish()
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
