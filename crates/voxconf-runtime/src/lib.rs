//! # voxconf runtime
//!
//! Everything that turns the layer stack of `voxconf-core` into a live
//! configuration for a running assistant process.
//!
//! ```text
//! ┌──────────────┐   reads/writes   ┌────────────┐   reload   ┌───────────────┐
//! │ application  │─────────────────▶│ Context    │◀───────────│ ChangeWatcher │◀── files
//! └──────────────┘                  │ LayerStack │            └───────────────┘
//!                                   └────────────┘
//!                                      ▲     │ patches
//!                                      │     ▼
//!                                   ┌────────────┐
//!                                   │PatchChannel│◀──▶ MessageBus ◀──▶ other processes
//!                                   └────────────┘
//! ```
//!
//! - **settings**: where the layers live and how the resolver behaves,
//!   loaded with figment from defaults, `voxconf.yaml` and `VOXCONF_*`
//! - **locations**: XDG search path and per-layer file resolution
//! - **context**: the [`ConfigurationContext`] facade
//! - **watcher**: debounced reload of changed layer files
//! - **patch** / **bus**: runtime patch propagation between processes
//! - **logging**: tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voxconf_runtime::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = SettingsLoader::new().load()?;
//!     init_from_config(&settings.logging);
//!
//!     // watches the layer files when `watch.enabled` is set
//!     let config = ConfigurationContext::open(&settings)?;
//!     println!("{}", config.get("lang").unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `json-log`: Enable JSON log output

pub mod bus;
pub mod context;
pub mod error;
pub mod locations;
pub mod logging;
pub mod patch;
pub mod settings;
pub mod watcher;

pub use bus::{InMemoryBus, Message, MessageBus, MessageHandler, SubscriptionId};
pub use context::{ConfigurationContext, ContextBuilder};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, init_from_config};
pub use patch::PatchChannel;
pub use settings::{ResolverSettings, SettingsLoader};
pub use watcher::{ChangeCallback, ChangeWatcher, FileWatchPort, NotifyWatchPort};

pub use tracing;
pub use voxconf_core as core;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use voxconf_runtime::prelude::*;
/// ```
pub mod prelude {
    // Facade
    pub use crate::context::ConfigurationContext;

    // Settings and logging
    pub use crate::logging::init_from_config;
    pub use crate::settings::{ResolverSettings, SettingsLoader};

    // Ports
    pub use crate::bus::{InMemoryBus, Message, MessageBus};
    pub use crate::watcher::{ChangeCallback, FileWatchPort, NotifyWatchPort};

    // Layer model
    pub use voxconf_core::{ConfigMap, Constraints, LayerKind, LayerStack};
}
