//! Settings of the resolver itself.
//!
//! These settings decide where the configuration layers live, how the change
//! watcher debounces and which bus topics refresh the Remote layer. They are
//! not part of the merged configuration.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{SettingsError, SettingsResult};
pub use loader::SettingsLoader;
pub use schema::{
    BusSettings, LocationSettings, LogFormat, LogLevel, LogOutput, LoggingConfig,
    ResolverSettings, WatchSettings,
};
pub use validation::validate_settings;
