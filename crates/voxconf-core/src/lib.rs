//! # Voxconf Core
//!
//! Layered configuration sources and the merge engine behind them.
//!
//! A voice assistant reads its configuration from several files owned by
//! different parties. Each file becomes a [`LayeredSource`] with a fixed
//! precedence slot ([`LayerKind`]); the [`MergeEngine`] folds them into one
//! mapping, honouring the [`Constraints`] that administrator layers declare.
//!
//! ## Precedence
//!
//! ```text
//! ┌─────────┐  ┌──────────────┐  ┌────────┐  ┌────────┐  ┌──────────┐  ┌──────────────┐
//! │ Default │─▶│ Distribution │─▶│ System │─▶│ Remote │─▶│ User[..] │─▶│ RuntimePatch │
//! └─────────┘  └──────────────┘  └────────┘  └────────┘  └──────────┘  └──────────────┘
//!   lowest                                                                   highest
//! ```
//!
//! Mappings merge recursively, every other value (lists included) is
//! replaced, and an explicit `null` shadows whatever is below it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use voxconf_core::{LayerPaths, LayerStack};
//!
//! let stack = LayerStack::from_paths(&LayerPaths {
//!     system: Some("/etc/mycroft/mycroft.conf".into()),
//!     user: vec!["/home/me/.config/mycroft/mycroft.conf".into()],
//!     ..Default::default()
//! });
//!
//! let merged = stack.merged();
//! println!("{}", merged["lang"]);
//! ```

pub mod constraints;
pub mod error;
pub mod format;
pub mod io;
pub mod layer;
mod lock;
pub mod merge;
pub mod remote;
pub mod stack;
pub mod value;

pub use constraints::{Constraints, ProtectedKeys, SYSTEM_SECTION};
pub use error::{ConfigError, ConfigResult};
pub use format::FileFormat;
pub use io::{FsIo, MemoryIo, SourceIo};
pub use layer::{LayerBuilder, LayerKind, LayeredSource, LoadStatus};
pub use merge::MergeEngine;
pub use remote::{RemoteBackend, RemoteError, translate_remote};
pub use stack::{LayerPaths, LayerStack};
pub use value::ConfigMap;
