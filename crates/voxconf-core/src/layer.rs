//! A single configuration origin with a fixed precedence slot.
//!
//! A [`LayeredSource`] owns the contents loaded from one file (or an
//! in-memory mapping) and knows how to reload, merge and store them.
//!
//! # Read-only layers
//!
//! Administrator layers are built with `read_only(true)`. Every public
//! mutation then fails with [`ConfigError::PermissionDenied`] unless the
//! layer was also built with `allow_overwrite(true)`. Loading from disk is
//! not a mutation in that sense: it goes through an [`OverwriteScope`], a
//! write guard that bypasses the check for the duration of the load only.
//!
//! # Reload semantics
//!
//! Loading writes the parsed top-level keys into the existing contents one
//! by one. Keys that disappeared from the file are therefore kept from the
//! previous load.
//!
//! ```rust,ignore
//! use voxconf_core::{LayerKind, LayeredSource};
//!
//! let system = LayeredSource::builder(LayerKind::System)
//!     .origin("/etc/mycroft/mycroft.conf")
//!     .read_only(true)
//!     .build();
//!
//! assert!(system.set("lang", "en-us".into()).is_err());
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use crate::error::{ConfigError, ConfigResult};
use crate::format::FileFormat;
use crate::io::{FsIo, SourceIo};
use crate::lock::file_lock;
use crate::value::{self, ConfigMap};

// =============================================================================
// Layer Kind
// =============================================================================

/// The precedence slot of a layer, lowest first.
///
/// `UserXdg` entries are ordered by `priority`: lower priorities load first
/// and are overridden by higher ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerKind {
    /// Bundled defaults.
    Default,
    /// Distribution-provided configuration (`/usr/share/...`).
    Distribution,
    /// System administrator configuration (`/etc/...`).
    System,
    /// Settings cached from a remote backend.
    Remote,
    /// One entry of the XDG user search path.
    UserXdg {
        /// Position in the search path.
        priority: u32,
    },
    /// In-memory patches applied at runtime.
    RuntimePatch,
}

impl LayerKind {
    fn rank(self) -> (u8, u32) {
        match self {
            Self::Default => (0, 0),
            Self::Distribution => (1, 0),
            Self::System => (2, 0),
            Self::Remote => (3, 0),
            Self::UserXdg { priority } => (4, priority),
            Self::RuntimePatch => (5, 0),
        }
    }

    /// Layers whose `system` section may declare constraints.
    pub fn is_administrator(self) -> bool {
        matches!(self, Self::Default | Self::Distribution | Self::System)
    }

    /// Returns `true` for any user search path entry.
    pub fn is_user(self) -> bool {
        matches!(self, Self::UserXdg { .. })
    }

    /// Short name used in logs and tables.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Distribution => "distribution",
            Self::System => "system",
            Self::Remote => "remote",
            Self::UserXdg { .. } => "user",
            Self::RuntimePatch => "runtime_patch",
        }
    }
}

impl PartialOrd for LayerKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LayerKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserXdg { priority } => write!(f, "user[{priority}]"),
            other => f.write_str(other.as_str()),
        }
    }
}

// =============================================================================
// Load Status
// =============================================================================

/// Outcome of [`LayeredSource::load`] and [`LayeredSource::reload`].
///
/// Load failures never surface as errors; the layer keeps its previous
/// contents and the failure is logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// The file was read and its keys written into the layer.
    Loaded,
    /// The modification time matched the last load; nothing was read.
    Unchanged,
    /// The file does not exist.
    Missing,
    /// The file could not be read or decoded.
    Failed(String),
    /// The layer has no backing file.
    InMemory,
}

impl LoadStatus {
    /// Returns `true` if new contents were read.
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }
}

// =============================================================================
// Layered Source
// =============================================================================

#[derive(Debug, Default)]
struct LayerState {
    contents: ConfigMap,
    last_loaded_mtime: Option<SystemTime>,
}

/// One configuration origin: a file path or an in-memory mapping.
///
/// The identity of a layer, for watching and merge matching, is its origin
/// path. Callers only ever receive snapshots of the contents.
pub struct LayeredSource {
    kind: LayerKind,
    origin: Option<PathBuf>,
    read_only: bool,
    allow_overwrite: bool,
    io: Arc<dyn SourceIo>,
    state: RwLock<LayerState>,
}

/// Builder for [`LayeredSource`].
pub struct LayerBuilder {
    kind: LayerKind,
    origin: Option<PathBuf>,
    read_only: bool,
    allow_overwrite: bool,
    io: Arc<dyn SourceIo>,
    seed: Option<ConfigMap>,
}

impl LayerBuilder {
    /// Sets the backing file.
    pub fn origin(mut self, path: impl Into<PathBuf>) -> Self {
        self.origin = Some(path.into());
        self
    }

    /// Sets the backing file if one is given.
    pub fn maybe_origin(mut self, path: Option<PathBuf>) -> Self {
        self.origin = path;
        self
    }

    /// Marks the layer as administrator-controlled.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Lifts the read-only restriction for this instance.
    pub fn allow_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    /// Replaces the filesystem backend.
    pub fn io(mut self, io: Arc<dyn SourceIo>) -> Self {
        self.io = io;
        self
    }

    /// Initial contents, applied before the backing file is loaded.
    pub fn seed(mut self, contents: ConfigMap) -> Self {
        self.seed = Some(contents);
        self
    }

    /// Builds the layer and performs the initial load.
    pub fn build(self) -> LayeredSource {
        let layer = LayeredSource {
            kind: self.kind,
            origin: self.origin,
            read_only: self.read_only,
            allow_overwrite: self.allow_overwrite,
            io: self.io,
            state: RwLock::new(LayerState::default()),
        };

        if let Some(seed) = self.seed {
            layer.overwrite_scope().merge(seed);
        }
        if layer.origin.is_some() {
            layer.load(None);
        }
        layer
    }
}

impl LayeredSource {
    /// Starts building a layer of the given kind.
    pub fn builder(kind: LayerKind) -> LayerBuilder {
        LayerBuilder {
            kind,
            origin: None,
            read_only: false,
            allow_overwrite: false,
            io: Arc::new(FsIo),
            seed: None,
        }
    }

    /// A writable layer backed by `path`, loaded immediately.
    pub fn from_path(kind: LayerKind, path: impl Into<PathBuf>) -> Self {
        Self::builder(kind).origin(path).build()
    }

    /// A writable layer with no backing file.
    pub fn in_memory(kind: LayerKind) -> Self {
        Self::builder(kind).build()
    }

    /// The precedence slot.
    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    /// The backing file, if any.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Whether the layer was built read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether public mutations are permitted.
    pub fn is_writable(&self) -> bool {
        !self.read_only || self.allow_overwrite
    }

    /// Modification time recorded by the last successful load of the origin.
    pub fn last_loaded_mtime(&self) -> Option<SystemTime> {
        self.state.read().last_loaded_mtime
    }

    fn origin_display(&self) -> String {
        match &self.origin {
            Some(path) => path.display().to_string(),
            None => format!("in-memory {} layer", self.kind),
        }
    }

    fn ensure_writable(&self) -> ConfigResult<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(ConfigError::permission_denied(self.origin_display()))
        }
    }

    /// Grants write access regardless of the read-only flag until dropped.
    pub(crate) fn overwrite_scope(&self) -> OverwriteScope<'_> {
        OverwriteScope {
            state: self.state.write(),
        }
    }

    // -------------------------------------------------------------------------
    // Disk I/O
    // -------------------------------------------------------------------------

    /// Loads `path` (or the origin) into the layer.
    ///
    /// Never fails: a missing, unreadable or malformed file is logged and the
    /// current contents are left untouched.
    pub fn load(&self, path: Option<&Path>) -> LoadStatus {
        let Some(path) = path.or(self.origin.as_deref()) else {
            error!(layer = %self.kind, "in memory configuration, nothing to load");
            return LoadStatus::InMemory;
        };

        let _io_guard = file_lock();

        if !self.io.is_file(path) {
            debug!(path = %path.display(), "Configuration not defined, skipping");
            return LoadStatus::Missing;
        }

        let mtime = self.io.modified(path).ok();
        let parsed = self
            .io
            .read_to_string(path)
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
            .and_then(|text| FileFormat::from_path(path).parse(&text, path));

        match parsed {
            Ok(contents) => {
                let mut scope = self.overwrite_scope();
                for (key, value) in contents {
                    scope.insert(key, value);
                }
                if self.origin.as_deref() == Some(path) {
                    scope.state.last_loaded_mtime = mtime;
                }
                debug!(path = %path.display(), layer = %self.kind, "Configuration loaded");
                LoadStatus::Loaded
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Error loading configuration");
                LoadStatus::Failed(e.to_string())
            }
        }
    }

    /// Re-reads the origin if its modification time changed since the last
    /// load.
    pub fn reload(&self) -> LoadStatus {
        let Some(origin) = self.origin.as_deref() else {
            return LoadStatus::InMemory;
        };

        let _io_guard = file_lock();

        match self.io.modified(origin) {
            Ok(mtime) if Some(mtime) == self.last_loaded_mtime() => LoadStatus::Unchanged,
            Ok(_) => self.load(Some(origin)),
            Err(_) => {
                debug!(path = %origin.display(), "Configuration not defined, skipping");
                LoadStatus::Missing
            }
        }
    }

    /// Serializes the contents to `path` or the origin.
    ///
    /// The format follows the target extension.
    pub fn store(&self, path: Option<&Path>) -> ConfigResult<()> {
        self.ensure_writable()?;

        let Some(path) = path.or(self.origin.as_deref()) else {
            error!(layer = %self.kind, "in memory configuration, no save location");
            return Err(ConfigError::NoPath);
        };

        let _io_guard = file_lock();

        let text = FileFormat::from_path(path).render(&self.state.read().contents)?;
        self.io.write(path, &text).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        debug!(path = %path.display(), layer = %self.kind, "Configuration stored");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Deep-merges `other` into the contents.
    pub fn merge(&self, other: &ConfigMap) -> ConfigResult<()> {
        self.ensure_writable()?;
        self.overwrite_scope().merge(other.clone());
        Ok(())
    }

    /// Deep-merges the contents of another layer.
    pub fn merge_source(&self, other: &LayeredSource) -> ConfigResult<()> {
        self.merge(&other.snapshot())
    }

    /// Sets a top-level key.
    pub fn set(&self, key: impl Into<String>, value: Value) -> ConfigResult<()> {
        self.ensure_writable()?;
        self.overwrite_scope().insert(key.into(), value);
        Ok(())
    }

    /// Sets the leaf at a dotted or slashed key path.
    pub fn set_path(&self, key: &str, value: Value) -> ConfigResult<()> {
        self.ensure_writable()?;
        self.overwrite_scope().set_path(key, value)
    }

    /// Removes every key.
    pub fn clear(&self) -> ConfigResult<()> {
        self.ensure_writable()?;
        self.overwrite_scope().clear();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    /// Returns a copy of a top-level value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.read().contents.get(key).cloned()
    }

    /// Returns a copy of the value at a key path.
    pub fn get_path(&self, key: &str) -> Option<Value> {
        value::get_path(&self.state.read().contents, key).cloned()
    }

    /// Returns `true` if a top-level key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.read().contents.contains_key(key)
    }

    /// Returns a copy of the contents.
    pub fn snapshot(&self) -> ConfigMap {
        self.state.read().contents.clone()
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.state.read().contents.len()
    }

    /// Returns `true` if the layer holds no keys.
    pub fn is_empty(&self) -> bool {
        self.state.read().contents.is_empty()
    }

    /// The contents under a canonical (sorted-key) JSON encoding.
    pub fn canonical_json(&self) -> ConfigResult<Vec<u8>> {
        serde_json_canonicalizer::to_vec(&self.state.read().contents).map_err(|e| {
            ConfigError::Serialize {
                reason: e.to_string(),
            }
        })
    }

    /// SHA-256 hex digest of [`canonical_json`](Self::canonical_json), used
    /// for change detection.
    pub fn content_digest(&self) -> ConfigResult<String> {
        let bytes = self.canonical_json()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

impl PartialEq for LayeredSource {
    /// Layers are equal when their canonical encodings are byte-identical.
    fn eq(&self, other: &Self) -> bool {
        match (self.canonical_json(), other.canonical_json()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for LayeredSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredSource")
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .field("read_only", &self.read_only)
            .field("allow_overwrite", &self.allow_overwrite)
            .field("keys", &self.len())
            .finish()
    }
}

// =============================================================================
// Overwrite Scope
// =============================================================================

/// Temporary write access to a layer that ignores the read-only flag.
///
/// Holding the scope holds the layer's write lock, so a concurrent public
/// mutation cannot observe a half-applied load.
pub(crate) struct OverwriteScope<'a> {
    state: RwLockWriteGuard<'a, LayerState>,
}

impl OverwriteScope<'_> {
    pub(crate) fn insert(&mut self, key: String, value: Value) {
        self.state.contents.insert(key, value);
    }

    pub(crate) fn merge(&mut self, other: ConfigMap) {
        value::merge_into(&mut self.state.contents, other);
    }

    pub(crate) fn set_path(&mut self, key: &str, value: Value) -> ConfigResult<()> {
        value::set_path(&mut self.state.contents, key, value)
    }

    pub(crate) fn clear(&mut self) {
        self.state.contents.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
