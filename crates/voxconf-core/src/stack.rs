//! The fixed, ordered set of live layers.
//!
//! A [`LayerStack`] owns one layer per precedence slot:
//!
//! ```text
//! Default < Distribution < System < Remote < User[0..n] < RuntimePatch
//! ```
//!
//! Default, Distribution and System are read-only. The RuntimePatch layer is
//! in-memory only and receives every runtime write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::constraints::Constraints;
use crate::io::{FsIo, SourceIo};
use crate::layer::{LayerKind, LayeredSource, LoadStatus};
use crate::merge::MergeEngine;
use crate::remote::{RemoteBackend, disabled_backend_settings, translate_remote};
use crate::value::ConfigMap;

/// Resolved locations of the fixed layers.
#[derive(Debug, Clone, Default)]
pub struct LayerPaths {
    /// Bundled defaults file; `None` keeps the Default layer in memory.
    pub default: Option<PathBuf>,
    /// Contents of the Default layer before its file (if any) is loaded.
    pub default_seed: Option<ConfigMap>,
    /// Distribution configuration file.
    pub distribution: Option<PathBuf>,
    /// System configuration file.
    pub system: Option<PathBuf>,
    /// Remote settings cache file.
    pub remote: Option<PathBuf>,
    /// User search path, least specific first.
    pub user: Vec<PathBuf>,
}

/// The live layers of one configuration context.
pub struct LayerStack {
    default: Arc<LayeredSource>,
    distribution: Arc<LayeredSource>,
    system: Arc<LayeredSource>,
    remote: Arc<LayeredSource>,
    user: Vec<Arc<LayeredSource>>,
    patch: Arc<LayeredSource>,
    remote_backend: Option<Arc<dyn RemoteBackend>>,
}

impl LayerStack {
    /// Builds and loads every layer from the filesystem.
    pub fn from_paths(paths: &LayerPaths) -> Self {
        Self::from_paths_with_io(paths, Arc::new(FsIo))
    }

    /// Builds and loads every layer through `io`.
    pub fn from_paths_with_io(paths: &LayerPaths, io: Arc<dyn SourceIo>) -> Self {
        let admin = |kind: LayerKind, path: &Option<PathBuf>| {
            Arc::new(
                LayeredSource::builder(kind)
                    .maybe_origin(path.clone())
                    .read_only(true)
                    .io(io.clone())
                    .build(),
            )
        };

        let mut default = LayeredSource::builder(LayerKind::Default)
            .maybe_origin(paths.default.clone())
            .read_only(true)
            .io(io.clone());
        if let Some(seed) = &paths.default_seed {
            default = default.seed(seed.clone());
        }

        let user = paths
            .user
            .iter()
            .enumerate()
            .map(|(i, path)| {
                Arc::new(
                    LayeredSource::builder(LayerKind::UserXdg { priority: i as u32 })
                        .origin(path.clone())
                        .io(io.clone())
                        .build(),
                )
            })
            .collect();

        let stack = Self {
            default: Arc::new(default.build()),
            distribution: admin(LayerKind::Distribution, &paths.distribution),
            system: admin(LayerKind::System, &paths.system),
            remote: Arc::new(
                LayeredSource::builder(LayerKind::Remote)
                    .maybe_origin(paths.remote.clone())
                    .io(io.clone())
                    .build(),
            ),
            user,
            patch: Arc::new(LayeredSource::in_memory(LayerKind::RuntimePatch)),
            remote_backend: None,
        };

        debug!(user_layers = stack.user.len(), "Layer stack loaded");
        stack
    }

    /// Assembles a stack from prebuilt layers.
    ///
    /// Each layer must carry the kind matching its slot.
    pub fn from_layers(
        default: LayeredSource,
        distribution: LayeredSource,
        system: LayeredSource,
        remote: LayeredSource,
        user: Vec<LayeredSource>,
    ) -> Self {
        Self {
            default: Arc::new(default),
            distribution: Arc::new(distribution),
            system: Arc::new(system),
            remote: Arc::new(remote),
            user: user.into_iter().map(Arc::new).collect(),
            patch: Arc::new(LayeredSource::in_memory(LayerKind::RuntimePatch)),
            remote_backend: None,
        }
    }

    /// Attaches the backend consulted by [`reload_remote`](Self::reload_remote).
    pub fn with_remote_backend(mut self, backend: Arc<dyn RemoteBackend>) -> Self {
        self.remote_backend = Some(backend);
        self
    }

    /// The Default layer.
    pub fn default_layer(&self) -> &Arc<LayeredSource> {
        &self.default
    }

    /// The Distribution layer.
    pub fn distribution(&self) -> &Arc<LayeredSource> {
        &self.distribution
    }

    /// The System layer.
    pub fn system(&self) -> &Arc<LayeredSource> {
        &self.system
    }

    /// The Remote layer.
    pub fn remote(&self) -> &Arc<LayeredSource> {
        &self.remote
    }

    /// The user search path, least specific first.
    pub fn user_layers(&self) -> &[Arc<LayeredSource>] {
        &self.user
    }

    /// The most specific user layer, the default persist target.
    pub fn user_layer(&self) -> Option<&Arc<LayeredSource>> {
        self.user.last()
    }

    /// The RuntimePatch layer.
    pub fn patch(&self) -> &Arc<LayeredSource> {
        &self.patch
    }

    /// Every layer in precedence order.
    pub fn layers(&self) -> Vec<&Arc<LayeredSource>> {
        let mut layers = vec![&self.default, &self.distribution, &self.system, &self.remote];
        layers.extend(self.user.iter());
        layers.push(&self.patch);
        layers
    }

    /// File-backed layers whose files may change at runtime.
    pub fn watchable_layers(&self) -> Vec<&Arc<LayeredSource>> {
        let mut layers = vec![&self.distribution, &self.system, &self.remote];
        layers.extend(self.user.iter());
        layers.retain(|layer| layer.origin().is_some());
        layers
    }

    /// Finds the watchable layer backed by `path`.
    pub fn find_by_origin(&self, path: &Path) -> Option<&Arc<LayeredSource>> {
        self.watchable_layers()
            .into_iter()
            .find(|layer| layer.origin() == Some(path))
    }

    /// Constraints declared by the administrator layers.
    pub fn constraints(&self) -> Constraints {
        Constraints::resolve([
            self.distribution.as_ref(),
            self.system.as_ref(),
            self.default.as_ref(),
        ])
    }

    /// Recomputes the merged view from the current layer contents.
    pub fn merged(&self) -> ConfigMap {
        let constraints = self.constraints();
        let layers: Vec<&LayeredSource> = self.layers().into_iter().map(Arc::as_ref).collect();
        MergeEngine::compute(&layers, &constraints)
    }

    /// Reloads every file-backed layer. The Remote layer is reloaded from
    /// its cache file; only [`reload_remote`](Self::reload_remote) contacts
    /// the backend.
    pub fn reload_all(&self) {
        self.default.reload();
        self.distribution.reload();
        self.system.reload();
        self.remote.reload();
        for layer in &self.user {
            layer.reload();
        }
    }

    /// Refreshes the Remote layer.
    ///
    /// Without a backend, or while unpaired, the cache file is reloaded. A
    /// disabled backend switches off backend-dependent features. Otherwise
    /// settings are fetched, translated, written into the layer and cached;
    /// any backend failure falls back to the cache file.
    pub fn reload_remote(&self) -> LoadStatus {
        let Some(backend) = &self.remote_backend else {
            return self.remote.reload();
        };
        if !backend.is_paired() {
            return self.remote.reload();
        }

        if backend.is_disabled() {
            for (key, value) in disabled_backend_settings() {
                if let Err(e) = self.remote.set(key, value) {
                    error!(error = %e, "Failed to apply disabled-backend settings");
                }
            }
            return LoadStatus::Loaded;
        }

        let mut settings = match backend.fetch_settings() {
            Ok(settings) => settings,
            Err(e) => {
                error!(error = %e, "Exception fetching remote configuration");
                return self.remote.load(None);
            }
        };

        let location = match backend.fetch_location() {
            Ok(location) => Some(location),
            Err(e) => {
                error!(error = %e, "Exception fetching remote location");
                self.remote.get("location")
            }
        };
        if let Some(location) = location.filter(|l| !l.is_null()) {
            settings.insert("location".to_string(), location);
        }

        for (key, value) in translate_remote(&settings) {
            if let Err(e) = self.remote.set(key, value) {
                error!(error = %e, "Failed to apply remote settings");
                return self.remote.load(None);
            }
        }
        if self.remote.origin().is_some()
            && let Err(e) = self.remote.store(None)
        {
            error!(error = %e, "Failed to cache remote configuration");
        }

        info!("Remote configuration updated");
        LoadStatus::Loaded
    }
}

impl std::fmt::Debug for LayerStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerStack")
            .field("default", &self.default)
            .field("distribution", &self.distribution)
            .field("system", &self.system)
            .field("remote", &self.remote)
            .field("user", &self.user)
            .field("patch", &self.patch)
            .field("remote_backend", &self.remote_backend.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryIo;
    use crate::remote::RemoteError;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn paths() -> LayerPaths {
        LayerPaths {
            default: Some("/pkg/default.conf".into()),
            default_seed: None,
            distribution: Some("/usr/share/mycroft/mycroft.conf".into()),
            system: Some("/etc/mycroft/mycroft.conf".into()),
            remote: Some("/home/u/.config/mycroft/web_cache.json".into()),
            user: vec![
                "/etc/xdg/mycroft/mycroft.conf".into(),
                "/home/u/.config/mycroft/mycroft.conf".into(),
            ],
        }
    }

    fn stack(io: &Arc<MemoryIo>) -> LayerStack {
        LayerStack::from_paths_with_io(&paths(), io.clone())
    }

    #[test]
    fn test_end_to_end_precedence() {
        let io = Arc::new(MemoryIo::new());
        io.put("/pkg/default.conf", r#"{"lang": "en-us", "tts": {"module": "a"}}"#);
        io.put("/etc/mycroft/mycroft.conf", "{}");
        io.put("/home/u/.config/mycroft/mycroft.conf", r#"{"lang": "es-mx"}"#);

        let stack = stack(&io);
        let merged = stack.merged();
        assert_eq!(merged["lang"], "es-mx");
        assert_eq!(merged["tts"]["module"], "a");
    }

    #[test]
    fn test_admin_layers_read_only() {
        let io = Arc::new(MemoryIo::new());
        let stack = stack(&io);

        assert!(stack.default_layer().is_read_only());
        assert!(stack.distribution().is_read_only());
        assert!(stack.system().set("a", json!(1)).is_err());
        assert!(stack.remote().set("a", json!(1)).is_ok());
        assert!(stack.patch().set("a", json!(1)).is_ok());
    }

    #[test]
    fn test_default_seed_then_file() {
        let io = Arc::new(MemoryIo::new());
        io.put("/pkg/default.conf", r#"{"lang": "pt-pt"}"#);
        let mut p = paths();
        p.default_seed = match json!({"lang": "en-us", "log_level": "INFO"}) {
            Value::Object(m) => Some(m),
            _ => None,
        };

        let stack = LayerStack::from_paths_with_io(&p, io.clone());
        assert_eq!(stack.default_layer().get("lang"), Some(json!("pt-pt")));
        assert_eq!(stack.default_layer().get("log_level"), Some(json!("INFO")));
    }

    #[test]
    fn test_system_constraints_disable_user() {
        let io = Arc::new(MemoryIo::new());
        io.put(
            "/etc/mycroft/mycroft.conf",
            r#"{"system": {"disable_user_config": true}, "lang": "en-us"}"#,
        );
        io.put("/home/u/.config/mycroft/mycroft.conf", r#"{"lang": "es-mx"}"#);

        let stack = stack(&io);
        assert!(stack.constraints().disable_user_config);
        assert_eq!(stack.merged()["lang"], "en-us");
    }

    #[test]
    fn test_watchable_layers_and_lookup() {
        let io = Arc::new(MemoryIo::new());
        let stack = stack(&io);

        assert_eq!(stack.watchable_layers().len(), 5);
        let found = stack
            .find_by_origin(Path::new("/home/u/.config/mycroft/mycroft.conf"))
            .unwrap();
        assert_eq!(found.kind(), LayerKind::UserXdg { priority: 1 });
        assert!(stack.find_by_origin(Path::new("/pkg/default.conf")).is_none());
        assert_eq!(
            stack.user_layer().unwrap().origin(),
            Some(Path::new("/home/u/.config/mycroft/mycroft.conf"))
        );
    }

    struct FakeBackend {
        fetches: AtomicUsize,
        paired: bool,
        disabled: bool,
        settings: Result<ConfigMap, RemoteError>,
        location: Result<Value, RemoteError>,
    }

    impl RemoteBackend for FakeBackend {
        fn is_paired(&self) -> bool {
            self.paired
        }
        fn is_disabled(&self) -> bool {
            self.disabled
        }
        fn fetch_settings(&self) -> Result<ConfigMap, RemoteError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.settings.clone()
        }
        fn fetch_location(&self) -> Result<Value, RemoteError> {
            self.location.clone()
        }
    }

    fn backend(paired: bool, disabled: bool, ok: bool) -> Arc<FakeBackend> {
        let settings = match json!({"dateFormat": "MDY", "uuid": "x"}) {
            Value::Object(m) => m,
            _ => ConfigMap::new(),
        };
        Arc::new(FakeBackend {
            fetches: AtomicUsize::new(0),
            paired,
            disabled,
            settings: if ok {
                Ok(settings)
            } else {
                Err(RemoteError::Unavailable("offline".into()))
            },
            location: Err(RemoteError::Backend("no location".into())),
        })
    }

    #[test]
    fn test_remote_reload_fetches_translates_and_caches() {
        let io = Arc::new(MemoryIo::new());
        io.put(
            "/home/u/.config/mycroft/web_cache.json",
            r#"{"location": {"city": "Lisbon"}}"#,
        );
        let stack = stack(&io).with_remote_backend(backend(true, false, true));

        assert_eq!(stack.reload_remote(), LoadStatus::Loaded);
        assert_eq!(stack.remote().get("date_format"), Some(json!("MDY")));
        assert_eq!(stack.remote().get_path("location.city"), Some(json!("Lisbon")));

        let cached = io.contents(Path::new("/home/u/.config/mycroft/web_cache.json")).unwrap();
        assert!(cached.contains("date_format"));
    }

    #[test]
    fn test_remote_reload_disabled_backend() {
        let io = Arc::new(MemoryIo::new());
        let stack = stack(&io).with_remote_backend(backend(true, true, true));

        stack.reload_remote();
        assert_eq!(stack.merged()["server"]["metrics"], false);
    }

    #[test]
    fn test_remote_reload_falls_back_to_cache() {
        let io = Arc::new(MemoryIo::new());
        io.put("/home/u/.config/mycroft/web_cache.json", r#"{"a": 1}"#);
        let unpaired = stack(&io).with_remote_backend(backend(false, false, true));
        assert_eq!(unpaired.reload_remote(), LoadStatus::Unchanged);

        let failing = stack(&io).with_remote_backend(backend(true, false, false));
        assert_eq!(failing.reload_remote(), LoadStatus::Loaded);
        assert_eq!(failing.remote().get("a"), Some(json!(1)));
        assert!(failing.remote().get("date_format").is_none());
    }

    #[test]
    fn test_reload_all_reads_remote_cache_without_fetching() {
        let io = Arc::new(MemoryIo::new());
        let cache = "/home/u/.config/mycroft/web_cache.json";
        io.put(cache, r#"{"date_format": "DMY"}"#);
        let backend = backend(true, false, true);
        let stack = stack(&io).with_remote_backend(backend.clone());

        io.put(cache, r#"{"date_format": "YMD"}"#);
        stack.reload_all();
        assert_eq!(stack.remote().get("date_format"), Some(json!("YMD")));
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 0);

        stack.reload_remote();
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(stack.remote().get("date_format"), Some(json!("MDY")));
    }
}
