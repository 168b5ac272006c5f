//! Autoconfigure command implementation
//!
//! Recommended presets live in a directory of per-topic folders, each
//! holding one configuration fragment per language:
//!
//! ```text
//! recommends/
//!   base/en-us.conf
//!   online_stt/en-us.conf
//!   offline_stt/en-us.conf
//!   online_male/  online_female/  offline_male/  offline_female/
//!   gpu/en-us.conf
//!   platform/<platform>.conf
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use serde_json::{Value, json};
use tracing::debug;
use voxconf_core::{ConfigMap, FileFormat, LayeredSource};
use voxconf_runtime::settings::ResolverSettings;
use voxconf_runtime::{ConfigurationContext, RuntimeError, locations};

use crate::lang;

const SERVER_TTS: &str = "ovos-tts-plugin-server";
const SERVER_STT: &str = "ovos-stt-plugin-server";

/// Keys printed after configuring.
const SUMMARY_KEYS: &[&str] = &[
    "lang",
    "tts",
    "stt",
    "system_unit",
    "temperature_unit",
    "windspeed_unit",
    "precipitation_unit",
    "date_format",
    "time_format",
    "spoken_time_format",
];

/// Where speech recognition and voice run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Online,
    Offline,
    /// Online speech recognition, offline voice.
    Hybrid,
}

impl Mode {
    pub fn from_flags(offline: bool, hybrid: bool) -> Self {
        if offline {
            Self::Offline
        } else if hybrid {
            Self::Hybrid
        } else {
            Self::Online
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voice {
    Male,
    Female,
    Unset,
}

impl Voice {
    pub fn from_flags(male: bool, female: bool) -> Self {
        if male {
            Self::Male
        } else if female {
            Self::Female
        } else {
            Self::Unset
        }
    }

    fn suffix(self) -> Option<&'static str> {
        match self {
            Self::Male => Some("male"),
            Self::Female => Some("female"),
            Self::Unset => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub lang: String,
    pub mode: Mode,
    pub voice: Voice,
    pub platform: Option<String>,
    pub gpu: bool,
}

/// Outcome of [`configure`].
#[derive(Debug, Default)]
pub struct Report {
    pub lang: String,
    pub merged: Vec<PathBuf>,
    pub missing: Vec<String>,
}

/// Directory of recommended fragments.
pub struct Recommends {
    root: PathBuf,
}

impl Recommends {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<folder>/<lang>.conf`, else the first file of the folder named
    /// after the language subtag.
    pub fn find(&self, folder: &str, lang: &str) -> Option<PathBuf> {
        let dir = self.root.join(folder);
        let exact = dir.join(format!("{}.conf", lang.to_lowercase()));
        if exact.is_file() {
            return Some(exact);
        }

        let prefix = lang::primary(lang);
        let mut candidates: Vec<PathBuf> = fs::read_dir(&dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.to_lowercase().starts_with(&prefix))
            })
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }

    /// `platform/<name>.conf`.
    pub fn platform(&self, name: &str) -> Option<PathBuf> {
        let path = self
            .root
            .join("platform")
            .join(format!("{}.conf", name.to_lowercase()));
        path.is_file().then_some(path)
    }
}

fn read_fragment(path: &Path) -> Result<ConfigMap> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(FileFormat::from_path(path).parse(&text, path)?)
}

/// Applies the presets selected by `options` to `user` without storing it.
pub fn configure(
    user: &LayeredSource,
    recommends: &Recommends,
    options: &Options,
) -> Result<Report> {
    let mut report = Report {
        lang: lang::standardize(&options.lang),
        ..Default::default()
    };
    let stdlang = report.lang.clone();

    user.set("tts", json!({ SERVER_TTS: {} }))?;
    user.set("stt", json!({ SERVER_STT: {} }))?;

    let mut merge = |folder: &str, found: Option<PathBuf>| -> Result<()> {
        match found {
            Some(path) => {
                user.merge(&read_fragment(&path)?)?;
                debug!(path = %path.display(), "Merged recommended configuration");
                report.merged.push(path);
            }
            None => report.missing.push(folder.to_string()),
        }
        Ok(())
    };
    let by_lang = |folder: &str| recommends.find(folder, &stdlang);

    merge("base", by_lang("base"))?;

    let (stt_folder, voice_prefix) = match options.mode {
        Mode::Online => ("online_stt", "online"),
        Mode::Offline => ("offline_stt", "offline"),
        Mode::Hybrid => ("online_stt", "offline"),
    };
    if options.mode != Mode::Offline {
        user.set_path("stt.module", Value::from(SERVER_STT))?;
    }
    if options.mode == Mode::Online {
        user.set_path("tts.module", Value::from(SERVER_TTS))?;
    }
    merge(stt_folder, by_lang(stt_folder))?;

    if let Some(suffix) = options.voice.suffix() {
        let folder = format!("{voice_prefix}_{suffix}");
        merge(&folder, by_lang(&folder))?;
    }

    if let Some(platform) = &options.platform {
        merge(&format!("platform/{platform}"), recommends.platform(platform))?;
    }
    if options.gpu {
        merge("gpu", by_lang("gpu"))?;
    }

    user.set("lang", Value::from(stdlang.as_str()))?;
    Ok(report)
}

/// Subset of `config` shown after configuring.
pub fn summary(config: &ConfigMap) -> ConfigMap {
    config
        .iter()
        .filter(|(k, _)| SUMMARY_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub fn execute(settings: &ResolverSettings, options: &Options) -> Result<()> {
    if options.mode == Mode::Online {
        println!("{}", "Using online public servers".red());
    }
    if options.voice == Voice::Unset {
        println!(
            "{}",
            "Skipping TTS configuration, pass '--male' or '--female' to set language defaults"
                .red()
        );
    }

    let root = locations::recommends_dir(settings)
        .ok_or_else(|| anyhow!("no recommends directory configured"))?;
    let context = ConfigurationContext::from_settings(settings)?;
    let user = context
        .layers()
        .user_layer()
        .ok_or(RuntimeError::NoUserLayer)?;

    let report = configure(user, &Recommends::new(root), options)?;
    println!("{} {}", "Standardized lang-code:".blue(), report.lang);
    for path in &report.merged {
        println!("Merged config: {}", path.display());
    }
    for folder in &report.missing {
        println!("{}", format!("ERROR: {folder} not available for {}", report.lang).red());
    }

    user.store(None)?;
    if let Some(path) = user.origin() {
        println!("Config updated: {}", path.display());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&Value::Object(summary(&user.snapshot())))?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use voxconf_core::LayerKind;

    fn recommends(files: &[(&str, &str)]) -> (TempDir, Recommends) {
        let temp = TempDir::new().unwrap();
        for (path, contents) in files {
            let path = temp.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        let recommends = Recommends::new(temp.path());
        (temp, recommends)
    }

    fn options(mode: Mode, voice: Voice) -> Options {
        Options {
            lang: "pt".to_string(),
            mode,
            voice,
            platform: None,
            gpu: false,
        }
    }

    fn user() -> LayeredSource {
        LayeredSource::in_memory(LayerKind::UserXdg { priority: 0 })
    }

    #[test]
    fn test_find_exact_then_prefix() {
        let (_temp, recs) = recommends(&[
            ("base/pt-pt.conf", "{}"),
            ("online_stt/pt-br.conf", "{}"),
        ]);
        assert!(recs.find("base", "pt-PT").unwrap().ends_with("base/pt-pt.conf"));
        assert!(recs.find("online_stt", "pt-PT").unwrap().ends_with("online_stt/pt-br.conf"));
        assert!(recs.find("gpu", "pt-PT").is_none());
    }

    #[test]
    fn test_online_uses_server_plugins() {
        let (_temp, recs) = recommends(&[
            ("base/pt-pt.conf", r#"{"system_unit": "metric"}"#),
            ("online_stt/pt-pt.conf", r#"{"stt": {"fallback_module": "x"}}"#),
        ]);
        let user = user();

        let report = configure(&user, &recs, &options(Mode::Online, Voice::Unset)).unwrap();
        assert_eq!(report.lang, "pt-PT");
        assert_eq!(report.merged.len(), 2);
        assert!(report.missing.is_empty());

        let config = user.snapshot();
        assert_eq!(config["lang"], "pt-PT");
        assert_eq!(config["tts"]["module"], SERVER_TTS);
        assert_eq!(config["stt"]["module"], SERVER_STT);
        assert_eq!(config["stt"]["fallback_module"], "x");
        assert_eq!(config["system_unit"], "metric");
    }

    #[test]
    fn test_hybrid_offline_voice() {
        let (_temp, recs) = recommends(&[
            ("offline_female/pt-pt.conf", r#"{"tts": {"module": "piper"}}"#),
            ("platform/rpi4.conf", r#"{"listener": {"sample_rate": 16000}}"#),
        ]);
        let user = user();
        let mut opts = options(Mode::Hybrid, Voice::Female);
        opts.platform = Some("rpi4".to_string());

        let report = configure(&user, &recs, &opts).unwrap();
        assert_eq!(report.missing, ["base", "online_stt"]);

        let config = user.snapshot();
        assert_eq!(config["tts"]["module"], "piper");
        assert_eq!(config["stt"]["module"], SERVER_STT);
        assert_eq!(config["listener"]["sample_rate"], 16000);
    }

    #[test]
    fn test_summary_filters_keys() {
        let config = match json!({"lang": "pt-PT", "tts": {}, "listener": {}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let summary = summary(&config);
        let keys: Vec<&String> = summary.keys().collect();
        assert_eq!(keys, ["lang", "tts"]);
    }
}
