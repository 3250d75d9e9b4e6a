//! Persisted user preferences.
//!
//! Stored as TOML at `<config dir>/settings.toml` (override with
//! `MACDOCK_SETTINGS`). A missing file means defaults; a file that fails to
//! parse is logged and treated as defaults as well.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::docker::ContainerConfig;

/// macOS releases offered by the image.
pub const KNOWN_VERSIONS: &[&str] = &["15", "14", "13", "12", "11"];

/// Typical RAM allocations for the guest.
pub const KNOWN_RAM_SIZES: &[&str] = &["4G", "6G", "8G", "12G", "16G", "24G", "32G"];

const SETTINGS_FILE: &str = "settings.toml";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Host directory mounted into the container as `/storage`.
    pub storage_path: String,
    pub macos_version: String,
    pub ram_size: String,
    /// Keep the id of the started container so it can be resumed later.
    pub remember_container: bool,
    pub last_container_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_path: String::new(),
            macos_version: "14".to_string(),
            ram_size: "8G".to_string(),
            remember_container: true,
            last_container_id: String::new(),
        }
    }
}

impl Settings {
    pub fn container_config(&self) -> ContainerConfig {
        ContainerConfig {
            os_version: self.macos_version.clone(),
            ram_size: self.ram_size.clone(),
            storage_path: self.storage_path.clone(),
        }
    }

    /// Toggle remembering; switching it off also forgets the stored id.
    pub fn set_remember_container(&mut self, remember: bool) {
        self.remember_container = remember;
        if !remember {
            self.last_container_id.clear();
        }
    }

    /// Apply a `key = value` pair as typed on the command line.
    pub fn set_key(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "storage_path" => self.storage_path = value.to_string(),
            "macos_version" => self.macos_version = value.to_string(),
            "ram_size" => self.ram_size = value.to_string(),
            "remember_container" => {
                let remember = value
                    .parse::<bool>()
                    .with_context(|| format!("remember_container expects true or false, got '{value}'"))?;
                self.set_remember_container(remember);
            }
            "last_container_id" => self.last_container_id = value.to_string(),
            other => anyhow::bail!(
                "unknown setting '{other}'; expected one of storage_path, macos_version, \
                 ram_size, remember_container, last_container_id"
            ),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Key-value preference storage.
pub trait SettingsStore: Send + Sync + 'static {
    fn load(&self) -> Settings;

    fn save(&self, settings: &Settings) -> anyhow::Result<()>;

    /// Load, modify and save in one call.
    fn update(&self, change: impl FnOnce(&mut Settings)) -> anyhow::Result<Settings>
    where
        Self: Sized,
    {
        let mut settings = self.load();
        change(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

/// Settings held only in memory.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    inner: Mutex<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Settings {
        self.inner.lock().expect("settings mutex poisoned").clone()
    }

    fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        *self.inner.lock().expect("settings mutex poisoned") = settings.clone();
        Ok(())
    }
}

/// Settings persisted as a TOML file.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `MACDOCK_SETTINGS` if set, otherwise `settings.toml` in `config_dir`.
    /// `None` when neither is available.
    pub fn locate(config_dir: Option<&Path>) -> Option<Self> {
        Self::locate_with(std::env::var_os("MACDOCK_SETTINGS"), config_dir)
    }

    fn locate_with(override_path: Option<OsString>, config_dir: Option<&Path>) -> Option<Self> {
        match (override_path, config_dir) {
            (Some(path), _) => Some(Self::new(path)),
            (None, Some(dir)) => Some(Self::new(dir.join(SETTINGS_FILE))),
            (None, None) => None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Settings {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file, using defaults");
                return Settings::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read settings");
                return Settings::default();
            }
        };

        toml::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "invalid settings file, using defaults");
            Settings::default()
        })
    }

    fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating settings directory '{}'", parent.display()))?;
        }
        let text = toml::to_string_pretty(settings).context("serializing settings")?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("writing settings to '{}'", self.path.display()))?;
        Ok(())
    }
}
