//! Application directory structure for macdock.
//!
//! - Config:  `~/.config/macdock/`  (settings.toml)
//! - Logs:    `~/Library/Logs/macdock/` on macOS, `~/.local/share/macdock/logs/`
//!   elsewhere
//!
//! XDG variables are honoured when set. On Windows `%APPDATA%` and
//! `%LOCALAPPDATA%` take the place of `$HOME`.

use std::path::{Path, PathBuf};

use tracing::info;

const APP_NAME: &str = "macdock";

/// All resolved application directory paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Human-editable config
    pub config: PathBuf,
    /// Application logs (used when `MACDOCK_LOG=1`)
    pub logs: PathBuf,
}

impl AppPaths {
    /// Resolve all paths from the user's home directory.
    /// Does not create any directories; call `ensure()` for that.
    pub fn resolve() -> Option<Self> {
        #[cfg(windows)]
        {
            let roaming = std::env::var_os("APPDATA").map(PathBuf::from)?;
            let local = std::env::var_os("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| roaming.clone());
            Some(Self {
                config: roaming.join(APP_NAME),
                logs: local.join(APP_NAME).join("logs"),
            })
        }

        #[cfg(not(windows))]
        {
            let home = std::env::var_os("HOME").map(PathBuf::from)?;
            Some(Self {
                config: resolve_config_dir(&home),
                logs: resolve_log_dir(&home),
            })
        }
    }

    /// Create all directories that don't already exist.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [&self.config, &self.logs] {
            std::fs::create_dir_all(dir)?;
            info!("ensured directory: {}", dir.display());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Platform-specific path resolution
// ---------------------------------------------------------------------------

#[cfg_attr(windows, allow(dead_code))]
fn resolve_config_dir(home: &Path) -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join(APP_NAME)
    } else {
        home.join(".config").join(APP_NAME)
    }
}

#[cfg(target_os = "macos")]
fn resolve_log_dir(home: &Path) -> PathBuf {
    home.join("Library").join("Logs").join(APP_NAME)
}

#[cfg(not(target_os = "macos"))]
#[cfg_attr(windows, allow(dead_code))]
fn resolve_log_dir(home: &Path) -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        PathBuf::from(xdg).join(APP_NAME).join("logs")
    } else {
        home.join(".local").join("share").join(APP_NAME).join("logs")
    }
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;

    #[test]
    fn resolve_produces_valid_paths() {
        let paths = AppPaths::resolve().expect("HOME should be set in tests");
        assert!(paths.config.ends_with("macdock"));
        assert!(paths.logs.to_string_lossy().contains("macdock"));
    }

    #[test]
    fn config_dir_is_under_home_without_xdg() {
        if std::env::var_os("XDG_CONFIG_HOME").is_some() {
            return;
        }
        let dir = resolve_config_dir(Path::new("/home/someone"));
        assert_eq!(dir, PathBuf::from("/home/someone/.config/macdock"));
    }

    #[test]
    fn ensure_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths {
            config: tmp.path().join("config"),
            logs: tmp.path().join("share/logs"),
        };

        paths.ensure().expect("ensure should succeed");

        assert!(paths.config.is_dir());
        assert!(paths.logs.is_dir());
    }
}
