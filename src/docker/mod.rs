//! Docker orchestration for the macOS container.
//!
//! Checks that the host can run the container, renders its compose file and
//! drives `docker-compose` to start, stop and inspect it. All work happens by
//! invoking external binaries through a [`runner::CommandRunner`].

use std::fmt;

use serde::Serialize;

pub mod compose;
pub mod lifecycle;
pub mod probe;
pub mod runner;

// ---------------------------------------------------------------------------
// Constants shared across submodules
// ---------------------------------------------------------------------------

/// Compose service (and container) name.
pub const SERVICE_NAME: &str = "macos";

/// Container image running macOS under QEMU/KVM.
pub const IMAGE: &str = "dockurr/macos";

/// File name of the generated compose file inside the working directory.
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

/// Browser UI served by the container once it is up.
pub const WEB_UI_URL: &str = "http://127.0.0.1:8006/";

/// VNC endpoint exposed by the container (TCP and UDP).
pub const VNC_PORT: u16 = 5900;

pub const DOCKER_INSTALL_URL: &str = "https://www.docker.com/products/docker-desktop/";
pub const WSL_INSTALL_URL: &str = "https://docs.microsoft.com/en-us/windows/wsl/install";
pub const VIRTUALIZATION_GUIDE_URL: &str =
    "https://docs.docker.com/desktop/troubleshoot/topics/#virtualization";

// ---------------------------------------------------------------------------
// Shared types
// ---------------------------------------------------------------------------

/// Result of probing the host for a usable Docker setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentStatus {
    /// A probe is in flight.
    Checking,
    /// Docker is installed, its daemon answers and (on Windows) WSL is set up.
    Installed,
    /// `docker --version` failed or could not be launched.
    NotInstalled,
    /// The CLI exists but `docker info` cannot reach the daemon.
    DaemonNotRunning,
    /// Windows host without a registered WSL distribution.
    WslRequired,
    /// Something unexpected went wrong during the probe.
    Error,
}

impl EnvironmentStatus {
    /// Page that helps the user fix this status, if any.
    pub fn help_url(self) -> Option<&'static str> {
        match self {
            EnvironmentStatus::NotInstalled | EnvironmentStatus::DaemonNotRunning => {
                Some(DOCKER_INSTALL_URL)
            }
            EnvironmentStatus::WslRequired => Some(WSL_INSTALL_URL),
            EnvironmentStatus::Error => Some(VIRTUALIZATION_GUIDE_URL),
            EnvironmentStatus::Checking | EnvironmentStatus::Installed => None,
        }
    }

    pub fn is_ready(self) -> bool {
        self == EnvironmentStatus::Installed
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EnvironmentStatus::Checking => "checking",
            EnvironmentStatus::Installed => "Docker is installed and ready",
            EnvironmentStatus::NotInstalled => "Docker is not installed",
            EnvironmentStatus::DaemonNotRunning => "Docker is installed but the daemon is not running",
            EnvironmentStatus::WslRequired => "WSL is not configured for Docker",
            EnvironmentStatus::Error => "an unexpected error occurred while checking Docker",
        };
        f.write_str(text)
    }
}

/// User-chosen parameters for a new container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// macOS release passed to the image as `VERSION` (e.g. `"14"`).
    pub os_version: String,
    /// Guest memory passed as `RAM_SIZE` (e.g. `"8G"`).
    pub ram_size: String,
    /// Host directory mounted at `/storage` inside the container.
    pub storage_path: String,
}

impl ContainerConfig {
    /// The storage path is the only field that is checked.
    pub fn validate(&self) -> Result<(), lifecycle::LifecycleError> {
        if self.storage_path.trim().is_empty() {
            return Err(lifecycle::LifecycleError::EmptyStoragePath);
        }
        Ok(())
    }
}

/// A container id kept so a later launch can resume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRecord {
    pub id: String,
    pub remembered: bool,
}

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use lifecycle::{ContainerController, LifecycleError, LifecycleState};
pub use probe::{EnvironmentProbe, HostPlatform};
pub use runner::{CommandError, CommandLine, CommandRunner, ProcessOutput, SystemRunner};
