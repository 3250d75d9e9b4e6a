//! Host environment checks.
//!
//! Runs a fixed sequence of commands and stops at the first one that fails:
//!
//! ```text
//! docker --version            ─ fail ─► NotInstalled
//! docker info                 ─ fail ─► DaemonNotRunning
//! wsl --list --verbose  (win) ─ fail ─► WslRequired
//! docker run ... /dev/kvm     ─ fail ─► warning only
//!                             ─ ok ───► Installed
//! ```

use tracing::debug;

use crate::app_log::LogSink;
use crate::docker::EnvironmentStatus;
use crate::docker::runner::{CommandError, CommandLine, CommandRunner};

/// Host operating system family, as far as the probe cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Windows,
    Other,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else {
            HostPlatform::Other
        }
    }
}

/// Checks that Docker (and on Windows, WSL) is usable.
pub struct EnvironmentProbe<'a, R> {
    runner: &'a R,
    sink: &'a LogSink,
    platform: HostPlatform,
}

impl<'a, R: CommandRunner> EnvironmentProbe<'a, R> {
    pub fn new(runner: &'a R, sink: &'a LogSink) -> Self {
        Self {
            runner,
            sink,
            platform: HostPlatform::current(),
        }
    }

    /// Probe as if running on `platform` instead of the real host.
    pub fn with_platform(mut self, platform: HostPlatform) -> Self {
        self.platform = platform;
        self
    }

    /// Run the checks and report the status of the first failing step.
    ///
    /// Never fails: launch problems with the first two commands map to
    /// [`EnvironmentStatus::NotInstalled`], anything else unexpected to
    /// [`EnvironmentStatus::Error`].
    pub async fn check(&self) -> EnvironmentStatus {
        self.sink.info("Checking Docker installation...");

        match self.check_steps().await {
            Ok(status) => status,
            Err(e) if e.is_launch_failure() => {
                self.sink.error(format!("Error while checking Docker: {e}"));
                EnvironmentStatus::NotInstalled
            }
            Err(e) => {
                self.sink.error(format!("Unexpected error: {e}"));
                EnvironmentStatus::Error
            }
        }
    }

    async fn check_steps(&self) -> Result<EnvironmentStatus, CommandError> {
        let version = self
            .runner
            .run(&CommandLine::new("docker").arg("--version"))
            .await?;
        if !version.success() {
            self.sink.error("Docker is not installed");
            return Ok(EnvironmentStatus::NotInstalled);
        }
        self.sink.success(format!(
            "Docker is installed: {}",
            version.stdout_text().trim()
        ));

        let info = self
            .runner
            .run(&CommandLine::new("docker").arg("info"))
            .await?;
        if !info.success() {
            self.sink.warning("Docker daemon is not running");
            return Ok(EnvironmentStatus::DaemonNotRunning);
        }
        self.sink.success("Docker daemon is running");

        if self.platform == HostPlatform::Windows && !self.check_wsl().await {
            self.sink.warning("WSL is not configured for Docker");
            return Ok(EnvironmentStatus::WslRequired);
        }

        self.sink.success("All requirements met, Docker is ready");
        Ok(EnvironmentStatus::Installed)
    }

    /// `true` when at least one WSL distribution is registered. Runs the KVM
    /// check afterwards, whose outcome is only logged.
    async fn check_wsl(&self) -> bool {
        self.sink.info("Checking WSL...");

        let output = match self
            .runner
            .run(&CommandLine::new("wsl").args(["--list", "--verbose"]))
            .await
        {
            Ok(output) => output,
            Err(e) => {
                self.sink.warning(format!("Error while checking WSL: {e}"));
                return false;
            }
        };

        let listing = decode_wsl_output(&output.stdout);
        debug!(output = %listing, "wsl --list --verbose");

        if !has_wsl_distro(&listing) {
            self.sink.warning("No WSL distributions found");
            return false;
        }
        self.sink.success("WSL is configured and ready");

        self.check_kvm().await;
        true
    }

    async fn check_kvm(&self) {
        self.sink.info("Checking KVM availability...");

        let cmd = CommandLine::new("docker").args([
            "run",
            "--rm",
            "--device=/dev/kvm",
            "alpine:latest",
            "ls",
            "/dev/kvm",
        ]);

        match self.runner.run(&cmd).await {
            Ok(output) if output.success() && output.stdout_text().contains("/dev/kvm") => {
                self.sink.success("KVM is available through Docker");
            }
            Ok(output) => {
                let mut detail = output.stdout_text();
                detail.push_str(&output.stderr_text());
                self.sink.warning(format!("KVM is not available: {}", detail.trim()));
            }
            Err(e) => {
                self.sink.warning(format!("Could not check KVM: {e}"));
            }
        }
    }
}

/// Decode `wsl.exe` output, which is UTF-16LE on most Windows builds. Falls
/// back to UTF-8 when the bytes do not look like UTF-16 or decode to blank.
pub fn decode_wsl_output(bytes: &[u8]) -> String {
    let looks_wide = bytes.len() % 2 == 0 && bytes.iter().skip(1).step_by(2).any(|b| *b == 0);
    if looks_wide {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let wide = String::from_utf16_lossy(&units);
        if !wide
            .trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .is_empty()
        {
            return wide;
        }
    }

    String::from_utf8_lossy(bytes).into_owned()
}

/// Best-effort guess whether `wsl --list --verbose` shows a registered distro.
///
/// The output format is locale and version dependent, so this only looks for
/// a state column value or the default Ubuntu distro.
pub fn has_wsl_distro(listing: &str) -> bool {
    let lower = listing.to_lowercase();
    ["running", "stopped", "ubuntu"]
        .iter()
        .any(|needle| lower.contains(needle))
}
