//! macdock: run a macOS virtual machine inside a Docker container.
//!
//! The heavy lifting is done by the `dockurr/macos` image; this crate checks
//! that the host can run it, writes its `docker-compose.yml` and drives the
//! container through `docker-compose`.
//!
//! ```text
//! EnvironmentProbe ──► EnvironmentStatus
//! ContainerController ──► compose::render ──► docker-compose up/down/logs/ps
//!        │                      ▲
//!        ├── LogSink            └── SettingsStore (version, RAM, storage, remembered id)
//!        └── watch<LifecycleState> ──► LogPoller / front end
//! ```

pub mod app_log;
pub mod docker;
pub mod logging;
pub mod paths;
pub mod settings;
pub mod state_machine;
pub mod tasks;

pub use app_log::{LogEntry, LogLevel, LogSink};
pub use docker::{
    ContainerConfig, ContainerController, ContainerRecord, EnvironmentProbe, EnvironmentStatus,
    LifecycleError, LifecycleState,
};
pub use settings::{FileSettingsStore, MemorySettingsStore, Settings, SettingsStore};
