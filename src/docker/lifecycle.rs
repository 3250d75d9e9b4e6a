//! Container lifecycle management via `docker-compose`.
//!
//! ## Architecture
//!
//! ```text
//! ContainerController<R: CommandRunner, S: SettingsStore>
//!     ├─► start(config)        write compose file → docker-compose up -d
//!     │                        → docker-compose ps -q macos (remember id)
//!     ├─► stop()               docker-compose down → clear logs cache
//!     ├─► logs()               docker-compose logs --tail=50 macos
//!     ├─► is_running()         docker-compose ps -q macos
//!     ├─► check_existing()     docker ps -a -q --filter id=<id>
//!     └─► start_existing(id)   docker start <id>
//! ```
//!
//! Start, stop and resume are single-flight: a second call while one is in
//! progress fails with [`LifecycleError::Busy`]. If one of those futures is
//! dropped half way, the state machine is rolled back.
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use statig::prelude::*;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::app_log::LogSink;
use crate::docker::runner::{CommandError, CommandLine, CommandRunner};
use crate::docker::{ContainerConfig, ContainerRecord, SERVICE_NAME, WEB_UI_URL, compose};
use crate::settings::SettingsStore;
use crate::state_machine::lifecycle_sm::{LifecycleEvent, LifecycleMachine};

/// Number of log lines requested from `docker-compose logs`.
pub const LOG_TAIL_LINES: usize = 50;

/// Observable lifecycle state of the managed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl LifecycleState {
    pub fn is_running(self) -> bool {
        self == LifecycleState::Running
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("another start or stop is already in progress")]
    Busy,

    #[error("the container is already running")]
    AlreadyRunning,

    #[error("storage path must not be empty")]
    EmptyStoragePath,

    #[error("no remembered container to resume")]
    NoRememberedContainer,

    #[error("failed to write compose file '{}': {source}", path.display())]
    ComposeFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("failed to update settings: {0:#}")]
    Settings(anyhow::Error),
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Drives the macOS container through its lifecycle.
///
/// Constructed explicitly with its collaborators; wrap it in an `Arc` to share
/// it with background tasks (see [`crate::tasks`]).
pub struct ContainerController<R, S> {
    runner: R,
    settings: S,
    sink: LogSink,
    work_dir: PathBuf,
    machine: Mutex<StateMachine<LifecycleMachine>>,
    state_tx: watch::Sender<LifecycleState>,
    container_logs: Mutex<Vec<String>>,
    operation: tokio::sync::Mutex<()>,
}

impl<R, S> ContainerController<R, S> {
    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    /// Receive every lifecycle state change.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Directory holding `docker-compose.yml`; compose commands run from here.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Last container log snapshot fetched by [`Self::logs`].
    pub fn cached_logs(&self) -> Vec<String> {
        self.container_logs
            .lock()
            .expect("container log mutex poisoned")
            .clone()
    }

    fn dispatch(&self, event: &LifecycleEvent) -> LifecycleState {
        let next = {
            let mut machine = self.machine.lock().expect("lifecycle mutex poisoned");
            machine.handle(event);
            LifecycleMachine::public_state(machine.state())
        };

        let previous = self.state_tx.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, ?event, "lifecycle transition");
        }
        next
    }

    /// Enter a transitional state; the returned guard reverts it with
    /// `on_abort` unless [`PendingTransition::commit`] is called.
    fn begin_transition(
        &self,
        event: LifecycleEvent,
        on_abort: LifecycleEvent,
    ) -> PendingTransition<'_, R, S> {
        self.dispatch(&event);
        PendingTransition {
            controller: self,
            on_abort: Some(on_abort),
        }
    }

    fn begin_operation(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, LifecycleError> {
        self.operation.try_lock().map_err(|_| LifecycleError::Busy)
    }

    fn compose<I, A>(&self, args: I) -> CommandLine
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        CommandLine::new("docker-compose")
            .args(args)
            .current_dir(&self.work_dir)
    }
}

impl<R: CommandRunner, S: SettingsStore> ContainerController<R, S> {
    pub fn new(runner: R, settings: S, sink: LogSink, work_dir: impl Into<PathBuf>) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Idle);
        Self {
            runner,
            settings,
            sink,
            work_dir: work_dir.into(),
            machine: Mutex::new(LifecycleMachine::default().state_machine()),
            state_tx,
            container_logs: Mutex::new(Vec::new()),
            operation: tokio::sync::Mutex::new(()),
        }
    }

    /// Write the compose file for `config` and bring the container up.
    ///
    /// On success the state is Running and, when remembering is enabled, the
    /// new container id is stored in the settings and returned.
    pub async fn start(
        &self,
        config: &ContainerConfig,
    ) -> Result<Option<ContainerRecord>, LifecycleError> {
        let _operation = self.begin_operation()?;
        config.validate()?;
        if self.state().is_running() {
            return Err(LifecycleError::AlreadyRunning);
        }

        let pending =
            self.begin_transition(LifecycleEvent::StartRequested, LifecycleEvent::StartFailed);

        self.sink.info("Creating docker-compose.yml...");
        let path = compose::write(&self.work_dir, config)
            .await
            .map_err(|source| {
                let path = compose::compose_path(&self.work_dir);
                self.sink
                    .error(format!("Failed to write {}: {source}", path.display()));
                LifecycleError::ComposeFile { path, source }
            })?;
        self.sink.success(format!("{} created", path.display()));

        self.sink.info("Starting macOS container...");
        let up = self.compose(["up", "-d"]);
        let result = match self.runner.run(&up).await {
            Ok(output) => output.check(&up),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            match &e {
                CommandError::NonZeroExit { stderr, .. } => self.sink.error(format!(
                    "Container failed to start: {}",
                    if stderr.is_empty() { e.to_string() } else { stderr.clone() }
                )),
                _ => self.sink.error(format!("Failed to start container: {e}")),
            }
            return Err(e.into());
        }

        pending.commit(LifecycleEvent::StartSucceeded);
        self.sink.success("Container started successfully");
        self.sink.info(format!("Web interface available at {WEB_UI_URL}"));

        Ok(self.remember_started_container().await)
    }

    async fn remember_started_container(&self) -> Option<ContainerRecord> {
        if !self.settings.load().remember_container {
            return None;
        }

        let id = self.container_id().await?;
        match self.settings.update(|s| s.last_container_id = id.clone()) {
            Ok(_) => {
                self.sink.info(format!("Container id saved: {id}"));
                Some(ContainerRecord {
                    id,
                    remembered: true,
                })
            }
            Err(e) => {
                warn!(error = %e, "failed to persist container id");
                self.sink.warning(format!("Could not save container id: {e:#}"));
                Some(ContainerRecord {
                    id,
                    remembered: false,
                })
            }
        }
    }

    /// Bring the compose project down and clear the container log cache.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let _operation = self.begin_operation()?;
        let pending =
            self.begin_transition(LifecycleEvent::StopRequested, LifecycleEvent::StopFailed);

        self.sink.info("Stopping macOS container...");
        let down = self.compose(["down"]);
        let result = match self.runner.run(&down).await {
            Ok(output) => output.check(&down),
            Err(e) => Err(e),
        };

        match result {
            Ok(_) => {
                {
                    let mut cache = self
                        .container_logs
                        .lock()
                        .expect("container log mutex poisoned");
                    pending.commit(LifecycleEvent::StopSucceeded);
                    cache.clear();
                }
                self.sink.success("Container stopped");
                Ok(())
            }
            Err(e) => {
                self.sink.error(format!("Failed to stop container: {e}"));
                Err(e.into())
            }
        }
    }

    /// Snapshot of the last lines the container printed.
    ///
    /// Not a stream: callers poll (see [`crate::tasks::LogPoller`]). While the
    /// container is running the snapshot is also kept in [`Self::cached_logs`].
    pub async fn logs(&self) -> Result<Vec<String>, LifecycleError> {
        let tail = format!("--tail={LOG_TAIL_LINES}");
        let cmd = self.compose(["logs", tail.as_str(), SERVICE_NAME]);
        let output = self.runner.run(&cmd).await.inspect_err(|e| {
            error!(error = %e, "failed to fetch container logs");
        })?;

        let lines: Vec<String> = output.stdout_text().lines().map(str::to_string).collect();

        // A fetch that outlives a stop must not refill the cache.
        let mut cache = self
            .container_logs
            .lock()
            .expect("container log mutex poisoned");
        if self.state().is_running() {
            *cache = lines.clone();
        }
        Ok(lines)
    }

    /// `true` when `docker-compose ps -q` lists the service.
    pub async fn is_running(&self) -> bool {
        self.container_id().await.is_some()
    }

    /// Id of the compose service container, if it exists.
    pub async fn container_id(&self) -> Option<String> {
        let cmd = self.compose(["ps", "-q", SERVICE_NAME]);
        match self.runner.run(&cmd).await {
            Ok(output) => {
                let id = output.stdout_text().trim().to_string();
                (!id.is_empty()).then_some(id)
            }
            Err(e) => {
                error!(error = %e, "failed to query container status");
                None
            }
        }
    }

    /// Align the state machine with what Docker reports.
    pub async fn refresh(&self) -> LifecycleState {
        let running = self.is_running().await;
        self.dispatch(&LifecycleEvent::Observed { running })
    }

    /// Whether the remembered container still exists.
    ///
    /// Returns `false` without running anything when remembering is off or no
    /// id is stored. A container Docker no longer knows about is forgotten.
    pub async fn check_existing(&self) -> bool {
        let settings = self.settings.load();
        if !settings.remember_container || settings.last_container_id.is_empty() {
            return false;
        }
        let id = settings.last_container_id;

        let cmd = CommandLine::new("docker").args([
            "ps".to_string(),
            "-a".to_string(),
            "-q".to_string(),
            "--filter".to_string(),
            format!("id={id}"),
        ]);

        match self.runner.run(&cmd).await {
            Ok(output) if output.success() && !output.stdout_text().trim().is_empty() => {
                self.sink.info(format!("Found existing container: {id}"));
                true
            }
            Ok(_) => {
                self.sink.info("Existing container not found");
                self.forget_quietly();
                false
            }
            Err(e) => {
                error!(error = %e, "failed to look up existing container");
                false
            }
        }
    }

    /// Start the remembered container, if there is one.
    pub async fn resume(&self) -> Result<ContainerRecord, LifecycleError> {
        let settings = self.settings.load();
        if !settings.remember_container || settings.last_container_id.is_empty() {
            return Err(LifecycleError::NoRememberedContainer);
        }
        self.start_existing(&settings.last_container_id).await
    }

    /// `docker start <id>`. A failing start forgets the remembered id.
    pub async fn start_existing(&self, id: &str) -> Result<ContainerRecord, LifecycleError> {
        let _operation = self.begin_operation()?;
        if id.is_empty() {
            return Err(LifecycleError::NoRememberedContainer);
        }
        if self.state().is_running() {
            return Err(LifecycleError::AlreadyRunning);
        }

        let pending =
            self.begin_transition(LifecycleEvent::StartRequested, LifecycleEvent::StartFailed);

        self.sink.info("Starting existing container...");
        let cmd = CommandLine::new("docker").args(["start", id]);
        let result = match self.runner.run(&cmd).await {
            Ok(output) => output.check(&cmd),
            Err(e) => Err(e),
        };

        match result {
            Ok(_) => {
                pending.commit(LifecycleEvent::StartSucceeded);
                self.sink.success("Existing container started");
                self.sink.info(format!("Web interface available at {WEB_UI_URL}"));
                Ok(ContainerRecord {
                    id: id.to_string(),
                    remembered: self.settings.load().remember_container,
                })
            }
            Err(e) => {
                self.sink.error(format!("Failed to start existing container: {e}"));
                if matches!(e, CommandError::NonZeroExit { .. }) {
                    self.forget_quietly();
                }
                Err(e.into())
            }
        }
    }

    /// Drop the remembered id so the next start creates a fresh container.
    pub fn forget_container(&self) -> Result<(), LifecycleError> {
        self.settings
            .update(|s| s.last_container_id.clear())
            .map(|_| ())
            .map_err(LifecycleError::Settings)
    }

    fn forget_quietly(&self) {
        if let Err(e) = self.forget_container() {
            warn!(error = %e, "failed to clear remembered container id");
        }
    }
}

// ---------------------------------------------------------------------------
// Rollback guard
// ---------------------------------------------------------------------------

struct PendingTransition<'a, R, S> {
    controller: &'a ContainerController<R, S>,
    on_abort: Option<LifecycleEvent>,
}

impl<R, S> PendingTransition<'_, R, S> {
    fn commit(mut self, event: LifecycleEvent) {
        self.on_abort = None;
        self.controller.dispatch(&event);
    }
}

impl<R, S> Drop for PendingTransition<'_, R, S> {
    fn drop(&mut self) {
        if let Some(event) = self.on_abort.take() {
            self.controller.dispatch(&event);
        }
    }
}
