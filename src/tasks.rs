//! Background work around the [`ContainerController`].
//!
//! - [`LogPoller`]: periodically fetches `docker-compose logs` while a viewer
//!   is open. Start it when logs become visible, stop it when they are hidden;
//!   it also ends by itself once the container is no longer running.
//! - [`spawn_operation`]: runs a start/stop/resume on the runtime so the
//!   caller's thread stays responsive. The returned handle can abort it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::docker::{
    CommandRunner, ContainerConfig, ContainerController, ContainerRecord, LifecycleError,
};
use crate::settings::SettingsStore;

/// How often the log view refreshes.
pub const LOG_POLL_INTERVAL: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Log poller
// ---------------------------------------------------------------------------

/// Restartable periodic fetch of container logs.
pub struct LogPoller {
    interval: Duration,
    lines_tx: watch::Sender<Vec<String>>,
    task: Option<JoinHandle<()>>,
}

impl Default for LogPoller {
    fn default() -> Self {
        Self::new(LOG_POLL_INTERVAL)
    }
}

impl LogPoller {
    pub fn new(interval: Duration) -> Self {
        let (lines_tx, _) = watch::channel(Vec::new());
        Self {
            interval,
            lines_tx,
            task: None,
        }
    }

    /// Receive each log snapshot as it is fetched.
    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.lines_tx.subscribe()
    }

    /// `true` while the polling task is alive.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Begin polling `controller`. Restarts the task if one is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<R, S>(&mut self, controller: Arc<ContainerController<R, S>>)
    where
        R: CommandRunner,
        S: SettingsStore,
    {
        self.stop();

        let lines_tx = self.lines_tx.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if !controller.state().is_running() {
                    debug!(state = %controller.state(), "log poller exiting (container not running)");
                    return;
                }

                match controller.logs().await {
                    Ok(lines) => {
                        lines_tx.send_replace(lines);
                    }
                    Err(e) => {
                        warn!(error = %e, "log poll failed");
                        lines_tx.send_replace(vec![format!("Failed to fetch logs: {e}")]);
                    }
                }
            }
        });

        info!(interval_ms = period.as_millis() as u64, "log poller started");
        self.task = Some(handle);
    }

    /// Stop polling. A fetch still in flight is dropped unpublished; the last
    /// published snapshot stays available to subscribers.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("log poller stopped");
        }
    }
}

impl Drop for LogPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Background lifecycle operations
// ---------------------------------------------------------------------------

/// A lifecycle operation to run in the background.
#[derive(Debug, Clone)]
pub enum Operation {
    Start(ContainerConfig),
    Resume,
    Stop,
}

/// What a finished [`Operation`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Started(Option<ContainerRecord>),
    Resumed(ContainerRecord),
    Stopped,
}

/// Handle to a spawned [`Operation`].
pub struct OperationHandle {
    handle: JoinHandle<Result<OperationOutcome, LifecycleError>>,
}

impl OperationHandle {
    /// Abort the operation. The controller rolls its state back.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the result. `None` if the operation was cancelled.
    pub async fn join(self) -> Option<Result<OperationOutcome, LifecycleError>> {
        match self.handle.await {
            Ok(result) => Some(result),
            Err(e) if e.is_cancelled() => None,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

/// Run `operation` on the tokio runtime.
pub fn spawn_operation<R, S>(
    controller: Arc<ContainerController<R, S>>,
    operation: Operation,
) -> OperationHandle
where
    R: CommandRunner,
    S: SettingsStore,
{
    let handle = tokio::spawn(async move {
        match operation {
            Operation::Start(config) => controller
                .start(&config)
                .await
                .map(OperationOutcome::Started),
            Operation::Resume => controller.resume().await.map(OperationOutcome::Resumed),
            Operation::Stop => controller.stop().await.map(|()| OperationOutcome::Stopped),
        }
    });

    OperationHandle { handle }
}

/// Lines of `current` that were not already shown as the tail of `previous`.
///
/// `docker-compose logs --tail` returns a sliding window, so consecutive
/// snapshots overlap; this finds the longest suffix of `previous` that is a
/// prefix of `current` and returns what follows it.
pub fn fresh_lines<'a>(previous: &[String], current: &'a [String]) -> &'a [String] {
    let max_overlap = previous.len().min(current.len());
    let overlap = (0..=max_overlap)
        .rev()
        .find(|&k| previous[previous.len() - k..] == current[..k])
        .unwrap_or(0);
    &current[overlap..]
}
