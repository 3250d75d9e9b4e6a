//! `LogPoller` on a paused clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use macdock::tasks::LogPoller;
use macdock::{ContainerController, LifecycleState, LogSink, MemorySettingsStore, Settings};

use common::{Reply, ScriptedRunner, SharedRunner};

const PS: &str = "docker-compose ps -q macos";
const LOGS: &str = "docker-compose logs --tail=50 macos";

fn running_controller(
    runner: ScriptedRunner,
) -> (
    Arc<ScriptedRunner>,
    Arc<ContainerController<SharedRunner, MemorySettingsStore>>,
) {
    let runner = Arc::new(runner.on(PS, Reply::ok("abc123\n")));
    let controller = Arc::new(ContainerController::new(
        SharedRunner(runner.clone()),
        MemorySettingsStore::new(Settings::default()),
        LogSink::new(),
        std::env::temp_dir(),
    ));
    (runner, controller)
}

fn log_fetches(runner: &ScriptedRunner) -> usize {
    runner.calls().iter().filter(|c| *c == LOGS).count()
}

#[tokio::test(start_paused = true)]
async fn publishes_snapshots_while_running() {
    let (runner, controller) =
        running_controller(ScriptedRunner::new().on(LOGS, Reply::ok("boot\nready\n")));
    assert_eq!(controller.refresh().await, LifecycleState::Running);

    let mut poller = LogPoller::new(Duration::from_secs(2));
    let mut rx = poller.subscribe();
    poller.start(controller.clone());

    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), vec!["boot", "ready"]);
    assert!(poller.is_active());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(log_fetches(&runner) >= 3);

    poller.stop();
    tokio::task::yield_now().await;
    assert!(!poller.is_active());
}

#[tokio::test(start_paused = true)]
async fn exits_once_container_stops() {
    let (runner, controller) =
        running_controller(ScriptedRunner::new().on(LOGS, Reply::ok("line\n")));
    controller.refresh().await;

    let mut poller = LogPoller::new(Duration::from_secs(2));
    poller.start(controller.clone());
    tokio::task::yield_now().await;

    controller.stop().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(!poller.is_active());
    let fetched = log_fetches(&runner);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(log_fetches(&runner), fetched);
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_is_published_as_a_line() {
    let (_, controller) = running_controller(ScriptedRunner::new().on(LOGS, Reply::LaunchFailure));
    controller.refresh().await;

    let mut poller = LogPoller::new(Duration::from_secs(2));
    let mut rx = poller.subscribe();
    poller.start(controller);

    rx.changed().await.unwrap();
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].starts_with("Failed to fetch logs"));
}

#[tokio::test(start_paused = true)]
async fn stop_discards_fetch_in_flight() {
    let runner = ScriptedRunner::new().on(LOGS, Reply::ok("stale\n"));
    let gate = runner.hold(LOGS);
    let (runner, controller) = running_controller(runner);
    controller.refresh().await;

    let mut poller = LogPoller::new(Duration::from_secs(2));
    let rx = poller.subscribe();
    poller.start(controller);
    while !runner.was_called(LOGS) {
        tokio::task::yield_now().await;
    }

    poller.stop();
    gate.notify_one();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(!rx.has_changed().unwrap());
    assert!(rx.borrow().is_empty());
    assert_eq!(log_fetches(&runner), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_previous_task() {
    let (runner, controller) = running_controller(ScriptedRunner::new().on(LOGS, Reply::ok("x\n")));
    controller.refresh().await;

    let mut poller = LogPoller::new(Duration::from_secs(2));
    let mut rx = poller.subscribe();
    poller.start(controller.clone());
    rx.changed().await.unwrap();
    assert_eq!(log_fetches(&runner), 1);

    poller.start(controller);
    tokio::time::sleep(Duration::from_secs(5)).await;

    // One fetch from the first task, then ticks at 0, 2 and 4 s from the second.
    assert_eq!(log_fetches(&runner), 4);
    assert!(poller.is_active());
    poller.stop();
}
