//! macdock: run macOS in Docker from the command line.
//!
//! Checks the host for Docker (and WSL/KVM on Windows), writes a
//! `docker-compose.yml` for the `dockurr/macos` image and manages the
//! container's lifecycle. Settings persist between runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};

use macdock::docker::probe::EnvironmentProbe;
use macdock::docker::{SystemRunner, VNC_PORT, WEB_UI_URL, compose};
use macdock::paths::AppPaths;
use macdock::settings::{FileSettingsStore, KNOWN_RAM_SIZES, KNOWN_VERSIONS, SettingsStore};
use macdock::tasks::{LogPoller, fresh_lines};
use macdock::{ContainerController, LifecycleState, LogSink, logging};

type Controller = ContainerController<SystemRunner, FileSettingsStore>;

/// Run a macOS virtual machine inside a Docker container
#[derive(Parser, Debug)]
#[command(name = "macdock", version, about = "Run macOS in Docker")]
struct Args {
    /// Directory holding docker-compose.yml (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    workdir: Option<PathBuf>,

    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that Docker (and WSL/KVM on Windows) is ready
    Check,
    /// Write docker-compose.yml and start a new container
    Start {
        #[command(flatten)]
        overrides: Overrides,
        /// Start without probing the environment first
        #[arg(long)]
        skip_check: bool,
    },
    /// Start the remembered container from a previous run
    Resume,
    /// Stop the container (docker-compose down)
    Stop,
    /// Show whether the container is running
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the last container log lines
    Logs {
        /// Keep polling until the container stops
        #[arg(short, long)]
        follow: bool,
        /// Poll interval in seconds when following
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
    /// Print the docker-compose.yml that `start` would write
    Compose {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Show or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the current settings
    Show,
    /// Set a single setting, e.g. `config set ram_size 16G`
    Set { key: String, value: String },
    /// Forget the remembered container so the next start creates a new one
    Forget,
}

/// Values that override (and are saved to) the settings.
#[derive(ClapArgs, Debug, Default)]
struct Overrides {
    /// macOS version (15, 14, 13, 12, 11)
    #[arg(long = "os-version")]
    os_version: Option<String>,
    /// RAM for the guest, e.g. 8G
    #[arg(long)]
    ram: Option<String>,
    /// Host directory mounted as /storage
    #[arg(long)]
    storage: Option<PathBuf>,
    /// Do not remember the container id for `resume`
    #[arg(long)]
    no_remember: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let paths = AppPaths::resolve();
    let _log_guard = logging::init(paths.as_ref().map(|p| p.logs.as_path()), args.verbose);

    if let Some(paths) = &paths {
        if let Err(e) = paths.ensure() {
            tracing::warn!(error = %e, "failed to create application directories");
        }
    }
    let Some(store) = FileSettingsStore::locate(paths.as_ref().map(|p| p.config.as_path())) else {
        bail!("cannot determine the home directory for settings; set MACDOCK_SETTINGS");
    };

    let work_dir = match args.workdir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving current directory")?,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating Tokio runtime")?;

    let controller = Arc::new(ContainerController::new(
        SystemRunner,
        store,
        LogSink::new(),
        work_dir,
    ));

    runtime.block_on(run(args.command, controller))
}

async fn run(command: Command, controller: Arc<Controller>) -> Result<()> {
    match command {
        Command::Check => check(&controller).await,
        Command::Start {
            overrides,
            skip_check,
        } => start(&controller, overrides, skip_check).await,
        Command::Resume => resume(&controller).await,
        Command::Stop => stop(&controller).await,
        Command::Status { json } => status(&controller, json).await,
        Command::Logs { follow, interval } => {
            logs(controller, follow, Duration::from_secs(interval.max(1))).await
        }
        Command::Compose { overrides } => {
            let settings = apply_overrides(controller.settings(), overrides, false)?;
            print!("{}", compose::render(&settings.container_config()));
            Ok(())
        }
        Command::Config { action } => config(&controller, action),
    }
}

async fn check(controller: &Controller) -> Result<()> {
    let status = EnvironmentProbe::new(controller.runner(), controller.sink())
        .check()
        .await;
    print_app_log(controller);

    println!("{status}");
    if let Some(url) = status.help_url() {
        println!("See {url}");
    }
    if !status.is_ready() {
        bail!("environment check failed: {status}");
    }
    Ok(())
}

async fn start(controller: &Controller, overrides: Overrides, skip_check: bool) -> Result<()> {
    let settings = apply_overrides(controller.settings(), overrides, true)?;
    let config = settings.container_config();

    if !skip_check {
        let status = EnvironmentProbe::new(controller.runner(), controller.sink())
            .check()
            .await;
        if !status.is_ready() {
            print_app_log(controller);
            if let Some(url) = status.help_url() {
                println!("See {url}");
            }
            bail!("cannot start: {status}");
        }
    }

    if controller.refresh().await == LifecycleState::Running {
        print_app_log(controller);
        println!("The container is already running at {WEB_UI_URL}");
        return Ok(());
    }

    let result = controller.start(&config).await;
    print_app_log(controller);
    let record = result?;

    println!("macOS is booting. Web interface: {WEB_UI_URL} (VNC on port {VNC_PORT})");
    if let Some(record) = record {
        println!("Remembered container {}", record.id);
    }
    Ok(())
}

async fn resume(controller: &Controller) -> Result<()> {
    if !controller.check_existing().await {
        print_app_log(controller);
        bail!("no remembered container to resume; use `macdock start`");
    }

    let result = controller.resume().await;
    print_app_log(controller);
    let record = result?;

    println!("Resumed container {}. Web interface: {WEB_UI_URL}", record.id);
    Ok(())
}

async fn stop(controller: &Controller) -> Result<()> {
    let result = controller.stop().await;
    print_app_log(controller);
    result?;
    Ok(())
}

async fn status(controller: &Controller, json: bool) -> Result<()> {
    let state = controller.refresh().await;
    let id = controller.container_id().await;
    let settings = controller.settings().load();

    if json {
        let value = serde_json::json!({
            "state": state,
            "container_id": id,
            "remembered_container_id": (!settings.last_container_id.is_empty())
                .then_some(&settings.last_container_id),
            "web_ui": state.is_running().then_some(WEB_UI_URL),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match (state, id) {
        (LifecycleState::Running, Some(id)) => {
            println!("running ({id})");
            println!("Web interface: {WEB_UI_URL}");
        }
        (state, _) => println!("{state}"),
    }
    if !settings.last_container_id.is_empty() {
        println!("Remembered container: {}", settings.last_container_id);
    }
    Ok(())
}

async fn logs(controller: Arc<Controller>, follow: bool, interval: Duration) -> Result<()> {
    if !follow {
        for line in controller.logs().await? {
            println!("{line}");
        }
        return Ok(());
    }

    if !controller.refresh().await.is_running() {
        bail!("the container is not running");
    }

    let mut poller = LogPoller::new(interval);
    let mut rx = poller.subscribe();
    poller.start(controller);

    let mut shown: Vec<String> = Vec::new();
    loop {
        match tokio::time::timeout(interval * 2, rx.changed()).await {
            Ok(Ok(())) => {
                let snapshot = rx.borrow_and_update().clone();
                for line in fresh_lines(&shown, &snapshot) {
                    println!("{line}");
                }
                shown = snapshot;
            }
            Ok(Err(_)) => break,
            Err(_) if !poller.is_active() => break,
            Err(_) => {}
        }
    }

    poller.stop();
    Ok(())
}

fn config(controller: &Controller, action: ConfigAction) -> Result<()> {
    let store = controller.settings();
    match action {
        ConfigAction::Show => {
            let settings = store.load();
            println!("# {}", store.path().display());
            print!("{}", toml::to_string_pretty(&settings)?);
            println!();
            println!("# known versions:  {}", KNOWN_VERSIONS.join(", "));
            println!("# known RAM sizes: {}", KNOWN_RAM_SIZES.join(", "));
        }
        ConfigAction::Set { key, value } => {
            let mut settings = store.load();
            settings.set_key(&key, &value)?;
            store.save(&settings)?;
            println!("{key} = {value}");
        }
        ConfigAction::Forget => {
            controller.forget_container()?;
            println!("Forgot remembered container");
        }
    }
    Ok(())
}

/// Merge command-line overrides into the saved settings. When `persist` is
/// set the merged settings are written back.
fn apply_overrides(
    store: &FileSettingsStore,
    overrides: Overrides,
    persist: bool,
) -> Result<macdock::Settings> {
    let mut settings = store.load();
    if let Some(version) = overrides.os_version {
        settings.macos_version = version;
    }
    if let Some(ram) = overrides.ram {
        settings.ram_size = ram;
    }
    if let Some(storage) = overrides.storage {
        settings.storage_path = storage.display().to_string();
    }
    if overrides.no_remember {
        settings.set_remember_container(false);
    }

    if persist {
        store.save(&settings)?;
    }
    Ok(settings)
}

fn print_app_log(controller: &Controller) {
    for entry in controller.sink().drain() {
        println!("{entry}");
    }
}
